//! Identity and public key lookup for script authors.
//!
//! A [`KeyService`] turns an author query into candidate identities and
//! resolves one chosen identity into a key ring. [`resolve_author_key`]
//! drives a service and picks exactly one candidate.

pub mod keybase;
pub mod local;

use std::fmt;
use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{PipethisError, Result};
use crate::fetch::Fetcher;
use crate::keyring::KeyRing;

pub use keybase::KeybaseService;
pub use local::{KeyringLocation, LocalKeyringService};

/// A third-party identity and public key service.
pub trait KeyService {
    /// Which strategy this is.
    fn kind(&self) -> ServiceKind;

    /// All identities matching `query`. Zero matches is an error, never an
    /// empty success.
    fn matches(&self, query: &str) -> Result<Vec<Identity>>;

    /// The public key ring for one identity previously returned by
    /// [`KeyService::matches`]. Anything other than exactly one key is an
    /// error.
    fn resolve_key(&self, identity: &Identity) -> Result<KeyRing>;
}

/// An author's identity as reported by a key service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub fingerprint: String,
    pub full_name: String,
    pub twitter: String,
    pub github: String,
    pub hacker_news: String,
    pub reddit: String,
    pub sites: Vec<String>,
    pub emails: Vec<String>,
}

impl Identity {
    /// An identity with no attributes at all. Never a valid match.
    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
            && self.fingerprint.is_empty()
            && self.full_name.is_empty()
            && self.twitter.is_empty()
            && self.github.is_empty()
            && self.hacker_news.is_empty()
            && self.reddit.is_empty()
            && self.sites.iter().all(String::is_empty)
            && self.emails.iter().all(String::is_empty)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>15}: {}", "Identifier", self.username)?;
        writeln!(f, "{:>15}: {}", "Full name", self.full_name)?;
        writeln!(f, "{:>15}: {}", "Twitter", self.twitter)?;
        writeln!(f, "{:>15}: {}", "Github", self.github)?;
        writeln!(f, "{:>15}: {}", "Hacker News", self.hacker_news)?;
        writeln!(f, "{:>15}: {}", "Reddit", self.reddit)?;
        writeln!(f, "{:>15}: {}", "Fingerprint", self.fingerprint)?;
        for site in &self.sites {
            writeln!(f, "{:>15}: {}", "Site", site)?;
        }
        for email in &self.emails {
            writeln!(f, "{:>15}: {}", "Email", email)?;
        }
        Ok(())
    }
}

/// Key service selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Keybase,
    Local,
}

impl ServiceKind {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keybase" => Some(Self::Keybase),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keybase => write!(f, "keybase"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Create the requested key service. Scripts read from a pipe always use
/// the local keyring: there is no terminal to confirm a remote identity.
pub fn new_key_service(
    kind: ServiceKind,
    from_pipe: bool,
    config: &Config,
    keyring: &KeyringLocation,
    fetcher: &Fetcher,
) -> Result<Box<dyn KeyService>> {
    let kind = if from_pipe { ServiceKind::Local } else { kind };

    match kind {
        ServiceKind::Keybase => Ok(Box::new(KeybaseService::new(
            fetcher.clone(),
            &config.keybase,
        ))),
        ServiceKind::Local => Ok(Box::new(LocalKeyringService::new(keyring)?)),
    }
}

/// Look up `query` with `service`, pick one identity and return its key
/// ring.
///
/// With `force_single` the lookup must produce exactly one candidate and no
/// prompt is shown. Otherwise every candidate is listed on `prompt` and the
/// operator picks one by number from `input`.
pub fn resolve_author_key<R: BufRead, W: Write>(
    service: &dyn KeyService,
    query: &str,
    force_single: bool,
    input: &mut R,
    prompt: &mut W,
) -> Result<KeyRing> {
    let matches = service.matches(query)?;
    if matches.is_empty() {
        return Err(PipethisError::NoMatches(query.to_string()));
    }

    // Show every detail (handles, sites, fingerprint) so the operator can
    // confirm this is the author they expect.
    let chosen = if force_single {
        choose_single_match(query, matches)?
    } else {
        choose_match(matches, input, prompt)?
    };

    let ring = service.resolve_key(&chosen)?;
    tracing::info!(
        service = %service.kind(),
        identity = %chosen.username,
        fingerprint = %chosen.fingerprint,
        "verifying script against selected identity"
    );

    Ok(ring)
}

/// Prompt for one of `matches`. `q` (or an empty answer) cancels.
fn choose_match<R: BufRead, W: Write>(
    mut matches: Vec<Identity>,
    input: &mut R,
    prompt: &mut W,
) -> Result<Identity> {
    tracing::info!(count = matches.len(), "found author matches");

    writeln!(prompt)?;
    for (idx, identity) in matches.iter().enumerate() {
        writeln!(prompt, "{idx}:\n")?;
        writeln!(prompt, "{identity}")?;
    }
    write!(prompt, "\nEnter the number to use, or 'q' to cancel: ")?;
    prompt.flush()?;

    let mut response = String::new();
    input.read_line(&mut response)?;
    let response = response.trim();

    if response.is_empty() || response.eq_ignore_ascii_case("q") {
        return Err(PipethisError::SelectionCancelled);
    }

    let n: i64 = response
        .parse()
        .map_err(|_| PipethisError::SelectionParse(response.to_string()))?;

    if n < 0 || n as usize >= matches.len() {
        return Err(PipethisError::InvalidSelection(n));
    }
    writeln!(prompt)?;

    Ok(matches.swap_remove(n as usize))
}

fn choose_single_match(query: &str, mut matches: Vec<Identity>) -> Result<Identity> {
    match matches.len() {
        0 => Err(PipethisError::NoMatches(query.to_string())),
        1 => Ok(matches.remove(0)),
        n => Err(PipethisError::AmbiguousMatches(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;

    /// Canned service: returns fixed matches and resolves every identity to
    /// Alice's key.
    struct FakeService {
        matches: Vec<Identity>,
        resolved: RefCell<Vec<Identity>>,
    }

    impl FakeService {
        fn new(matches: Vec<Identity>) -> Self {
            Self {
                matches,
                resolved: RefCell::new(Vec::new()),
            }
        }
    }

    impl KeyService for FakeService {
        fn kind(&self) -> ServiceKind {
            ServiceKind::Local
        }

        fn matches(&self, _query: &str) -> Result<Vec<Identity>> {
            Ok(self.matches.clone())
        }

        fn resolve_key(&self, identity: &Identity) -> Result<KeyRing> {
            self.resolved.borrow_mut().push(identity.clone());
            KeyRing::parse(&std::fs::read("tests/fixtures/alice.asc")?)
        }
    }

    fn named(username: &str) -> Identity {
        Identity {
            username: username.into(),
            ..Default::default()
        }
    }

    fn resolve(service: &FakeService, force_single: bool, answer: &str) -> Result<KeyRing> {
        let mut input = Cursor::new(answer.to_string());
        let mut prompt = Vec::new();
        resolve_author_key(service, "who", force_single, &mut input, &mut prompt)
    }

    #[test]
    fn single_match_bails_without_matches() {
        let err = choose_single_match("who", vec![]).unwrap_err();
        assert!(matches!(err, PipethisError::NoMatches(_)));
    }

    #[test]
    fn single_match_bails_with_more_than_one() {
        let err = choose_single_match("who", vec![named("a"), named("b")]).unwrap_err();
        assert!(matches!(err, PipethisError::AmbiguousMatches(2)));
    }

    #[test]
    fn single_match_returns_the_match() {
        let identity = choose_single_match("who", vec![named("foo")]).unwrap();
        assert_eq!(identity.username, "foo");
    }

    #[test]
    fn empty_result_is_no_match() {
        let service = FakeService::new(vec![]);
        assert!(matches!(
            resolve(&service, false, "0\n"),
            Err(PipethisError::NoMatches(_))
        ));
    }

    #[test]
    fn forced_single_resolves_without_prompting() {
        let service = FakeService::new(vec![named("alice")]);
        let ring = resolve(&service, true, "").unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(service.resolved.borrow()[0].username, "alice");
    }

    #[test]
    fn forced_single_rejects_ambiguity() {
        let service = FakeService::new(vec![named("a"), named("b")]);
        assert!(matches!(
            resolve(&service, true, "0\n"),
            Err(PipethisError::AmbiguousMatches(2))
        ));
        assert!(service.resolved.borrow().is_empty());
    }

    #[test]
    fn prompt_picks_by_number() {
        let service = FakeService::new(vec![named("a"), named("b"), named("c")]);
        resolve(&service, false, "1\n").unwrap();
        assert_eq!(service.resolved.borrow()[0].username, "b");
    }

    #[test]
    fn prompt_lists_every_candidate() {
        let mut input = Cursor::new("0\n");
        let mut prompt = Vec::new();
        choose_match(vec![named("first"), named("second")], &mut input, &mut prompt).unwrap();

        let shown = String::from_utf8(prompt).unwrap();
        assert!(shown.contains("0:\n"));
        assert!(shown.contains("1:\n"));
        assert!(shown.contains("Identifier: first"));
        assert!(shown.contains("Identifier: second"));
        assert!(shown.contains("'q' to cancel"));
    }

    #[test]
    fn prompt_cancels_on_q() {
        let service = FakeService::new(vec![named("a")]);
        assert!(matches!(
            resolve(&service, false, "q\n"),
            Err(PipethisError::SelectionCancelled)
        ));
        assert!(matches!(
            resolve(&service, false, "Q\n"),
            Err(PipethisError::SelectionCancelled)
        ));
    }

    #[test]
    fn prompt_rejects_non_numbers() {
        let service = FakeService::new(vec![named("a")]);
        assert!(matches!(
            resolve(&service, false, "first\n"),
            Err(PipethisError::SelectionParse(_))
        ));
    }

    #[test]
    fn prompt_rejects_out_of_range() {
        let service = FakeService::new(vec![named("a"), named("b")]);
        assert!(matches!(
            resolve(&service, false, "2\n"),
            Err(PipethisError::InvalidSelection(2))
        ));
        assert!(matches!(
            resolve(&service, false, "-1\n"),
            Err(PipethisError::InvalidSelection(-1))
        ));
    }

    #[test]
    fn empty_identity_is_detected() {
        assert!(Identity::default().is_empty());
        assert!(Identity {
            emails: vec![String::new()],
            ..Default::default()
        }
        .is_empty());
        assert!(!named("a").is_empty());
    }

    #[test]
    fn identity_display_lists_all_details() {
        let identity = Identity {
            username: "alice".into(),
            fingerprint: "DDB2F671970892C1".into(),
            sites: vec!["https://alice.example.org".into()],
            emails: vec!["Alice Example <alice@example.org>".into()],
            ..Default::default()
        };
        let shown = identity.to_string();
        assert!(shown.contains("     Identifier: alice\n"));
        assert!(shown.contains("    Fingerprint: DDB2F671970892C1\n"));
        assert!(shown.contains("           Site: https://alice.example.org\n"));
        assert!(shown.contains("          Email: Alice Example <alice@example.org>\n"));
    }

    #[test]
    fn service_kind_parses_leniently() {
        assert_eq!(ServiceKind::from_str_lenient("keybase"), Some(ServiceKind::Keybase));
        assert_eq!(ServiceKind::from_str_lenient("LOCAL"), Some(ServiceKind::Local));
        assert_eq!(ServiceKind::from_str_lenient("onename"), None);
        assert_eq!(ServiceKind::from_str_lenient("gpg"), None);
    }

    #[test]
    fn keybase_is_created_without_pipe() {
        let config = Config::default();
        let fetcher = Fetcher::new(config.http.timeout()).unwrap();
        let service = new_key_service(
            ServiceKind::Keybase,
            false,
            &config,
            &KeyringLocation::default(),
            &fetcher,
        )
        .unwrap();
        assert_eq!(service.kind(), ServiceKind::Keybase);
    }

    #[test]
    fn pipe_forces_local_keyring() {
        let config = Config::default();
        let fetcher = Fetcher::new(config.http.timeout()).unwrap();
        let location = KeyringLocation {
            home: Some("/nonexistent-home".into()),
            ..Default::default()
        };

        let err = new_key_service(ServiceKind::Keybase, true, &config, &location, &fetcher)
            .err()
            .unwrap();
        match err {
            PipethisError::KeyRingFile { path, .. } => {
                assert_eq!(path, "/nonexistent-home/.gnupg/pubring.gpg")
            }
            other => panic!("unexpected error: {other}"),
        }

        let location = KeyringLocation {
            explicit: Some("tests/fixtures/pubring.gpg".into()),
            ..Default::default()
        };
        let service =
            new_key_service(ServiceKind::Keybase, true, &config, &location, &fetcher).unwrap();
        assert_eq!(service.kind(), ServiceKind::Local);
    }
}
