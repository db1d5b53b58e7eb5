use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::{Identity, KeyService, ServiceKind};
use crate::config::KeybaseConfig;
use crate::error::{PipethisError, Result};
use crate::fetch::Fetcher;
use crate::keyring::KeyRing;

/// Characters allowed in a query or username before it goes anywhere near
/// a URL.
static QUERY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\-\.]+$").unwrap());

/// Key service for the Keybase public directory (https://keybase.io).
#[derive(Debug, Clone)]
pub struct KeybaseService {
    fetcher: Fetcher,
    autocomplete_url: String,
    key_url_base: String,
}

#[derive(Debug, Deserialize)]
struct AutocompleteResponse {
    status: Status,
    #[serde(default)]
    completions: Vec<Completion>,
}

#[derive(Debug, Deserialize)]
struct Status {
    code: i64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Completion {
    #[serde(default)]
    components: Components,
}

#[derive(Debug, Default, Deserialize)]
struct Components {
    username: Option<Val>,
    key_fingerprint: Option<Val>,
    full_name: Option<Val>,
    twitter: Option<Val>,
    github: Option<Val>,
    hackernews: Option<Val>,
    reddit: Option<Val>,
    websites: Option<Vec<Val>>,
}

#[derive(Debug, Default, Deserialize)]
struct Val {
    #[serde(default)]
    val: String,
}

fn val(v: Option<Val>) -> String {
    v.map(|v| v.val).unwrap_or_default()
}

impl From<Components> for Identity {
    fn from(c: Components) -> Self {
        Identity {
            username: val(c.username),
            fingerprint: val(c.key_fingerprint),
            full_name: val(c.full_name),
            twitter: val(c.twitter),
            github: val(c.github),
            hacker_news: val(c.hackernews),
            reddit: val(c.reddit),
            sites: c
                .websites
                .unwrap_or_default()
                .into_iter()
                .map(|site| site.val)
                .collect(),
            emails: vec![],
        }
    }
}

/// Reject anything outside `[A-Za-z0-9_.-]`.
pub fn validate_query(query: &str) -> Result<&str> {
    if QUERY_RE.is_match(query) {
        Ok(query)
    } else {
        Err(PipethisError::InvalidQuery(query.to_string()))
    }
}

impl KeybaseService {
    pub fn new(fetcher: Fetcher, config: &KeybaseConfig) -> Self {
        Self {
            fetcher,
            autocomplete_url: config.autocomplete_url.clone(),
            key_url_base: config.key_url_base.clone(),
        }
    }

    fn autocomplete_url(&self, query: &str) -> Result<Url> {
        Url::parse_with_params(&self.autocomplete_url, &[("q", query)]).map_err(|e| {
            PipethisError::Config(format!(
                "bad Keybase autocomplete URL '{}': {}",
                self.autocomplete_url, e
            ))
        })
    }

    fn key_url(&self, username: &str) -> String {
        format!("{}/{}/key.asc", self.key_url_base.trim_end_matches('/'), username)
    }
}

/// Parse an autocomplete response into identities. A non-zero status code
/// is a service error; empty identities are dropped.
fn parse_response(body: &[u8], query: &str) -> Result<Vec<Identity>> {
    let response: AutocompleteResponse = serde_json::from_slice(body)?;
    if response.status.code != 0 {
        return Err(PipethisError::Service(format!(
            "Bad status code: {} ({})",
            response.status.name, response.status.code
        )));
    }

    let identities: Vec<Identity> = response
        .completions
        .into_iter()
        .map(|c| Identity::from(c.components))
        .filter(|identity| !identity.is_empty())
        .collect();

    if identities.is_empty() {
        return Err(PipethisError::NoMatches(query.to_string()));
    }

    Ok(identities)
}

/// Keep a key document only if it holds exactly one key.
fn single_key(ring: KeyRing, username: &str) -> Result<KeyRing> {
    match ring.len() {
        1 => Ok(ring),
        n => Err(PipethisError::KeyResolution(format!(
            "{n} keys returned for {username}, need exactly 1"
        ))),
    }
}

impl KeyService for KeybaseService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Keybase
    }

    /// Users matching `query` in any detail (username, social handles,
    /// fingerprint). Keybase caps the list at ten.
    fn matches(&self, query: &str) -> Result<Vec<Identity>> {
        let query = validate_query(query)?;
        let url = self.autocomplete_url(query)?;
        let body = self.fetcher.get_bytes(url.as_str())?;
        parse_response(&body, query)
    }

    /// Fetch the user's published key. Multi-key documents are refused
    /// rather than guessed at.
    fn resolve_key(&self, identity: &Identity) -> Result<KeyRing> {
        let username = validate_query(&identity.username)?;
        let body = self.fetcher.get_bytes(&self.key_url(username))?;
        single_key(KeyRing::parse(&body)?, username)
    }
}
