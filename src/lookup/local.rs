use std::fs;
use std::path::{Path, PathBuf};

use once_cell::unsync::OnceCell;

use super::{Identity, KeyService, ServiceKind};
use crate::error::{PipethisError, Result};
use crate::keyring::KeyRing;

/// Where to find the local public keyring. Built from the environment at
/// the edge of the program and handed in, so the service itself never
/// reads process state.
#[derive(Debug, Clone, Default)]
pub struct KeyringLocation {
    /// Explicit keyring file; wins over everything else.
    pub explicit: Option<PathBuf>,
    /// `$GNUPGHOME`, when set and non-empty.
    pub gnupg_home: Option<PathBuf>,
    /// The user's home directory.
    pub home: Option<PathBuf>,
}

impl KeyringLocation {
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            gnupg_home: std::env::var_os("GNUPGHOME")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            home: dirs::home_dir(),
        }
    }

    /// `explicit`, else `$GNUPGHOME/pubring.gpg`, else `~/.gnupg/pubring.gpg`.
    pub fn ring_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.explicit {
            return Ok(path.clone());
        }
        if let Some(gnupg_home) = &self.gnupg_home {
            return Ok(gnupg_home.join("pubring.gpg"));
        }
        let home = self
            .home
            .as_ref()
            .ok_or_else(|| PipethisError::Config("Could not find home directory".into()))?;
        Ok(home.join(".gnupg").join("pubring.gpg"))
    }
}

/// Key service backed by a local GnuPG public keyring.
#[derive(Debug)]
pub struct LocalKeyringService {
    ring_file: PathBuf,
    ring: OnceCell<Option<KeyRing>>,
}

impl LocalKeyringService {
    /// Fails when the keyring file is missing or empty.
    pub fn new(location: &KeyringLocation) -> Result<Self> {
        let ring_file = location.ring_file()?;

        let metadata = fs::metadata(&ring_file).map_err(|source| PipethisError::KeyRingFile {
            path: ring_file.display().to_string(),
            source,
        })?;
        if metadata.len() == 0 {
            return Err(PipethisError::EmptyKeyRing(ring_file.display().to_string()));
        }

        Ok(Self {
            ring_file,
            ring: OnceCell::new(),
        })
    }

    pub fn ring_file(&self) -> &Path {
        &self.ring_file
    }

    /// The keyring, loaded on first use. A keyring that cannot be read or
    /// parsed is `None` rather than an error.
    fn ring(&self) -> Option<&KeyRing> {
        self.ring
            .get_or_init(|| match load(&self.ring_file) {
                Ok(ring) => Some(ring),
                Err(e) => {
                    tracing::warn!(
                        path = %self.ring_file.display(),
                        error = %e,
                        "failed to load key ring"
                    );
                    None
                }
            })
            .as_ref()
    }

    fn loaded_ring(&self) -> Result<&KeyRing> {
        self.ring()
            .ok_or_else(|| PipethisError::NoKeyRing(self.ring_file.display().to_string()))
    }
}

impl KeyService for LocalKeyringService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Local
    }

    /// Every key whose ID or any user ID contains `query`, ignoring case.
    fn matches(&self, query: &str) -> Result<Vec<Identity>> {
        let ring = self.loaded_ring()?;

        let identities: Vec<Identity> = ring
            .entries()
            .into_iter()
            .map(|entry| Identity {
                fingerprint: entry.key_id,
                emails: entry.user_ids,
                ..Default::default()
            })
            .filter(|identity| is_match(query, identity))
            .collect();

        if identities.is_empty() {
            return Err(PipethisError::NoMatches(query.to_string()));
        }

        Ok(identities)
    }

    /// Look the identity's fingerprint up as a 64-bit key ID. Exactly one
    /// key must carry it.
    fn resolve_key(&self, identity: &Identity) -> Result<KeyRing> {
        let id = u64::from_str_radix(&identity.fingerprint, 16).map_err(|e| {
            PipethisError::KeyResolution(format!(
                "invalid key ID '{}': {}",
                identity.fingerprint, e
            ))
        })?;

        let keys = self.loaded_ring()?.select_by_key_id(id);
        if keys.len() != 1 {
            return Err(PipethisError::KeyResolution(format!(
                "{} keys found for {}, need exactly 1",
                keys.len(),
                identity.fingerprint
            )));
        }

        Ok(keys)
    }
}

fn load(path: &Path) -> Result<KeyRing> {
    let ring = KeyRing::parse(&fs::read(path)?)?;
    if ring.is_empty() {
        return Err(PipethisError::EmptyKeyRing(path.display().to_string()));
    }
    Ok(ring)
}

fn is_match(query: &str, identity: &Identity) -> bool {
    let query = query.to_uppercase();

    if identity.fingerprint.to_uppercase().contains(&query) {
        return true;
    }

    identity
        .emails
        .iter()
        .any(|email| email.to_uppercase().contains(&query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixture_service() -> LocalKeyringService {
        LocalKeyringService::new(&KeyringLocation {
            explicit: Some("tests/fixtures/pubring.gpg".into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn is_match_matches_on_fingerprint() {
        let identity = Identity {
            fingerprint: "foobar".into(),
            ..Default::default()
        };

        assert!(is_match("oba", &identity));
        assert!(is_match("foo", &identity));
        assert!(is_match("bar", &identity));
        assert!(is_match("FOOBAR", &identity));
        assert!(!is_match("quux", &identity));
    }

    #[test]
    fn is_match_matches_on_emails() {
        let identity = Identity {
            emails: vec!["foobar".into(), "bizbaz".into(), "THINGS".into()],
            ..Default::default()
        };

        assert!(is_match("oba", &identity));
        assert!(is_match("FOOBAR", &identity));
        assert!(is_match("zba", &identity));
        assert!(is_match("thin", &identity));
    }

    #[test]
    fn is_match_fails_without_details() {
        assert!(!is_match("foo", &Identity::default()));
    }

    #[test]
    fn gnupg_home_override() {
        let location = KeyringLocation {
            gnupg_home: Some("/foo".into()),
            home: Some("/home/someone".into()),
            ..Default::default()
        };
        assert_eq!(location.ring_file().unwrap(), PathBuf::from("/foo/pubring.gpg"));

        match LocalKeyringService::new(&location).unwrap_err() {
            PipethisError::KeyRingFile { path, source } => {
                assert_eq!(path, "/foo/pubring.gpg");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn home_default() {
        let location = KeyringLocation {
            home: Some("/home/someone".into()),
            ..Default::default()
        };
        assert_eq!(
            location.ring_file().unwrap(),
            PathBuf::from("/home/someone/.gnupg/pubring.gpg")
        );
    }

    #[test]
    fn empty_keyring_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let location = KeyringLocation {
            explicit: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(
            LocalKeyringService::new(&location),
            Err(PipethisError::EmptyKeyRing(_))
        ));
    }

    #[test]
    fn unreadable_keyring_reports_no_ring() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"this is not a keyring").unwrap();
        let service = LocalKeyringService::new(&KeyringLocation {
            explicit: Some(file.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(
            service.matches("alice"),
            Err(PipethisError::NoKeyRing(_))
        ));
    }

    #[test]
    fn matches_user_id_substring() {
        let matches = fixture_service().matches("alice").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].fingerprint, "DDB2F671970892C1");
        assert_eq!(matches[0].emails, vec!["Alice Example <alice@example.org>"]);
    }

    #[test]
    fn matches_key_id_case_insensitively() {
        let matches = fixture_service().matches("546ec04d").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].emails, vec!["Bob Builder <bob@example.org>"]);
    }

    #[test]
    fn matches_several_keys() {
        assert_eq!(fixture_service().matches("EXAMPLE.ORG").unwrap().len(), 2);
    }

    #[test]
    fn no_matches_is_an_error() {
        assert!(matches!(
            fixture_service().matches("mallory"),
            Err(PipethisError::NoMatches(_))
        ));
    }

    #[test]
    fn resolves_single_key() {
        let service = fixture_service();
        let alice = service.matches("alice").unwrap().remove(0);
        let ring = service.resolve_key(&alice).unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.entries()[0].key_id, "DDB2F671970892C1");
    }

    #[test]
    fn resolve_rejects_bad_fingerprints() {
        let service = fixture_service();
        assert!(matches!(
            service.resolve_key(&Identity::default()),
            Err(PipethisError::KeyResolution(_))
        ));
        let unknown = Identity {
            fingerprint: "0123456789ABCDEF".into(),
            ..Default::default()
        };
        assert!(matches!(
            service.resolve_key(&unknown),
            Err(PipethisError::KeyResolution(_))
        ));
    }

    proptest! {
        #[test]
        fn any_case_of_a_substring_matches(
            fingerprint in "[a-zA-Z0-9]{8,24}",
            start in 0usize..4,
            len in 1usize..4,
            upper in any::<bool>(),
        ) {
            let query = &fingerprint[start..start + len];
            let query = if upper { query.to_uppercase() } else { query.to_lowercase() };
            let identity = Identity { fingerprint: fingerprint.clone(), ..Default::default() };
            prop_assert!(is_match(&query, &identity));
        }
    }
}
