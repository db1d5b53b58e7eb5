//! Public key rings and detached signature checks, backed by sequoia-openpgp.

use std::io::Read;

use sequoia_openpgp as openpgp;

use openpgp::armor;
use openpgp::cert::{Cert, CertParser};
use openpgp::parse::stream::{
    DetachedVerifierBuilder, MessageLayer, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::{KeyHandle, KeyID};

use crate::error::Result;

/// A set of public certificates a signature may be checked against.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    certs: Vec<Cert>,
}

/// Printable summary of one certificate in a ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// 64-bit primary key ID, upper-case hex.
    pub key_id: String,
    /// User ID strings, typically `Name <email>`.
    pub user_ids: Vec<String>,
}

impl KeyRing {
    /// Parse a key ring. Accepts binary keyring files as well as armored
    /// public key blocks. Certificates that fail to parse are skipped.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            certs: usable_certs(CertParser::from_bytes(bytes)?),
        })
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn entries(&self) -> Vec<KeyEntry> {
        self.certs
            .iter()
            .map(|cert| KeyEntry {
                key_id: cert.keyid().to_hex(),
                user_ids: cert
                    .userids()
                    .map(|ua| String::from_utf8_lossy(ua.userid().value()).into_owned())
                    .collect(),
            })
            .collect()
    }

    /// Certificates carrying a primary key or subkey with this key ID.
    pub fn select_by_key_id(&self, id: u64) -> KeyRing {
        let id = KeyID::new(id);
        let certs = self
            .certs
            .iter()
            .filter(|cert| cert.keys().any(|ka| ka.key().keyid() == id))
            .cloned()
            .collect();
        KeyRing { certs }
    }

    /// Check a binary detached signature over `message`.
    pub fn verify_detached(
        &self,
        message: &mut impl Read,
        signature: &mut impl Read,
    ) -> Result<()> {
        let mut sig = Vec::new();
        signature.read_to_end(&mut sig)?;
        self.check(message, &sig)
    }

    /// Check an ASCII-armored detached signature over `message`.
    pub fn verify_armored_detached(
        &self,
        message: &mut impl Read,
        signature: &mut impl Read,
    ) -> Result<()> {
        let mut armored = Vec::new();
        signature.read_to_end(&mut armored)?;

        let mut reader = armor::Reader::from_bytes(
            &armored,
            armor::ReaderMode::Tolerant(Some(armor::Kind::Signature)),
        );
        let mut sig = Vec::new();
        reader.read_to_end(&mut sig)?;

        self.check(message, &sig)
    }

    fn check(&self, message: &mut impl Read, sig: &[u8]) -> Result<()> {
        let mut data = Vec::new();
        message.read_to_end(&mut data)?;

        let policy = StandardPolicy::new();
        let helper = RingHelper { certs: &self.certs };
        let mut verifier =
            DetachedVerifierBuilder::from_bytes(sig)?.with_policy(&policy, None, helper)?;
        verifier.verify_bytes(&data)?;
        Ok(())
    }
}

fn usable_certs(parsed: impl Iterator<Item = openpgp::Result<Cert>>) -> Vec<Cert> {
    parsed
        .filter_map(|cert| match cert {
            Ok(cert) => Some(cert),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable certificate in key ring");
                None
            }
        })
        .collect()
}

/// Hands the whole ring to the verifier and accepts the message when any
/// signature in any group checks out.
struct RingHelper<'a> {
    certs: &'a [Cert],
}

impl VerificationHelper for RingHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(self.certs.to_vec())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                if results.iter().any(|r| r.is_ok()) {
                    return Ok(());
                }
            }
        }
        Err(openpgp::Error::BadSignature("no good signature from the key ring".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::fs::File;

    const ALICE_KEY_ID: &str = "DDB2F671970892C1";
    const BOB_KEY_ID: &str = "546EC04DDEE05C8F";

    fn ring(path: &str) -> KeyRing {
        KeyRing::parse(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn parses_binary_keyring() {
        let ring = ring("tests/fixtures/pubring.gpg");
        assert_eq!(ring.len(), 2);

        let ids: Vec<String> = ring.entries().into_iter().map(|e| e.key_id).collect();
        assert!(ids.contains(&ALICE_KEY_ID.to_string()));
        assert!(ids.contains(&BOB_KEY_ID.to_string()));
    }

    #[test]
    fn parses_armored_key() {
        let ring = ring("tests/fixtures/alice.asc");
        let entries = ring.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key_id, ALICE_KEY_ID);
        assert_eq!(entries[0].user_ids, vec!["Alice Example <alice@example.org>"]);
    }

    #[test]
    fn selects_by_key_id() {
        let ring = ring("tests/fixtures/pubring.gpg");
        let id = u64::from_str_radix(ALICE_KEY_ID, 16).unwrap();
        assert_eq!(ring.select_by_key_id(id).len(), 1);
        assert!(ring.select_by_key_id(0xdead_beef).is_empty());
    }

    #[test]
    fn verifies_binary_detached_signature() {
        let ring = ring("tests/fixtures/alice.asc");
        let mut script = File::open("tests/fixtures/hello.sh").unwrap();
        let mut sig = File::open("tests/fixtures/hello.sh.sig").unwrap();
        ring.verify_detached(&mut script, &mut sig).unwrap();
    }

    #[test]
    fn verifies_armored_detached_signature() {
        let ring = ring("tests/fixtures/alice.asc");
        let mut script = File::open("tests/fixtures/hello.sh").unwrap();
        let mut sig = File::open("tests/fixtures/hello.sh.asc").unwrap();
        ring.verify_armored_detached(&mut script, &mut sig).unwrap();
    }

    #[test]
    fn rejects_signature_from_another_key() {
        let ring = ring("tests/fixtures/alice.asc");
        let mut script = File::open("tests/fixtures/hello.sh").unwrap();
        let mut sig = File::open("tests/fixtures/hello.sh.bob.sig").unwrap();
        assert!(ring.verify_detached(&mut script, &mut sig).is_err());
    }

    #[test]
    fn rejects_mutated_message() {
        let ring = ring("tests/fixtures/alice.asc");
        let mut contents = fs::read("tests/fixtures/hello.sh").unwrap();
        let last = contents.len() - 2;
        contents[last] ^= 0x01;

        let mut sig = File::open("tests/fixtures/hello.sh.sig").unwrap();
        assert!(ring.verify_detached(&mut contents.as_slice(), &mut sig).is_err());
    }

    #[test]
    fn unreadable_certificates_are_skipped() {
        let alice = ring("tests/fixtures/alice.asc").certs.remove(0);
        let two = ring("tests/fixtures/two_keys.asc").certs;
        let parsed = vec![
            Ok(alice),
            Err(anyhow::anyhow!("unsupported public key algorithm")),
            Ok(two[1].clone()),
        ];

        let ring = KeyRing {
            certs: usable_certs(parsed.into_iter()),
        };
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.entries()[0].key_id, ALICE_KEY_ID);
    }
}
