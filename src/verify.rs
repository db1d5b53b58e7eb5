use std::io::{Seek, SeekFrom};

use crate::error::{PipethisError, Result};
use crate::keyring::KeyRing;
use crate::signature::SignatureArtifact;

/// Check the script against its signature with `ring`.
///
/// The signature is tried as a binary detached signature first, then as an
/// armored one. Either passing is a pass.
pub fn verify(signature: &mut SignatureArtifact<'_>, ring: &KeyRing) -> Result<()> {
    let mut sig = signature.body()?;
    let mut script = signature.script().body()?;

    match ring.verify_detached(&mut script, &mut sig) {
        Ok(()) => return Ok(()),
        Err(e) => tracing::debug!(error = %e, "binary signature check failed"),
    }

    script.seek(SeekFrom::Start(0))?;
    sig.seek(SeekFrom::Start(0))?;

    match ring.verify_armored_detached(&mut script, &mut sig) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(error = %e, "armored signature check failed");
            Err(PipethisError::VerificationFailed)
        }
    }
}
