//! The detached signature a script is verified against.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use once_cell::unsync::OnceCell;
use tempfile::TempPath;

use crate::error::{PipethisError, Result};
use crate::fetch::Fetcher;
use crate::script::ScriptArtifact;

/// Signature bytes for one script, stored next to the script's temporary
/// copy at `<temp>.sig`.
#[derive(Debug)]
pub struct SignatureArtifact<'s> {
    script: &'s ScriptArtifact,
    fetcher: &'s Fetcher,
    path: PathBuf,
    explicit_source: Option<String>,
    source: OnceCell<Option<String>>,
    /// Guard for a downloaded signature. Inline signatures are owned by the
    /// script instead.
    downloaded: Option<TempPath>,
}

impl<'s> SignatureArtifact<'s> {
    /// Nothing is fetched until [`SignatureArtifact::body`] needs it.
    pub fn locate(
        script: &'s ScriptArtifact,
        explicit_source: Option<String>,
        fetcher: &'s Fetcher,
    ) -> Self {
        Self {
            script,
            fetcher,
            path: script.signature_path(),
            explicit_source: explicit_source.filter(|s| !s.is_empty()),
            source: OnceCell::new(),
            downloaded: None,
        }
    }

    pub fn script(&self) -> &'s ScriptArtifact {
        self.script
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the signature comes from. Defaults to the script location with
    /// `.sig` appended; inline-signed and piped scripts have no default.
    pub fn source(&self) -> Option<&str> {
        self.source
            .get_or_init(|| {
                if let Some(explicit) = &self.explicit_source {
                    return Some(explicit.clone());
                }
                if self.script.is_inline_signed() || self.script.is_piped() {
                    return None;
                }
                self.script.source().map(|src| format!("{src}.sig"))
            })
            .as_deref()
    }

    /// Copy the signature from its source into the local signature file.
    /// Inline-signed scripts already have one, so this does nothing for them.
    /// Only the first call fetches anything.
    pub fn download(&mut self) -> Result<()> {
        if self.script.is_inline_signed() || self.downloaded.is_some() {
            return Ok(());
        }

        let source = self
            .source()
            .ok_or(PipethisError::MissingSignatureSource)?
            .to_string();
        let mut body = self.fetcher.open(&source)?;

        // Guard first, so a failed copy still leaves nothing behind.
        let guard = TempPath::from_path(&self.path);
        let mut file = File::create(&guard)?;
        io::copy(&mut body, &mut file)?;
        self.downloaded = Some(guard);

        tracing::debug!(source = %source, path = %self.path.display(), "signature downloaded");
        Ok(())
    }

    /// Open the signature for reading, downloading it first when the local
    /// file is missing or empty.
    pub fn body(&mut self) -> Result<File> {
        let present = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        if !present {
            self.download()
                .map_err(|e| PipethisError::SignatureUnavailable {
                    source: Box::new(e),
                })?;
        }
        Ok(File::open(&self.path)?)
    }
}
