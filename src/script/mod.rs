//! The script being inspected, verified and run.
//!
//! Every source (local file, URL, STDIN) is copied into a private temporary
//! file before anything else looks at it. The temporary files are held as
//! `TempPath` guards and disappear when the artifact is dropped.

pub mod author;

use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use once_cell::unsync::OnceCell;
use sha2::{Digest, Sha256};
use tempfile::TempPath;

use crate::clearsign;
use crate::error::{PipethisError, Result};
use crate::fetch::Fetcher;

/// A script materialized into a temporary file.
#[derive(Debug)]
pub struct ScriptArtifact {
    /// Original local path or URL; `None` when read from STDIN.
    source: Option<String>,
    temp: TempPath,
    /// Signature extracted from an inline-signed script, at `<temp>.sig`.
    inline_signature: Option<TempPath>,
    digest: String,
    author: OnceCell<String>,
}

impl ScriptArtifact {
    /// Acquire the script at `location`, or from STDIN when `location` is
    /// absent or empty.
    pub fn acquire(
        location: Option<&str>,
        fetcher: &Fetcher,
        temp_dir: Option<&Path>,
    ) -> Result<Self> {
        match location.filter(|l| !l.is_empty()) {
            None => {
                let stdin = io::stdin();
                if stdin.is_terminal() {
                    return Err(PipethisError::NoInput);
                }
                Self::from_reader(stdin.lock(), None, temp_dir)
            }
            Some(location) => {
                let body = fetcher.open(location)?;
                Self::from_reader(body, Some(location.to_string()), temp_dir)
            }
        }
    }

    /// Materialize `body` into a fresh temporary file, then split off an
    /// inline signature if the content is a cleartext-signed document.
    pub fn from_reader<R: Read>(
        mut body: R,
        source: Option<String>,
        temp_dir: Option<&Path>,
    ) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pipethis-");
        let mut file = match temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        io::copy(&mut body, &mut file)?;
        file.flush()?;
        let temp = file.into_temp_path();

        let described = source.clone().unwrap_or_else(|| "STDIN".into());
        let contents = fs::read(&temp)?;

        let (contents, inline_signature) = match clearsign::decode(&contents) {
            Some(doc) => {
                let guard = TempPath::from_path(sibling_sig_path(&temp));
                fs::write(&guard, doc.armored_signature()?)?;
                fs::write(&temp, &doc.payload)?;
                tracing::info!(source = %described, "inline signature detached");
                (doc.payload, Some(guard))
            }
            None => (contents, None),
        };

        if contents.is_empty() {
            return Err(PipethisError::EmptyScript(described));
        }

        let digest = hex::encode(Sha256::digest(&contents));

        Ok(Self {
            source,
            temp,
            inline_signature,
            digest,
            author: OnceCell::new(),
        })
    }

    /// Path of the temporary copy.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_piped(&self) -> bool {
        self.source.is_none()
    }

    pub fn is_inline_signed(&self) -> bool {
        self.inline_signature.is_some()
    }

    /// Where this script's signature lives (or will live once downloaded).
    pub fn signature_path(&self) -> PathBuf {
        sibling_sig_path(&self.temp)
    }

    /// Hex SHA-256 of the script body as it will be run.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn body(&self) -> Result<File> {
        Ok(File::open(self.path())?)
    }

    /// The author token from the script body. Scanned once, then cached.
    pub fn author(&self) -> Result<&str> {
        self.author
            .get_or_try_init(|| {
                let reader = BufReader::new(self.body()?);
                author::scan(reader)?.ok_or(PipethisError::AuthorNotFound)
            })
            .map(String::as_str)
    }

    /// Open the script in `editor` if inspection was requested, then ask
    /// whether to continue. Piped scripts are never inspected.
    ///
    /// The editor's exit status is ignored. Only an explicit "n"/"no"
    /// stops the run; an empty answer continues.
    pub fn inspect<R: BufRead, W: Write>(
        &self,
        requested: bool,
        editor: &str,
        input: &mut R,
        prompt: &mut W,
    ) -> Result<bool> {
        if !requested || self.is_piped() {
            return Ok(true);
        }

        tracing::info!(path = %self.path().display(), editor, "opening script for inspection");
        match Command::new(editor)
            .arg(self.path())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
        {
            Ok(status) => tracing::debug!(%status, "editor exited"),
            Err(e) => tracing::warn!(editor, error = %e, "could not launch editor"),
        }

        write!(prompt, "Continue processing {}? (Y/n) ", self.path().display())?;
        prompt.flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer)?;

        Ok(!is_negative(&answer))
    }

    /// Run the script with `target`. The first element of `args` is the
    /// original script location; it is replaced by the temporary path.
    pub fn run(&self, target: &str, args: &[String]) -> Result<()> {
        let mut argv: Vec<OsString> = args.iter().map(OsString::from).collect();
        let path = self.path().as_os_str().to_owned();
        match argv.first_mut() {
            Some(first) => *first = path,
            None => argv.push(path),
        }

        tracing::info!(path = %self.path().display(), target, "running script");

        let status = Command::new(target)
            .args(&argv)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(PipethisError::ScriptFailed(status))
        }
    }
}

fn sibling_sig_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(OsStr::new(".sig"));
    PathBuf::from(name)
}

fn is_negative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "n" | "no")
}
