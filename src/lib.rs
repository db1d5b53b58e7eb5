//! pipethis: verify a script's author before piping it into a shell.
//!
//! A script is copied from a local path, a URL or STDIN into a private
//! temporary file. Its `PIPETHIS_AUTHOR` token is looked up with a
//! [`lookup::KeyService`], the script is checked against a detached or
//! inline OpenPGP signature, and only then is it handed to the target
//! executable.
//!
//! # Quick Start
//!
//! ```no_run
//! use pipethis::config::Config;
//! use pipethis::lookup::{KeyringLocation, ServiceKind};
//! use pipethis::{execute, RunOptions};
//!
//! let options = RunOptions {
//!     target: "/bin/sh".into(),
//!     location: Some("https://example.org/install.sh".into()),
//!     lookup_with: ServiceKind::Keybase,
//!     keyring: KeyringLocation::from_env(None),
//!     ..RunOptions::default()
//! };
//! execute(&options, &Config::default()).unwrap();
//! ```

pub mod clearsign;
pub mod config;
pub mod error;
pub mod fetch;
pub mod interrupt;
pub mod keyring;
pub mod lookup;
pub mod script;
pub mod signature;
pub mod verify;

use std::env;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use config::Config;
use error::{PipethisError, Result};
use fetch::Fetcher;
use interrupt::Interrupt;
use lookup::{KeyringLocation, ServiceKind};
use script::ScriptArtifact;
use signature::SignatureArtifact;

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Executable the script is passed to.
    pub target: String,
    /// Open the script in `editor` and confirm before going on.
    pub inspect: bool,
    pub editor: String,
    /// Verify the author's signature before running.
    pub verify: bool,
    /// Explicit signature location. Defaults to `<location>.sig`.
    pub signature: Option<String>,
    pub lookup_with: ServiceKind,
    /// Script location; `None` reads STDIN.
    pub location: Option<String>,
    /// Extra arguments passed through to the script.
    pub script_args: Vec<String>,
    pub keyring: KeyringLocation,
    /// Raised by a termination signal; checked between steps.
    pub interrupt: Interrupt,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            target: "/bin/sh".into(),
            inspect: false,
            editor: "vi".into(),
            verify: true,
            signature: None,
            lookup_with: ServiceKind::default(),
            location: None,
            script_args: Vec::new(),
            keyring: KeyringLocation::default(),
            interrupt: Interrupt::default(),
        }
    }
}

/// Run the whole pipeline: acquire, inspect, verify, execute. Prompts go to
/// STDERR and answers are read from STDIN.
pub fn execute(options: &RunOptions, config: &Config) -> Result<()> {
    let mut input = BufReader::new(io::stdin());
    let mut prompt = io::stderr();
    execute_with(options, config, &mut input, &mut prompt)
}

/// [`execute`] with explicit prompt streams.
///
/// Every temporary file is owned by a value local to this call, so all of
/// them are gone when it returns, whatever the outcome. A signal caught by
/// `options.interrupt` ends the run with [`PipethisError::Interrupted`].
pub fn execute_with<R: BufRead, W: Write>(
    options: &RunOptions,
    config: &Config,
    input: &mut R,
    prompt: &mut W,
) -> Result<()> {
    ensure_target(&options.target)?;

    let fetcher = Fetcher::new(config.http.timeout())?;
    let script = ScriptArtifact::acquire(
        options.location.as_deref(),
        &fetcher,
        config.temp_dir.as_deref(),
    )?;
    tracing::info!(
        source = script.source().unwrap_or("STDIN"),
        path = %script.path().display(),
        sha256 = script.digest(),
        "script acquired"
    );
    options.interrupt.check()?;

    if !script.inspect(options.inspect, &options.editor, input, prompt)? {
        return Err(PipethisError::Aborted(script.path().display().to_string()));
    }
    options.interrupt.check()?;

    if options.verify {
        let author = script.author()?;
        tracing::info!(author, "script author");

        let service = lookup::new_key_service(
            options.lookup_with,
            script.is_piped(),
            config,
            &options.keyring,
            &fetcher,
        )?;
        let ring = lookup::resolve_author_key(
            service.as_ref(),
            author,
            script.is_piped(),
            input,
            prompt,
        )?;

        let mut signature =
            SignatureArtifact::locate(&script, options.signature.clone(), &fetcher);
        verify::verify(&mut signature, &ring)?;
        tracing::info!(author, path = %script.path().display(), "signature verified");
    } else {
        tracing::warn!("signature verification disabled");
    }
    options.interrupt.check()?;

    let mut args = Vec::with_capacity(options.script_args.len() + 1);
    args.push(options.location.clone().unwrap_or_default());
    args.extend(options.script_args.iter().cloned());

    let result = script.run(&options.target, &args);
    // A script killed by the same Ctrl-C reports as interrupted, not failed.
    options.interrupt.check()?;
    result
}

/// The target must be an existing path or a command found on `PATH`.
fn ensure_target(target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(PipethisError::TargetMissing(target.to_string()));
    }
    if Path::new(target).exists() {
        return Ok(());
    }
    if !target.contains(std::path::MAIN_SEPARATOR) {
        if let Some(paths) = env::var_os("PATH") {
            if env::split_paths(&paths).any(|dir| dir.join(target).is_file()) {
                return Ok(());
            }
        }
    }
    Err(PipethisError::TargetMissing(target.to_string()))
}
