use std::process::ExitStatus;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipethisError>;

#[derive(Error, Debug)]
pub enum PipethisError {
    #[error("No script location given and nothing piped to STDIN")]
    NoInput,

    #[error("Invalid location '{0}': not a local file or a URL")]
    InvalidLocation(String),

    #[error("Script from {0} is empty")]
    EmptyScript(String),

    #[error("Fetch failed for {location}: {message}")]
    Fetch { location: String, message: String },

    #[error("Invalid user requested: '{0}'")]
    InvalidQuery(String),

    #[error("Key service error: {0}")]
    Service(String),

    #[error("No author matches found for {0}")]
    NoMatches(String),

    #[error("Found {0} author matches; need exactly 1 when reading from STDIN")]
    AmbiguousMatches(usize),

    #[error("No match selected")]
    SelectionCancelled,

    #[error("Invalid match selected: {0}")]
    InvalidSelection(i64),

    #[error("Could not read selection '{0}'")]
    SelectionParse(String),

    #[error("Author not found")]
    AuthorNotFound,

    #[error("The signature source location is missing")]
    MissingSignatureSource,

    #[error("{source} (do you need to set --signature?)")]
    SignatureUnavailable { source: Box<PipethisError> },

    #[error("Failed to verify signature")]
    VerificationFailed,

    #[error("No key ring loaded from {0}")]
    NoKeyRing(String),

    #[error("Cannot read key ring {path}: {source}")]
    KeyRingFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Key ring {0} is empty")]
    EmptyKeyRing(String),

    #[error("Key resolution failed: {0}")]
    KeyResolution(String),

    #[error("Unrecognized key service '{0}'")]
    UnknownService(String),

    #[error("Script executable '{0}' does not exist")]
    TargetMissing(String),

    #[error("Exiting without running {0}")]
    Aborted(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("Script exited with {0}")]
    ScriptFailed(ExitStatus),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenPGP error: {0}")]
    OpenPgp(#[from] anyhow::Error),
}

impl PipethisError {
    /// Process exit status for this error. Every failure is terminal and
    /// there is no retry distinction, so all of them share one code.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
