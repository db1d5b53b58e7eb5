use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipethisError, Result};
use crate::lookup::ServiceKind;

/// Top-level configuration from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key service used when `--lookup-with` is not given.
    pub lookup_with: ServiceKind,
    pub keybase: KeybaseConfig,
    pub http: HttpConfig,
    pub keyring: KeyringConfig,
    /// Directory for the script's temporary copy. System temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybaseConfig {
    pub autocomplete_url: String,
    pub key_url_base: String,
}

impl Default for KeybaseConfig {
    fn default() -> Self {
        Self {
            autocomplete_url: "https://keybase.io/_/api/1.0/user/autocomplete.json".into(),
            key_url_base: "https://keybase.io".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    /// Public keyring file for the local lookup strategy. Falls back to
    /// `$GNUPGHOME/pubring.gpg`, then `~/.gnupg/pubring.gpg`.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// `<config dir>/pipethis/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("pipethis").join("config.toml"))
            .ok_or_else(|| PipethisError::Config("Could not find config directory".into()))
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# pipethis configuration

# Key service used to find script authors (keybase, local).
lookup_with = "keybase"

# Where the temporary copy of each script is written.
# temp_dir = "/tmp"

[keybase]
autocomplete_url = "https://keybase.io/_/api/1.0/user/autocomplete.json"
key_url_base = "https://keybase.io"

[http]
# Timeout for every download, in seconds.
timeout_secs = 30

[keyring]
# Public keyring for the local lookup strategy.
# path = "~/.gnupg/pubring.gpg"
"#
    }
}
