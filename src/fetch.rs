//! Location resolution shared by script, signature and key acquisition.
//!
//! A location is tried as a local path first. Only when nothing exists at
//! that path is it treated as a URL, so a file whose name happens to look
//! like a URL still resolves locally.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::error::{PipethisError, Result};

/// Opens locations for reading. Holds the HTTP client so every remote
/// fetch in a run shares one connection pool and one timeout.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pipethis/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Open `location` locally if it exists on disk, otherwise fetch it as a URL.
    pub fn open(&self, location: &str) -> Result<Box<dyn Read>> {
        if let Some(file) = open_local(location)? {
            tracing::debug!(location, "opened local file");
            return Ok(Box::new(file));
        }
        self.open_remote(location)
    }

    /// Fetch `location` as a URL. The URL must carry a scheme, and any
    /// non-success HTTP status is an error rather than a body to consume.
    pub fn open_remote(&self, location: &str) -> Result<Box<dyn Read>> {
        let url = parse_url(location)?;
        tracing::debug!(%url, "fetching");

        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipethisError::Fetch {
                location: location.to_string(),
                message: e.to_string(),
            })?;

        Ok(Box::new(response))
    }

    /// Fetch a URL fully into memory.
    pub fn get_bytes(&self, location: &str) -> Result<Vec<u8>> {
        let mut body = self.open_remote(location)?;
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

fn open_local(location: &str) -> Result<Option<File>> {
    let path = Path::new(location);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(File::open(path)?))
}

fn parse_url(location: &str) -> Result<Url> {
    match Url::parse(location) {
        Ok(url) if !url.scheme().is_empty() => Ok(url),
        _ => Err(PipethisError::InvalidLocation(location.to_string())),
    }
}
