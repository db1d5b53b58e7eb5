use std::io::{self, BufRead};

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker that introduces the author token inside a script.
pub const AUTHOR_MARKER: &str = "PIPETHIS_AUTHOR";

static AUTHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"PIPETHIS_AUTHOR\s+([A-Za-z0-9_]+)").unwrap());

/// Scan `reader` top to bottom and return the first author token found.
///
/// The marker may sit anywhere on a line; it is not required to be inside
/// a comment.
pub fn scan<R: BufRead>(reader: R) -> io::Result<Option<String>> {
    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        if let Some(cap) = AUTHOR_RE.captures(&line) {
            return Ok(cap.get(1).map(|m| m.as_str().to_string()));
        }
    }
    Ok(None)
}
