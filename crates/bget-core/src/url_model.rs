//! URL-line decomposition for the input list.
//!
//! Grammar accepted per line: `[http://]host[:port]/path` where `host` is
//! a dotted-quad IPv4 address (no name resolution anywhere in this
//! client), `port` defaults to 80, and the local filename is the final
//! path segment. Malformed lines are skipped with a warning, never fatal
//! to the batch.

use anyhow::{Context, Result};
use std::net::Ipv4Addr;
use std::path::Path;

const HTTP_PREFIX: &str = "http://";

/// Decomposed URL plus the derived local filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    /// Original line, kept for diagnostics and the final report.
    pub url: String,
    pub host: Ipv4Addr,
    pub port: u16,
    /// Absolute request path, echoed byte-for-byte into the request line.
    pub path: String,
    /// Final path segment; the output file name.
    pub local: String,
}

impl UrlParts {
    /// Parse one list line. Returns a human-readable reason on failure so
    /// the caller can log and move on.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let rest = line.strip_prefix(HTTP_PREFIX).unwrap_or(line);

        let path_start = rest.find('/').ok_or("missing path")?;
        let (authority, path) = rest.split_at(path_start);

        let (host_str, port) = match authority.split_once(':') {
            Some((h, p)) => {
                let port: u16 = p.parse().map_err(|_| "invalid port")?;
                (h, port)
            }
            None => (authority, 80),
        };

        if host_str.is_empty() {
            return Err("empty host".into());
        }
        let host: Ipv4Addr = host_str
            .parse()
            .map_err(|_| "host is not a dotted-quad IPv4 address")?;

        if path.len() < 2 {
            return Err("empty path".into());
        }

        let local = path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or("no filename in path")?;

        Ok(UrlParts {
            url: line.to_string(),
            host,
            port,
            path: path.to_string(),
            local: local.to_string(),
        })
    }
}

/// Read the URL list file: one URL per line, blank lines ignored,
/// malformed lines logged and skipped. Failure to open or read the file
/// itself is fatal (it is the program's one mandatory input).
pub fn read_url_list(path: &Path) -> Result<Vec<UrlParts>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read url list {}", path.display()))?;

    let mut parts = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match UrlParts::parse(line) {
            Ok(p) => parts.push(p),
            Err(reason) => {
                tracing::warn!("skipping line {}: {} ({})", lineno + 1, line, reason);
            }
        }
    }
    Ok(parts)
}
