//! Source fetchers: HTTP(S) via a blocking `reqwest` client, everything else
//! from the local filesystem.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use votegrid_recon::{FetchError, SourceFetcher, SourceId};

pub const USER_AGENT: &str = concat!("votegrid/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Parse a JSON body, tolerating a UTF-8 BOM.
fn parse_body(text: &str) -> Result<Value, FetchError> {
    let trimmed = text.trim_start_matches('\u{feff}');
    serde_json::from_str(trimmed).map_err(|e| {
        let preview: String = trimmed.chars().take(120).collect();
        FetchError::Decode(format!("{e} (body: {preview})"))
    })
}

// ── HTTP ────────────────────────────────────────────────────────────

pub struct HttpFetcher {
    http: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

impl SourceFetcher for HttpFetcher {
    /// Non-2xx and non-JSON content types are failures; the caller retries
    /// them on the next pass.
    fn fetch(&mut self, source: &SourceId) -> Result<Value, FetchError> {
        let resp = self
            .http
            .get(source.as_str())
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(content_type) = resp.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if !content_type.contains("json") {
                return Err(FetchError::ContentType(content_type.to_string()));
            }
        }

        let text = resp.text().map_err(|e| FetchError::Network(e.to_string()))?;
        log::debug!("{source}: {} bytes", text.len());
        parse_body(&text)
    }
}

// ── Local files ─────────────────────────────────────────────────────

/// Reads identifiers as paths, relative ones against `base`.
pub struct LocalFetcher {
    base: PathBuf,
}

impl LocalFetcher {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn resolve(&self, source: &SourceId) -> PathBuf {
        let path = Path::new(source.as_str());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl SourceFetcher for LocalFetcher {
    fn fetch(&mut self, source: &SourceId) -> Result<Value, FetchError> {
        let path = self.resolve(source);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| FetchError::Io(format!("{}: {e}", path.display())))?;
        parse_body(&text)
    }
}

// ── Dispatch ────────────────────────────────────────────────────────

/// `http(s)://` identifiers go to the network, the rest to disk.
pub struct AutoFetcher {
    http: HttpFetcher,
    local: LocalFetcher,
}

impl AutoFetcher {
    pub fn new(base: impl Into<PathBuf>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpFetcher::new(timeout)?,
            local: LocalFetcher::new(base),
        })
    }
}

impl SourceFetcher for AutoFetcher {
    fn fetch(&mut self, source: &SourceId) -> Result<Value, FetchError> {
        if source.is_remote() {
            self.http.fetch(source)
        } else {
            self.local.fetch(source)
        }
    }
}
