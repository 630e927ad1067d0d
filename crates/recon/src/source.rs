//! Source identifiers and the fetch collaborator contract.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

use crate::config::DatasetConfig;

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Opaque locator of one snapshot payload (archive URL, direct URL, or path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }

    /// Key shared by every archive capture of the same underlying payload:
    /// the locator with any Wayback Machine capture prefix removed.
    pub fn canonical_key(&self) -> String {
        match archive_prefix().find(&self.0) {
            Some(m) => self.0[m.end()..].to_string(),
            None => self.0.clone(),
        }
    }

    /// Archive capture time from the 14-digit `/web/<stamp>/` segment.
    pub fn capture_time(&self) -> Option<NaiveDateTime> {
        let caps = archive_prefix().captures(&self.0)?;
        NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), "%Y%m%d%H%M%S").ok()
    }

    /// Snapshot time embedded in the canonical locator, e.g.
    /// `.../GAGeneral-2020-11-04T03:21:05.123Z.json`. The last match wins.
    pub fn snapshot_time(&self) -> Option<NaiveDateTime> {
        let key = self.canonical_key();
        let found = embedded_timestamp().find_iter(&key).last()?;
        parse_timestamp(found.as_str())
    }

    /// Time used for window eligibility: capture time, else snapshot time.
    pub fn eligibility_time(&self) -> Option<NaiveDateTime> {
        self.capture_time().or_else(|| self.snapshot_time())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn archive_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https?://web\.archive\.org/web/(\d{14})[a-z_]*/").expect("valid archive regex")
    })
}

fn embedded_timestamp() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z?").expect("valid timestamp regex")
    })
}

/// Parse a reported timestamp. Offsets are normalized to UTC; naive values
/// are taken as-is.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    let naive = text.strip_suffix('Z').unwrap_or(text);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

// ---------------------------------------------------------------------------
// Source list + selection
// ---------------------------------------------------------------------------

/// Identifiers from a list file: one per line (whitespace-separated tokens
/// are split), `#` comments and blank lines ignored.
pub fn parse_source_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

/// Eligible identifiers in list order: exact duplicates dropped (first kept),
/// then the `contains` filter, then the snapshot window.
pub fn select_sources(identifiers: &[String], config: &DatasetConfig) -> Vec<SourceId> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for raw in identifiers {
        let source = SourceId::new(raw.as_str());
        if source.as_str().is_empty() || !seen.insert(source.clone()) {
            continue;
        }

        if let Some(needle) = &config.sources.contains {
            if !source.as_str().contains(needle.as_str()) {
                log::debug!("skipping {source}: does not contain '{needle}'");
                continue;
            }
        }

        if let Some(window) = &config.window {
            match source.eligibility_time() {
                Some(at) if window.contains(at) => {}
                Some(at) => {
                    log::debug!("skipping {source}: {at} outside snapshot window");
                    continue;
                }
                None => {
                    log::debug!("skipping {source}: no capture or snapshot time");
                    continue;
                }
            }
        }

        selected.push(source);
    }

    selected
}

// ---------------------------------------------------------------------------
// Fetch contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, DNS, timeout.
    Network(String),
    /// Non-2xx response.
    Status(u16),
    /// Response was not JSON.
    ContentType(String),
    /// Body could not be decoded as JSON.
    Decode(String),
    /// Local read failure.
    Io(String),
    /// Payload decoded but has no usable shape or snapshot time.
    Payload(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Status(status) => write!(f, "HTTP status {status}"),
            Self::ContentType(ct) => write!(f, "unexpected content type '{ct}'"),
            Self::Decode(msg) => write!(f, "invalid JSON: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Payload(msg) => write!(f, "unusable payload: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Resolves an identifier to its JSON payload.
pub trait SourceFetcher {
    fn fetch(&mut self, source: &SourceId) -> Result<serde_json::Value, FetchError>;
}

/// Called after every fetch attempt with the time the attempt took.
pub trait Pacer {
    fn pause_after(&mut self, fetch_duration: Duration);
}

/// Sleeps `multiplier × fetch duration` so the upstream is not hammered.
#[derive(Debug, Clone, Copy)]
pub struct CourtesyDelay {
    multiplier: f64,
}

impl CourtesyDelay {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier: if multiplier.is_finite() { multiplier.max(0.0) } else { 0.0 },
        }
    }

    pub fn delay_for(&self, fetch_duration: Duration) -> Duration {
        fetch_duration.mul_f64(self.multiplier)
    }
}

impl Pacer for CourtesyDelay {
    fn pause_after(&mut self, fetch_duration: Duration) {
        let delay = self.delay_for(fetch_duration);
        if !delay.is_zero() {
            log::debug!("courtesy delay {:.1}s", delay.as_secs_f64());
            thread::sleep(delay);
        }
    }
}

/// Pacer that never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Pacer for NoDelay {
    fn pause_after(&mut self, _fetch_duration: Duration) {}
}
