//! Typed decode of raw payload elements.
//!
//! Every field is optional: an absent or unusable field decodes to `None`
//! instead of failing the element, so the normalizer decides what is fatal.

use std::collections::BTreeMap;

use serde::de::{Deserializer, IgnoredAny};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Lenient scalars
// ---------------------------------------------------------------------------

/// Vote count that may arrive as an integer, a float, a numeric string, the
/// literal `"null"`, or JSON null. Anything unresolvable is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Count(pub Option<i64>);

impl<'de> Deserialize<'de> for Count {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(i64),
            Float(f64),
            Text(String),
            Other(IgnoredAny),
        }

        let value = match Option::<Repr>::deserialize(deserializer)? {
            None | Some(Repr::Other(_)) => None,
            Some(Repr::Int(n)) => Some(n),
            Some(Repr::Float(f)) if f.is_finite() => Some(f.round() as i64),
            Some(Repr::Float(_)) => None,
            Some(Repr::Text(s)) => parse_count_text(&s),
        };
        Ok(Count(value))
    }
}

fn parse_count_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        return None;
    }
    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.round() as i64)
    })
}

/// Vote share fraction (0.0 ..= 1.0), same leniency as [`Count`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Share(pub Option<f64>);

impl<'de> Deserialize<'de> for Share {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
            Other(IgnoredAny),
        }

        let value = match Option::<Repr>::deserialize(deserializer)? {
            None | Some(Repr::Other(_)) => None,
            Some(Repr::Number(f)) => Some(f),
            Some(Repr::Text(s)) => s.trim().parse::<f64>().ok(),
        };
        Ok(Share(value.filter(|f| f.is_finite())))
    }
}

/// Identifier that may arrive as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Label(pub Option<String>);

impl Label {
    /// Trimmed, non-empty text.
    pub fn text(&self) -> Option<&str> {
        self.0.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Int(i64),
            Other(IgnoredAny),
        }

        let value = match Option::<Repr>::deserialize(deserializer)? {
            None | Some(Repr::Other(_)) => None,
            Some(Repr::Text(s)) => Some(s),
            Some(Repr::Int(n)) => Some(n.to_string()),
        };
        Ok(Label(value))
    }
}

pub type Results = BTreeMap<String, Count>;

// ---------------------------------------------------------------------------
// Precinct feed
// ---------------------------------------------------------------------------

/// One element of a precinct payload array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPrecinct {
    #[serde(default)]
    pub locality_name: Label,
    #[serde(default)]
    pub precinct_id: Label,
    #[serde(default)]
    pub locality_fips: Count,
    #[serde(default)]
    pub results: Option<Results>,
    #[serde(default)]
    pub vote_type: Label,
    #[serde(default)]
    pub votes: Count,
}

/// Payload metadata block; carries the snapshot time when the identifier does not.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMeta {
    #[serde(default)]
    pub timestamp: Label,
    #[serde(default)]
    pub last_updated: Label,
}

impl RawMeta {
    pub fn snapshot_text(&self) -> Option<&str> {
        self.timestamp.text().or_else(|| self.last_updated.text())
    }
}

// ---------------------------------------------------------------------------
// Race feeds (county results, statewide time series)
// ---------------------------------------------------------------------------

/// One element of `data.races`. Counties and observations stay as raw JSON
/// so a single malformed entry only drops itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRace {
    #[serde(default)]
    pub race_id: Label,
    #[serde(default)]
    pub state_id: Label,
    #[serde(default)]
    pub last_updated: Label,
    #[serde(default)]
    pub counties: Vec<serde_json::Value>,
    #[serde(default)]
    pub timeseries: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCounty {
    #[serde(default)]
    pub name: Label,
    #[serde(default)]
    pub fips: Count,
    #[serde(default)]
    pub votes: Count,
    #[serde(default)]
    pub absentee_votes: Count,
    #[serde(default)]
    pub results: Option<Results>,
    #[serde(default)]
    pub results_absentee: Option<Results>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawObservation {
    #[serde(default)]
    pub timestamp: Label,
    #[serde(default)]
    pub votes: Count,
    #[serde(default)]
    pub vote_shares: Option<BTreeMap<String, Share>>,
}
