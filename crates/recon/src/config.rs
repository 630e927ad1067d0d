use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    /// State identifier stamped on every record of a precinct feed. County and
    /// time-series feeds carry their own state ids and fall back to this.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub feed: Feed,
    #[serde(default)]
    pub rollup: Rollup,
    /// Courtesy delay after each fetch = multiplier × fetch duration.
    #[serde(default = "default_courtesy_multiplier")]
    pub courtesy_multiplier: f64,
    #[serde(default = "default_candidates")]
    pub candidates: Vec<CandidateConfig>,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub window: Option<SnapshotWindow>,
    /// Race type matched against `race_id[3..]` in race feeds, e.g. `G-P`
    /// for the presidential general.
    #[serde(default = "default_race_prefix")]
    pub race_prefix: String,
    #[serde(default)]
    pub timeseries: TimeseriesConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_courtesy_multiplier() -> f64 {
    3.0
}

fn default_candidates() -> Vec<CandidateConfig> {
    [("bidenj", "biden"), ("trumpd", "trump"), ("jorgensenj", "jorgensen")]
        .into_iter()
        .map(|(slug, column)| CandidateConfig {
            slug: slug.into(),
            column: column.into(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Feed + rollup
// ---------------------------------------------------------------------------

/// Shape of the payloads behind the source identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    /// Top-level arrays of precinct records (`precincts`, `precinct_by_vote_type`, ...).
    #[default]
    Precincts,
    /// `data.races[].counties[]` county results.
    Counties,
    /// `data.races[].timeseries[]` statewide vote-share observations.
    Timeseries,
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precincts => write!(f, "precincts"),
            Self::Counties => write!(f, "counties"),
            Self::Timeseries => write!(f, "timeseries"),
        }
    }
}

/// Coarsest level the aggregator synthesizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rollup {
    #[default]
    County,
    State,
}

impl Rollup {
    pub fn includes_state(self) -> bool {
        matches!(self, Self::State)
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// A tracked candidate: `slug` keys the raw results mapping, `column` names
/// the `votes_<column>` output column. The first two tracked candidates
/// define the margin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CandidateConfig {
    pub slug: String,
    pub column: String,
}

// ---------------------------------------------------------------------------
// Sources, window, time series, output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    /// Source list file, one identifier per line.
    #[serde(default)]
    pub list: Option<String>,
    /// Keep only identifiers containing this substring.
    #[serde(default)]
    pub contains: Option<String>,
}

/// Half-open snapshot window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SnapshotWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl SnapshotWindow {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.from && at < self.to
    }
}

fn default_race_prefix() -> String {
    "G-P".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeseriesConfig {
    #[serde(default)]
    pub order_policy: OrderPolicy,
}

/// Which out-of-order observations of a time series are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// Keep every observation.
    Off,
    /// Drop only the leading run of observations that are not strictly
    /// earlier than their successor.
    Leading,
    /// Drop every observation that is not strictly earlier than its successor.
    #[default]
    Any,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub csv: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl DatasetConfig {
    pub fn from_toml(input: &str) -> Result<Self, PipelineError> {
        let config: DatasetConfig =
            toml::from_str(input).map_err(|e| PipelineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::ConfigValidation("name must not be empty".into()));
        }

        if let Some(state) = &self.state {
            if state.trim().is_empty() {
                return Err(PipelineError::ConfigValidation(
                    "state must not be empty when given".into(),
                ));
            }
        } else if self.feed == Feed::Precincts {
            return Err(PipelineError::ConfigValidation(
                "feed 'precincts' requires a state".into(),
            ));
        }

        // Margin needs a leading and a trailing candidate
        if self.candidates.len() < 2 {
            return Err(PipelineError::ConfigValidation(format!(
                "at least 2 candidates are required, found {}",
                self.candidates.len()
            )));
        }

        let mut slugs = HashSet::new();
        let mut columns = HashSet::new();
        for candidate in &self.candidates {
            if candidate.slug.trim().is_empty() {
                return Err(PipelineError::ConfigValidation(
                    "candidate slug must not be empty".into(),
                ));
            }
            if !is_column_name(&candidate.column) {
                return Err(PipelineError::ConfigValidation(format!(
                    "candidate '{}': column '{}' must match [a-z0-9_]+",
                    candidate.slug, candidate.column
                )));
            }
            if candidate.column == "other" {
                return Err(PipelineError::ConfigValidation(format!(
                    "candidate '{}': column 'other' is reserved",
                    candidate.slug
                )));
            }
            if !slugs.insert(candidate.slug.as_str()) {
                return Err(PipelineError::ConfigValidation(format!(
                    "duplicate candidate slug '{}'",
                    candidate.slug
                )));
            }
            if !columns.insert(candidate.column.as_str()) {
                return Err(PipelineError::ConfigValidation(format!(
                    "duplicate candidate column '{}'",
                    candidate.column
                )));
            }
        }

        if !self.courtesy_multiplier.is_finite() || self.courtesy_multiplier < 0.0 {
            return Err(PipelineError::ConfigValidation(format!(
                "courtesy_multiplier must be a non-negative number, got {}",
                self.courtesy_multiplier
            )));
        }

        if let Some(window) = &self.window {
            if window.from >= window.to {
                return Err(PipelineError::ConfigValidation(format!(
                    "window.from ({}) must be before window.to ({})",
                    window.from, window.to
                )));
            }
        }

        if self.race_prefix.trim().is_empty() {
            return Err(PipelineError::ConfigValidation(
                "race_prefix must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// `votes_<column>` headers of the tracked candidates, in order.
    pub fn candidate_columns(&self) -> Vec<String> {
        self.candidates
            .iter()
            .map(|c| format!("votes_{}", c.column))
            .collect()
    }
}

fn is_column_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PRECINCTS: &str = r#"
name = "GA precincts 2020"
state = "GA"
feed = "precincts"
rollup = "state"
courtesy_multiplier = 3.0

[[candidates]]
slug = "bidenj"
column = "biden"

[[candidates]]
slug = "trumpd"
column = "trump"

[sources]
list = "urls.txt"
contains = "GAGeneral"

[window]
from = "2020-11-04T00:00:00"
to = "2020-11-11T00:00:00"

[output]
csv = "GA_precincts_timeseries_2020.csv"
"#;

    #[test]
    fn parse_valid_precincts() {
        let config = DatasetConfig::from_toml(VALID_PRECINCTS).unwrap();
        assert_eq!(config.name, "GA precincts 2020");
        assert_eq!(config.state.as_deref(), Some("GA"));
        assert_eq!(config.feed, Feed::Precincts);
        assert!(config.rollup.includes_state());
        assert_eq!(config.candidates.len(), 2);
        assert_eq!(config.candidate_columns(), vec!["votes_biden", "votes_trump"]);
        assert_eq!(config.sources.list.as_deref(), Some("urls.txt"));
        let window = config.window.unwrap();
        assert_eq!(window.from.to_string(), "2020-11-04 00:00:00");
        assert_eq!(config.output.csv.as_deref(), Some("GA_precincts_timeseries_2020.csv"));
    }

    #[test]
    fn defaults_apply() {
        let config = DatasetConfig::from_toml(
            r#"
name = "PA"
state = "PA"
"#,
        )
        .unwrap();
        assert_eq!(config.feed, Feed::Precincts);
        assert_eq!(config.rollup, Rollup::County);
        assert_eq!(config.courtesy_multiplier, 3.0);
        assert_eq!(
            config.candidate_columns(),
            vec!["votes_biden", "votes_trump", "votes_jorgensen"]
        );
        assert_eq!(config.timeseries.order_policy, OrderPolicy::Any);
        assert_eq!(config.race_prefix, "G-P");
        assert!(config.window.is_none());
    }

    #[test]
    fn precinct_feed_requires_state() {
        let err = DatasetConfig::from_toml(r#"name = "x""#).unwrap_err();
        assert!(err.to_string().contains("requires a state"), "{err}");

        // County feeds carry state ids in the payload
        let config = DatasetConfig::from_toml(
            r#"
name = "national"
feed = "counties"
"#,
        )
        .unwrap();
        assert!(config.state.is_none());
    }

    #[test]
    fn rejects_single_candidate() {
        let err = DatasetConfig::from_toml(
            r#"
name = "x"
state = "GA"
[[candidates]]
slug = "bidenj"
column = "biden"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigValidation(_)));
    }

    #[test]
    fn rejects_duplicate_and_reserved_columns() {
        let dup = r#"
name = "x"
state = "GA"
[[candidates]]
slug = "bidenj"
column = "biden"
[[candidates]]
slug = "bidenj2"
column = "biden"
"#;
        let err = DatasetConfig::from_toml(dup).unwrap_err();
        assert!(err.to_string().contains("duplicate candidate column"), "{err}");

        let reserved = r#"
name = "x"
state = "GA"
[[candidates]]
slug = "bidenj"
column = "biden"
[[candidates]]
slug = "write_ins"
column = "other"
"#;
        let err = DatasetConfig::from_toml(reserved).unwrap_err();
        assert!(err.to_string().contains("reserved"), "{err}");

        let bad = r#"
name = "x"
state = "GA"
[[candidates]]
slug = "bidenj"
column = "Biden J"
[[candidates]]
slug = "trumpd"
column = "trump"
"#;
        assert!(DatasetConfig::from_toml(bad).is_err());
    }

    #[test]
    fn rejects_inverted_window() {
        let input = r#"
name = "x"
state = "GA"
[window]
from = "2020-11-11T00:00:00"
to = "2020-11-04T00:00:00"
"#;
        let err = DatasetConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("window.from"), "{err}");
    }

    #[test]
    fn rejects_negative_multiplier() {
        let input = r#"
name = "x"
state = "GA"
courtesy_multiplier = -1.0
"#;
        assert!(DatasetConfig::from_toml(input).is_err());
    }

    #[test]
    fn parse_error_is_reported() {
        let err = DatasetConfig::from_toml("name = ").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigParse(_)));
    }

    #[test]
    fn window_is_half_open() {
        let config = DatasetConfig::from_toml(VALID_PRECINCTS).unwrap();
        let window = config.window.unwrap();
        assert!(window.contains(window.from));
        assert!(!window.contains(window.to));
    }
}
