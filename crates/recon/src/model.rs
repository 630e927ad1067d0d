use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;

// ---------------------------------------------------------------------------
// Rendering sentinels (output boundary only)
// ---------------------------------------------------------------------------

/// FIPS rendered for county and state aggregate rows that carry no code.
pub const AGGREGATE_FIPS: i64 = -9999;
pub const COUNTY_SENTINEL: &str = "COUNTY";
pub const STATE_SENTINEL: &str = "STATE";
pub const TOTAL_VOTE_TYPE: &str = "total";

/// Output timestamp format. Fractional seconds are appended only when present.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

/// Where a row sits in the precinct → county → state hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Locality {
    Precinct { county: String, precinct: String },
    /// County aggregate, either reported by the source or synthesized.
    County { county: String },
    /// State aggregate.
    State,
}

impl Locality {
    pub fn county_label(&self) -> &str {
        match self {
            Self::Precinct { county, .. } | Self::County { county } => county,
            Self::State => STATE_SENTINEL,
        }
    }

    pub fn precinct_label(&self) -> &str {
        match self {
            Self::Precinct { precinct, .. } => precinct,
            Self::County { .. } => COUNTY_SENTINEL,
            Self::State => STATE_SENTINEL,
        }
    }

    pub fn is_precinct(&self) -> bool {
        matches!(self, Self::Precinct { .. })
    }

    pub fn is_county(&self) -> bool {
        matches!(self, Self::County { .. })
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Self::State)
    }
}

// ---------------------------------------------------------------------------
// Vote type
// ---------------------------------------------------------------------------

/// Ballot category. Equality, hashing and ordering all go through
/// [`VoteType::label`], so `Kind("total")` and `Total` are the same value.
/// Unspecified sorts after every labelled type.
#[derive(Debug, Clone)]
pub enum VoteType {
    /// All vote types combined.
    Total,
    Kind(String),
    /// The source gave no breakdown.
    Unspecified,
}

impl VoteType {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            None | Some("") => Self::Unspecified,
            Some(l) if l.eq_ignore_ascii_case("null") || l.eq_ignore_ascii_case("none") => {
                Self::Unspecified
            }
            Some(l) if l.eq_ignore_ascii_case(TOTAL_VOTE_TYPE) => Self::Total,
            Some(l) => Self::Kind(l.to_string()),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Total => Some(TOTAL_VOTE_TYPE),
            Self::Kind(k) => Some(k),
            Self::Unspecified => None,
        }
    }

    pub fn is_total(&self) -> bool {
        self.label() == Some(TOTAL_VOTE_TYPE)
    }

    pub fn is_unspecified(&self) -> bool {
        self.label().is_none()
    }
}

impl PartialEq for VoteType {
    fn eq(&self, other: &Self) -> bool {
        self.label() == other.label()
    }
}

impl Eq for VoteType {}

impl Hash for VoteType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label().hash(state);
    }
}

impl Ord for VoteType {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.label(), other.label()) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl PartialOrd for VoteType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Measures
// ---------------------------------------------------------------------------

/// Numeric measures of one row. `candidates` is aligned with the dataset's
/// tracked candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tally {
    pub votes: Option<i64>,
    pub candidates: Vec<Option<i64>>,
    pub other: Option<i64>,
}

impl Tally {
    /// All-null tally for `width` tracked candidates.
    pub fn empty(width: usize) -> Self {
        Self {
            votes: None,
            candidates: vec![None; width],
            other: None,
        }
    }

    /// Null-skipping sum of `parts`: a measure stays null only while every
    /// addend is null, and an overflowing sum degrades to null.
    pub fn sum(parts: &[&Tally], width: usize) -> Self {
        let width = parts.iter().map(|t| t.candidates.len()).max().unwrap_or(0).max(width);
        Self {
            votes: sum_nullable(parts.iter().map(|t| t.votes)),
            candidates: (0..width)
                .map(|i| sum_nullable(parts.iter().map(|t| t.candidate(i))))
                .collect(),
            other: sum_nullable(parts.iter().map(|t| t.other)),
        }
    }

    pub fn candidate(&self, index: usize) -> Option<i64> {
        self.candidates.get(index).copied().flatten()
    }
}

fn sum_nullable(values: impl Iterator<Item = Option<i64>>) -> Option<i64> {
    let mut present = values.flatten().peekable();
    present.peek()?;
    present.try_fold(0i64, i64::checked_add)
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// One geographic unit: the grid completer and the aggregator group on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub state: String,
    pub locality: Locality,
    pub fips: Option<i64>,
}

/// One time series: a unit reported under one vote type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub unit: UnitKey,
    pub vote_type: VoteType,
}

/// Uniqueness key of an assembled row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub series: SeriesKey,
    pub timestamp: NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One row of the canonical table.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteRecord {
    pub state: String,
    pub locality: Locality,
    pub fips: Option<i64>,
    /// Time the snapshot reported as of, not the fetch time.
    pub timestamp: NaiveDateTime,
    pub vote_type: VoteType,
    pub tally: Tally,
    /// Latest-standing margin of this row's series; set by the margin resolver.
    pub margin: Option<f64>,
}

impl VoteRecord {
    pub fn unit(&self) -> UnitKey {
        UnitKey {
            state: self.state.clone(),
            locality: self.locality.clone(),
            fips: self.fips,
        }
    }

    pub fn series(&self) -> SeriesKey {
        SeriesKey {
            unit: self.unit(),
            vote_type: self.vote_type.clone(),
        }
    }

    pub fn row_key(&self) -> RowKey {
        RowKey {
            series: self.series(),
            timestamp: self.timestamp,
        }
    }

    /// Row with the given identity and every measure null.
    pub fn placeholder(unit: &UnitKey, vote_type: VoteType, timestamp: NaiveDateTime, width: usize) -> Self {
        Self {
            state: unit.state.clone(),
            locality: unit.locality.clone(),
            fips: unit.fips,
            timestamp,
            vote_type,
            tally: Tally::empty(width),
            margin: None,
        }
    }

    /// FIPS as written to the table. Precinct `total` rows and aggregates
    /// without a code get the sentinel; the unit key keeps the real code.
    pub fn rendered_fips(&self) -> Option<i64> {
        match (&self.locality, self.fips) {
            (Locality::Precinct { .. }, _) if self.vote_type.is_total() => Some(AGGREGATE_FIPS),
            (_, Some(code)) => Some(code),
            (Locality::Precinct { .. }, None) => None,
            (_, None) => Some(AGGREGATE_FIPS),
        }
    }

    pub fn rendered_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Output order: (state, county, precinct, fips, vote_type, timestamp) on
/// rendered values. Missing FIPS and missing vote type sort last.
pub fn output_order(a: &VoteRecord, b: &VoteRecord) -> Ordering {
    a.state
        .cmp(&b.state)
        .then_with(|| a.locality.county_label().cmp(b.locality.county_label()))
        .then_with(|| a.locality.precinct_label().cmp(b.locality.precinct_label()))
        .then_with(|| cmp_nulls_last(a.rendered_fips(), b.rendered_fips()))
        .then_with(|| a.vote_type.cmp(&b.vote_type))
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

fn cmp_nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
