use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::Rollup;
use crate::model::{Locality, RowKey, SeriesKey, Tally, UnitKey, VoteRecord, VoteType};

/// Rows contributed by each granularity level after key collisions are
/// resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub source: usize,
    pub precinct_totals: usize,
    pub counties: usize,
    pub county_totals: usize,
    pub states: usize,
    pub state_totals: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Stacked {
    /// Every level, one row per [`RowKey`], in key order.
    pub records: Vec<VoteRecord>,
    pub counts: LevelCounts,
}

/// Stack source rows with every synthesized level.
///
/// Source rows are de-duplicated on their row key, the later one winning.
/// A synthesized row never replaces a row already on the stack, so source
/// rows take precedence and earlier levels win over later ones.
pub fn aggregate(records: Vec<VoteRecord>, rollup: Rollup, width: usize) -> Stacked {
    let mut stack: BTreeMap<RowKey, VoteRecord> = BTreeMap::new();
    for record in records {
        stack.insert(record.row_key(), record);
    }
    let mut counts = LevelCounts {
        source: stack.len(),
        ..LevelCounts::default()
    };
    let reported = reported_breakdowns(&stack);

    let precinct_totals = totals(level(&stack, Locality::is_precinct), width);
    counts.precinct_totals = push_level(&mut stack, precinct_totals);

    let to_county = |r: &VoteRecord| match &r.locality {
        Locality::Precinct { county, .. } => Some(UnitKey {
            state: r.state.clone(),
            locality: Locality::County { county: county.clone() },
            fips: None,
        }),
        _ => None,
    };
    let counties = group_sum(breakdown(&stack, Locality::is_precinct), to_county, width);
    counts.counties = push_level(&mut stack, counties);

    let county_totals = level_totals(&stack, &reported, Locality::is_precinct, Locality::is_county, to_county, width);
    counts.county_totals = push_level(&mut stack, county_totals);

    if rollup.includes_state() {
        let to_state = |r: &VoteRecord| {
            Some(UnitKey {
                state: r.state.clone(),
                locality: Locality::State,
                fips: None,
            })
        };
        let states = group_sum(breakdown(&stack, Locality::is_county), to_state, width);
        counts.states = push_level(&mut stack, states);

        let state_totals = level_totals(&stack, &reported, Locality::is_county, Locality::is_state, to_state, width);
        counts.state_totals = push_level(&mut stack, state_totals);
    }

    Stacked {
        records: stack.into_values().collect(),
        counts,
    }
}

// ---------------------------------------------------------------------------
// Grouped summation
// ---------------------------------------------------------------------------

type Slice = (UnitKey, NaiveDateTime);

fn level<'a>(
    stack: &'a BTreeMap<RowKey, VoteRecord>,
    at: fn(&Locality) -> bool,
) -> impl Iterator<Item = &'a VoteRecord> + 'a {
    stack.values().filter(move |r| at(&r.locality))
}

/// Non-`total` rows of one level.
fn breakdown<'a>(
    stack: &'a BTreeMap<RowKey, VoteRecord>,
    at: fn(&Locality) -> bool,
) -> impl Iterator<Item = &'a VoteRecord> + 'a {
    level(stack, at).filter(|r| !r.vote_type.is_total())
}

/// (unit, timestamp) slices where the source itself reported a vote-type row.
fn reported_breakdowns(stack: &BTreeMap<RowKey, VoteRecord>) -> BTreeSet<Slice> {
    stack
        .values()
        .filter(|r| !r.vote_type.is_total())
        .map(|r| (r.unit(), r.timestamp))
        .collect()
}

/// Inserts rows whose key is not on the stack yet; returns how many landed.
fn push_level(stack: &mut BTreeMap<RowKey, VoteRecord>, rows: Vec<VoteRecord>) -> usize {
    let mut added = 0;
    for row in rows {
        if let Entry::Vacant(slot) = stack.entry(row.row_key()) {
            slot.insert(row);
            added += 1;
        }
    }
    added
}

/// Sums tallies per (target unit, vote type, timestamp). `target` maps a
/// row to the coarser unit it rolls into; `None` skips the row.
pub fn group_sum<'a, I, F>(rows: I, target: F, width: usize) -> Vec<VoteRecord>
where
    I: IntoIterator<Item = &'a VoteRecord>,
    F: Fn(&VoteRecord) -> Option<UnitKey>,
{
    let mut groups: BTreeMap<RowKey, Vec<&Tally>> = BTreeMap::new();
    for row in rows {
        let Some(unit) = target(row) else {
            continue;
        };
        let key = RowKey {
            series: SeriesKey {
                unit,
                vote_type: row.vote_type.clone(),
            },
            timestamp: row.timestamp,
        };
        groups.entry(key).or_default().push(&row.tally);
    }

    groups
        .into_iter()
        .map(|(key, parts)| synthesized(key, Tally::sum(&parts, width)))
        .collect()
}

/// `total` rows per (unit, timestamp) at one level. A row without a vote
/// type that reports `votes` already is the combined count and is promoted
/// as is; otherwise the labelled vote types are summed. Existing `total`
/// rows are never inputs.
fn totals<'a>(rows: impl Iterator<Item = &'a VoteRecord>, width: usize) -> Vec<VoteRecord> {
    #[derive(Default)]
    struct Parts<'t> {
        typed: Vec<&'t Tally>,
        unspecified: Vec<&'t Tally>,
    }

    let mut groups: BTreeMap<Slice, Parts> = BTreeMap::new();
    for row in rows {
        if row.vote_type.is_total() {
            continue;
        }
        let parts = groups.entry((row.unit(), row.timestamp)).or_default();
        if row.vote_type.is_unspecified() {
            parts.unspecified.push(&row.tally);
        } else {
            parts.typed.push(&row.tally);
        }
    }

    groups
        .into_iter()
        .map(|((unit, timestamp), parts)| {
            let combined = Tally::sum(&parts.unspecified, width);
            let tally = if combined.votes.is_some() || parts.typed.is_empty() {
                combined
            } else {
                Tally::sum(&parts.typed, width)
            };
            let key = RowKey {
                series: SeriesKey {
                    unit,
                    vote_type: VoteType::Total,
                },
                timestamp,
            };
            synthesized(key, tally)
        })
        .collect()
}

/// `total` rows of an aggregate level. Where the source reported part of the
/// unit's breakdown, the total is the sum of the unit's own vote-type rows.
/// Elsewhere it is the sum of the finer level's `total` rows, which stays
/// right when only some vote types (absentee) are broken out.
fn level_totals<F>(
    stack: &BTreeMap<RowKey, VoteRecord>,
    reported: &BTreeSet<Slice>,
    finer: fn(&Locality) -> bool,
    at: fn(&Locality) -> bool,
    target: F,
    width: usize,
) -> Vec<VoteRecord>
where
    F: Fn(&VoteRecord) -> Option<UnitKey>,
{
    let mut rolled: BTreeMap<Slice, VoteRecord> = group_sum(
        level(stack, finer).filter(|r| r.vote_type.is_total()),
        target,
        width,
    )
    .into_iter()
    .map(|row| ((row.unit(), row.timestamp), row))
    .collect();

    let mut out = Vec::new();
    for own in totals(level(stack, at), width) {
        let slice = (own.unit(), own.timestamp);
        match rolled.remove(&slice) {
            Some(sum) if !reported.contains(&slice) => out.push(sum),
            _ => out.push(own),
        }
    }
    out.extend(rolled.into_values());
    out
}

fn synthesized(key: RowKey, tally: Tally) -> VoteRecord {
    let RowKey { series, timestamp } = key;
    VoteRecord {
        state: series.unit.state,
        locality: series.unit.locality,
        fips: series.unit.fips,
        timestamp,
        vote_type: series.vote_type,
        tally,
        margin: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AGGREGATE_FIPS, COUNTY_SENTINEL, STATE_SENTINEL};
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 11, 4).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn precinct(county: &str, precinct: &str, vote_type: &str, votes: Option<i64>) -> VoteRecord {
        VoteRecord {
            state: "GA".into(),
            locality: Locality::Precinct {
                county: county.into(),
                precinct: precinct.into(),
            },
            fips: Some(13121),
            timestamp: at(1),
            vote_type: VoteType::from_label(Some(vote_type)),
            tally: Tally {
                votes,
                candidates: vec![votes.map(|v| v / 2), None],
                other: None,
            },
            margin: None,
        }
    }

    fn find<'a>(stacked: &'a Stacked, locality: &Locality, vote_type: &str) -> &'a VoteRecord {
        stacked
            .records
            .iter()
            .find(|r| &r.locality == locality && r.vote_type.label() == Some(vote_type))
            .unwrap()
    }

    #[test]
    fn precinct_totals_sum_vote_types() {
        let rows = vec![
            precinct("fulton", "a", "absentee", Some(10)),
            precinct("fulton", "a", "election-day", Some(30)),
        ];
        let stacked = aggregate(rows, Rollup::County, 2);
        let total = find(
            &stacked,
            &Locality::Precinct {
                county: "fulton".into(),
                precinct: "a".into(),
            },
            "total",
        );
        assert_eq!(total.tally.votes, Some(40));
        assert_eq!(total.fips, Some(13121));
        assert_eq!(stacked.counts.precinct_totals, 1);
    }

    #[test]
    fn reported_total_is_not_double_counted() {
        let rows = vec![
            precinct("fulton", "a", "absentee", Some(10)),
            precinct("fulton", "a", "total", Some(99)),
        ];
        let stacked = aggregate(rows, Rollup::County, 2);
        let p = Locality::Precinct {
            county: "fulton".into(),
            precinct: "a".into(),
        };
        assert_eq!(find(&stacked, &p, "total").tally.votes, Some(99));
        assert_eq!(stacked.counts.precinct_totals, 0);
    }

    #[test]
    fn county_conserves_precinct_votes() {
        let rows = vec![
            precinct("fulton", "a", "absentee", Some(10)),
            precinct("fulton", "b", "absentee", Some(15)),
            precinct("fulton", "c", "absentee", None),
            precinct("cobb", "x", "absentee", Some(7)),
        ];
        let stacked = aggregate(rows, Rollup::County, 2);
        let fulton = Locality::County { county: "fulton".into() };
        let row = find(&stacked, &fulton, "absentee");
        assert_eq!(row.tally.votes, Some(25));
        assert_eq!(row.locality.precinct_label(), COUNTY_SENTINEL);
        assert_eq!(row.rendered_fips(), Some(AGGREGATE_FIPS));
        assert_eq!(find(&stacked, &fulton, "total").tally.votes, Some(25));
        assert_eq!(stacked.counts.counties, 2);
        assert_eq!(stacked.counts.county_totals, 2);
        assert_eq!(stacked.counts.states, 0);
    }

    #[test]
    fn state_rollup_when_enabled() {
        let rows = vec![
            precinct("fulton", "a", "absentee", Some(10)),
            precinct("cobb", "x", "absentee", Some(7)),
            precinct("cobb", "x", "provisional", Some(1)),
        ];
        let stacked = aggregate(rows, Rollup::State, 2);
        let total = find(&stacked, &Locality::State, "total");
        assert_eq!(total.tally.votes, Some(18));
        assert_eq!(total.locality.county_label(), STATE_SENTINEL);
        assert_eq!(total.locality.precinct_label(), STATE_SENTINEL);
        assert_eq!(total.rendered_fips(), Some(AGGREGATE_FIPS));
        assert_eq!(find(&stacked, &Locality::State, "absentee").tally.votes, Some(17));
        assert_eq!(stacked.counts.states, 2);
        assert_eq!(stacked.counts.state_totals, 1);
    }

    #[test]
    fn unspecified_row_is_promoted_to_total() {
        let rows = vec![
            precinct("fulton", "a", "none", Some(50)),
            precinct("fulton", "a", "absentee", Some(20)),
        ];
        let stacked = aggregate(rows, Rollup::County, 2);
        let p = Locality::Precinct {
            county: "fulton".into(),
            precinct: "a".into(),
        };
        assert_eq!(find(&stacked, &p, "total").tally.votes, Some(50));
    }

    #[test]
    fn unspecified_without_votes_falls_back_to_typed_sum() {
        let rows = vec![
            precinct("fulton", "a", "none", None),
            precinct("fulton", "a", "absentee", Some(20)),
            precinct("fulton", "a", "provisional", Some(2)),
        ];
        let stacked = aggregate(rows, Rollup::County, 2);
        let p = Locality::Precinct {
            county: "fulton".into(),
            precinct: "a".into(),
        };
        assert_eq!(find(&stacked, &p, "total").tally.votes, Some(22));
    }

    #[test]
    fn source_county_row_wins_over_synthesized() {
        let mut reported = precinct("fulton", "COUNTY", "absentee", Some(500));
        reported.locality = Locality::County { county: "fulton".into() };
        reported.fips = None;
        let rows = vec![reported, precinct("fulton", "a", "absentee", Some(10))];
        let stacked = aggregate(rows, Rollup::County, 2);
        let fulton = Locality::County { county: "fulton".into() };
        assert_eq!(find(&stacked, &fulton, "absentee").tally.votes, Some(500));
        assert_eq!(find(&stacked, &fulton, "total").tally.votes, Some(500));
        assert_eq!(stacked.counts.counties, 0);
        assert_eq!(stacked.counts.county_totals, 1);
    }

    #[test]
    fn source_county_rows_define_county_and_state_totals() {
        let county_row = |vote_type: &str, votes: i64| {
            let mut row = precinct("fulton", "COUNTY", vote_type, Some(votes));
            row.locality = Locality::County { county: "fulton".into() };
            row.fips = None;
            row
        };
        let rows = vec![
            county_row("absentee", 500),
            county_row("election-day", 300),
            precinct("fulton", "a", "absentee", Some(10)),
        ];
        let stacked = aggregate(rows, Rollup::State, 2);
        let fulton = Locality::County { county: "fulton".into() };
        assert_eq!(find(&stacked, &fulton, "total").tally.votes, Some(800));
        assert_eq!(find(&stacked, &Locality::State, "absentee").tally.votes, Some(500));
        assert_eq!(find(&stacked, &Locality::State, "election-day").tally.votes, Some(300));
        assert_eq!(find(&stacked, &Locality::State, "total").tally.votes, Some(800));
    }

    #[test]
    fn overflowing_sums_become_null() {
        let rows = vec![
            precinct("fulton", "a", "absentee", Some(i64::MAX)),
            precinct("fulton", "a", "election-day", Some(1)),
            precinct("fulton", "b", "absentee", Some(1)),
        ];
        let stacked = aggregate(rows, Rollup::State, 2);
        let a = Locality::Precinct {
            county: "fulton".into(),
            precinct: "a".into(),
        };
        let fulton = Locality::County { county: "fulton".into() };
        assert_eq!(find(&stacked, &a, "total").tally.votes, None);
        assert_eq!(find(&stacked, &fulton, "absentee").tally.votes, None);
        assert_eq!(find(&stacked, &fulton, "election-day").tally.votes, Some(1));
        assert_eq!(find(&stacked, &Locality::State, "total").tally.votes, Some(1));
    }

    #[test]
    fn later_duplicate_source_row_wins() {
        let rows = vec![
            precinct("fulton", "a", "absentee", Some(10)),
            precinct("fulton", "a", "absentee", Some(12)),
        ];
        let stacked = aggregate(rows, Rollup::County, 2);
        assert_eq!(stacked.counts.source, 1);
        let p = Locality::Precinct {
            county: "fulton".into(),
            precinct: "a".into(),
        };
        assert_eq!(find(&stacked, &p, "absentee").tally.votes, Some(12));
    }
}
