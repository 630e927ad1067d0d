use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::model::{SeriesKey, Tally, VoteRecord};

/// Spread between the first two tracked candidates in percentage points,
/// positive when the second leads. Undefined without a non-zero `votes`.
pub fn instantaneous(tally: &Tally) -> Option<f64> {
    let votes = tally.votes.filter(|v| *v != 0)?;
    let first = tally.candidate(0)?;
    let second = tally.candidate(1)?;
    Some((second as f64 - first as f64) / votes as f64 * 100.0)
}

/// Overwrites `margin` on every row with the margin of its series' latest
/// row that reported `votes`. Reads only tallies, so repeated calls give
/// the same result.
pub fn resolve_margins(records: &mut [VoteRecord]) {
    let mut latest: BTreeMap<SeriesKey, (NaiveDateTime, Option<f64>)> = BTreeMap::new();
    for record in records.iter() {
        if record.tally.votes.is_none() {
            continue;
        }
        let margin = instantaneous(&record.tally);
        latest
            .entry(record.series())
            .and_modify(|slot| {
                if record.timestamp >= slot.0 {
                    *slot = (record.timestamp, margin);
                }
            })
            .or_insert((record.timestamp, margin));
    }

    for record in records.iter_mut() {
        record.margin = latest.get(&record.series()).and_then(|(_, margin)| *margin);
    }
}
