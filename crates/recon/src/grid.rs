use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;

use crate::error::PipelineError;
use crate::model::{UnitKey, VoteRecord, VoteType};

/// Gives every unit a row for every (vote type, timestamp) pair observed
/// anywhere in `records`. Missing rows are appended with null measures;
/// returns how many were added.
///
/// The grid is the cross product of all distinct timestamps and all
/// distinct labelled vote types. Rows without a vote type keep their own
/// timeline and are never filled.
pub fn complete_grid(
    dataset: &str,
    records: &mut Vec<VoteRecord>,
    width: usize,
) -> Result<usize, PipelineError> {
    if records.is_empty() {
        return Err(PipelineError::EmptyDataset {
            dataset: dataset.to_string(),
        });
    }

    let timestamps: BTreeSet<NaiveDateTime> = records.iter().map(|r| r.timestamp).collect();
    let vote_types: BTreeSet<VoteType> = records
        .iter()
        .map(|r| r.vote_type.clone())
        .filter(|vt| !vt.is_unspecified())
        .collect();

    let mut present: BTreeMap<UnitKey, BTreeSet<(VoteType, NaiveDateTime)>> = BTreeMap::new();
    for record in records.iter() {
        present
            .entry(record.unit())
            .or_default()
            .insert((record.vote_type.clone(), record.timestamp));
    }

    let grid_size = timestamps.len() * vote_types.len();
    let mut missing = Vec::new();
    for (unit, have) in &present {
        let covered = have.iter().filter(|(vt, _)| !vt.is_unspecified()).count();
        if covered >= grid_size {
            continue;
        }
        for vote_type in &vote_types {
            for &timestamp in &timestamps {
                if !have.contains(&(vote_type.clone(), timestamp)) {
                    missing.push(VoteRecord::placeholder(unit, vote_type.clone(), timestamp, width));
                }
            }
        }
    }

    let added = missing.len();
    if added > 0 {
        log::debug!("{dataset}: grid {grid_size} cell(s) per unit, {added} row(s) filled");
    }
    records.extend(missing);
    Ok(added)
}
