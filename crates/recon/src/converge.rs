//! Fetch-until-converged loop over a shrinking work-list of sources.
//!
//! The loop is a fold: [`step`] takes the state of the previous pass and
//! returns the next one; [`converge`] iterates it to a fixed point.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::model::VoteRecord;
use crate::normalize::Normalizer;
use crate::source::{Pacer, SourceFetcher, SourceId};

#[derive(Debug, Clone, Default)]
pub struct ConvergenceState {
    /// Identifiers still to fetch, in list order.
    pub pending: Vec<SourceId>,
    /// Canonical keys already fetched and normalized.
    pub processed: BTreeSet<String>,
    /// Records per canonical key.
    collected: BTreeMap<String, Vec<VoteRecord>>,
    pub passes: usize,
    pub fetched: usize,
    pub dropped: usize,
}

impl ConvergenceState {
    pub fn new(pending: Vec<SourceId>) -> Self {
        Self {
            pending,
            ..Self::default()
        }
    }

    pub fn record_count(&self) -> usize {
        self.collected.values().map(Vec::len).sum()
    }

    fn finish(self) -> Convergence {
        Convergence {
            records: self.collected.into_values().flatten().collect(),
            unresolved: self.pending,
            passes: self.passes,
            fetched: self.fetched,
            dropped: self.dropped,
        }
    }
}

/// Result of a converged loop. `records` are ordered by canonical key, so
/// the work-list order does not leak into the output.
#[derive(Debug, Clone, Default)]
pub struct Convergence {
    pub records: Vec<VoteRecord>,
    /// Identifiers that never succeeded.
    pub unresolved: Vec<SourceId>,
    pub passes: usize,
    pub fetched: usize,
    pub dropped: usize,
}

/// One pass over the work-list. Failures stay pending; duplicates of an
/// already processed canonical key are removed without a fetch.
pub fn step<F, P>(
    mut state: ConvergenceState,
    fetcher: &mut F,
    pacer: &mut P,
    normalizer: &Normalizer,
) -> ConvergenceState
where
    F: SourceFetcher + ?Sized,
    P: Pacer + ?Sized,
{
    state.passes += 1;
    let mut retry = Vec::new();

    for source in std::mem::take(&mut state.pending) {
        let key = source.canonical_key();
        if state.processed.contains(&key) {
            log::debug!("{source}: already have {key}");
            continue;
        }

        let started = Instant::now();
        let outcome = fetcher
            .fetch(&source)
            .and_then(|payload| normalizer.normalize(&source, payload));
        pacer.pause_after(started.elapsed());

        match outcome {
            Ok(normalized) => {
                log::info!("{source}: {} record(s)", normalized.records.len());
                state.fetched += 1;
                state.dropped += normalized.dropped;
                state.collected.insert(key.clone(), normalized.records);
                state.processed.insert(key);
            }
            Err(e) => {
                log::warn!("{source}: {e}");
                retry.push(source);
            }
        }
    }

    state.pending = retry;
    state
}

/// Repeats [`step`] until the work-list is empty or a pass makes no
/// progress. Terminates within `sources.len()` passes.
pub fn converge<F, P>(
    sources: Vec<SourceId>,
    fetcher: &mut F,
    pacer: &mut P,
    normalizer: &Normalizer,
) -> Convergence
where
    F: SourceFetcher + ?Sized,
    P: Pacer + ?Sized,
{
    let mut state = ConvergenceState::new(sources);
    while !state.pending.is_empty() {
        let before = state.pending.len();
        state = step(state, fetcher, pacer, normalizer);
        if state.pending.len() == before {
            break;
        }
    }

    if !state.pending.is_empty() {
        log::warn!(
            "{} source(s) unresolved after {} pass(es)",
            state.pending.len(),
            state.passes
        );
    }
    state.finish()
}
