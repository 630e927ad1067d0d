//! Payload → canonical `VoteRecord`s.
//!
//! Each feed shape is decoded element by element through the structs in
//! [`crate::raw`]; a malformed element is dropped and counted, never fatal.
//! A payload is rejected as a whole only when it has no usable shape or no
//! snapshot time, which leaves its identifier pending for the next pass.

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::config::{CandidateConfig, DatasetConfig, Feed, OrderPolicy};
use crate::model::{Locality, Tally, VoteRecord, VoteType, COUNTY_SENTINEL};
use crate::raw::{Count, RawCounty, RawMeta, RawObservation, RawPrecinct, RawRace, Results};
use crate::source::{parse_timestamp, FetchError, SourceId};

const ABSENTEE_VOTE_TYPE: &str = "absentee";

/// Records decoded from one payload plus the number of elements dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub records: Vec<VoteRecord>,
    pub dropped: usize,
}

impl Normalized {
    fn drop_element(&mut self, source: &SourceId, what: &str, reason: impl std::fmt::Display) {
        self.dropped += 1;
        log::warn!("{source}: dropping {what}: {reason}");
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    feed: Feed,
    state: Option<String>,
    candidates: Vec<CandidateConfig>,
    race_prefix: String,
    order_policy: OrderPolicy,
}

impl Normalizer {
    pub fn new(config: &DatasetConfig) -> Self {
        Self {
            feed: config.feed,
            state: config.state.clone(),
            candidates: config.candidates.clone(),
            race_prefix: config.race_prefix.clone(),
            order_policy: config.timeseries.order_policy,
        }
    }

    /// Number of tracked candidates.
    pub fn width(&self) -> usize {
        self.candidates.len()
    }

    pub fn normalize(&self, source: &SourceId, payload: Value) -> Result<Normalized, FetchError> {
        match self.feed {
            Feed::Precincts => self.precinct_payload(source, payload),
            Feed::Counties => self.county_payload(source, payload),
            Feed::Timeseries => self.timeseries_payload(source, payload),
        }
    }

    // -----------------------------------------------------------------------
    // Precinct feed
    // -----------------------------------------------------------------------

    fn precinct_payload(&self, source: &SourceId, payload: Value) -> Result<Normalized, FetchError> {
        let timestamp = snapshot_time(source, &payload)?;
        let Value::Object(sections) = payload else {
            return Err(FetchError::Payload("expected a JSON object".into()));
        };
        let state = self.state.as_deref().unwrap_or_default();

        let mut out = Normalized::default();
        let mut saw_records = false;
        for (section, value) in sections {
            let Value::Array(items) = value else {
                continue;
            };
            saw_records = true;
            for item in items {
                match serde_json::from_value::<RawPrecinct>(item) {
                    Ok(raw) => match self.precinct_record(&raw, state, timestamp) {
                        Some(record) => out.records.push(record),
                        None => out.drop_element(source, &section, "missing locality or precinct id"),
                    },
                    Err(e) => out.drop_element(source, &section, e),
                }
            }
        }

        if !saw_records {
            return Err(FetchError::Payload("no record arrays".into()));
        }
        Ok(out)
    }

    /// One precinct element. `None` only when the locality or the precinct id
    /// is absent; every other gap becomes a null measure.
    pub fn precinct_record(
        &self,
        raw: &RawPrecinct,
        state: &str,
        timestamp: NaiveDateTime,
    ) -> Option<VoteRecord> {
        let county = normalize_county(raw.locality_name.text()?);
        let precinct_id = raw.precinct_id.text()?;

        // Source-reported county aggregate: no FIPS lookup.
        let (locality, fips) = if precinct_id.eq_ignore_ascii_case(COUNTY_SENTINEL) {
            (Locality::County { county }, None)
        } else {
            let precinct = normalize_name(precinct_id);
            (Locality::Precinct { county, precinct }, raw.locality_fips.0)
        };

        Some(VoteRecord {
            state: state.to_string(),
            locality,
            fips,
            timestamp,
            vote_type: VoteType::from_label(raw.vote_type.text()),
            tally: tally_from_results(raw.votes.0, raw.results.as_ref(), &self.candidates),
            margin: None,
        })
    }

    // -----------------------------------------------------------------------
    // Race feeds
    // -----------------------------------------------------------------------

    fn races(&self, source: &SourceId, payload: &mut Value, out: &mut Normalized) -> Result<Vec<RawRace>, FetchError> {
        let Some(Value::Array(items)) = payload.pointer_mut("/data/races").map(Value::take) else {
            return Err(FetchError::Payload("missing data.races array".into()));
        };

        let mut races = Vec::new();
        for item in items {
            match serde_json::from_value::<RawRace>(item) {
                Ok(race) if self.race_matches(&race) => races.push(race),
                Ok(_) => {}
                Err(e) => out.drop_element(source, "race", e),
            }
        }
        Ok(races)
    }

    /// `race_id[2..]` must be `-<race_prefix>` optionally followed by `-...`.
    fn race_matches(&self, race: &RawRace) -> bool {
        let prefix = self.race_prefix.as_str();
        race.race_id
            .text()
            .and_then(|id| id.get(2..))
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_prefix(prefix))
            .is_some_and(|tail| tail.is_empty() || tail.starts_with('-'))
    }

    fn race_state(&self, race: &RawRace) -> String {
        race.state_id
            .text()
            .map(str::to_string)
            .or_else(|| race.race_id.text().and_then(|id| id.get(..2)).map(str::to_string))
            .or_else(|| self.state.clone())
            .unwrap_or_default()
    }

    fn county_payload(&self, source: &SourceId, mut payload: Value) -> Result<Normalized, FetchError> {
        let fallback = snapshot_time(source, &payload).ok();
        let mut out = Normalized::default();

        for race in self.races(source, &mut payload, &mut out)? {
            let timestamp = race.last_updated.text().and_then(parse_timestamp).or(fallback);
            let Some(timestamp) = timestamp else {
                for _ in &race.counties {
                    out.drop_element(source, "county", "race has no timestamp");
                }
                continue;
            };
            let state = self.race_state(&race);

            for item in race.counties {
                let raw = match serde_json::from_value::<RawCounty>(item) {
                    Ok(raw) => raw,
                    Err(e) => {
                        out.drop_element(source, "county", e);
                        continue;
                    }
                };
                let Some(name) = raw.name.text() else {
                    out.drop_element(source, "county", "missing name");
                    continue;
                };
                let locality = Locality::County { county: normalize_county(name) };

                out.records.push(VoteRecord {
                    state: state.clone(),
                    locality: locality.clone(),
                    fips: raw.fips.0,
                    timestamp,
                    vote_type: VoteType::Total,
                    tally: tally_from_results(raw.votes.0, raw.results.as_ref(), &self.candidates),
                    margin: None,
                });

                if raw.results_absentee.is_some() || raw.absentee_votes.0.is_some() {
                    out.records.push(VoteRecord {
                        state: state.clone(),
                        locality,
                        fips: raw.fips.0,
                        timestamp,
                        vote_type: VoteType::Kind(ABSENTEE_VOTE_TYPE.into()),
                        tally: tally_from_results(
                            raw.absentee_votes.0,
                            raw.results_absentee.as_ref(),
                            &self.candidates,
                        ),
                        margin: None,
                    });
                }
            }
        }
        Ok(out)
    }

    fn timeseries_payload(&self, source: &SourceId, mut payload: Value) -> Result<Normalized, FetchError> {
        let mut out = Normalized::default();

        for race in self.races(source, &mut payload, &mut out)? {
            let state = self.race_state(&race);

            let mut series = Vec::with_capacity(race.timeseries.len());
            for item in race.timeseries {
                match serde_json::from_value::<RawObservation>(item) {
                    Ok(obs) => match obs.timestamp.text().and_then(parse_timestamp) {
                        Some(at) => series.push((at, obs)),
                        None => out.drop_element(source, "observation", "missing timestamp"),
                    },
                    Err(e) => out.drop_element(source, "observation", e),
                }
            }

            let (kept, out_of_order) = monotone_observations(series, self.order_policy);
            if out_of_order > 0 {
                log::debug!("{source}: {out_of_order} out-of-order observation(s) filtered");
                out.dropped += out_of_order;
            }

            for (timestamp, obs) in kept {
                let votes = obs.votes.0;
                let counts: Option<Results> = obs.vote_shares.map(|shares| {
                    shares
                        .into_iter()
                        .map(|(slug, share)| {
                            let count = votes.zip(share.0).map(|(v, s)| (v as f64 * s).round() as i64);
                            (slug, Count(count))
                        })
                        .collect()
                });
                out.records.push(VoteRecord {
                    state: state.clone(),
                    locality: Locality::State,
                    fips: None,
                    timestamp,
                    vote_type: VoteType::Total,
                    tally: tally_from_results(votes, counts.as_ref(), &self.candidates),
                    margin: None,
                });
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Snapshot time from the identifier, else from the payload's `meta` block.
fn snapshot_time(source: &SourceId, payload: &Value) -> Result<NaiveDateTime, FetchError> {
    if let Some(at) = source.snapshot_time() {
        return Ok(at);
    }
    payload
        .get("meta")
        .and_then(|meta| serde_json::from_value::<RawMeta>(meta.clone()).ok())
        .and_then(|meta| meta.snapshot_text().and_then(parse_timestamp))
        .ok_or_else(|| FetchError::Payload("no snapshot timestamp in identifier or meta block".into()))
}

/// Tracked candidates by slug; everything else in `results` sums into
/// `other`. A null anywhere in the remainder makes `other` null. An empty
/// remainder gives `votes − Σ tracked` when all of those are known. Sums
/// that overflow are null.
pub fn tally_from_results(
    votes: Option<i64>,
    results: Option<&Results>,
    candidates: &[CandidateConfig],
) -> Tally {
    let Some(results) = results else {
        return Tally {
            votes,
            ..Tally::empty(candidates.len())
        };
    };

    let tracked: Vec<Option<i64>> = candidates
        .iter()
        .map(|c| results.get(&c.slug).and_then(|count| count.0))
        .collect();

    let mut remainder = results
        .iter()
        .filter(|(slug, _)| !candidates.iter().any(|c| &c.slug == *slug))
        .map(|(_, count)| count.0)
        .peekable();

    let other = if remainder.peek().is_some() {
        remainder.try_fold(0i64, |acc, value| acc.checked_add(value?))
    } else {
        let known = tracked.iter().try_fold(0i64, |acc, value| acc.checked_add((*value)?));
        votes.zip(known).and_then(|(total, known)| total.checked_sub(known))
    };

    Tally {
        votes,
        candidates: tracked,
        other,
    }
}

/// Trimmed, lowercased, each space to a hyphen.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "-")
}

/// [`normalize_name`] without a trailing `-county`.
pub fn normalize_county(raw: &str) -> String {
    let name = normalize_name(raw);
    match name.strip_suffix("-county") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => name,
    }
}

/// Applies the order policy to a series in source order. Returns the kept
/// observations and how many were dropped. The last observation is always
/// kept.
pub fn monotone_observations<T>(
    series: Vec<(NaiveDateTime, T)>,
    policy: OrderPolicy,
) -> (Vec<(NaiveDateTime, T)>, usize) {
    let times: Vec<NaiveDateTime> = series.iter().map(|(at, _)| *at).collect();
    let len = times.len();
    let in_order = |i: usize| i + 1 >= len || times[i] < times[i + 1];

    let keep: Vec<bool> = match policy {
        OrderPolicy::Off => vec![true; len],
        OrderPolicy::Any => (0..len).map(in_order).collect(),
        OrderPolicy::Leading => {
            let first = (0..len).find(|&i| in_order(i)).unwrap_or(len);
            (0..len).map(|i| i >= first).collect()
        }
    };

    let dropped = keep.iter().filter(|k| !**k).count();
    let kept = series
        .into_iter()
        .zip(keep)
        .filter_map(|(obs, keep)| keep.then_some(obs))
        .collect();
    (kept, dropped)
}
