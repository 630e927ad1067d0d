use serde::Serialize;

use crate::aggregate::LevelCounts;
use crate::assemble::assemble;
use crate::config::DatasetConfig;
use crate::converge::converge;
use crate::error::PipelineError;
use crate::normalize::Normalizer;
use crate::source::{select_sources, Pacer, SourceFetcher, SourceId};
use crate::table::VoteTable;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dataset: String,
    pub feed: String,
    pub engine_version: String,
    pub run_at: String,
    pub sources_listed: usize,
    pub sources_selected: usize,
    pub sources_fetched: usize,
    pub sources_unresolved: usize,
    pub passes: usize,
    pub records_dropped: usize,
    pub rows: usize,
    pub rows_filled: usize,
    pub levels: LevelCounts,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub table: VoteTable,
    /// Identifiers that never resolved; their gaps show up as null cells.
    pub unresolved: Vec<SourceId>,
}

/// Select eligible sources, converge, assemble.
pub fn run<F, P>(
    config: &DatasetConfig,
    identifiers: &[String],
    fetcher: &mut F,
    pacer: &mut P,
) -> Result<RunReport, PipelineError>
where
    F: SourceFetcher + ?Sized,
    P: Pacer + ?Sized,
{
    let sources = select_sources(identifiers, config);
    log::info!(
        "{}: {} of {} source(s) eligible",
        config.name,
        sources.len(),
        identifiers.len()
    );
    let selected = sources.len();

    let normalizer = Normalizer::new(config);
    let convergence = converge(sources, fetcher, pacer, &normalizer);
    for source in &convergence.unresolved {
        log::warn!("unresolved: {source}");
    }

    let assembly = assemble(convergence.records, config)?;

    let summary = RunSummary {
        dataset: config.name.clone(),
        feed: config.feed.to_string(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        run_at: chrono::Utc::now().to_rfc3339(),
        sources_listed: identifiers.len(),
        sources_selected: selected,
        sources_fetched: convergence.fetched,
        sources_unresolved: convergence.unresolved.len(),
        passes: convergence.passes,
        records_dropped: convergence.dropped,
        rows: assembly.table.len(),
        rows_filled: assembly.filled,
        levels: assembly.counts,
    };

    Ok(RunReport {
        summary,
        table: assembly.table,
        unresolved: convergence.unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::{json, Value};

    use crate::source::{FetchError, NoDelay};

    struct MapFetcher(HashMap<String, Value>);

    impl SourceFetcher for MapFetcher {
        fn fetch(&mut self, source: &SourceId) -> Result<Value, FetchError> {
            self.0.get(source.as_str()).cloned().ok_or(FetchError::Status(404))
        }
    }

    #[test]
    fn run_reports_unresolved_and_counts() {
        let config = DatasetConfig::from_toml("name = \"GA\"\nstate = \"GA\"\n").unwrap();
        let mut fetcher = MapFetcher(HashMap::from([(
            "https://x/GAGeneral-2020-11-04T06:00:00Z.json".to_string(),
            json!({"precincts": [
                {"locality_name": "Fulton", "precinct_id": "A", "vote_type": "absentee", "votes": 10,
                 "results": {"bidenj": 6, "trumpd": 4}},
                {"precinct_id": "orphan"},
            ]}),
        )]));
        let ids = vec![
            "https://x/GAGeneral-2020-11-04T06:00:00Z.json".to_string(),
            "https://x/GAGeneral-2020-11-04T07:00:00Z.json".to_string(),
        ];

        let report = run(&config, &ids, &mut fetcher, &mut NoDelay).unwrap();
        assert_eq!(report.summary.sources_selected, 2);
        assert_eq!(report.summary.sources_fetched, 1);
        assert_eq!(report.summary.records_dropped, 1);
        assert_eq!(report.unresolved.len(), 1);
        // precinct absentee + total, county absentee + total
        assert_eq!(report.table.len(), 4);
        assert_eq!(report.summary.levels.source, 1);
    }

    #[test]
    fn nothing_recovered_is_an_error() {
        let config = DatasetConfig::from_toml("name = \"GA\"\nstate = \"GA\"\n").unwrap();
        let mut fetcher = MapFetcher(HashMap::new());
        let err = run(&config, &["missing.json".to_string()], &mut fetcher, &mut NoDelay).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset { .. }));
    }
}
