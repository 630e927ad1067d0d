use crate::aggregate::{aggregate, LevelCounts, Stacked};
use crate::config::DatasetConfig;
use crate::error::PipelineError;
use crate::grid::complete_grid;
use crate::margin::resolve_margins;
use crate::model::{output_order, VoteRecord};
use crate::table::VoteTable;

#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub table: VoteTable,
    pub counts: LevelCounts,
    /// Placeholder rows added by grid completion.
    pub filled: usize,
}

/// Converged records → final table: stack every level, complete the grid,
/// resolve margins, sort.
pub fn assemble(records: Vec<VoteRecord>, config: &DatasetConfig) -> Result<Assembly, PipelineError> {
    let width = config.candidates.len();

    let Stacked { mut records, counts } = aggregate(records, config.rollup, width);
    let filled = complete_grid(&config.name, &mut records, width)?;
    resolve_margins(&mut records);
    records.sort_by(output_order);

    Ok(Assembly {
        table: VoteTable {
            candidate_columns: config.candidate_columns(),
            rows: records,
        },
        counts,
        filled,
    })
}
