use std::io::Write;

use crate::error::PipelineError;
use crate::model::VoteRecord;

/// Final assembled table: sorted rows plus the tracked candidate columns
/// they are rendered with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteTable {
    /// Output column suffixes, `votes_<column>`, in tracked order.
    pub candidate_columns: Vec<String>,
    pub rows: Vec<VoteRecord>,
}

impl VoteTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `state,county,precinct,fips,timestamp,vote_type,votes,votes_<c>...,votes_other,margin`
    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = ["state", "county", "precinct", "fips", "timestamp", "vote_type", "votes"]
            .into_iter()
            .map(String::from)
            .collect();
        header.extend(self.candidate_columns.iter().cloned());
        header.push("votes_other".into());
        header.push("margin".into());
        header
    }

    /// One row as output cells; nulls render as empty cells.
    pub fn render_row(&self, row: &VoteRecord) -> Vec<String> {
        let mut cells = vec![
            row.state.clone(),
            row.locality.county_label().to_string(),
            row.locality.precinct_label().to_string(),
            cell(row.rendered_fips()),
            row.rendered_timestamp(),
            row.vote_type.label().unwrap_or_default().to_string(),
            cell(row.tally.votes),
        ];
        cells.extend((0..self.candidate_columns.len()).map(|i| cell(row.tally.candidate(i))));
        cells.push(cell(row.tally.other));
        cells.push(cell(row.margin));
        cells
    }

    /// Header always written, even with zero rows.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), PipelineError> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(out);
        writer.write_record(self.header())?;
        for row in &self.rows {
            writer.write_record(self.render_row(row))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, PipelineError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| PipelineError::Csv(e.to_string()))
    }
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Locality, Tally, VoteType};
    use chrono::NaiveDate;

    fn table(rows: Vec<VoteRecord>) -> VoteTable {
        VoteTable {
            candidate_columns: vec!["votes_biden".into(), "votes_trump".into()],
            rows,
        }
    }

    #[test]
    fn header_follows_candidates() {
        assert_eq!(
            table(Vec::new()).header().join(","),
            "state,county,precinct,fips,timestamp,vote_type,votes,votes_biden,votes_trump,votes_other,margin"
        );
    }

    #[test]
    fn state_row_renders_sentinels() {
        let row = VoteRecord {
            state: "GA".into(),
            locality: Locality::State,
            fips: None,
            timestamp: NaiveDate::from_ymd_opt(2020, 11, 4).unwrap().and_hms_opt(6, 0, 0).unwrap(),
            vote_type: VoteType::Total,
            tally: Tally {
                votes: Some(100),
                candidates: vec![Some(60), None],
                other: None,
            },
            margin: Some(-20.0),
        };
        let csv = table(vec![row]).to_csv_string().unwrap();
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(line, "GA,STATE,STATE,-9999,2020-11-04T06:00:00,total,100,60,,,-20");
    }

    #[test]
    fn empty_table_still_has_header() {
        let csv = table(Vec::new()).to_csv_string().unwrap();
        assert_eq!(csv.lines().count(), 1);
    }
}
