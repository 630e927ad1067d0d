//! `votegrid-recon`: snapshot reconciliation and aggregation engine.
//!
//! Pure engine crate: converges a list of source identifiers through a
//! caller-supplied fetcher, then returns one time-consistent table at
//! precinct, county and state granularity. No HTTP or CLI dependencies.

pub mod aggregate;
pub mod assemble;
pub mod config;
pub mod converge;
pub mod engine;
pub mod error;
pub mod grid;
pub mod margin;
pub mod model;
pub mod normalize;
pub mod raw;
pub mod source;
pub mod table;

pub use config::DatasetConfig;
pub use engine::{run, RunReport, RunSummary};
pub use error::PipelineError;
pub use model::{Locality, Tally, VoteRecord, VoteType};
pub use source::{CourtesyDelay, FetchError, NoDelay, Pacer, SourceFetcher, SourceId};
pub use table::VoteTable;
