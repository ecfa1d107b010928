//! Data models for rvp-ingest
//!
//! Page identifiers, the records flowing through the pipeline, and the
//! outcome of a single page fetch.

pub mod record;

pub use record::{FetchOutcome, FetchParams, PageId, RawRecord, ScoredRecord, SCORE_SCALE};
