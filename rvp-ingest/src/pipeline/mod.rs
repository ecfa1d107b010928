//! Bounded-concurrency pagination pipeline
//!
//! # Architecture
//! - [`PageSequencer`] hands out page identifiers
//! - [`RateLimiter`] inserts the per-fetch politeness delay
//! - [`TransportBridge`] carries fetch and scoring requests to their endpoints
//! - worker loops claim, fetch and route pages (see `worker`)
//! - [`FailureLedger`] keeps failed pages until retried or dismissed
//! - [`ScoringStage`] scores a page and appends it to the [`ResultStore`]
//! - [`PipelineController`] owns the run lifecycle
//!
//! # Termination
//! A run stops dispatching fetches once its termination flag is set (empty
//! page, page cap, or `stop()`). In-flight fetches and scorings drain; the
//! run is finished when its task tracker is empty.

pub mod bridge;
pub mod charts;
pub mod controller;
pub mod endpoints;
pub mod ledger;
pub mod rate_limiter;
pub mod results;
pub mod scoring;
pub mod sequencer;
pub mod state;
mod worker;

pub use bridge::{BridgeError, BridgeHandler, TransportBridge};
pub use charts::{ChartPublisher, ChartWindow};
pub use controller::{PipelineController, PipelineStatus};
pub use ledger::{FailureLedger, FailureRecord};
pub use rate_limiter::RateLimiter;
pub use results::ResultStore;
pub use scoring::ScoringStage;
pub use sequencer::PageSequencer;
pub use state::{PipelineState, RunSnapshot};

use crate::models::PageId;
use rvp_common::config::TomlConfig;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the pipeline control surface
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// A run is active and has not been terminated
    #[error("a pipeline run is already active")]
    AlreadyRunning,

    /// No run to act on
    #[error("no active pipeline run")]
    NoActiveRun,

    #[error("concurrency must be at least 1 (got {0})")]
    InvalidConcurrency(usize),

    /// The page has no entry in the failure ledger
    #[error("page {0} has no recorded failure")]
    UnknownFailure(PageId),

    /// A retry for the page is still outstanding
    #[error("a retry for page {0} is already in flight")]
    RetryInFlight(PageId),

    /// The window would reach back past the earliest representable date
    #[error("duration of {0} days is out of range")]
    InvalidDuration(u32),

    /// The scoring endpoint has not reported ready yet
    #[error("scorer is not ready")]
    ScorerNotReady,
}

/// Runtime settings of the pipeline, derived from [`TomlConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Workers launched when a start request does not name a count
    pub concurrency: usize,
    /// Delay before every fetch dispatched by a worker
    pub delay_per_call: Duration,
    /// Highest page identifier a run may claim
    pub max_pages: u64,
    pub fetch_timeout: Duration,
    pub score_timeout: Duration,
    /// Respawn a worker that exits on a failed page
    pub replace_failed_workers: bool,
    pub default_duration_days: u32,
    /// Merge preference before any `set_merge_preference` call
    pub merge_charts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&TomlConfig::default())
    }
}

impl From<&TomlConfig> for PipelineConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            delay_per_call: Duration::from_millis(config.delay_per_call_ms),
            max_pages: config.max_pages,
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            score_timeout: Duration::from_millis(config.score_timeout_ms),
            replace_failed_workers: config.replace_failed_workers,
            default_duration_days: config.default_duration_days,
            merge_charts: config.merge_charts,
        }
    }
}
