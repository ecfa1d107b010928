//! Scoring stage
//!
//! Receives a fetched page from a worker, scores it through the scoring
//! bridge and appends the scored records to the [`ResultStore`]. Pages are
//! scored independently; completion order decides append order.

use super::bridge::BridgeError;
use super::charts::ChartPublisher;
use super::endpoints::{ScoringBridge, ScoringRequest};
use super::results::ResultStore;
use super::state::PipelineState;
use crate::models::{PageId, RawRecord, ScoredRecord};
use chrono::Utc;
use rvp_common::events::{EventBus, PulseEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Why a page contributed no records
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("scoring bridge: {0}")]
    Bridge(#[from] BridgeError),

    #[error("scorer: {0}")]
    Scorer(String),

    #[error("expected {expected} score pairs, got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("score {value} for record {index} is outside [0, 1]")]
    OutOfRange { index: usize, value: f64 },
}

pub struct ScoringStage {
    state: Arc<PipelineState>,
    bridge: ScoringBridge,
    results: Arc<ResultStore>,
    charts: Arc<ChartPublisher>,
    events: EventBus,
}

impl ScoringStage {
    pub fn new(
        state: Arc<PipelineState>,
        bridge: ScoringBridge,
        results: Arc<ResultStore>,
        charts: Arc<ChartPublisher>,
        events: EventBus,
    ) -> Self {
        Self {
            state,
            bridge,
            results,
            charts,
            events,
        }
    }

    /// Hand a page to scoring without waiting for the result
    ///
    /// The page enters the analyzing set before this returns; the scoring
    /// itself runs on the run's task tracker.
    pub async fn submit(self: &Arc<Self>, page: PageId, records: Vec<RawRecord>) {
        self.state.begin_analysis(page).await;
        self.events.emit_lossy(self.state.in_flight_event().await);

        let stage = Arc::clone(self);
        self.state.tracker().spawn(async move {
            // Failures are already logged and broadcast
            let _ = stage.score(page, records).await;
        });
    }

    /// Score one page and append its records
    ///
    /// Returns the number of records appended. On failure the page's
    /// records are dropped.
    pub async fn score(&self, page: PageId, records: Vec<RawRecord>) -> Result<usize, ScoringError> {
        self.state.begin_analysis(page).await;
        debug!(page = %page, records = records.len(), "Scoring page");

        let outcome = match self.score_records(page, records).await {
            Ok(scored) => {
                let appended = scored.len();
                let results_total = self.results.append(scored).await;
                Ok((appended, results_total))
            }
            Err(e) => Err(e),
        };

        self.state.finish_analysis(page).await;
        self.events.emit_lossy(self.state.in_flight_event().await);

        match outcome {
            Ok((appended, results_total)) => {
                debug!(page = %page, appended, results_total, "Page scored");
                self.events.emit_lossy(PulseEvent::ScoringCompleted {
                    page: page.get(),
                    appended,
                    results_total,
                    timestamp: Utc::now(),
                });
                self.charts.refresh(&self.results).await;
                Ok(appended)
            }
            Err(e) => {
                error!(page = %page, error = %e, "Scoring failed; dropping page records");
                self.events.emit_lossy(PulseEvent::ScoringFailed {
                    page: page.get(),
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn score_records(
        &self,
        page: PageId,
        records: Vec<RawRecord>,
    ) -> Result<Vec<ScoredRecord>, ScoringError> {
        let request = ScoringRequest {
            texts: records
                .iter()
                .map(|record| (record.text_a.clone(), record.text_b.clone()))
                .collect(),
        };

        let scores = self
            .bridge
            .request(page, request)
            .await?
            .map_err(ScoringError::Scorer)?;

        if scores.len() != records.len() {
            return Err(ScoringError::CountMismatch {
                expected: records.len(),
                got: scores.len(),
            });
        }

        for (index, (a, b)) in scores.iter().enumerate() {
            for value in [*a, *b] {
                if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                    return Err(ScoringError::OutOfRange { index, value });
                }
            }
        }

        Ok(records
            .into_iter()
            .zip(scores)
            .map(|(record, (a, b))| ScoredRecord::from_unit_scores(record, a, b))
            .collect())
    }
}
