//! Pipeline controller
//!
//! Owns the run lifecycle and the session-wide pieces (result store,
//! charts). Each `start` builds a fresh [`PipelineState`] and fresh bridges;
//! results accumulate across runs.

use super::charts::{ChartPublisher, ChartWindow};
use super::endpoints::{FetchBridge, FetchEndpoint, ScoringBridge, ScoringEndpoint};
use super::ledger::FailureRecord;
use super::rate_limiter::RateLimiter;
use super::results::ResultStore;
use super::scoring::ScoringStage;
use super::state::{PipelineState, RunSnapshot};
use super::worker::{self, RunHandles};
use super::{PipelineConfig, PipelineError};
use crate::models::{PageId, ScoredRecord};
use crate::services::{Extractor, Renderer, Scorer};
use chrono::Utc;
use rvp_common::events::{EventBus, PulseEvent, TerminationCause};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Channel capacity of each bridge
const BRIDGE_CAPACITY: usize = 64;

/// Status reported to the control plane
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// Latest run, if any run was started in this session
    pub run: Option<RunSnapshot>,
    pub failures: Vec<FailureRecord>,
    pub results_total: usize,
    pub merge_charts: bool,
    pub scorer_ready: bool,
}

pub struct PipelineController {
    config: PipelineConfig,
    extractor: Arc<dyn Extractor>,
    scorer: Arc<dyn Scorer>,
    results: Arc<ResultStore>,
    charts: Arc<ChartPublisher>,
    events: EventBus,
    current: RwLock<Option<RunHandles>>,
}

impl PipelineController {
    pub fn new(
        config: PipelineConfig,
        extractor: Arc<dyn Extractor>,
        scorer: Arc<dyn Scorer>,
        renderer: Arc<dyn Renderer>,
        events: EventBus,
    ) -> Self {
        let merge_charts = config.merge_charts;
        Self {
            config,
            extractor,
            scorer,
            results: Arc::new(ResultStore::new()),
            charts: Arc::new(ChartPublisher::new(
                renderer,
                events.clone(),
                merge_charts,
            )),
            events,
            current: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn results_store(&self) -> &Arc<ResultStore> {
        &self.results
    }

    pub fn is_scorer_ready(&self) -> bool {
        self.scorer.is_ready()
    }

    /// Start a run with `concurrency` workers (config default when `None`)
    ///
    /// Refused while the previous run is still dispatching fetches.
    /// Accumulated results are kept.
    pub async fn start(
        &self,
        duration_in_days: u32,
        concurrency: Option<usize>,
    ) -> Result<Uuid, PipelineError> {
        let concurrency = concurrency.unwrap_or(self.config.concurrency);
        if concurrency == 0 {
            return Err(PipelineError::InvalidConcurrency(concurrency));
        }
        let window = ChartWindow::ending(Utc::now().date_naive(), duration_in_days)
            .ok_or(PipelineError::InvalidDuration(duration_in_days))?;
        if !self.scorer.is_ready() {
            return Err(PipelineError::ScorerNotReady);
        }

        let mut current = self.current.write().await;
        if let Some(run) = current.as_ref() {
            if !run.state.is_terminated() && !run.state.is_finished() {
                return Err(PipelineError::AlreadyRunning);
            }
        }

        let state = Arc::new(PipelineState::new(
            concurrency,
            duration_in_days,
            window.min_date,
            self.config.max_pages,
        ));
        let run_id = state.run_id();

        let fetch = Arc::new(FetchBridge::spawn_endpoint(
            Arc::new(FetchEndpoint::new(Arc::clone(&self.extractor))),
            BRIDGE_CAPACITY,
            self.config.fetch_timeout,
        ));
        let scoring_bridge = ScoringBridge::spawn_endpoint(
            Arc::new(ScoringEndpoint::new(Arc::clone(&self.scorer))),
            BRIDGE_CAPACITY,
            self.config.score_timeout,
        );
        let scoring = Arc::new(ScoringStage::new(
            Arc::clone(&state),
            scoring_bridge,
            Arc::clone(&self.results),
            Arc::clone(&self.charts),
            self.events.clone(),
        ));

        let handles = RunHandles {
            state: Arc::clone(&state),
            fetch,
            scoring,
            limiter: RateLimiter::new(self.config.delay_per_call),
            events: self.events.clone(),
            replace_failed_workers: self.config.replace_failed_workers,
        };

        self.charts.set_window(window).await;

        info!(
            run_id = %run_id,
            concurrency,
            duration_in_days,
            min_date = %window.min_date,
            "Starting pipeline run"
        );
        self.events.emit_lossy(PulseEvent::RunStarted {
            run_id,
            concurrency,
            duration_in_days,
            min_date: window.min_date,
            timestamp: Utc::now(),
        });

        for _ in 0..concurrency {
            worker::spawn_worker(handles.clone());
        }
        state.tracker().close();
        self.watch_for_finish(Arc::clone(&state));

        *current = Some(handles);
        Ok(run_id)
    }

    fn watch_for_finish(&self, state: Arc<PipelineState>) {
        let results = Arc::clone(&self.results);
        let events = self.events.clone();
        tokio::spawn(async move {
            state.tracker().wait().await;
            let results_total = results.len().await;
            let unresolved_failures = state.failures().len().await;
            info!(
                run_id = %state.run_id(),
                results_total,
                unresolved_failures,
                "Pipeline run finished"
            );
            events.emit_lossy(PulseEvent::RunFinished {
                run_id: state.run_id(),
                results_total,
                unresolved_failures,
                timestamp: Utc::now(),
            });
        });
    }

    /// Stop dispatching new fetches; in-flight work drains
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let run = self.current_run().await?;
        let run_id = run.state.run_id();

        if !run.state.terminate(TerminationCause::StopRequested).await {
            return Err(PipelineError::NoActiveRun);
        }

        info!(run_id = %run_id, "Stop requested; draining in-flight work");
        self.events.emit_lossy(PulseEvent::RunStopRequested {
            run_id,
            timestamp: Utc::now(),
        });
        self.events.emit_lossy(PulseEvent::RunTerminated {
            run_id,
            cause: TerminationCause::StopRequested,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Re-fetch a failed page of the latest run
    ///
    /// The retry joins the run's task tracker, so `drain()` waits for it.
    /// When the run had already finished, `RunFinished` is emitted again
    /// once the retry and its scoring are done.
    pub async fn retry_page(&self, page: PageId) -> Result<(), PipelineError> {
        let run = self.current_run().await?;
        run.state.failures().begin_retry(page).await?;

        self.events.emit_lossy(PulseEvent::FailureRetrying {
            run_id: run.state.run_id(),
            page: page.get(),
            timestamp: Utc::now(),
        });

        let state = Arc::clone(&run.state);
        let reopened = state.is_finished();
        state.tracker().spawn(worker::retry_page(run, page));
        if reopened {
            self.watch_for_finish(state);
        }
        Ok(())
    }

    /// Drop a failed page without retrying it
    pub async fn dismiss_failure(&self, page: PageId) -> Result<FailureRecord, PipelineError> {
        let run = self.current_run().await?;
        let record = run.state.failures().dismiss(page).await?;

        info!(page = %page, "Failure dismissed");
        self.events.emit_lossy(PulseEvent::FailureDismissed {
            run_id: run.state.run_id(),
            page: page.get(),
            timestamp: Utc::now(),
        });
        Ok(record)
    }

    /// Switch between one merged chart and three split charts
    ///
    /// Re-renders immediately when a run has set the chart window.
    pub async fn set_merge_preference(&self, merge: bool) {
        self.charts.set_merged(merge);
        self.charts.refresh(&self.results).await;
    }

    pub fn merge_preference(&self) -> bool {
        self.charts.merged()
    }

    pub async fn status(&self) -> PipelineStatus {
        let run = self.current.read().await.clone();
        let (run, failures) = match run {
            Some(run) => (
                Some(run.state.snapshot().await),
                run.state.failures().list().await,
            ),
            None => (None, Vec::new()),
        };

        PipelineStatus {
            run,
            failures,
            results_total: self.results.len().await,
            merge_charts: self.charts.merged(),
            scorer_ready: self.scorer.is_ready(),
        }
    }

    pub async fn results(&self) -> Vec<ScoredRecord> {
        self.results.snapshot().await
    }

    pub async fn latest_chart(&self) -> Option<String> {
        self.charts.latest().await
    }

    /// State of the latest run
    pub async fn run_state(&self) -> Option<Arc<PipelineState>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|run| Arc::clone(&run.state))
    }

    /// Wait until every worker, scoring and retry task of the latest run ends
    pub async fn drain(&self) {
        if let Some(state) = self.run_state().await {
            state.tracker().wait().await;
        }
    }

    async fn current_run(&self) -> Result<RunHandles, PipelineError> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(PipelineError::NoActiveRun)
    }
}
