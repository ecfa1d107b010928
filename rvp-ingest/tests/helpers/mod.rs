//! Shared fakes for pipeline integration tests
//!
//! - `ScriptedExtractor`: per-page scripted fetch outcomes with call log
//! - `FixedScorer`: constant scores, optional latency and failure trigger
//! - `fast_config` / `controller`: a controller wired to the fakes

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rvp_common::events::{EventBus, PulseEvent};
use rvp_ingest::models::{FetchOutcome, FetchParams, PageId, RawRecord};
use rvp_ingest::pipeline::{PipelineConfig, PipelineController};
use rvp_ingest::services::{ScoreError, Scorer, SvgRenderer};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// `count` dated records for `page`, texts tagged with the page number
pub fn records(page: u64, count: usize) -> Vec<RawRecord> {
    (0..count)
        .map(|i| {
            RawRecord::new(
                format!("page {} review {} pro", page, i),
                format!("page {} review {} con", page, i),
            )
            .with_date(Utc::now().date_naive())
        })
        .collect()
}

/// Extractor answering from per-page scripts
///
/// Each page holds a queue of outcomes; calls pop the queue until one
/// outcome is left, which then repeats. Unscripted pages use the fallback
/// (end of pages unless changed).
pub struct ScriptedExtractor {
    scripts: Mutex<HashMap<u64, VecDeque<FetchOutcome>>>,
    fallback: FetchOutcome,
    latency: HashMap<u64, Duration>,
    default_latency: Duration,
    calls: Mutex<Vec<u64>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: FetchOutcome::success(Vec::new()),
            latency: HashMap::new(),
            default_latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue `outcome` for the next call on `page`
    pub fn page(self, page: u64, outcome: FetchOutcome) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn page_with_records(self, page: u64, count: usize) -> Self {
        self.page(page, FetchOutcome::success(records(page, count)))
    }

    /// Outcome for every unscripted page
    pub fn fallback(mut self, outcome: FetchOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    pub fn page_latency(mut self, page: u64, latency: Duration) -> Self {
        self.latency.insert(page, latency);
        self
    }

    /// Pages fetched so far, in call order
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, page: u64) -> usize {
        self.calls().iter().filter(|p| **p == page).count()
    }
}

#[async_trait]
impl rvp_ingest::services::Extractor for ScriptedExtractor {
    async fn fetch_page(&self, page: PageId, _params: FetchParams) -> FetchOutcome {
        self.calls.lock().unwrap().push(page.get());

        let latency = self
            .latency
            .get(&page.get())
            .copied()
            .unwrap_or(self.default_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&page.get()) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| self.fallback.clone()),
            None => self.fallback.clone(),
        }
    }
}

/// Scorer returning the same score for every text
///
/// Text containing `poison` fails.
pub struct FixedScorer {
    score: f64,
    latency: Duration,
    ready: AtomicBool,
}

impl FixedScorer {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            latency: Duration::ZERO,
            ready: AtomicBool::new(true),
        }
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn not_ready(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, text: &str) -> Result<f64, ScoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if text.contains("poison") {
            return Err(ScoreError::Failed(format!("cannot score {:?}", text)));
        }
        Ok(self.score)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Short delays and timeouts; failed workers are not replaced
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        concurrency: 2,
        delay_per_call: Duration::from_millis(5),
        max_pages: 1000,
        fetch_timeout: Duration::from_secs(5),
        score_timeout: Duration::from_secs(5),
        replace_failed_workers: false,
        default_duration_days: 90,
        merge_charts: true,
    }
}

pub fn controller(
    config: PipelineConfig,
    extractor: Arc<ScriptedExtractor>,
    scorer: Arc<FixedScorer>,
) -> Arc<PipelineController> {
    Arc::new(PipelineController::new(
        config,
        extractor,
        scorer,
        Arc::new(SvgRenderer::new()),
        EventBus::new(1000),
    ))
}

/// Drain every event currently buffered on `rx`
pub fn collect_events(rx: &mut broadcast::Receiver<PulseEvent>) -> Vec<PulseEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the first event matching `predicate`, up to `timeout`
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<PulseEvent>,
    timeout: Duration,
    mut predicate: F,
) -> Option<PulseEvent>
where
    F: FnMut(&PulseEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
