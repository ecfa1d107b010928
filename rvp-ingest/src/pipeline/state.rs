//! Per-run pipeline state
//!
//! One [`PipelineState`] exists per run. It is created by the controller
//! on `start`, shared with workers and scoring tasks through an `Arc`, and
//! never reused by a later run.

use super::ledger::FailureLedger;
use super::sequencer::PageSequencer;
use crate::models::{FetchParams, PageId};
use chrono::{NaiveDate, Utc};
use rvp_common::events::{PulseEvent, TerminationCause};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// Outcome of a worker trying to claim its next page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Page claimed and added to the fetching set
    Page(PageId),
    /// The run was already terminated; nothing was claimed
    Terminated,
    /// The page cap was hit; this call terminated the run
    Exhausted,
}

#[derive(Debug, Default)]
struct InFlight {
    fetching: BTreeSet<PageId>,
    analyzing: BTreeSet<PageId>,
    termination: Option<TerminationCause>,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub concurrency: usize,
    pub duration_in_days: u32,
    pub min_date: NaiveDate,
    pub terminated: bool,
    pub termination_cause: Option<TerminationCause>,
    pub fetching: Vec<PageId>,
    pub analyzing: Vec<PageId>,
    pub pages_claimed: u64,
    /// Every worker and scoring task has ended
    pub finished: bool,
}

/// Shared mutable state of a single run
///
/// The fetching/analyzing sets and the termination cause sit behind one
/// lock, so a claim can never slip past a termination that another worker
/// has already recorded.
#[derive(Debug)]
pub struct PipelineState {
    run_id: Uuid,
    concurrency: usize,
    duration_in_days: u32,
    params: FetchParams,
    sequencer: PageSequencer,
    in_flight: Mutex<InFlight>,
    terminated: CancellationToken,
    failures: FailureLedger,
    tracker: TaskTracker,
    next_worker: AtomicUsize,
}

impl PipelineState {
    pub fn new(
        concurrency: usize,
        duration_in_days: u32,
        min_date: NaiveDate,
        max_pages: u64,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            concurrency,
            duration_in_days,
            params: FetchParams { min_date },
            sequencer: PageSequencer::new(max_pages),
            in_flight: Mutex::new(InFlight::default()),
            terminated: CancellationToken::new(),
            failures: FailureLedger::new(),
            tracker: TaskTracker::new(),
            next_worker: AtomicUsize::new(0),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn duration_in_days(&self) -> u32 {
        self.duration_in_days
    }

    pub fn params(&self) -> FetchParams {
        self.params
    }

    pub fn failures(&self) -> &FailureLedger {
        &self.failures
    }

    /// Tracker owning every worker, scoring and retry task of the run
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Token cancelled when the run terminates
    pub fn termination_token(&self) -> &CancellationToken {
        &self.terminated
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// All tracked tasks have ended and no new workers will be added
    pub fn is_finished(&self) -> bool {
        self.tracker.is_closed() && self.tracker.is_empty()
    }

    pub(crate) fn next_worker_id(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::SeqCst)
    }

    /// Claim the next page unless the run is terminated
    pub async fn claim_page(&self) -> Claim {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.termination.is_some() {
            return Claim::Terminated;
        }

        match self.sequencer.next() {
            Some(page) => {
                in_flight.fetching.insert(page);
                Claim::Page(page)
            }
            None => {
                in_flight.termination = Some(TerminationCause::PageLimit);
                self.terminated.cancel();
                Claim::Exhausted
            }
        }
    }

    /// Add a page to the fetching set outside the sequence (manual retry)
    pub async fn mark_fetching(&self, page: PageId) {
        self.in_flight.lock().await.fetching.insert(page);
    }

    pub async fn finish_fetch(&self, page: PageId) {
        self.in_flight.lock().await.fetching.remove(&page);
    }

    pub async fn begin_analysis(&self, page: PageId) {
        self.in_flight.lock().await.analyzing.insert(page);
    }

    pub async fn finish_analysis(&self, page: PageId) {
        self.in_flight.lock().await.analyzing.remove(&page);
    }

    /// Record termination
    ///
    /// Returns `true` only for the call that actually terminated the run;
    /// later calls keep the first cause.
    pub async fn terminate(&self, cause: TerminationCause) -> bool {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.termination.is_some() {
            return false;
        }
        in_flight.termination = Some(cause);
        self.terminated.cancel();
        true
    }

    pub async fn termination_cause(&self) -> Option<TerminationCause> {
        self.in_flight.lock().await.termination
    }

    /// Current fetching and analyzing sets, as plain page numbers
    pub async fn in_flight_pages(&self) -> (Vec<u64>, Vec<u64>) {
        let in_flight = self.in_flight.lock().await;
        (
            in_flight.fetching.iter().map(|p| p.get()).collect(),
            in_flight.analyzing.iter().map(|p| p.get()).collect(),
        )
    }

    /// `InFlightChanged` event for the current sets
    pub async fn in_flight_event(&self) -> PulseEvent {
        let (fetching, analyzing) = self.in_flight_pages().await;
        PulseEvent::InFlightChanged {
            run_id: self.run_id,
            fetching,
            analyzing,
            timestamp: Utc::now(),
        }
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let in_flight = self.in_flight.lock().await;
        RunSnapshot {
            run_id: self.run_id,
            concurrency: self.concurrency,
            duration_in_days: self.duration_in_days,
            min_date: self.params.min_date,
            terminated: in_flight.termination.is_some(),
            termination_cause: in_flight.termination,
            fetching: in_flight.fetching.iter().copied().collect(),
            analyzing: in_flight.analyzing.iter().copied().collect(),
            pages_claimed: self.sequencer.issued(),
            finished: self.is_finished(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(max_pages: u64) -> PipelineState {
        let min_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PipelineState::new(2, 90, min_date, max_pages)
    }

    #[tokio::test]
    async fn test_claim_adds_to_fetching_set() {
        let state = state(10);
        assert_eq!(state.claim_page().await, Claim::Page(PageId::new(1)));
        assert_eq!(state.claim_page().await, Claim::Page(PageId::new(2)));

        state.finish_fetch(PageId::new(1)).await;
        let (fetching, analyzing) = state.in_flight_pages().await;
        assert_eq!(fetching, vec![2]);
        assert!(analyzing.is_empty());
    }

    #[tokio::test]
    async fn test_no_claim_after_termination() {
        let state = state(10);
        assert_eq!(state.claim_page().await, Claim::Page(PageId::new(1)));

        assert!(state.terminate(TerminationCause::EmptyPage).await);
        assert!(state.is_terminated());
        assert_eq!(state.claim_page().await, Claim::Terminated);

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.pages_claimed, 1);
        assert_eq!(snapshot.termination_cause, Some(TerminationCause::EmptyPage));
    }

    #[tokio::test]
    async fn test_first_termination_cause_wins() {
        let state = state(10);
        assert!(state.terminate(TerminationCause::StopRequested).await);
        assert!(!state.terminate(TerminationCause::EmptyPage).await);
        assert_eq!(
            state.termination_cause().await,
            Some(TerminationCause::StopRequested)
        );
    }

    #[tokio::test]
    async fn test_page_cap_terminates_run() {
        let state = state(1);
        assert_eq!(state.claim_page().await, Claim::Page(PageId::new(1)));
        assert_eq!(state.claim_page().await, Claim::Exhausted);
        assert!(state.is_terminated());
        assert_eq!(state.claim_page().await, Claim::Terminated);
        assert_eq!(
            state.termination_cause().await,
            Some(TerminationCause::PageLimit)
        );
    }

    #[tokio::test]
    async fn test_analysis_set_tracks_pages() {
        let state = state(10);
        state.begin_analysis(PageId::new(3)).await;
        state.begin_analysis(PageId::new(1)).await;
        assert_eq!(state.in_flight_pages().await.1, vec![1, 3]);

        state.finish_analysis(PageId::new(3)).await;
        assert_eq!(state.in_flight_pages().await.1, vec![1]);
    }
}
