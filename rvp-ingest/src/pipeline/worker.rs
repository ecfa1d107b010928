//! Worker loop and manual retry path
//!
//! Worker states: idle -> rate limiting -> fetching -> (scoring handoff |
//! terminated | failed). A worker loops back to idle after a handoff and
//! exits on the other two outcomes.

use super::endpoints::FetchBridge;
use super::rate_limiter::RateLimiter;
use super::scoring::ScoringStage;
use super::state::{Claim, PipelineState};
use crate::models::{FetchOutcome, PageId, RawRecord};
use chrono::Utc;
use rvp_common::events::{EventBus, FailureKind, PulseEvent, TerminationCause, WorkerExitReason};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a worker or retry task needs, shared per run
#[derive(Clone)]
pub(crate) struct RunHandles {
    pub state: Arc<PipelineState>,
    pub fetch: Arc<FetchBridge>,
    pub scoring: Arc<ScoringStage>,
    pub limiter: RateLimiter,
    pub events: EventBus,
    pub replace_failed_workers: bool,
}

/// A fetch result plus how it failed, if it did
struct Fetched {
    outcome: FetchOutcome,
    kind: FailureKind,
}

/// What the caller of a fetch should do next
enum Routed {
    /// Records handed to scoring
    Handoff,
    /// Successful response with no records
    EndOfPages,
    /// Failure recorded in the ledger
    Failed,
}

/// Spawn one worker loop on the run's task tracker
pub(crate) fn spawn_worker(handles: RunHandles) {
    let worker = handles.state.next_worker_id();
    let tracker = handles.state.tracker().clone();
    tracker.spawn(run_worker(handles, worker));
}

async fn run_worker(handles: RunHandles, worker: usize) {
    let state = &handles.state;
    let run_id = state.run_id();
    debug!(run_id = %run_id, worker, "Worker started");

    let reason = loop {
        // Idle: never consume a page once terminated
        if state.is_terminated() {
            break WorkerExitReason::Terminated;
        }

        debug!(worker, "Rate limiting");
        if !handles.limiter.wait_unless(state.termination_token()).await {
            break WorkerExitReason::Terminated;
        }

        let page = match state.claim_page().await {
            Claim::Page(page) => page,
            Claim::Terminated => break WorkerExitReason::Terminated,
            Claim::Exhausted => {
                info!(run_id = %run_id, worker, "Page limit reached");
                handles.events.emit_lossy(PulseEvent::RunTerminated {
                    run_id,
                    cause: TerminationCause::PageLimit,
                    timestamp: Utc::now(),
                });
                break WorkerExitReason::Terminated;
            }
        };

        debug!(worker, page = %page, "Fetching");
        handles.events.emit_lossy(state.in_flight_event().await);
        let fetched = fetch(&handles, page).await;

        match route(&handles, page, fetched, false).await {
            Routed::Handoff => continue,
            Routed::EndOfPages => {
                if state.terminate(TerminationCause::EmptyPage).await {
                    info!(run_id = %run_id, worker, page = %page, "No more pages; run terminated");
                    handles.events.emit_lossy(PulseEvent::RunTerminated {
                        run_id,
                        cause: TerminationCause::EmptyPage,
                        timestamp: Utc::now(),
                    });
                }
                break WorkerExitReason::Terminated;
            }
            Routed::Failed => break WorkerExitReason::Failed,
        }
    };

    let replaced = reason == WorkerExitReason::Failed
        && handles.replace_failed_workers
        && !state.is_terminated();
    if replaced {
        debug!(worker, "Spawning replacement worker");
        spawn_worker(handles.clone());
    }

    debug!(run_id = %run_id, worker, reason = %reason, replaced, "Worker exited");
    handles.events.emit_lossy(PulseEvent::WorkerExited {
        run_id,
        worker,
        reason,
        replaced,
        timestamp: Utc::now(),
    });
}

/// Re-fetch a failed page outside the sequence
///
/// Skips the sequencer, the rate limiter and the termination check. The
/// ledger entry is removed on success (records or empty) and replaced on
/// another failure. An empty page here does not terminate the run.
pub(crate) async fn retry_page(handles: RunHandles, page: PageId) {
    let state = &handles.state;
    state.mark_fetching(page).await;
    handles.events.emit_lossy(state.in_flight_event().await);

    info!(run_id = %state.run_id(), page = %page, "Retrying failed page");
    let fetched = fetch(&handles, page).await;

    match route(&handles, page, fetched, true).await {
        Routed::Handoff | Routed::EndOfPages => {
            state.failures().resolve(page).await;
            info!(page = %page, "Failed page resolved");
            handles.events.emit_lossy(PulseEvent::FailureResolved {
                run_id: state.run_id(),
                page: page.get(),
                timestamp: Utc::now(),
            });
        }
        Routed::Failed => {
            warn!(page = %page, "Retry failed again");
        }
    }
}

/// Dispatch one fetch through the bridge
///
/// The page must already be in the fetching set; it leaves the set when
/// the bridge resolves. Bridge failures become status `-1`.
async fn fetch(handles: &RunHandles, page: PageId) -> Fetched {
    let params = handles.state.params();
    let fetched = match handles.fetch.request(page, (page, params)).await {
        Ok(outcome) => Fetched {
            outcome,
            kind: FailureKind::Transport,
        },
        Err(e) => {
            warn!(page = %page, error = %e, "Fetch did not cross the boundary");
            let kind = match e {
                super::BridgeError::Timeout(_) => FailureKind::Timeout,
                _ => FailureKind::BoundaryUnreachable,
            };
            Fetched {
                outcome: FetchOutcome::failure(FetchOutcome::UNREACHABLE),
                kind,
            }
        }
    };

    handles.state.finish_fetch(page).await;
    handles.events.emit_lossy(handles.state.in_flight_event().await);
    fetched
}

/// Apply a fetch outcome: hand off records, report end of pages, or
/// record the failure
async fn route(handles: &RunHandles, page: PageId, fetched: Fetched, retry: bool) -> Routed {
    let Fetched { outcome, kind } = fetched;
    let run_id = handles.state.run_id();

    match outcome.records {
        Some(records) if !records.is_empty() => {
            handoff(handles, page, records).await;
            Routed::Handoff
        }
        Some(_) => {
            debug!(page = %page, retry, "Page is empty");
            Routed::EndOfPages
        }
        None => {
            let status = outcome.status;
            warn!(page = %page, status, kind = %kind, retry, "Page fetch failed");
            handles.state.failures().record(page, status, kind).await;
            handles.events.emit_lossy(PulseEvent::PageFailed {
                run_id,
                page: page.get(),
                status,
                kind,
                timestamp: Utc::now(),
            });
            Routed::Failed
        }
    }
}

async fn handoff(handles: &RunHandles, page: PageId, records: Vec<RawRecord>) {
    debug!(page = %page, records = records.len(), "Handing page to scoring");
    handles.events.emit_lossy(PulseEvent::PageFetched {
        run_id: handles.state.run_id(),
        page: page.get(),
        records: records.len(),
        timestamp: Utc::now(),
    });
    handles.scoring.submit(page, records).await;
}
