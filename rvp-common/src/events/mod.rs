//! Event types for the ReviewPulse event system
//!
//! Provides the shared event vocabulary and the EventBus used to fan
//! pipeline progress out to SSE clients, logs and tests.

mod pipeline_types;

pub use pipeline_types::{FailureKind, TerminationCause, WorkerExitReason};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// ReviewPulse event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// Page identifiers travel as plain `u64`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PulseEvent {
    /// A run was started and its workers launched
    RunStarted {
        run_id: Uuid,
        concurrency: usize,
        duration_in_days: u32,
        /// Oldest record date the run keeps
        min_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    /// Stop was requested; in-flight work keeps draining
    RunStopRequested {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A run stopped dispatching new fetches
    RunTerminated {
        run_id: Uuid,
        cause: TerminationCause,
        timestamp: DateTime<Utc>,
    },

    /// Every worker and scoring task of the run has finished
    RunFinished {
        run_id: Uuid,
        /// Session-wide result count at the time the run drained
        results_total: usize,
        /// Unresolved failures left in the run's ledger
        unresolved_failures: usize,
        timestamp: DateTime<Utc>,
    },

    /// The in-flight page sets changed
    ///
    /// Triggers:
    /// - UI: "currently fetching" / "currently analyzing" labels
    InFlightChanged {
        run_id: Uuid,
        fetching: Vec<u64>,
        analyzing: Vec<u64>,
        timestamp: DateTime<Utc>,
    },

    /// A page came back with records and was handed to scoring
    PageFetched {
        run_id: Uuid,
        page: u64,
        records: usize,
        timestamp: DateTime<Utc>,
    },

    /// A page fetch failed and was recorded in the failure ledger
    ///
    /// Triggers:
    /// - UI: error list entry with a retry action
    PageFailed {
        run_id: Uuid,
        page: u64,
        status: i32,
        kind: FailureKind,
        timestamp: DateTime<Utc>,
    },

    /// A worker loop ended
    WorkerExited {
        run_id: Uuid,
        worker: usize,
        reason: WorkerExitReason,
        /// Whether a replacement worker was spawned
        replaced: bool,
        timestamp: DateTime<Utc>,
    },

    /// Scored records for a page were appended to the result store
    ScoringCompleted {
        page: u64,
        appended: usize,
        results_total: usize,
        timestamp: DateTime<Utc>,
    },

    /// Scoring for a page failed; its records were dropped
    ScoringFailed {
        page: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A manual retry for a failed page was dispatched
    FailureRetrying {
        run_id: Uuid,
        page: u64,
        timestamp: DateTime<Utc>,
    },

    /// A failed page was fetched successfully on retry
    FailureResolved {
        run_id: Uuid,
        page: u64,
        timestamp: DateTime<Utc>,
    },

    /// A failed page was dismissed without retrying
    FailureDismissed {
        run_id: Uuid,
        page: u64,
        timestamp: DateTime<Utc>,
    },

    /// The renderer produced a new artifact
    ///
    /// Triggers:
    /// - UI: replace chart container contents with `artifact` verbatim
    ChartsUpdated {
        results_total: usize,
        merged: bool,
        artifact: String,
        timestamp: DateTime<Utc>,
    },
}

impl PulseEvent {
    /// Event name used for SSE `event:` lines and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            PulseEvent::RunStarted { .. } => "RunStarted",
            PulseEvent::RunStopRequested { .. } => "RunStopRequested",
            PulseEvent::RunTerminated { .. } => "RunTerminated",
            PulseEvent::RunFinished { .. } => "RunFinished",
            PulseEvent::InFlightChanged { .. } => "InFlightChanged",
            PulseEvent::PageFetched { .. } => "PageFetched",
            PulseEvent::PageFailed { .. } => "PageFailed",
            PulseEvent::WorkerExited { .. } => "WorkerExited",
            PulseEvent::ScoringCompleted { .. } => "ScoringCompleted",
            PulseEvent::ScoringFailed { .. } => "ScoringFailed",
            PulseEvent::FailureRetrying { .. } => "FailureRetrying",
            PulseEvent::FailureResolved { .. } => "FailureResolved",
            PulseEvent::FailureDismissed { .. } => "FailureDismissed",
            PulseEvent::ChartsUpdated { .. } => "ChartsUpdated",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
///
/// # Examples
///
/// ```
/// use rvp_common::events::{EventBus, PulseEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PulseEvent::FailureDismissed {
///     run_id: uuid::Uuid::new_v4(),
///     page: 2,
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "FailureDismissed");
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PulseEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PulseEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PulseEvent,
    ) -> Result<usize, broadcast::error::SendError<PulseEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PulseEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
