//! Supporting enums carried inside pipeline events

use serde::{Deserialize, Serialize};

/// Why a page fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The extractor answered with a non-success status
    Transport,
    /// The isolation boundary could not be crossed (closed or dropped)
    BoundaryUnreachable,
    /// No reply arrived before the bridge timeout
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "Transport"),
            FailureKind::BoundaryUnreachable => write!(f, "BoundaryUnreachable"),
            FailureKind::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Why a worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerExitReason {
    /// Run was terminated (empty page, page cap, or stop)
    Terminated,
    /// The worker's page failed
    Failed,
}

impl std::fmt::Display for WorkerExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerExitReason::Terminated => write!(f, "Terminated"),
            WorkerExitReason::Failed => write!(f, "Failed"),
        }
    }
}

/// Why a run stopped dispatching fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationCause {
    /// A page came back successful with zero records
    EmptyPage,
    /// The page cap was reached
    PageLimit,
    /// The user asked the run to stop
    StopRequested,
}

impl std::fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationCause::EmptyPage => write!(f, "EmptyPage"),
            TerminationCause::PageLimit => write!(f, "PageLimit"),
            TerminationCause::StopRequested => write!(f, "StopRequested"),
        }
    }
}
