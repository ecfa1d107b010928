//! Failed pages awaiting a manual decision
//!
//! Entries are created when a fetch fails and leave the ledger when the
//! page is retried successfully or dismissed. A retry that fails again
//! replaces the entry with the new status. There is no automatic retry.

use super::PipelineError;
use crate::models::PageId;
use chrono::{DateTime, Utc};
use rvp_common::events::FailureKind;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// One unresolved page failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub page: PageId,
    /// Status reported by the extractor, `-1` when no response came back
    pub status: i32,
    pub kind: FailureKind,
    /// Failed fetch attempts so far, original attempt included
    pub attempts: u32,
    /// A manual retry is outstanding
    pub retrying: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FailureLedger {
    entries: RwLock<BTreeMap<PageId, FailureRecord>>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed fetch of `page`
    ///
    /// A page already in the ledger (failed retry) keeps its attempt count,
    /// incremented, and loses its `retrying` mark.
    pub async fn record(&self, page: PageId, status: i32, kind: FailureKind) -> FailureRecord {
        let mut entries = self.entries.write().await;
        let attempts = entries.get(&page).map_or(1, |existing| existing.attempts + 1);
        let record = FailureRecord {
            page,
            status,
            kind,
            attempts,
            retrying: false,
            recorded_at: Utc::now(),
        };
        entries.insert(page, record.clone());
        record
    }

    /// Mark `page` as being retried
    pub async fn begin_retry(&self, page: PageId) -> Result<FailureRecord, PipelineError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&page)
            .ok_or(PipelineError::UnknownFailure(page))?;
        if entry.retrying {
            return Err(PipelineError::RetryInFlight(page));
        }
        entry.retrying = true;
        Ok(entry.clone())
    }

    /// Remove `page` after a successful retry
    pub async fn resolve(&self, page: PageId) -> Option<FailureRecord> {
        self.entries.write().await.remove(&page)
    }

    /// Drop `page` without retrying
    pub async fn dismiss(&self, page: PageId) -> Result<FailureRecord, PipelineError> {
        let mut entries = self.entries.write().await;
        match entries.get(&page) {
            None => Err(PipelineError::UnknownFailure(page)),
            Some(entry) if entry.retrying => Err(PipelineError::RetryInFlight(page)),
            Some(_) => entries
                .remove(&page)
                .ok_or(PipelineError::UnknownFailure(page)),
        }
    }

    pub async fn get(&self, page: PageId) -> Option<FailureRecord> {
        self.entries.read().await.get(&page).cloned()
    }

    /// All entries ordered by page
    pub async fn list(&self) -> Vec<FailureRecord> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_list() {
        let ledger = FailureLedger::new();
        ledger.record(PageId::new(5), 503, FailureKind::Transport).await;
        ledger.record(PageId::new(2), 429, FailureKind::Transport).await;

        let pages: Vec<u64> = ledger.list().await.iter().map(|r| r.page.get()).collect();
        assert_eq!(pages, vec![2, 5]);
        assert_eq!(ledger.get(PageId::new(2)).await.unwrap().status, 429);
    }

    #[tokio::test]
    async fn test_retry_guard() {
        let ledger = FailureLedger::new();
        let page = PageId::new(2);

        assert_eq!(
            ledger.begin_retry(page).await,
            Err(PipelineError::UnknownFailure(page))
        );

        ledger.record(page, 429, FailureKind::Transport).await;
        let entry = ledger.begin_retry(page).await.unwrap();
        assert!(entry.retrying);

        assert_eq!(
            ledger.begin_retry(page).await,
            Err(PipelineError::RetryInFlight(page))
        );
        assert_eq!(
            ledger.dismiss(page).await,
            Err(PipelineError::RetryInFlight(page))
        );
    }

    #[tokio::test]
    async fn test_failed_retry_replaces_entry() {
        let ledger = FailureLedger::new();
        let page = PageId::new(4);

        ledger.record(page, 429, FailureKind::Transport).await;
        ledger.begin_retry(page).await.unwrap();
        let updated = ledger.record(page, -1, FailureKind::Timeout).await;

        assert_eq!(updated.attempts, 2);
        assert!(!updated.retrying);
        assert_eq!(updated.status, -1);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_and_dismiss_remove_entry() {
        let ledger = FailureLedger::new();
        ledger.record(PageId::new(1), 500, FailureKind::Transport).await;
        ledger.record(PageId::new(2), 500, FailureKind::Transport).await;

        assert!(ledger.resolve(PageId::new(1)).await.is_some());
        assert!(ledger.dismiss(PageId::new(2)).await.is_ok());
        assert!(ledger.is_empty().await);

        assert_eq!(
            ledger.dismiss(PageId::new(2)).await,
            Err(PipelineError::UnknownFailure(PageId::new(2)))
        );
    }
}
