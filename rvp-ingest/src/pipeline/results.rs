//! Session-wide accumulated results

use crate::models::ScoredRecord;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Append-only list of scored records
///
/// Owned by the controller rather than a run, so results survive a
/// stop/start within the same process. Append order is scoring-completion
/// order; records of one page stay contiguous and in page order.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: RwLock<Vec<ScoredRecord>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one page's records, returning the new total
    pub async fn append(&self, page_records: Vec<ScoredRecord>) -> usize {
        let mut records = self.records.write().await;
        records.extend(page_records);
        records.len()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Read access to every record, for rendering without a copy
    pub async fn read(&self) -> RwLockReadGuard<'_, Vec<ScoredRecord>> {
        self.records.read().await
    }

    pub async fn snapshot(&self) -> Vec<ScoredRecord> {
        self.records.read().await.clone()
    }
}
