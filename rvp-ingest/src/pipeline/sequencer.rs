//! Page identifier issuance

use crate::models::PageId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues page identifiers 1, 2, 3, ... with no gaps and no repeats
///
/// Safe to share between workers: every call observes a distinct value.
/// `next()` returns `None` once `max_pages` identifiers have been handed out.
#[derive(Debug)]
pub struct PageSequencer {
    next: AtomicU64,
    max_pages: u64,
}

impl PageSequencer {
    pub fn new(max_pages: u64) -> Self {
        Self {
            next: AtomicU64::new(PageId::FIRST.get()),
            max_pages,
        }
    }

    /// Claim the next identifier
    pub fn next(&self) -> Option<PageId> {
        let limit = self.max_pages;
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current <= limit {
                    current.checked_add(1)
                } else {
                    None
                }
            })
            .ok()
            .map(PageId::new)
    }

    /// Number of identifiers issued so far
    pub fn issued(&self) -> u64 {
        let next = self.next.load(Ordering::SeqCst);
        next - PageId::FIRST.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    #[test]
    fn test_starts_at_one_and_increments() {
        let sequencer = PageSequencer::new(1000);
        assert_eq!(sequencer.next(), Some(PageId::new(1)));
        assert_eq!(sequencer.next(), Some(PageId::new(2)));
        assert_eq!(sequencer.next(), Some(PageId::new(3)));
        assert_eq!(sequencer.issued(), 3);
    }

    #[test]
    fn test_limit_stops_issuing() {
        let sequencer = PageSequencer::new(2);
        assert_eq!(sequencer.next(), Some(PageId::new(1)));
        assert_eq!(sequencer.next(), Some(PageId::new(2)));
        assert_eq!(sequencer.next(), None);
        assert_eq!(sequencer.next(), None);
        assert_eq!(sequencer.issued(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_get_contiguous_unique_ids() {
        let sequencer = Arc::new(PageSequencer::new(u64::MAX));
        let mut tasks = JoinSet::new();

        for _ in 0..8 {
            let sequencer = Arc::clone(&sequencer);
            tasks.spawn(async move {
                let mut claimed = Vec::new();
                for _ in 0..50 {
                    claimed.push(sequencer.next().unwrap().get());
                    tokio::task::yield_now().await;
                }
                claimed
            });
        }

        let mut all = BTreeSet::new();
        while let Some(result) = tasks.join_next().await {
            let claimed = result.unwrap();
            // Each caller's own sequence is increasing
            assert!(claimed.windows(2).all(|w| w[0] < w[1]));
            for id in claimed {
                assert!(all.insert(id), "duplicate page id {}", id);
            }
        }

        assert_eq!(all.len(), 400);
        assert_eq!(all.iter().next().copied(), Some(1));
        assert_eq!(all.iter().next_back().copied(), Some(400));
    }
}
