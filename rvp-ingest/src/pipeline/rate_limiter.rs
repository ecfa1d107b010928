//! Per-fetch politeness delay

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed delay applied once before every fetch dispatch
///
/// Each worker waits the full delay on its own; the limiter does not
/// serialize workers against each other.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    delay: Duration,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Suspend the caller for the configured delay
    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tracing::debug!("Rate limiting: waiting {:?}", self.delay);
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Wait for the delay unless `cancel` fires first
    ///
    /// Returns `false` when the wait was cut short by cancellation.
    pub async fn wait_unless(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.wait() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_wait_sleeps_for_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        let elapsed = start.elapsed();

        // Two calls, each a full delay
        assert!(elapsed >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_zero_delay_returns_immediately() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_cancellation_cuts_wait_short() {
        let limiter = RateLimiter::new(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.wait_unless(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let completed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should end promptly")
            .unwrap();
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_skips_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!limiter.wait_unless(&cancel).await);
    }
}
