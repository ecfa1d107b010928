//! Renderer notification and latest-artifact cache

use super::results::ResultStore;
use crate::services::Renderer;
use chrono::{Duration, NaiveDate, Utc};
use rvp_common::events::{EventBus, PulseEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Time window of the charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartWindow {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    pub duration_in_days: u32,
}

impl ChartWindow {
    /// Window of `duration_in_days` ending at `today`
    ///
    /// `None` when the start of the window is not a representable date.
    pub fn ending(today: NaiveDate, duration_in_days: u32) -> Option<Self> {
        let min_date = today.checked_sub_signed(Duration::days(i64::from(duration_in_days)))?;
        Some(Self {
            min_date,
            max_date: today,
            duration_in_days,
        })
    }

    /// Same window with its end moved to `today` if that is later
    pub fn extended_to(self, today: NaiveDate) -> Self {
        Self {
            max_date: self.max_date.max(today),
            ..self
        }
    }
}

#[derive(Debug, Clone)]
struct Artifact {
    results_total: usize,
    merged: bool,
    body: String,
}

#[derive(Debug, Default)]
struct ChartState {
    window: Option<ChartWindow>,
    latest: Option<Artifact>,
}

/// Re-renders on every result append and keeps the latest artifact
///
/// Renders are serialized, so the cached artifact always reflects at least
/// as many records as any artifact produced before it.
pub struct ChartPublisher {
    renderer: Arc<dyn Renderer>,
    events: EventBus,
    merged: AtomicBool,
    state: Mutex<ChartState>,
}

impl ChartPublisher {
    pub fn new(renderer: Arc<dyn Renderer>, events: EventBus, merged: bool) -> Self {
        Self {
            renderer,
            events,
            merged: AtomicBool::new(merged),
            state: Mutex::new(ChartState::default()),
        }
    }

    pub async fn set_window(&self, window: ChartWindow) {
        self.state.lock().await.window = Some(window);
    }

    pub async fn window(&self) -> Option<ChartWindow> {
        self.state.lock().await.window
    }

    pub fn set_merged(&self, merged: bool) {
        self.merged.store(merged, Ordering::SeqCst);
    }

    pub fn merged(&self) -> bool {
        self.merged.load(Ordering::SeqCst)
    }

    /// Render the current results and publish the artifact
    ///
    /// Returns `false` when no window has been set yet (no run started).
    pub async fn refresh(&self, results: &ResultStore) -> bool {
        let mut state = self.state.lock().await;
        let Some(window) = state.window else {
            return false;
        };
        let window = window.extended_to(Utc::now().date_naive());
        let merged = self.merged();

        let artifact = {
            let records = results.read().await;
            Artifact {
                results_total: records.len(),
                merged,
                body: self.renderer.render(&records, &window, merged),
            }
        };

        debug!(
            results_total = artifact.results_total,
            merged, "Charts rendered"
        );
        self.events.emit_lossy(PulseEvent::ChartsUpdated {
            results_total: artifact.results_total,
            merged,
            artifact: artifact.body.clone(),
            timestamp: Utc::now(),
        });
        state.latest = Some(artifact);
        true
    }

    /// Most recent artifact, if any render has happened
    pub async fn latest(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .latest
            .as_ref()
            .map(|artifact| artifact.body.clone())
    }

    /// Whether the latest artifact was drawn in merged mode
    pub async fn latest_merged(&self) -> Option<bool> {
        self.state
            .lock()
            .await
            .latest
            .as_ref()
            .map(|artifact| artifact.merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawRecord, ScoredRecord};

    struct CountingRenderer;

    impl Renderer for CountingRenderer {
        fn render(&self, results: &[ScoredRecord], _window: &ChartWindow, merged: bool) -> String {
            format!("{}:{}", results.len(), merged)
        }
    }

    fn publisher() -> (ChartPublisher, EventBus) {
        let events = EventBus::new(16);
        (
            ChartPublisher::new(Arc::new(CountingRenderer), events.clone(), false),
            events,
        )
    }

    #[test]
    fn test_window_ending_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let window = ChartWindow::ending(today, 30).unwrap();
        assert_eq!(window.min_date, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
        assert_eq!(window.extended_to(today - Duration::days(3)), window);
    }

    #[test]
    fn test_window_out_of_range_is_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert!(ChartWindow::ending(today, 200_000_000).is_none());
        assert!(ChartWindow::ending(today, u32::MAX).is_none());

        let edge = ChartWindow::ending(NaiveDate::MIN + Duration::days(10), 10).unwrap();
        assert_eq!(edge.min_date, NaiveDate::MIN);
    }

    #[tokio::test]
    async fn test_merge_preference_starts_from_constructor() {
        let charts = ChartPublisher::new(Arc::new(CountingRenderer), EventBus::new(4), true);
        assert!(charts.merged());
        charts.set_merged(false);
        assert!(!charts.merged());
    }

    #[tokio::test]
    async fn test_no_render_without_window() {
        let (charts, _) = publisher();
        assert!(!charts.refresh(&ResultStore::new()).await);
        assert_eq!(charts.latest().await, None);
    }

    #[tokio::test]
    async fn test_refresh_publishes_artifact() {
        let (charts, events) = publisher();
        let mut rx = events.subscribe();
        let results = ResultStore::new();
        results
            .append(vec![ScoredRecord::from_unit_scores(RawRecord::new("a", "b"), 0.1, 0.2)])
            .await;

        charts
            .set_window(ChartWindow::ending(Utc::now().date_naive(), 90).unwrap())
            .await;
        charts.set_merged(true);
        assert!(charts.refresh(&results).await);

        assert_eq!(charts.latest().await.as_deref(), Some("1:true"));
        assert_eq!(charts.latest_merged().await, Some(true));
        match rx.try_recv().unwrap() {
            PulseEvent::ChartsUpdated {
                results_total,
                merged,
                artifact,
                ..
            } => {
                assert_eq!(results_total, 1);
                assert!(merged);
                assert_eq!(artifact, "1:true");
            }
            other => panic!("unexpected event {}", other.event_type()),
        }
    }
}
