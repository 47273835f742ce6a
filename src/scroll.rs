//! Scroll monitor
//! Marks the current path as read once the viewport has scrolled far enough
//! down the document

use crate::host::HostEnvironment;
use crate::throttle::Throttle;
use crate::tracker::ReadTracker;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

pub const DEFAULT_SCROLL_THRESHOLD: f64 = 0.8;
pub const DEFAULT_SCROLL_WINDOW: Duration = Duration::from_millis(2000);

/// Scroll tracking parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollOptions {
    /// Fraction of the document (0..=1) the viewport bottom must reach
    pub threshold: f64,
    /// Minimum time between scroll checks
    pub window: Duration,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCROLL_THRESHOLD,
            window: DEFAULT_SCROLL_WINDOW,
        }
    }
}

/// Watches the host's scroll signal on behalf of a tracker
pub struct ScrollMonitor;

impl ScrollMonitor {
    /// Register a listener on the host's scroll signal. Every call registers
    /// an independent listener with its own throttle. The listener runs on
    /// the current tokio runtime until the scroll signal closes.
    ///
    /// The listener holds the tracker weakly: once every tracker handle is
    /// gone, checks are skipped and the host (with its signal) can drop.
    pub fn start(tracker: &ReadTracker, options: ScrollOptions) {
        let mut scroll_rx = tracker.host().subscribe_scroll();
        let tracker = tracker.downgrade();
        let threshold = options.threshold;

        let check = Throttle::wrap(
            move |()| {
                let Some(tracker) = tracker.upgrade() else {
                    return;
                };
                let fraction = tracker.host().viewport().scroll_fraction();
                tracing::trace!(fraction, threshold, "Scroll check");
                if fraction >= threshold {
                    tokio::spawn(async move {
                        if let Err(e) = tracker.mark_as_read(None).await {
                            tracing::warn!("Failed to record scroll read: {}", e);
                        }
                    });
                }
            },
            options.window,
        );

        tokio::spawn(async move {
            loop {
                match scroll_rx.recv().await {
                    Ok(()) => check.call(()),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::trace!(skipped, "Scroll listener lagged");
                        check.call(());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Scroll signal closed, listener stopped");
        });
    }
}

impl ReadTracker {
    /// Automatically mark the current path as read when the user scrolls
    /// past `options.threshold` of the document
    pub fn track_scroll(&self, options: ScrollOptions) {
        ScrollMonitor::start(self, options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfigPatch;
    use crate::host::{SimulatedHost, ViewportMetrics};
    use crate::storage::MemoryEngine;
    use std::sync::Arc;

    fn setup() -> (ReadTracker, Arc<SimulatedHost>) {
        let host = Arc::new(SimulatedHost::new("/article"));
        host.set_viewport(ViewportMetrics {
            scroll_offset: 0.0,
            viewport_height: 200.0,
            document_height: 1000.0,
        });
        let tracker = ReadTracker::new(
            Arc::new(MemoryEngine::new()),
            host.clone(),
            TrackerConfigPatch::default(),
        );
        (tracker, host)
    }

    /// Let spawned listener and write tasks run
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_when_threshold_crossed() {
        let (tracker, host) = setup();
        tracker.track_scroll(ScrollOptions::default());

        host.scroll_to(100.0);
        settle().await;
        assert_eq!(tracker.is_read(None).await.unwrap(), None);

        tokio::time::sleep(Duration::from_secs(3)).await;
        host.scroll_to(700.0);
        settle().await;
        assert!(tracker.is_read(None).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_check_reads_latest_position() {
        let (tracker, host) = setup();
        tracker.track_scroll(ScrollOptions::default());

        host.scroll_to(100.0);
        settle().await;
        // Inside the window: deferred, not dropped
        host.scroll_to(650.0);
        settle().await;
        assert_eq!(tracker.is_read(None).await.unwrap(), None);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(tracker.is_read(Some("/article")).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_threshold_never_marks() {
        let (tracker, host) = setup();
        tracker.track_scroll(ScrollOptions {
            threshold: 0.95,
            window: Duration::from_millis(100),
        });

        for offset in [100.0, 300.0, 500.0, 700.0] {
            host.scroll_to(offset);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(tracker.is_read(None).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_height_document_is_noop() {
        let (tracker, host) = setup();
        host.set_viewport(ViewportMetrics::default());
        tracker.track_scroll(ScrollOptions::default());

        host.scroll_to(0.0);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(tracker.is_read(None).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uses_path_at_check_time() {
        let (tracker, host) = setup();
        tracker.track_scroll(ScrollOptions::default());

        host.navigate("/next");
        host.scroll_to(900.0);
        settle().await;
        assert!(tracker.is_read(Some("/next")).await.unwrap().is_some());
        assert_eq!(tracker.is_read(Some("/article")).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_start_registers_a_listener() {
        let (tracker, host) = setup();
        tracker.track_scroll(ScrollOptions::default());
        tracker.track_scroll(ScrollOptions::default());
        assert_eq!(host.listener_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_ends_with_tracker_and_host() {
        let (tracker, host) = setup();
        tracker.track_scroll(ScrollOptions::default());
        host.scroll_to(100.0);
        settle().await;

        let weak_host = Arc::downgrade(&host);
        drop(tracker);
        drop(host);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(weak_host.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_after_tracker_dropped_is_noop() {
        let engine = Arc::new(MemoryEngine::new());
        let (_, host) = setup();
        let tracker = ReadTracker::new(engine.clone(), host.clone(), TrackerConfigPatch::default());
        tracker.track_scroll(ScrollOptions::default());
        drop(tracker);

        // The host outlives the tracker; the listener keeps running but skips checks
        host.scroll_to(900.0);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(host.listener_count(), 1);

        let other = ReadTracker::new(engine, host.clone(), TrackerConfigPatch::default());
        assert_eq!(other.is_read(Some("/article")).await.unwrap(), None);
    }
}
