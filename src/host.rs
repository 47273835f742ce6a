//! Host environment capability
//! Current location, viewport geometry and the scroll signal, injected into
//! the tracker instead of read from globals

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// Capacity of the simulated scroll signal. Lagging listeners skip ahead.
const SCROLL_CHANNEL_CAPACITY: usize = 64;

/// Viewport geometry at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewportMetrics {
    /// Vertical scroll offset of the viewport's top edge
    pub scroll_offset: f64,
    /// Height of the visible viewport
    pub viewport_height: f64,
    /// Total scrollable height of the document
    pub document_height: f64,
}

impl ViewportMetrics {
    /// Fraction of the document reached by the bottom of the viewport.
    /// Degenerate geometry (zero document height) yields NaN or infinity.
    pub fn scroll_fraction(&self) -> f64 {
        (self.scroll_offset + self.viewport_height) / self.document_height
    }
}

/// What the tracker needs from the page it runs in
pub trait HostEnvironment: Send + Sync {
    /// Path of the current location, used when callers pass no path
    fn current_path(&self) -> String;

    fn viewport(&self) -> ViewportMetrics;

    /// Register a passive listener for scroll position changes
    fn subscribe_scroll(&self) -> broadcast::Receiver<()>;
}

/// Host driven programmatically, for tests and headless use
pub struct SimulatedHost {
    path: RwLock<String>,
    viewport: RwLock<ViewportMetrics>,
    scroll_tx: broadcast::Sender<()>,
}

impl SimulatedHost {
    pub fn new(path: impl Into<String>) -> Self {
        let (scroll_tx, _) = broadcast::channel(SCROLL_CHANNEL_CAPACITY);
        Self {
            path: RwLock::new(path.into()),
            viewport: RwLock::new(ViewportMetrics::default()),
            scroll_tx,
        }
    }

    /// Navigate to a new path
    pub fn navigate(&self, path: impl Into<String>) {
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = path.into();
    }

    /// Replace the viewport geometry without emitting a scroll event
    pub fn set_viewport(&self, viewport: ViewportMetrics) {
        *self.viewport.write().unwrap_or_else(PoisonError::into_inner) = viewport;
    }

    /// Move the viewport and emit a scroll event
    pub fn scroll_to(&self, offset: f64) {
        self.viewport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .scroll_offset = offset;
        // No listeners is fine
        let _ = self.scroll_tx.send(());
    }

    /// Number of registered scroll listeners
    pub fn listener_count(&self) -> usize {
        self.scroll_tx.receiver_count()
    }
}

impl HostEnvironment for SimulatedHost {
    fn current_path(&self) -> String {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn viewport(&self) -> ViewportMetrics {
        *self.viewport.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe_scroll(&self) -> broadcast::Receiver<()> {
        self.scroll_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_fraction() {
        let metrics = ViewportMetrics {
            scroll_offset: 600.0,
            viewport_height: 200.0,
            document_height: 1000.0,
        };
        assert!((metrics.scroll_fraction() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_degenerate_document_height() {
        assert!(ViewportMetrics::default().scroll_fraction().is_nan());

        let metrics = ViewportMetrics {
            scroll_offset: 0.0,
            viewport_height: 100.0,
            document_height: 0.0,
        };
        assert!(metrics.scroll_fraction().is_infinite());
    }

    #[tokio::test]
    async fn test_simulated_host() {
        let host = SimulatedHost::new("/start");
        let mut rx = host.subscribe_scroll();
        assert_eq!(host.listener_count(), 1);

        host.set_viewport(ViewportMetrics {
            scroll_offset: 0.0,
            viewport_height: 100.0,
            document_height: 500.0,
        });
        host.scroll_to(250.0);
        rx.recv().await.unwrap();
        assert_eq!(host.viewport().scroll_offset, 250.0);

        host.navigate("/next");
        assert_eq!(host.current_path(), "/next");
    }
}
