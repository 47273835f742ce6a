//! Read Tracker - persistent per-client read tracking
//! Records which content paths a user has read, in an ordered key-value
//! store, and infers reads from scroll depth

pub mod codec;
pub mod config;
pub mod error;
pub mod host;
pub mod scroll;
pub mod storage;
pub mod throttle;
pub mod tracker;
pub mod utils;

pub use config::{TrackerConfig, TrackerConfigPatch};
pub use error::{Result, StorageError};
pub use host::{HostEnvironment, SimulatedHost, ViewportMetrics};
pub use scroll::{ScrollMonitor, ScrollOptions};
pub use storage::{MemoryEngine, SledEngine, StorageEngine};
pub use throttle::{Throttle, Throttled};
pub use tracker::{ReadRecord, ReadTracker, RecordStream};

/// Install a `tracing` subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // Ignore a subscriber that is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
