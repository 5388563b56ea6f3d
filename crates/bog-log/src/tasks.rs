//! Background maintenance tasks.
//!
//! Persistence and integrity run on their own timers, decoupled from the
//! mutation path: many `add` calls within one flush tick produce a single
//! write, and the rebuild pass only runs when something changed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::warn;

use crate::manager::LogManager;

/// Default flush cadence.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default rebuild cadence.
pub const DEFAULT_REBUILD_INTERVAL: Duration = Duration::from_secs(20);

/// Spawns the coalescing persistence timer.
pub fn spawn_flush(log: Arc<LogManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        loop {
            timer.tick().await;
            if let Err(e) = log.flush_if_dirty() {
                warn!("periodic log flush failed: {e}");
            }
        }
    })
}

/// Spawns the periodic integrity/re-sort timer.
pub fn spawn_rebuild(log: Arc<LogManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        loop {
            timer.tick().await;
            if let Err(e) = log.rebuild() {
                warn!("periodic log rebuild failed: {e}");
            }
        }
    })
}
