//! The tracking engine.
//!
//! [manager::TrackingManager] owns the only active session, ticks once per
//! interval while a session runs, mirrors the state onto registered UI handles
//! ([observers]) and subscribers ([events]), and writes the elapsed time to a
//! [TaskStore](crate::storage::task_storage::TaskStore) every few ticks.
//! [grouping] and [continuation] decide which sessions stack together and how
//! the next session of a stack is named.

use std::time::Duration;

pub mod continuation;
pub mod events;
pub mod grouping;
pub mod manager;
pub mod observers;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::TrackingManager;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_FLUSH_EVERY_TICKS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingConfig {
    pub tick_interval: Duration,
    /// Elapsed time is written to the store on every n-th tick.
    pub flush_every_ticks: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            flush_every_ticks: DEFAULT_FLUSH_EVERY_TICKS,
        }
    }
}
