//! Runtime diagnostics endpoint.
//!
//! Mounted by [`base_router`](crate::base_router) at the configured profiler
//! path. Reports what the tokio runtime knows about itself plus how long the
//! router has existed, as JSON.

use std::time::Instant;

use serde::Serialize;
use tokio::runtime::Handle;

/// Snapshot served by the diagnostics endpoint.
#[derive(Debug, Serialize)]
pub struct RuntimeReport {
    pub workers: Option<usize>,
    pub alive_tasks: Option<usize>,
    /// Seconds since `started`; the base router passes its build time.
    pub uptime_secs: u64,
}

impl RuntimeReport {
    /// `workers` and `alive_tasks` are `None` outside a tokio runtime.
    pub fn capture(started: Instant) -> Self {
        let metrics = Handle::try_current().ok().map(|h| h.metrics());
        Self {
            workers: metrics.as_ref().map(|m| m.num_workers()),
            alive_tasks: metrics.as_ref().map(|m| m.num_alive_tasks()),
            uptime_secs: started.elapsed().as_secs(),
        }
    }
}
