//! Periodic liveness sweeper.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::SessionRegistry;

/// Spawns the process-wide sweeper.
///
/// Every `period` it runs [`SessionRegistry::sweep`]. The first pass happens
/// one full period after start, so a session is pinged no sooner than one
/// period after connecting and evicted no later than two periods after its
/// last acknowledgement. The task ends when `shutdown` is cancelled.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs_f64(), "liveness sweeper started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = registry.sweep().await;
                    debug!(pinged = report.pinged, evicted = report.evicted, "liveness sweep");
                }
            }
        }

        info!("liveness sweeper stopped");
    })
}
