//! Background task failing passes abandoned by a crashed process.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::ReconcileService;

/// Spawns the sweeper. It runs once immediately, then every `every`,
/// failing passes still running after `older_than`.
pub fn spawn_sweeper(
    service: Arc<ReconcileService>,
    every: Duration,
    older_than: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(err) = service.sweep_abandoned(older_than).await {
                tracing::error!(error = %err, "stale update sweep failed");
            }
        }
    })
}
