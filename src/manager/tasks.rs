// src/manager/tasks.rs
//! Named periodic tasks
//!
//! Each task ticks on its own interval and stops when the engine's
//! cancellation token fires. Ticks take the same engine lock as request
//! handling and never hold it across an `.await`.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Monitoring + QoS
pub const MONITOR_TASK: &str = "monitor";

/// Reservation expiry + history pruning
pub const CLEANUP_TASK: &str = "cleanup";

/// Auto-scaling evaluation
pub const SCALING_TASK: &str = "scaling";

/// Handle of a running periodic task
pub(crate) struct PeriodicTask {
    pub name: &'static str,
    pub handle: JoinHandle<()>,
}

/// Spawn `tick` every `period` until `token` is cancelled
///
/// The first tick fires one full period after spawning.
pub(crate) fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    mut tick: F,
) -> PeriodicTask
where
    F: FnMut() + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Started {} task (every {:?})", name, period);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Stopping {} task", name);
                    break;
                }

                _ = interval.tick() => {
                    tick();
                }
            }
        }
    });

    PeriodicTask { name, handle }
}
