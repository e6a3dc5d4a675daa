// File: src/tasks/rate_limit_cleanup.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::cache::RateLimiter;

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

/// Spawns a background task that drops rate-limit keys with no attempt
/// younger than `retention`. Exits when `shutdown_rx` flips to true.
pub fn spawn_rate_limit_cleanup_task(
    limiter: Arc<RateLimiter>,
    every: Duration,
    retention: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.purge_expired(retention);
                    debug!(
                        "rate limiter purge removed {} key(s), {} remain",
                        removed,
                        limiter.tracked_keys()
                    );
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("rate limiter cleanup task stopping");
                        break;
                    }
                }
            }
        }
    })
}
