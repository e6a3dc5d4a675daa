// File: src/tasks/auto_close.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use ticketbot_common::error::Error;
use ticketbot_common::traits::GuildConfigRepository;

use crate::services::bulk_actions::BulkActionService;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub guilds_scanned: usize,
    pub guilds_failed: usize,
    pub tickets_closed: usize,
}

struct Running {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// Periodically closes stale tickets in every guild with auto-close enabled.
pub struct AutoCloseScheduler {
    configs: Arc<dyn GuildConfigRepository>,
    bulk: Arc<BulkActionService>,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl AutoCloseScheduler {
    pub fn new(
        configs: Arc<dyn GuildConfigRepository>,
        bulk: Arc<BulkActionService>,
        period: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            configs,
            bulk,
            period,
            running: Mutex::new(None),
        })
    }

    /// One pass over every known guild. Per-guild failures are logged and
    /// counted; they never stop the pass.
    pub async fn run_once(&self) -> Result<SweepReport, Error> {
        let guild_ids = self.configs.list_guild_ids().await?;
        let mut report = SweepReport::default();

        for guild_id in guild_ids {
            report.guilds_scanned += 1;
            match self.sweep_guild(&guild_id).await {
                Ok(closed) => report.tickets_closed += closed,
                Err(e) => {
                    report.guilds_failed += 1;
                    error!("auto-close sweep failed for guild {}: {:?}", guild_id, e);
                }
            }
        }

        let pruned = self.bulk.engine().prune_locks();
        debug!("auto-close sweep done: {:?} (pruned {} idle locks)", report, pruned);
        if report.tickets_closed > 0 {
            info!(
                "auto-close closed {} ticket(s) across {} guild(s)",
                report.tickets_closed, report.guilds_scanned
            );
        }
        Ok(report)
    }

    async fn sweep_guild(&self, guild_id: &str) -> Result<usize, Error> {
        let cfg = self.configs.get_guild_config(guild_id).await?;
        if !cfg.features.auto_close {
            return Ok(0);
        }
        let report = self.bulk.auto_close_inactive(guild_id, cfg.auto_close_days).await?;
        if report.failed > 0 {
            warn!("{} ticket(s) in guild {} could not be auto-closed", report.failed, guild_id);
        }
        Ok(report.succeeded)
    }

    /// Starts the periodic loop. The first pass runs one period from now.
    /// Calling `start` twice is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("auto-close scheduler already running");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = this.run_once().await {
                            error!("auto-close sweep could not list guilds: {:?}", e);
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("auto-close scheduler stopped");
        });

        info!("auto-close scheduler started (every {:?})", period);
        *running = Some(Running { handle, stop_tx });
    }

    /// Signals the loop and waits for it. A sweep in progress finishes first.
    pub async fn stop(&self) {
        let taken = self.running.lock().await.take();
        if let Some(Running { handle, stop_tx }) = taken {
            let _ = stop_tx.send(true);
            if let Err(e) = handle.await {
                error!("auto-close task ended abnormally: {:?}", e);
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}
