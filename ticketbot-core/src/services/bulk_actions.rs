// File: src/services/bulk_actions.rs

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use ticketbot_common::error::Error;
use ticketbot_common::models::{TicketFilter, TicketStatus, AUTO_CLOSE_ACTOR};

use crate::services::ticket_service::TicketService;

pub const BULK_CLOSE_REASON: &str = "bulk closure";

/// Outcome counts for one bulk operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkReport {
    fn record<T>(&mut self, ticket_id: &str, what: &str, result: &Result<T, Error>) {
        self.attempted += 1;
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => {
                self.failed += 1;
                error!("{} failed for ticket {}: {:?}", what, ticket_id, e);
            }
        }
    }

    pub fn merge(&mut self, other: BulkReport) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Guild-wide maintenance built on the engine's close path.
/// A failing ticket is logged and counted; the loop always continues.
pub struct BulkActionService {
    tickets: Arc<TicketService>,
}

impl BulkActionService {
    pub fn new(tickets: Arc<TicketService>) -> Self {
        Self { tickets }
    }

    pub fn engine(&self) -> &Arc<TicketService> {
        &self.tickets
    }

    pub async fn close_all_open(&self, guild_id: &str, actor_id: &str) -> Result<BulkReport, Error> {
        let open = self
            .tickets
            .list_tickets(guild_id, &TicketFilter::with_status(TicketStatus::Open))
            .await?;
        let mode = self
            .tickets
            .bulk_close_mode("🔒 This ticket was closed automatically (bulk closure)".to_string());

        let mut report = BulkReport::default();
        for ticket in open {
            // No outer timeout; the close may already be committed when it fires.
            // Channel calls inside are bounded by `side_effect_timeout`.
            let result = self
                .tickets
                .close_by_id(guild_id, &ticket.ticket_id, actor_id, BULK_CLOSE_REASON, &mode)
                .await;
            report.record(&ticket.ticket_id, "bulk close", &result);
        }

        info!(
            "bulk close in guild {} by {}: {}/{} closed",
            guild_id, actor_id, report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// Removes every closed ticket record. Channels are not touched.
    pub async fn delete_closed(&self, guild_id: &str) -> Result<BulkReport, Error> {
        let closed = self
            .tickets
            .list_tickets(guild_id, &TicketFilter::with_status(TicketStatus::Closed))
            .await?;

        let mut report = BulkReport::default();
        for ticket in closed {
            let result = self.tickets.purge_closed_ticket(guild_id, &ticket.ticket_id).await;
            report.record(&ticket.ticket_id, "delete closed", &result);
        }

        info!("deleted {}/{} closed tickets in guild {}", report.succeeded, report.attempted, guild_id);
        Ok(report)
    }

    /// Closes every open ticket idle for at least `threshold_days`, on behalf of `actor_id`.
    pub async fn close_inactive(&self, guild_id: &str, threshold_days: u32, actor_id: &str) -> Result<BulkReport, Error> {
        self.close_inactive_at(guild_id, threshold_days, actor_id, Utc::now(), false)
            .await
    }

    /// The scheduler's variant: `AUTO_CLOSE` actor and the auto-close grace.
    pub async fn auto_close_inactive(&self, guild_id: &str, threshold_days: u32) -> Result<BulkReport, Error> {
        self.close_inactive_at(guild_id, threshold_days, AUTO_CLOSE_ACTOR, Utc::now(), true)
            .await
    }

    pub async fn close_inactive_at(
        &self,
        guild_id: &str,
        threshold_days: u32,
        actor_id: &str,
        now: DateTime<Utc>,
        automatic: bool,
    ) -> Result<BulkReport, Error> {
        let open = self
            .tickets
            .list_tickets(guild_id, &TicketFilter::with_status(TicketStatus::Open))
            .await?;

        let mut report = BulkReport::default();
        for ticket in open {
            // Cheap pre-filter on the snapshot; the engine re-checks under the lock.
            let days = ticket.inactive_days(now);
            if days < i64::from(threshold_days) {
                continue;
            }
            let mode = if automatic {
                self.tickets.auto_close_mode()
            } else {
                self.tickets.bulk_close_mode(format!(
                    "🔒 Closed for inactivity ({days} days without activity)"
                ))
            };

            let result = match self
                .tickets
                .close_if_inactive(guild_id, &ticket.ticket_id, actor_id, threshold_days, now, &mode)
                .await
            {
                Ok(Some(_)) => Ok(()),
                // Activity or another close got there first.
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            report.record(&ticket.ticket_id, "inactivity close", &result);
        }

        if report.attempted > 0 {
            info!(
                "closed {}/{} inactive tickets in guild {} (threshold {} days, actor {})",
                report.succeeded, report.attempted, guild_id, threshold_days, actor_id
            );
        }
        Ok(report)
    }
}
