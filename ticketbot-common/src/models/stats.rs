use std::collections::BTreeMap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ticket::{Ticket, TicketStatus};

/// Aggregate counters shown by `/ticket stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStats {
    pub total: u64,
    pub open: u64,
    pub closed: u64,
    pub claimed: u64,
    pub today: u64,
    pub week: u64,
    /// Mean minutes from creation to first claim, over claimed tickets.
    pub avg_response_minutes: u64,
    pub by_type: BTreeMap<String, u64>,
}

impl TicketStats {
    pub fn from_tickets(tickets: &[Ticket], now: DateTime<Utc>) -> Self {
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        let week_ago = now - Duration::days(7);

        let mut stats = TicketStats::default();
        let mut response_total_secs: i64 = 0;
        let mut responded: i64 = 0;

        for t in tickets {
            stats.total += 1;
            match t.status {
                TicketStatus::Open => stats.open += 1,
                TicketStatus::Closed => stats.closed += 1,
            }
            if t.claimed_by.is_some() {
                stats.claimed += 1;
            }
            if let Some(claimed_at) = t.claimed_at {
                response_total_secs += claimed_at.signed_duration_since(t.created_at).num_seconds().max(0);
                responded += 1;
            }
            if t.created_at >= start_of_day {
                stats.today += 1;
            }
            if t.created_at >= week_ago {
                stats.week += 1;
            }
            *stats.by_type.entry(t.ticket_type.clone()).or_insert(0) += 1;
        }

        if responded > 0 {
            let avg_secs = response_total_secs as f64 / responded as f64;
            stats.avg_response_minutes = (avg_secs / 60.0).round() as u64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_status_claims_and_types() {
        let now = Utc::now();
        let mut a = Ticket::new_open("TKT-0001", "g", "u1", "billing", None, None, now);
        a.claimed_by = Some("s".into());
        a.claimed_at = Some(now + Duration::minutes(30));
        let mut b = Ticket::new_open("TKT-0002", "g", "u2", "general", None, None, now - Duration::days(10));
        b.status = TicketStatus::Closed;
        b.closed_at = Some(now);

        let stats = TicketStats::from_tickets(&[a, b], now);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.week, 1);
        assert_eq!(stats.avg_response_minutes, 30);
        assert_eq!(stats.by_type.get("billing"), Some(&1));
    }

    #[test]
    fn empty_set_has_zero_average() {
        let stats = TicketStats::from_tickets(&[], Utc::now());
        assert_eq!(stats, TicketStats::default());
    }
}
