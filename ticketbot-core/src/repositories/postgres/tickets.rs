// ticketbot-core/src/repositories/postgres/tickets.rs

use std::str::FromStr;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use ticketbot_common::error::Error;
use ticketbot_common::models::{Ticket, TicketFilter, TicketStatus};
use ticketbot_common::traits::repository_traits::TicketRepository;

const TICKET_COLUMNS: &str = r#"
    guild_id, ticket_id, author_id, channel_id, status,
    claimed_by, claimed_at, created_at, last_activity_at,
    closed_at, closed_by, close_reason, reopened_at, reopened_by,
    ticket_type, reason, description
"#;

#[derive(Clone)]
pub struct PostgresTicketRepository {
    pool: Pool<Postgres>,
}

impl PostgresTicketRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_ticket(r: &PgRow) -> Result<Ticket, Error> {
    let status: String = r.try_get("status")?;
    Ok(Ticket {
        ticket_id:        r.try_get("ticket_id")?,
        guild_id:         r.try_get("guild_id")?,
        author_id:        r.try_get("author_id")?,
        channel_id:       r.try_get("channel_id")?,
        status:           TicketStatus::from_str(&status)?,
        claimed_by:       r.try_get("claimed_by")?,
        claimed_at:       r.try_get("claimed_at")?,
        created_at:       r.try_get("created_at")?,
        last_activity_at: r.try_get("last_activity_at")?,
        closed_at:        r.try_get("closed_at")?,
        closed_by:        r.try_get("closed_by")?,
        close_reason:     r.try_get("close_reason")?,
        reopened_at:      r.try_get("reopened_at")?,
        reopened_by:      r.try_get("reopened_by")?,
        ticket_type:      r.try_get("ticket_type")?,
        reason:           r.try_get("reason")?,
        description:      r.try_get("description")?,
    })
}

#[async_trait]
impl TicketRepository for PostgresTicketRepository {
    async fn get_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<Option<Ticket>, Error> {
        let q = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE guild_id = $1 AND ticket_id = $2");
        let row_opt = sqlx::query(&q)
            .bind(guild_id)
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;
        row_opt.as_ref().map(row_to_ticket).transpose()
    }

    async fn get_ticket_by_channel(&self, guild_id: &str, channel_id: &str) -> Result<Option<Ticket>, Error> {
        let q = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE guild_id = $1 AND channel_id = $2");
        let row_opt = sqlx::query(&q)
            .bind(guild_id)
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await?;
        row_opt.as_ref().map(row_to_ticket).transpose()
    }

    async fn save_ticket(&self, guild_id: &str, ticket: &Ticket) -> Result<(), Error> {
        let q = r#"
            INSERT INTO tickets (
                guild_id, ticket_id, author_id, channel_id, status,
                claimed_by, claimed_at, created_at, last_activity_at,
                closed_at, closed_by, close_reason, reopened_at, reopened_by,
                ticket_type, reason, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (guild_id, ticket_id)
            DO UPDATE SET
                channel_id       = EXCLUDED.channel_id,
                status           = EXCLUDED.status,
                claimed_by       = EXCLUDED.claimed_by,
                claimed_at       = EXCLUDED.claimed_at,
                last_activity_at = EXCLUDED.last_activity_at,
                closed_at        = EXCLUDED.closed_at,
                closed_by        = EXCLUDED.closed_by,
                close_reason     = EXCLUDED.close_reason,
                reopened_at      = EXCLUDED.reopened_at,
                reopened_by      = EXCLUDED.reopened_by
        "#;
        sqlx::query(q)
            .bind(guild_id)
            .bind(&ticket.ticket_id)
            .bind(&ticket.author_id)
            .bind(&ticket.channel_id)
            .bind(ticket.status.as_str())
            .bind(&ticket.claimed_by)
            .bind(ticket.claimed_at)
            .bind(ticket.created_at)
            .bind(ticket.last_activity_at)
            .bind(ticket.closed_at)
            .bind(&ticket.closed_by)
            .bind(&ticket.close_reason)
            .bind(ticket.reopened_at)
            .bind(&ticket.reopened_by)
            .bind(&ticket.ticket_type)
            .bind(&ticket.reason)
            .bind(&ticket.description)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM tickets WHERE guild_id = $1 AND ticket_id = $2")
            .bind(guild_id)
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_all_tickets(&self, guild_id: &str, filter: &TicketFilter) -> Result<Vec<Ticket>, Error> {
        let q = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets
             WHERE guild_id = $1
               AND ($2::TEXT IS NULL OR status = $2)
               AND ($3::TEXT IS NULL OR author_id = $3)
             ORDER BY created_at"
        );
        let rows = sqlx::query(&q)
            .bind(guild_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.author_id.as_deref())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_ticket).collect()
    }

    async fn next_ticket_sequence(&self, guild_id: &str) -> Result<u64, Error> {
        let q = r#"
            INSERT INTO ticket_counters (guild_id, last_value)
            VALUES ($1, 1)
            ON CONFLICT (guild_id)
            DO UPDATE SET last_value = ticket_counters.last_value + 1
            RETURNING last_value
        "#;
        let row = sqlx::query(q)
            .bind(guild_id)
            .fetch_one(&self.pool)
            .await?;
        let value: i64 = row.try_get("last_value")?;
        u64::try_from(value).map_err(|_| Error::Parse(format!("negative ticket counter {value}")))
    }
}
