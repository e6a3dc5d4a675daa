// ticketbot-core/src/repositories/postgres/transcripts.rs

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use ticketbot_common::error::Error;
use ticketbot_common::models::{Transcript, TranscriptMessage};
use ticketbot_common::traits::repository_traits::TranscriptRepository;

#[derive(Clone)]
pub struct PostgresTranscriptRepository {
    pool: Pool<Postgres>,
}

impl PostgresTranscriptRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TranscriptRepository for PostgresTranscriptRepository {
    async fn save_transcript(&self, transcript: &Transcript) -> Result<(), Error> {
        let q = r#"
            INSERT INTO ticket_transcripts (guild_id, ticket_id, content, messages, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (guild_id, ticket_id)
            DO UPDATE SET content = EXCLUDED.content,
                          messages = EXCLUDED.messages,
                          created_at = EXCLUDED.created_at
        "#;
        sqlx::query(q)
            .bind(&transcript.guild_id)
            .bind(&transcript.ticket_id)
            .bind(&transcript.text)
            .bind(Json(&transcript.messages))
            .bind(transcript.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_transcript(&self, guild_id: &str, ticket_id: &str) -> Result<Option<Transcript>, Error> {
        let q = r#"
            SELECT guild_id, ticket_id, content, messages, created_at
            FROM ticket_transcripts
            WHERE guild_id = $1 AND ticket_id = $2
        "#;
        let row_opt = sqlx::query(q)
            .bind(guild_id)
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(r) = row_opt {
            let Json(messages): Json<Vec<TranscriptMessage>> = r.try_get("messages")?;
            Ok(Some(Transcript {
                guild_id:   r.try_get("guild_id")?,
                ticket_id:  r.try_get("ticket_id")?,
                text:       r.try_get("content")?,
                messages,
                created_at: r.try_get("created_at")?,
            }))
        } else {
            Ok(None)
        }
    }
}
