// ticketbot-core/src/repositories/postgres/guild_config.rs
//
// Guild configuration is stored as one JSONB document per guild.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use ticketbot_common::error::Error;
use ticketbot_common::models::GuildConfig;
use ticketbot_common::traits::repository_traits::GuildConfigRepository;

#[derive(Clone)]
pub struct PostgresGuildConfigRepository {
    pool: Pool<Postgres>,
}

impl PostgresGuildConfigRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuildConfigRepository for PostgresGuildConfigRepository {
    async fn get_guild_config(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        let row_opt = sqlx::query("SELECT config FROM guild_configs WHERE guild_id = $1")
            .bind(guild_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(r) = row_opt {
            let Json(mut cfg): Json<GuildConfig> = r.try_get("config")?;
            cfg.guild_id = guild_id.to_string();
            cfg.validate()?;
            return Ok(cfg);
        }

        // First access: store defaults, but never clobber a concurrent insert.
        let defaults = GuildConfig::default_for(guild_id);
        sqlx::query(
            r#"
            INSERT INTO guild_configs (guild_id, config)
            VALUES ($1, $2)
            ON CONFLICT (guild_id) DO NOTHING
            "#,
        )
        .bind(guild_id)
        .bind(Json(&defaults))
        .execute(&self.pool)
        .await?;
        debug!("created default config for guild {}", guild_id);
        Ok(defaults)
    }

    async fn set_guild_config(&self, guild_id: &str, config: &GuildConfig) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO guild_configs (guild_id, config, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (guild_id)
            DO UPDATE SET config = EXCLUDED.config,
                          updated_at = now()
            "#,
        )
        .bind(guild_id)
        .bind(Json(config))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_guild_ids(&self) -> Result<Vec<String>, Error> {
        let rows = sqlx::query("SELECT guild_id FROM guild_configs ORDER BY guild_id")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(r.try_get("guild_id")?);
        }
        Ok(out)
    }
}
