use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use twilight_gateway::{self as gateway, Config, Intents};
use twilight_http::client::ClientBuilder;

use ticketbot_common::traits::{
    ChannelProvisioner, GuildConfigRepository, TicketRepository, TranscriptRepository,
};
use ticketbot_core::cache::{RateLimitPolicy, RateLimiter};
use ticketbot_core::eventbus::log_relay::spawn_log_relay_task;
use ticketbot_core::eventbus::EventBus;
use ticketbot_core::platforms::discord::commands::register_global_commands;
use ticketbot_core::platforms::discord::{DiscordChannelProvisioner, DiscordRuntime};
use ticketbot_core::repositories::{
    InMemoryStore, PostgresGuildConfigRepository, PostgresTicketRepository,
    PostgresTranscriptRepository,
};
use ticketbot_core::services::{
    BulkActionService, CommandRegistry, Dispatcher, EngineConfig, GuildConfigService, TicketService,
};
use ticketbot_core::tasks::{spawn_rate_limit_cleanup_task, AutoCloseScheduler};
use ticketbot_core::Database;

#[derive(Parser, Debug, Clone)]
#[command(name = "ticketbot")]
#[command(author, version, about = "Ticketbot - support ticket lifecycle bot for Discord")]
struct Args {
    /// Bot token.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    discord_token: String,

    /// Postgres connection URL. Without it everything is kept in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    database_max_connections: u32,

    /// Seconds between inactivity sweeps.
    #[arg(long, env = "AUTO_CLOSE_INTERVAL_SECS", default_value_t = 3600)]
    auto_close_interval_secs: u64,

    /// Attempts allowed per user, guild and command inside the window.
    #[arg(long, env = "RATE_LIMIT_MAX_ATTEMPTS", default_value_t = 5)]
    rate_limit_max_attempts: usize,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 60)]
    rate_limit_window_secs: u64,

    #[arg(long, env = "RATE_LIMIT_PURGE_INTERVAL_SECS", default_value_t = 600)]
    rate_limit_purge_interval_secs: u64,

    #[arg(long, env = "RATE_LIMIT_RETENTION_SECS", default_value_t = 3600)]
    rate_limit_retention_secs: u64,

    /// Seconds before the channel of a closed ticket is deleted.
    #[arg(long, env = "CLOSE_GRACE_SECS", default_value_t = 10)]
    close_grace_secs: u64,

    /// Skip registering the global slash commands on startup.
    #[arg(long, default_value = "false")]
    skip_command_registration: bool,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("ticketbot_core=info".parse().unwrap_or_default())
        .add_directive("ticketbot_server=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

struct Stores {
    tickets: Arc<dyn TicketRepository>,
    configs: Arc<dyn GuildConfigRepository>,
    transcripts: Arc<dyn TranscriptRepository>,
}

async fn open_stores(args: &Args) -> anyhow::Result<Stores> {
    match &args.database_url {
        Some(url) => {
            info!("Using Postgres store");
            let db = Database::new(url, args.database_max_connections)
                .await
                .context("connecting to Postgres")?;
            db.migrate().await.context("running migrations")?;
            Ok(Stores {
                tickets: Arc::new(PostgresTicketRepository::new(db.pool().clone())),
                configs: Arc::new(PostgresGuildConfigRepository::new(db.pool().clone())),
                transcripts: Arc::new(PostgresTranscriptRepository::new(db.pool().clone())),
            })
        }
        None => {
            warn!("DATABASE_URL not set; tickets will not survive a restart");
            let store = Arc::new(InMemoryStore::new());
            Ok(Stores {
                tickets: store.clone(),
                configs: store.clone(),
                transcripts: store,
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("Ticketbot starting. auto_close_interval={}s", args.auto_close_interval_secs);

    if let Err(e) = run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    // 1) Storage
    let stores = open_stores(&args).await?;

    // 2) Discord REST client and the provisioner built on it
    let http = Arc::new(
        ClientBuilder::new()
            .token(args.discord_token.clone())
            .timeout(Duration::from_secs(30))
            .build(),
    );
    let provisioner: Arc<dyn ChannelProvisioner> = Arc::new(DiscordChannelProvisioner::new(http.clone()));

    // 3) Engine, services, dispatcher
    let event_bus = Arc::new(EventBus::new());
    let engine_config = EngineConfig {
        close_grace: Duration::from_secs(args.close_grace_secs),
        ..EngineConfig::default()
    };
    let engine = Arc::new(
        TicketService::new(
            stores.tickets.clone(),
            stores.configs.clone(),
            stores.transcripts.clone(),
            provisioner.clone(),
            engine_config,
        )
        .with_event_bus(event_bus.clone()),
    );
    let bulk = Arc::new(BulkActionService::new(engine.clone()));
    let config_service = Arc::new(
        GuildConfigService::new(stores.configs.clone()).with_provisioner(provisioner.clone()),
    );

    let limiter = Arc::new(RateLimiter::new());
    let policy = RateLimitPolicy {
        max_attempts: args.rate_limit_max_attempts,
        window: Duration::from_secs(args.rate_limit_window_secs),
    };
    let dispatcher = Arc::new(Dispatcher::new(
        CommandRegistry::standard(engine.clone(), bulk.clone(), config_service.clone()),
        limiter.clone(),
        policy,
        stores.configs.clone(),
    ));

    // 4) Background tasks
    let relay_handle =
        spawn_log_relay_task(&event_bus, stores.configs.clone(), provisioner.clone(), 1024).await;
    let cleanup_handle = spawn_rate_limit_cleanup_task(
        limiter.clone(),
        Duration::from_secs(args.rate_limit_purge_interval_secs),
        Duration::from_secs(args.rate_limit_retention_secs),
        event_bus.shutdown_rx.clone(),
    );
    let scheduler = AutoCloseScheduler::new(
        stores.configs.clone(),
        bulk.clone(),
        Duration::from_secs(args.auto_close_interval_secs),
    );
    scheduler.start().await;

    // 5) Gateway
    let application_id = http
        .current_user_application()
        .await
        .context("fetching application")?
        .model()
        .await
        .context("decoding application")?
        .id;
    if args.skip_command_registration {
        info!("Skipping slash command registration");
    } else {
        register_global_commands(&http, application_id).await?;
        info!("Registered global slash commands");
    }

    let runtime = DiscordRuntime::new(
        http.clone(),
        application_id,
        dispatcher,
        engine.clone(),
        config_service,
    );
    let config = Config::new(
        args.discord_token.clone(),
        Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT,
    );
    let shards = gateway::create_recommended(&http, config, |_, b| b.build())
        .await
        .map_err(|e| anyhow::anyhow!("create_recommended error: {e}"))?;

    let mut shard_tasks = Vec::new();
    for shard in shards {
        let runtime = runtime.clone();
        let shutdown_rx = event_bus.shutdown_rx.clone();
        shard_tasks.push(tokio::spawn(runtime.run(shard, shutdown_rx)));
    }
    info!("Started {} shard(s)", shard_tasks.len());

    // 6) Ctrl-C
    let eb_clone = event_bus.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down event bus...");
        eb_clone.shutdown();
    });

    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    // 7) Orderly stop
    info!("Stopping auto-close scheduler...");
    scheduler.stop().await;
    for task in shard_tasks {
        if let Err(e) = task.await {
            error!("shard task ended abnormally: {:?}", e);
        }
    }
    let _ = cleanup_handle.await;
    let _ = relay_handle.await;

    Ok(())
}
