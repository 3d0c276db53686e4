//! Game top-up gateway server.
//!
//! Confirms payments, debits customer wallets, and fulfills game top-up
//! orders through the G2Bulk API.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use gtop_core::events::order_event_channel;
use gtop_core::framework::DatabaseProcessor;
use gtop_core::processors::{NotificationSender, TelegramNotifier};
use gtop_core::provider::{FulfillmentProvider, G2BulkClient};
use gtop_core::repository::Repository;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Game top-up gateway
#[derive(Parser, Debug)]
#[command(name = "gtop-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./gtop-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "GTOP_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting gtop-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    let provider_config = loaded_config.provider.clone();
    let verification = loaded_config.verification;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Convert to shared config with separate locks for each section
    let shared_config = loaded_config.into_shared();

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let repo: Arc<dyn Repository> = Arc::new(DatabaseProcessor::new(db_pool.clone()));
    let provider: Arc<dyn FulfillmentProvider> = Arc::new(G2BulkClient::new(&provider_config)?);
    let notifier = Arc::new(TelegramNotifier::new(
        shared_config.notifications.clone(),
        provider_config.timeout,
    )?);

    let (events_tx, events_rx) = order_event_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(
        repo.clone(),
        provider,
        shared_config,
        events_tx,
        verification,
    );

    let reconciler_task = tokio::spawn(state.reconciler.clone().run(shutdown_rx.clone()));
    let sender_task =
        tokio::spawn(NotificationSender::new(repo, notifier, events_rx, shutdown_rx).run());

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    reload_notify.notify_one();
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("Background tasks already stopped");
    }
    for (name, task) in [("reconciler", reconciler_task), ("notification sender", sender_task)] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task panicked");
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
