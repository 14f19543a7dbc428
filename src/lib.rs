pub mod cli;
pub mod config;
pub mod db;
pub mod entities;
pub mod mail;
pub mod services;
pub mod state;
pub mod web;

pub use config::Config;

use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    init_tracing(&config);

    match args.command {
        None | Some(cli::Commands::Serve) => run_server(config).await,
        Some(cli::Commands::Migrate) => run_migrate(config).await,
        Some(cli::Commands::AddAdmin { username }) => run_add_admin(config, &username).await,
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!(
        "Emberforum v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let listen_addr = config.server.listen_addr.clone();
    let state = state::AppState::new(config).await?;

    spawn_token_sweeper(state.store.clone());

    let app = web::router(state).await;
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;

    info!("Forum running at http://{listen_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Hourly cleanup of consumed and expired recovery tokens. Validity never
/// depends on this; it only keeps the table small.
fn spawn_token_sweeper(store: db::Store) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match store.purge_expired_tokens().await {
                Ok(0) => {}
                Ok(n) => info!("Purged {n} dead reset tokens"),
                Err(e) => error!("Reset token purge failed: {e}"),
            }
        }
    });
}

async fn run_migrate(config: Config) -> anyhow::Result<()> {
    // Connecting applies pending migrations.
    let store = db::Store::new(&config.general.database_path).await?;
    store.ping().await?;
    info!("Migrations applied");
    Ok(())
}

async fn run_add_admin(config: Config, username: &str) -> anyhow::Result<()> {
    let store = db::Store::new(&config.general.database_path).await?;

    if store.set_super_admin(username, true).await? {
        info!("User {username} is now a superadmin");
    } else {
        warn!("No such user: {username}");
        anyhow::bail!("No such user: {username}");
    }

    Ok(())
}
