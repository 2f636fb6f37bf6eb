//! Governed action runtime server binary.
//!
//! Starts an HTTP server bridging `govrun-core`'s policy engine and
//! transactional store to a REST API for operational action admission and
//! execution.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use govrun_core::config::RuntimeConfig;
use govrun_core::policy::PolicyStore;
use govrun_core::storage::{self, materializations};
use govrun_server::state::AppState;

/// Governed action runtime server — serves the policy-gated case /
/// pending-action / execution API.
#[derive(Parser)]
#[command(name = "govrun-server", version, about)]
struct Cli {
    /// Host address to bind to. Overrides `API_HOST` when set.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on. Overrides `API_PORT` when set.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = RuntimeConfig::from_env();
    if let Some(host) = cli.host {
        config.api_host = host;
    }
    if let Some(port) = cli.port {
        config.api_port = port;
    }

    tracing::info!(
        db = %config.db_url,
        policy_path = %config.policy_path.display(),
        dev_mode = config.dev_mode,
        host = %config.api_host,
        port = config.api_port,
        "starting govrun server"
    );

    let pool = storage::init_db(&config.db_url).await?;

    let policy = PolicyStore::new(config.policy_path.clone());
    // Fail fast: an unreadable or malformed policy document at startup is a
    // deployment mistake, not a request-time condition.
    policy.load()?;

    let cleanup_pool = pool.clone();
    let cleanup_interval = config.idempotency_cleanup_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        loop {
            ticker.tick().await;
            match materializations::delete_expired(&cleanup_pool).await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, "idempotency TTL cleanup removed expired materializations");
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(%error, "idempotency TTL cleanup failed");
                }
            }
        }
    });

    let bind_host = config.api_host.clone();
    let bind_port = config.api_port;

    let state = Arc::new(AppState { db: pool, policy, config });
    let router = govrun_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind_host}:{bind_port}")).await?;
    tracing::info!("listening on http://{bind_host}:{bind_port}");
    axum::serve(listener, router).await?;

    Ok(())
}
