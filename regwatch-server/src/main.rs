//! # Regwatch Server
//!
//! Control surface for the regwatch vehicle-record platform: exposes the bulk
//! inspection-status scan over HTTP, backed by PostgreSQL and the external
//! government inspection API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use regwatch_core::ScanOrchestrator;
use regwatch_core::lookup::{HttpInspectionClient, InspectionApiConfig};
use regwatch_core::persistence::{PostgresCheckpointStore, PostgresOutcomeWriter};
use regwatch_core::registry::PostgresRegistry;
use regwatch_server::{AppState, Config, routes};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Parser, Debug)]
#[command(name = "regwatch-server")]
#[command(about = "Vehicle registry server with bulk inspection-status scanning")]
struct Cli {
    /// Path to a TOML config file; REGWATCH_* environment variables override
    /// its values.
    #[arg(long, env = "REGWATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regwatch_server=info,regwatch_core=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("connecting to the database")?;
    MIGRATOR.run(&pool).await.context("running migrations")?;

    let api_base = Url::parse(&config.inspection_api.base_url)
        .context("parsing inspection API base URL")?;
    let lookup = HttpInspectionClient::new(InspectionApiConfig {
        base_url: api_base,
        client_id: config.inspection_api.client_id.clone(),
        client_secret: config.inspection_api.client_secret.clone(),
        timeout_secs: config.inspection_api.timeout_secs,
    })
    .context("building inspection API client")?;

    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::new(PostgresRegistry::new(pool.clone())),
        Arc::new(lookup),
        Arc::new(PostgresOutcomeWriter::new(pool.clone())),
        Arc::new(PostgresCheckpointStore::new(pool.clone())),
        config.scan.clone(),
    ));

    // Runs the previous process left mid-flight become paused and resumable.
    match orchestrator.recover_interrupted().await {
        Ok(recovered) if !recovered.is_empty() => {
            for run in &recovered {
                info!(
                    scan_id = %run.id,
                    processed = run.processed,
                    total_items = run.total_items,
                    "interrupted scan marked paused; resume via POST /api/scan/resume"
                );
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "scan recovery failed"),
    }

    let app = routes::router(AppState::new(orchestrator));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("regwatch server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("regwatch server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, shutting down"),
        _ = terminate => info!("sigterm received, shutting down"),
    }
}
