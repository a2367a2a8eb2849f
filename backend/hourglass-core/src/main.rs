use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aircall;
mod api;
mod app;
mod auth;
mod auth_routes;
mod config;
mod error;
mod google_oauth;
mod kpi;
mod memory_store;
mod models;
mod pg_store;
mod presence;
mod projects;
mod reports;
mod setup_admin;
mod store;
mod tasks;
mod team_members;
mod time_entries;
mod timesheet;
mod validation;
mod week;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod reports_tests;
#[cfg(test)]
mod team_members_tests;

use crate::app::{build_router, AppState};
use crate::config::Config;
use crate::memory_store::MemoryStore;
use crate::pg_store::PgStore;
use crate::setup_admin::{ensure_admin, AdminSetup};
use crate::store::Repository;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "hourglass", version, about = "Team time tracking API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create or promote the configured administrator, then exit
    SetupAdmin,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let repo = open_repository(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, repo).await,
        Command::SetupAdmin => {
            match ensure_admin(repo.as_ref(), &config).await? {
                AdminSetup::Created(member) => info!("Administrator {} created", member.email),
                AdminSetup::Updated(member) => info!("Administrator {} updated", member.email),
            }
            Ok(())
        }
    }
}

async fn open_repository(config: &Config) -> anyhow::Result<Arc<dyn Repository>> {
    match config.database_url() {
        Some(url) => {
            let store = PgStore::connect(&url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            info!("Connected to PostgreSQL and applied migrations");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::default()))
        }
    }
}

async fn serve(config: Config, repo: Arc<dyn Repository>) -> anyhow::Result<()> {
    info!("Starting API server in {} mode", config.environment);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;
    let tls_paths = config.tls_paths();

    let state = AppState::new(config, repo);
    info!("Available features: {:?}", state.features());
    kpi::spawn_retention_task(state.clone());
    let app = build_router(state);

    match tls_paths {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .with_context(|| format!("Failed to load TLS cert/key from {} and {}", cert_path, key_path))?;

            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!("Listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Listening on http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("HTTP server failed")?;
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
