//! # admit-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the admissions API. Configuration comes
//! from `ADMIT_*` environment variables; command-line flags override them.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use admit_api::auth::SecretString;
use admit_api::state::{AppConfig, AppState};

/// Admissions application lifecycle API server.
#[derive(Parser, Debug)]
#[command(name = "admit-api", version, about)]
struct Cli {
    /// Port to listen on (overrides ADMIT_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Directory for uploaded documents (overrides ADMIT_UPLOAD_DIR).
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Upload request body limit in bytes (overrides ADMIT_MAX_UPLOAD_BYTES).
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    /// Disable the Prometheus `/metrics` endpoint and request metrics.
    #[arg(long)]
    no_metrics: bool,

    /// Bearer secret (overrides ADMIT_AUTH_TOKEN).
    #[arg(long)]
    auth_token: Option<String>,
}

impl Cli {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.upload_dir {
            config.upload_dir = dir;
        }
        if let Some(limit) = self.max_upload_bytes {
            config.max_upload_bytes = limit;
        }
        if self.no_metrics {
            config.metrics_enabled = false;
        }
        if let Some(token) = self.auth_token.filter(|t| !t.trim().is_empty()) {
            config.auth_token = Some(SecretString::new(token));
        }
        config
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("ADMIT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.apply(AppConfig::from_env().context("invalid configuration")?);
    tracing::info!(?config, "configuration loaded");
    if config.auth_token.is_none() {
        tracing::warn!("ADMIT_AUTH_TOKEN not set, authentication is disabled");
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload directory {}", config.upload_dir.display()))?;

    // Optional: absent DATABASE_URL means in-memory only.
    let db_pool = admit_api::db::init_pool()
        .await
        .context("database initialization failed")?;

    let port = config.port;
    let state = AppState::with_config(config, db_pool);
    state
        .hydrate_from_db()
        .await
        .context("database hydration failed")?;

    let app = admit_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("admissions API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
