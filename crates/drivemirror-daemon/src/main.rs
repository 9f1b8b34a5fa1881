//! DriveMirror daemon - HTTP front end for the replication engine
//!
//! Starts the API server and the periodic token refresh sweep, and shuts
//! both down on SIGTERM/SIGINT.
//!
//! # Architecture
//!
//! Configuration, database and Drive adapters are wired into
//! [`Services`], which the axum router shares with every handler. A
//! `CancellationToken` triggered by the signal handler stops the server.
//! Once in-flight requests have drained the sweep is stopped, pending
//! replication jobs are awaited and then the database is closed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use drivemirror_cache::{DatabasePool, SqliteStateRepository};
use drivemirror_core::config::Config;
use drivemirror_core::credentials::CredentialCipher;
use drivemirror_daemon::{logging, router, AppState};
use drivemirror_drive::{DriveClient, GoogleDriveStorage, GoogleTokenProvider};
use drivemirror_sync::Services;

#[derive(Debug, Parser)]
#[command(
    name = "drivemirrord",
    version,
    about = "Mirrors uploaded files across several Google Drive accounts"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

impl Cli {
    /// Loads the configuration and applies command-line overrides
    ///
    /// Also returns the error for a default-path file that was ignored, to be
    /// reported once logging is set up.
    fn load_config(&self) -> Result<(Config, Option<anyhow::Error>)> {
        let (mut config, ignored) = match &self.config {
            Some(path) => (
                Config::load(path).with_context(|| {
                    format!("Failed to load configuration from {}", path.display())
                })?,
                None,
            ),
            None => load_default_config(&Config::default_path()),
        };
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        Ok((config, ignored))
    }
}

/// Configuration from the default path, or defaults if there is no usable
/// file there
fn load_default_config(path: &Path) -> (Config, Option<anyhow::Error>) {
    match Config::load_if_present(path) {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(e) => (
            Config::default(),
            Some(e.context(format!("Ignoring configuration file {}", path.display()))),
        ),
    }
}

/// Waits for SIGTERM or SIGINT and cancels `token`
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

async fn run(config: Config, shutdown: CancellationToken) -> Result<()> {
    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(%e, "Invalid configuration");
        }
        anyhow::bail!("Configuration has {} error(s)", errors.len());
    }

    let secret = config
        .credential_secret()
        .context("No credential secret configured (security.credential_secret)")?;
    let cipher = CredentialCipher::from_secret(&secret).context("Invalid credential secret")?;

    let pool = DatabasePool::new(&config.database.path)
        .await
        .context("Failed to open database")?;
    info!(path = %config.database.path.display(), "Database ready");
    let repository = Arc::new(SqliteStateRepository::new(pool.pool().clone(), cipher));

    let storage = Arc::new(GoogleDriveStorage::new(DriveClient::with_base_url(
        config.google.api_base_url.as_str(),
    )));
    let provider = Arc::new(
        GoogleTokenProvider::new(&config.google).context("Failed to build OAuth client")?,
    );

    tokio::fs::create_dir_all(&config.storage.staging_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create staging directory {}",
                config.storage.staging_dir.display()
            )
        })?;

    let services = Services::new(&config, storage, provider, repository);
    let sweep = services.token_refresh_sweep().start();

    let app = router(AppState::new(
        services.clone(),
        config.storage.staging_dir.clone(),
    ));
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "API listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed");

    sweep.shutdown().await;
    services.shutdown().await;
    pool.close().await;
    served
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, ignored) = cli.load_config()?;

    logging::init(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "DriveMirror daemon starting (drivemirrord)");
    if let Some(e) = ignored {
        warn!(error = %format!("{e:#}"), "Configuration file is invalid, using defaults");
    }

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    let result = run(config, shutdown_token).await;

    match &result {
        Ok(()) => info!("DriveMirror daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "DriveMirror daemon exiting with error"),
    }

    result
}
