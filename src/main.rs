#![forbid(unsafe_code)]

//! `storyplex`: multi-channel text-adventure session engine.
//!
//! Loads configuration, clears stale save directories, then serves chat
//! events over stdin/stdout until EOF or a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use storyplex::chat::Dispatcher;
use storyplex::config::GlobalConfig;
use storyplex::messaging::stdio::{serve_stdio, StdioMessenger};
use storyplex::orchestrator::SessionRegistry;
use storyplex::saves::discovery;
use storyplex::{AppError, Result};

/// How long running sessions get to post their final output on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "storyplex", about = "Multi-channel text-adventure session engine", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("storyplex bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = Arc::new(GlobalConfig::load_from_path(&args.config)?);
    let catalog = config.catalog();
    info!(stories = catalog.len(), "configuration loaded");

    // ── Clear saves left by a previous run ──────────────
    let removed = discovery::wipe_root(&config.saves_root).await?;
    if removed > 0 {
        info!(removed, "removed stale save directories");
    }

    // ── Start the stdio bridge ──────────────────────────
    let registry = SessionRegistry::new();
    let messenger = Arc::new(StdioMessenger::stdout(config.outbox_dir.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&config),
        catalog,
        registry.clone(),
        messenger,
    ));

    let ct = CancellationToken::new();
    let stdio_ct = ct.clone();
    let mut stdio_handle = tokio::spawn(async move {
        if let Err(err) = serve_stdio(dispatcher, tokio::io::stdin(), stdio_ct).await {
            error!(%err, "stdio bridge failed");
        }
    });

    info!("storyplex ready");

    // ── Wait for shutdown signal or end of input ────────
    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
            let _ = (&mut stdio_handle).await;
        }
        _ = &mut stdio_handle => info!("input closed"),
    }

    // ── Let running games post their last output ────────
    let remaining = registry.shutdown_all(SHUTDOWN_GRACE).await;
    if remaining > 0 {
        warn!(remaining, "exiting with sessions still running");
    }

    info!("storyplex shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Logs go to stderr; stdout carries the message stream.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
