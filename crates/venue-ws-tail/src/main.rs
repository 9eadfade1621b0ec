/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Logged channel payloads with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use venue_ws_tail::TailConfig;

#[derive(Parser, Debug)]
#[command(name = "venue-ws-tail", version, about = "Tail venue WebSocket channels into the log")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting venue-ws-tail"
    );

    let config = TailConfig::from_file(&args.config_path).context("load config")?;
    info!(
        url = %config.url,
        subscription_count = config.subscriptions.len(),
        private = config.credentials.is_some(),
        "configuration loaded"
    );

    if args.dry_run {
        config.client_config()?;
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(name) => {
                info!(signal = name, "shutdown requested");
                trigger.cancel();
            }
            Err(err) => warn!(error = %err, "signal handling unavailable; stop with a hard kill"),
        }
    });

    venue_ws_tail::run(&config, shutdown).await?;
    Ok(())
}

/// `RUST_LOG` directives win over `--log-level` when set and non-empty
fn log_filter(log_level: &str, rust_log: Option<String>) -> Result<EnvFilter> {
    match rust_log.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid {} `{directives}`", EnvFilter::DEFAULT_ENV)),
        None => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid --log-level `{log_level}`")),
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = log_filter(log_level, std::env::var(EnvFilter::DEFAULT_ENV).ok())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!(err))
}

/// Wait for the first SIGINT or SIGTERM and return its name
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => {
                interrupted.context("install SIGINT handler")?;
                Ok("SIGINT")
            }
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("install SIGINT handler")?;
        Ok("SIGINT")
    }
}
