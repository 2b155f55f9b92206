//! keeld — the Keel control-center daemon.
//!
//! # Usage
//!
//! ```text
//! keeld --config /etc/keel/keeld.toml --listen 0.0.0.0:8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;

use keel_state::SystemClock;
use keeld::{DaemonConfig, Overrides};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "keeld", about = "Keel control center", version)]
struct Cli {
    /// Path to a keeld.toml file.
    #[arg(long, short, env = "KEEL_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "KEEL_LISTEN")]
    listen: Option<SocketAddr>,

    /// Seconds without a heartbeat before an agent is offline.
    #[arg(long)]
    liveness_window_secs: Option<u64>,

    /// Maximum number of dispatches executing at once.
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Deadline for a single dispatch, in seconds.
    #[arg(long)]
    dispatch_timeout_secs: Option<u64>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", env = "KEEL_LOG_FORMAT")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,keeld=debug,keel=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let overrides = Overrides {
        listen: cli.listen,
        liveness_window_secs: cli.liveness_window_secs,
        max_concurrent: cli.max_concurrent,
        dispatch_timeout_secs: cli.dispatch_timeout_secs,
    };
    let config = DaemonConfig::load(cli.config.as_deref(), &overrides)?;
    info!(
        listen = %config.server.listen,
        liveness_window_secs = config.liveness.window_secs,
        max_concurrent = config.dispatch.max_concurrent,
        dispatch_timeout_secs = config.dispatch.timeout_secs,
        "Keel control center starting"
    );

    let state = keeld::build_state(&config, Arc::new(SystemClock));

    let listener = tokio::net::TcpListener::bind(config.server.listen).await?;

    // Graceful shutdown on Ctrl-C.
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    };

    keeld::serve(listener, state, config.shutdown_grace(), shutdown).await?;

    info!("Keel control center stopped");
    Ok(())
}
