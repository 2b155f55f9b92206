//! keel-agent — Keel edge agent.
//!
//! # Usage
//!
//! ```text
//! CONTROL_CENTER_ADDR=http://cc:8080 keel-agent --address agent-instance-1:9090
//! ```

mod agent;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use agent::{AgentConfig, EdgeAgent};
use keel_client::DEFAULT_CONTROL_CENTER_ADDR;

#[derive(Parser)]
#[command(name = "keel-agent", about = "Keel edge agent", version)]
struct Cli {
    /// Control-center base URL.
    #[arg(long, env = "CONTROL_CENTER_ADDR", default_value = DEFAULT_CONTROL_CENTER_ADDR)]
    control_center: String,

    /// Address advertised to the control center.
    #[arg(long, env = "KEEL_AGENT_ADDRESS", default_value = "agent-instance-1:9090")]
    address: String,

    /// Heartbeat interval in seconds.
    #[arg(long, default_value = "30")]
    heartbeat_interval: u64,

    /// Deployment poll interval in seconds.
    #[arg(long, default_value = "10")]
    poll_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,keel_agent=debug")),
        )
        .init();

    let cli = Cli::parse();
    info!(control_center = %cli.control_center, "agent starting");

    let mut config = AgentConfig::new(cli.control_center, cli.address);
    config.heartbeat_interval = std::time::Duration::from_secs(cli.heartbeat_interval.max(1));
    config.poll_interval = std::time::Duration::from_secs(cli.poll_interval.max(1));

    let mut agent = EdgeAgent::new(config)?;
    agent.register().await?;

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    info!("agent is running, press Ctrl+C to exit");
    let (heartbeat, poll) = tokio::join!(
        agent.run_heartbeat(shutdown_rx.clone()),
        agent.run_poll(shutdown_rx),
    );
    heartbeat?;
    poll?;

    info!("agent stopped");
    Ok(())
}
