use clap::{Args, Parser, Subcommand, ValueEnum};

use keel_client::{ControlCenterClient, DEFAULT_CONTROL_CENTER_ADDR};
use keel_state::Owner;

mod commands;

#[derive(Parser)]
#[command(
    name = "keelctl",
    about = "Keel — deploy container images to edge agents and Kubernetes clusters",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Control-center base URL
    #[arg(long, global = true, env = "CONTROL_CENTER_ADDR", default_value = DEFAULT_CONTROL_CENTER_ADDR)]
    control_center: String,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    output: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage Kubernetes clusters
    Clusters {
        #[command(subcommand)]
        action: ClustersAction,
    },
    /// Inspect edge agents
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
    /// Deploy an image to a cluster or an agent
    Deploy {
        #[command(flatten)]
        target: TargetArgs,
        /// Container image to deploy
        #[arg(long)]
        image: String,
    },
    /// Inspect deployments
    Deployments {
        #[command(subcommand)]
        action: DeploymentsAction,
    },
}

#[derive(Subcommand)]
enum ClustersAction {
    /// List registered clusters
    List,
    /// Register a cluster from a kubeconfig file
    Add {
        /// Cluster name
        #[arg(long)]
        name: String,
        /// Path to the kubeconfig file
        #[arg(long)]
        kubeconfig: String,
    },
}

#[derive(Subcommand)]
enum AgentsAction {
    /// List registered agents and their liveness
    List,
}

#[derive(Subcommand)]
enum DeploymentsAction {
    /// List deployments of one cluster or agent
    List {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show one deployment
    Get {
        /// Deployment id (dep-xxxxxxxx)
        id: String,
    },
}

/// Exactly one of `--cluster` / `--agent`.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Cluster id
    #[arg(long)]
    cluster: Option<String>,
    /// Agent id
    #[arg(long)]
    agent: Option<String>,
}

impl TargetArgs {
    fn owner(self) -> anyhow::Result<Owner> {
        match (self.cluster, self.agent) {
            (Some(id), None) => Ok(Owner::Cluster(id)),
            (None, Some(id)) => Ok(Owner::Agent(id)),
            _ => anyhow::bail!("exactly one of --cluster or --agent is required"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = ControlCenterClient::new(&cli.control_center)?;
    let format = cli.output;

    match cli.command {
        Commands::Clusters { action } => match action {
            ClustersAction::List => commands::clusters::list(&client, format).await,
            ClustersAction::Add { name, kubeconfig } => {
                commands::clusters::add(&client, &name, &kubeconfig, format).await
            }
        },
        Commands::Agents { action } => match action {
            AgentsAction::List => commands::agents::list(&client, format).await,
        },
        Commands::Deploy { target, image } => {
            commands::deployments::deploy(&client, target.owner()?, &image, format).await
        }
        Commands::Deployments { action } => match action {
            DeploymentsAction::List { target } => {
                commands::deployments::list(&client, target.owner()?, format).await
            }
            DeploymentsAction::Get { id } => commands::deployments::get(&client, &id, format).await,
        },
    }
}
