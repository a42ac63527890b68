//! topograph: deployment topology graph tool.
//!
//! # Usage
//!
//! ```text
//! topograph ingest --file topology.yaml
//! topograph retarget --key prod@app-1:billing-api:1.0.0 --env dr --host app-2
//! topograph update node --hostname app-1 --new-hostname app-9 --type vm \
//!     --ip 10.0.0.1 --roles app,web
//! topograph cluster-nodes --cluster k8s-main --subnet 10.0.0.0/24
//! topograph quality --format json
//! topograph serve
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use topograph_core::{EnvironmentType, NodeType, TopographConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "topograph",
    about = "Deployment topology graph: reconcile manifests, retarget placements, gate quality",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to topograph.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Graph database path. Overrides [store].path.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest and reconcile the graph to it
    Ingest {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Run referential validation only
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Move one deployment to another environment and node
    Retarget {
        /// Current deployment key.
        #[arg(long)]
        key: String,
        #[arg(long)]
        env: String,
        #[arg(long)]
        host: String,
    },
    /// Update one inventory entity; dependent keys follow a rename
    Update {
        #[command(subcommand)]
        action: UpdateAction,
    },
    /// Evaluate the quality gate once
    Quality {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Deployments placed on nodes of a subnet
    DeploymentsBySubnet {
        #[arg(long)]
        subnet: String,
    },
    /// Blast radius of a node
    Impact {
        #[arg(long)]
        node: String,
    },
    /// Components and target nodes of a software system
    System {
        #[arg(long)]
        name: String,
    },
    /// Nodes of a cluster, optionally only those in one subnet
    ClusterNodes {
        #[arg(long)]
        cluster: String,
        #[arg(long)]
        subnet: Option<String>,
    },
    /// Print every entity and edge
    Dump,
    /// Run the scheduled quality gate until Ctrl-C
    Serve {
        /// Seconds between evaluations. Overrides [quality].interval_secs.
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(Subcommand)]
enum UpdateAction {
    /// Rename a software system
    System {
        #[arg(long)]
        name: String,
        #[arg(long)]
        new_name: String,
    },
    /// Rename or re-version a software component
    Component {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        new_name: Option<String>,
        #[arg(long)]
        new_version: Option<String>,
    },
    /// Replace a hardware node's type, address and roles
    Node {
        #[arg(long)]
        hostname: String,
        #[arg(long)]
        new_hostname: Option<String>,
        /// physical, vm, container_host, grid_manager, kubernetes_control_plane
        /// or kubernetes_worker
        #[arg(long = "type")]
        node_type: NodeType,
        #[arg(long)]
        ip: String,
        /// Comma-separated role tags.
        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,
    },
    /// Change a subnet's CIDR, VLAN or routing zone
    Subnet {
        #[arg(long)]
        cidr: String,
        #[arg(long)]
        new_cidr: Option<String>,
        #[arg(long)]
        vlan: String,
        #[arg(long)]
        routing_zone: String,
    },
    /// Rename or retype an execution environment
    Environment {
        #[arg(long)]
        name: String,
        #[arg(long)]
        new_name: Option<String>,
        #[arg(long = "type")]
        env_type: EnvironmentType,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = TopographConfig::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store.path = store;
    }
    if cli.log_json {
        config.log.json = true;
    }
    init_tracing(&config);

    match cli.command {
        Commands::Ingest { file } => commands::graph::ingest(&config, &file),
        Commands::Validate { file } => commands::graph::validate(&file),
        Commands::Retarget { key, env, host } => {
            commands::graph::retarget(&config, &key, &env, &host)
        }
        Commands::Update { action } => match action {
            UpdateAction::System { name, new_name } => {
                commands::update::system(&config, &name, &new_name)
            }
            UpdateAction::Component {
                name,
                version,
                new_name,
                new_version,
            } => commands::update::component(&config, &name, &version, new_name, new_version),
            UpdateAction::Node {
                hostname,
                new_hostname,
                node_type,
                ip,
                roles,
            } => commands::update::node(&config, &hostname, node_type, new_hostname, ip, roles),
            UpdateAction::Subnet {
                cidr,
                new_cidr,
                vlan,
                routing_zone,
            } => commands::update::subnet(&config, &cidr, new_cidr, vlan, routing_zone),
            UpdateAction::Environment {
                name,
                new_name,
                env_type,
            } => commands::update::environment(&config, &name, new_name, env_type),
        },
        Commands::Quality { format } => commands::quality::evaluate(&config, &format),
        Commands::DeploymentsBySubnet { subnet } => {
            commands::query::deployments_by_subnet(&config, &subnet)
        }
        Commands::Impact { node } => commands::query::impact(&config, &node),
        Commands::System { name } => commands::query::system(&config, &name),
        Commands::ClusterNodes { cluster, subnet } => {
            commands::query::cluster_nodes(&config, &cluster, subnet.as_deref())
        }
        Commands::Dump => commands::query::dump(&config),
        Commands::Serve { interval } => commands::quality::serve(&config, interval).await,
    }
}

fn init_tracing(config: &TopographConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
