//! sysmodelctl: operator CLI for the sysmodel registry.
//!
//! Opens the registry selected by the configuration file and runs one
//! management command, printing the result as JSON.
//!
//! # Usage
//!
//! ```text
//! sysmodelctl --config sysmodel.toml org add --name acme
//! sysmodelctl --config sysmodel.toml cluster cordon --org <org> --cluster <id>
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sysmodel_core::{LoggingConfig, Registry, RegistryConfig};
use sysmodel_state::ClusterHealth;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sysmodelctl", about = "sysmodel registry CLI", version)]
struct Cli {
    /// Registry configuration (TOML). Defaults to an in-memory registry.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage organizations
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },
    /// Manage clusters of an organization
    Cluster {
        #[command(subcommand)]
        action: ClusterAction,
    },
    /// Manage application descriptors
    Descriptor {
        #[command(subcommand)]
        action: DescriptorAction,
    },
    /// Manage application instances
    Instance {
        #[command(subcommand)]
        action: InstanceAction,
    },
}

#[derive(Subcommand)]
enum OrgAction {
    Add {
        #[arg(long)]
        name: String,
    },
    List,
}

#[derive(Subcommand)]
enum ClusterAction {
    Add {
        #[arg(long)]
        org: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        hostname: String,
    },
    List {
        #[arg(long)]
        org: String,
    },
    /// Keep new workloads off a cluster
    Cordon {
        #[arg(long)]
        org: String,
        #[arg(long)]
        cluster: String,
    },
    Uncordon {
        #[arg(long)]
        org: String,
        #[arg(long)]
        cluster: String,
    },
    /// Record a health report
    Health {
        #[arg(long)]
        org: String,
        #[arg(long)]
        cluster: String,
        #[arg(long, value_enum)]
        state: HealthArg,
    },
    Remove {
        #[arg(long)]
        org: String,
        #[arg(long)]
        cluster: String,
    },
}

#[derive(Subcommand)]
enum DescriptorAction {
    /// Add a descriptor read from a JSON file
    Add {
        #[arg(long)]
        org: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    List {
        #[arg(long)]
        org: String,
    },
}

#[derive(Subcommand)]
enum InstanceAction {
    Add {
        #[arg(long)]
        org: String,
        #[arg(long)]
        descriptor: String,
        #[arg(long)]
        name: String,
    },
    Show {
        #[arg(long)]
        org: String,
        #[arg(long)]
        instance: String,
    },
    Remove {
        #[arg(long)]
        org: String,
        #[arg(long)]
        instance: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HealthArg {
    Online,
    Offline,
}

impl From<HealthArg> for ClusterHealth {
    fn from(arg: HealthArg) -> Self {
        match arg {
            HealthArg::Online => ClusterHealth::Online,
            HealthArg::Offline => ClusterHealth::Offline,
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RegistryConfig::from_file(path)?,
        None => RegistryConfig::default(),
    };
    init_tracing(&config.logging);
    debug!(backend = ?config.storage.backend, "configuration loaded");

    let registry = Registry::from_config(&config)?;

    match cli.command {
        Commands::Org { action } => match action {
            OrgAction::Add { name } => commands::org::add(&registry, name),
            OrgAction::List => commands::org::list(&registry),
        },
        Commands::Cluster { action } => match action {
            ClusterAction::Add { org, name, hostname } => {
                commands::cluster::add(&registry, org, name, hostname)
            }
            ClusterAction::List { org } => commands::cluster::list(&registry, &org),
            ClusterAction::Cordon { org, cluster } => {
                commands::cluster::cordon(&registry, &org, &cluster)
            }
            ClusterAction::Uncordon { org, cluster } => {
                commands::cluster::uncordon(&registry, &org, &cluster)
            }
            ClusterAction::Health { org, cluster, state } => {
                commands::cluster::health(&registry, org, cluster, state.into())
            }
            ClusterAction::Remove { org, cluster } => {
                commands::cluster::remove(&registry, &org, &cluster)
            }
        },
        Commands::Descriptor { action } => match action {
            DescriptorAction::Add { org, file } => commands::descriptor::add(&registry, org, &file),
            DescriptorAction::List { org } => commands::descriptor::list(&registry, &org),
        },
        Commands::Instance { action } => match action {
            InstanceAction::Add {
                org,
                descriptor,
                name,
            } => commands::instance::add(&registry, org, descriptor, name),
            InstanceAction::Show { org, instance } => {
                commands::instance::show(&registry, &org, &instance)
            }
            InstanceAction::Remove { org, instance } => {
                commands::instance::remove(&registry, &org, &instance)
            }
        },
    }
}
