use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use plinth_deploy::{Address, FailurePolicy};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::config::PlinthConfig;

#[derive(Parser)]
#[command(name = "plinth")]
#[command(
    author,
    version,
    about = "Deploy interdependent contracts in dependency order"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "PLINTH_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Plinth.toml configuration file, or a directory containing one.
    ///
    /// If not provided, ./Plinth.toml is used when it exists, otherwise the
    /// built-in car-insurance component set is deployed with default settings.
    #[arg(short, long, alias = "conf", env = "PLINTH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the deployment plan without touching the ledger.
    Plan,
    /// Deploy every component in plan order.
    Deploy(DeployArgs),
}

/// Command line overrides for the configuration file.
#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// The URL of the ledger JSON-RPC endpoint.
    #[arg(long, alias = "rpc")]
    pub rpc_url: Option<Url>,

    /// The directory of compiled contract artifacts.
    #[arg(long, alias = "artifacts")]
    pub artifacts_dir: Option<PathBuf>,

    /// The account sending deployment transactions.
    #[arg(long)]
    pub deployer: Option<Address>,

    /// What to do when a deployment fails: halt or skip-dependents.
    #[arg(long)]
    pub failure_policy: Option<FailurePolicy>,

    /// Where to write the deployed addresses as JSON.
    #[arg(long, alias = "out")]
    pub addresses_out: Option<PathBuf>,
}

impl DeployArgs {
    /// Apply the overrides given on the command line.
    pub fn apply(self, config: &mut PlinthConfig) {
        if let Some(rpc_url) = self.rpc_url {
            config.rpc_url = rpc_url;
        }
        if let Some(artifacts_dir) = self.artifacts_dir {
            config.artifacts_dir = artifacts_dir;
        }
        if let Some(deployer) = self.deployer {
            config.deployer = Some(deployer);
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(addresses_out) = self.addresses_out {
            config.addresses_out = Some(addresses_out);
        }
    }
}
