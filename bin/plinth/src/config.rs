//! Deployment configuration, loaded from `Plinth.toml` and `PLINTH_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use plinth_deploy::{Address, DescriptorRegistry, FailurePolicy};
use serde::{Deserialize, Serialize};
use url::Url;

/// The default name for the plinth configuration file.
pub const CONFIG_FILENAME: &str = "Plinth.toml";

/// Prefix of the environment variables overriding the configuration file.
const ENV_PREFIX: &str = "PLINTH_";

/// Configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlinthConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: Url,
    /// Directory holding one compiled artifact per component.
    pub artifacts_dir: PathBuf,
    /// Account sending the deployments. Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    /// Maximum time to wait for each deployment to be mined.
    pub confirmation_timeout_secs: u64,
    /// What to do with the rest of the plan when a deployment fails.
    pub failure_policy: FailurePolicy,
    /// Where to write the deployed addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses_out: Option<PathBuf>,
    /// The components to deploy.
    pub components: DescriptorRegistry,
}

impl Default for PlinthConfig {
    fn default() -> Self {
        Self {
            rpc_url: Url::parse("http://localhost:8545").expect("static URL is valid"),
            artifacts_dir: PathBuf::from("build/contracts"),
            deployer: None,
            confirmation_timeout_secs: plinth_deploy::DEFAULT_CONFIRMATION_TIMEOUT.as_secs(),
            failure_policy: FailurePolicy::Halt,
            addresses_out: Some(PathBuf::from("deployed-addresses.json")),
            components: DescriptorRegistry::car_insurance(),
        }
    }
}

impl PlinthConfig {
    /// Load the configuration.
    ///
    /// An explicitly given path must exist; without one, `Plinth.toml` in the
    /// working directory is used when present. Environment variables take
    /// precedence over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) if !path.exists() => {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            Some(path) if path.is_dir() => path.join(CONFIG_FILENAME),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let config: Self = Self::figment(&path)
            .extract()
            .context(format!("Failed to load configuration from {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            components = config.components.len(),
            rpc_url = %config.rpc_url,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).only(&[
                "rpc_url",
                "artifacts_dir",
                "deployer",
                "confirmation_timeout_secs",
                "failure_policy",
                "addresses_out",
            ]))
    }
}
