//! plinth-deploy - Dependency-ordered deployment of on-chain components.
//!
//! Components are declared as [`ComponentDescriptor`]s whose constructor
//! arguments may reference other components. The crate builds the dependency
//! graph, derives a deterministic deployment order, and deploys each component
//! through a [`LedgerClient`], wiring the addresses of earlier deployments into
//! the constructor arguments of later ones.
//!
//! # Example
//!
//! ```no_run
//! use plinth_deploy::{
//!     ArtifactStore, DescriptorRegistry, Executor, RpcLedgerClient, deploy,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let ledger = RpcLedgerClient::new(
//!     "http://localhost:8545".parse()?,
//!     ArtifactStore::new("build/contracts"),
//! )?;
//! let executor = Executor::new(ledger);
//! let report = deploy(&DescriptorRegistry::car_insurance(), &executor).await?;
//! println!("{:#?}", report.addresses());
//! # Ok(())
//! # }
//! ```

mod descriptor;
mod error;
mod executor;
mod graph;
mod ledger;
mod orchestrator;
mod planner;
mod progress;
mod report;
mod resolver;

pub use descriptor::{AccountRef, ArgSpec, ComponentDescriptor, DescriptorRegistry, LiteralValue};
pub use error::{ErrorKind, OrchestratorError};
pub use executor::{Executor, FailurePolicy};
pub use graph::DependencyGraph;
pub use ledger::{
    ArtifactStore, DEFAULT_CONFIRMATION_TIMEOUT, LedgerClient, LedgerError, ResolvedArg,
    RpcLedgerClient, encode_constructor_args,
};
pub use orchestrator::{deploy, plan};
pub use planner::{DeploymentPlan, PlanStep};
pub use progress::{Phase, ProgressEvent, ProgressSink, TracingSink};
pub use report::{AddressFile, DeployedComponent, Outcome, RunReport, Status};
pub use resolver::{AccountsResolver, ArgResolver, StaticResolver};

/// Re-exported so callers can name addresses without depending on alloy directly.
pub use alloy_core::primitives::{Address, U256};
