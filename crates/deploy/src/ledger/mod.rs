//! Ledger client capability: the external system that executes a deployment
//! and returns the resulting on-chain address.

mod artifact;
mod rpc;

use std::future::Future;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::LiteralValue;

pub use artifact::ArtifactStore;
pub use rpc::{DEFAULT_CONFIRMATION_TIMEOUT, RpcLedgerClient};

/// A constructor argument after resolution, ready to be sent to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolvedArg {
    /// The address of a component deployed earlier in the run.
    Address(Address),
    /// A list of account addresses.
    Accounts(Vec<Address>),
    /// A literal value, passed through unchanged.
    Value(LiteralValue),
}

impl ResolvedArg {
    /// The ABI value this argument encodes to.
    pub fn to_sol_value(&self) -> DynSolValue {
        match self {
            ResolvedArg::Address(address) => DynSolValue::Address(*address),
            ResolvedArg::Accounts(accounts) => {
                DynSolValue::Array(accounts.iter().copied().map(DynSolValue::Address).collect())
            }
            ResolvedArg::Value(LiteralValue::Bool(b)) => DynSolValue::Bool(*b),
            ResolvedArg::Value(LiteralValue::Number(n)) => DynSolValue::Uint(*n, 256),
            ResolvedArg::Value(LiteralValue::Address(a)) => DynSolValue::Address(*a),
            ResolvedArg::Value(LiteralValue::Text(s)) => DynSolValue::String(s.clone()),
        }
    }
}

/// ABI-encode constructor arguments, to be appended to the creation bytecode.
pub fn encode_constructor_args(args: &[ResolvedArg]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.iter().map(ResolvedArg::to_sol_value).collect()).abi_encode_params()
}

/// Failure reported by a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The node could not be reached, or did not confirm in time.
    #[error("transport error: {0}")]
    Transport(String),
    /// The deployment transaction was rejected or reverted.
    #[error("deployment reverted: {0}")]
    Reverted(String),
    /// The compiled artifact for the component could not be loaded.
    #[error("artifact error: {0}")]
    Artifact(String),
}

/// Capability to deploy a component on a ledger.
///
/// `deploy` must only resolve once the deployment is definitively confirmed or
/// rejected; the executor does not issue the next deployment before that.
/// Retry policies, if any, belong to the implementation.
pub trait LedgerClient: Send + Sync {
    /// Deploy `name` with the given constructor arguments.
    fn deploy(
        &self,
        name: &str,
        args: &[ResolvedArg],
    ) -> impl Future<Output = Result<Address, LedgerError>> + Send;

    /// Accounts controlled by this client, used to resolve `account:N` references.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, LedgerError>> + Send {
        async { Ok(Vec::new()) }
    }
}
