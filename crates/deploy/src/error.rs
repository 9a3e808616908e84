//! Error types for planning and executing a deployment run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::LedgerError;

/// Errors raised while building, planning or executing a deployment.
///
/// Graph and planning errors (`CycleDetected`, `UnknownReference`,
/// `DuplicateComponent`) abort a run before any ledger call is made.
/// Execution errors are recorded in the [`RunReport`](crate::RunReport) of the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// A component transitively references itself.
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// A `ComponentRef` names a component that is not registered.
    #[error("component `{from}` references unknown component `{to}`")]
    UnknownReference { from: String, to: String },

    /// Two descriptors share the same name.
    #[error("component `{0}` is registered more than once")]
    DuplicateComponent(String),

    /// A `ComponentRef` was resolved before its target was deployed.
    #[error("component `{component}` needs `{dependency}` which has not been deployed")]
    UnresolvedDependency {
        component: String,
        dependency: String,
    },

    /// The resolver cannot resolve one of the component's arguments.
    #[error("component `{component}` argument #{index}: {reason}")]
    UnsupportedArgKind {
        component: String,
        index: usize,
        reason: String,
    },

    /// The ledger client rejected the deployment.
    #[error("deployment of `{component}` failed: {source}")]
    DeploymentFailed {
        component: String,
        #[source]
        source: LedgerError,
    },
}

impl OrchestratorError {
    /// The discriminant of this error, as stored in run outcomes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CycleDetected(_) => ErrorKind::CycleDetected,
            Self::UnknownReference { .. } => ErrorKind::UnknownReference,
            Self::DuplicateComponent(_) => ErrorKind::DuplicateComponent,
            Self::UnresolvedDependency { .. } => ErrorKind::UnresolvedDependency,
            Self::UnsupportedArgKind { .. } => ErrorKind::UnsupportedArgKind,
            Self::DeploymentFailed { .. } => ErrorKind::DeploymentFailed,
        }
    }

    /// Whether this error indicates a configuration bug rather than a ledger failure.
    ///
    /// Fatal errors halt a run under every failure policy.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DeploymentFailed { .. })
    }
}

/// Copyable discriminant of [`OrchestratorError`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    CycleDetected,
    UnknownReference,
    DuplicateComponent,
    UnresolvedDependency,
    UnsupportedArgKind,
    DeploymentFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = OrchestratorError::CycleDetected(vec!["A".to_string(), "B".to_string()]);
        assert_eq!(err.to_string(), "dependency cycle detected: A -> B");
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_deployment_failure_is_not_fatal() {
        let err = OrchestratorError::DeploymentFailed {
            component: "Claims".to_string(),
            source: LedgerError::Reverted("out of gas".to_string()),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.kind().to_string(), "deployment-failed");
    }
}
