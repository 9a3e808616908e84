//! Structured progress events emitted for every deployment attempt.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ErrorKind;

/// Phase of a deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Started,
    Succeeded,
    Failed,
    /// Not attempted because a dependency failed.
    Skipped,
}

/// A progress event for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub component: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<(ErrorKind, String)>,
    /// The failed component that blocked a skipped one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
}

impl ProgressEvent {
    pub fn started(component: &str) -> Self {
        Self {
            component: component.to_string(),
            phase: Phase::Started,
            address: None,
            error: None,
            blocked_by: None,
        }
    }

    pub fn succeeded(component: &str, address: Address) -> Self {
        Self {
            component: component.to_string(),
            phase: Phase::Succeeded,
            address: Some(address),
            error: None,
            blocked_by: None,
        }
    }

    pub fn failed(component: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            phase: Phase::Failed,
            address: None,
            error: Some((kind, message.into())),
            blocked_by: None,
        }
    }

    pub fn skipped(component: &str, blocked_by: &str) -> Self {
        Self {
            component: component.to_string(),
            phase: Phase::Skipped,
            address: None,
            error: None,
            blocked_by: Some(blocked_by.to_string()),
        }
    }
}

/// Consumer of progress events (logger, UI, test recorder).
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Logs progress events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &ProgressEvent) {
        let component = event.component.as_str();
        match (event.phase, event.address, &event.error) {
            (Phase::Skipped, _, _) => {
                let blocked_by = event.blocked_by.as_deref().unwrap_or_default();
                tracing::warn!(component, blocked_by, "Skipping deployment, dependency failed");
            }
            (Phase::Succeeded, Some(address), _) => {
                tracing::info!(component, %address, "✓ Deployed");
            }
            (Phase::Failed, _, Some((kind, message))) => {
                tracing::error!(component, %kind, error = %message, "✗ Deployment failed");
            }
            (phase, _, _) => {
                tracing::info!(component, %phase, "Deploying...");
            }
        }
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: &ProgressEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(event.clone());
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn emit(&self, event: &ProgressEvent) {
        (**self).emit(event);
    }
}
