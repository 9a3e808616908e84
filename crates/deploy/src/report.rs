//! Run report: the ordered log of per-component outcomes of one run.

use std::{collections::BTreeMap, path::Path, time::Duration};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Table, presets::UTF8_FULL};
use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// A component deployed during the run. Created once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedComponent {
    pub name: String,
    pub address: Address,
    /// Logical sequence number of the deployment within the run, starting at 0.
    pub deployed_at: u64,
}

/// Result of one plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum Status {
    Success { address: Address },
    Failed { kind: ErrorKind, message: String },
    /// Not attempted because `blocked_by` failed.
    Skipped { blocked_by: String },
}

/// Outcome of one plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    #[serde(flatten)]
    pub status: Status,
    pub elapsed: Duration,
}

impl Outcome {
    pub fn address(&self) -> Option<Address> {
        match self.status {
            Status::Success { address } => Some(address),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Status::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, Status::Failed { .. })
    }
}

/// Append-only record of a run.
///
/// Returned whether the run completed, halted on a failure or was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    plan_fingerprint: String,
    planned: usize,
    started_at: DateTime<Utc>,
    outcomes: Vec<Outcome>,
    deployed: Vec<DeployedComponent>,
    cancelled: bool,
}

/// Content of the address file written by [`RunReport::save_addresses`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFile {
    pub plan_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub addresses: BTreeMap<String, Address>,
}

impl RunReport {
    pub(crate) fn new(plan_fingerprint: String, planned: usize) -> Self {
        Self {
            plan_fingerprint,
            planned,
            started_at: Utc::now(),
            outcomes: Vec::with_capacity(planned),
            deployed: Vec::with_capacity(planned),
            cancelled: false,
        }
    }

    pub(crate) fn record_success(
        &mut self,
        name: &str,
        address: Address,
        elapsed: Duration,
    ) -> &DeployedComponent {
        self.outcomes.push(Outcome {
            name: name.to_string(),
            status: Status::Success { address },
            elapsed,
        });
        let deployed_at = self.deployed.len() as u64;
        self.deployed.push(DeployedComponent {
            name: name.to_string(),
            address,
            deployed_at,
        });
        &self.deployed[self.deployed.len() - 1]
    }

    pub(crate) fn record_failure(
        &mut self,
        name: &str,
        kind: ErrorKind,
        message: String,
        elapsed: Duration,
    ) {
        self.outcomes.push(Outcome {
            name: name.to_string(),
            status: Status::Failed { kind, message },
            elapsed,
        });
    }

    pub(crate) fn record_skipped(&mut self, name: &str, blocked_by: &str) {
        self.outcomes.push(Outcome {
            name: name.to_string(),
            status: Status::Skipped {
                blocked_by: blocked_by.to_string(),
            },
            elapsed: Duration::ZERO,
        });
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Outcomes in execution order.
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Components deployed during the run, in deployment order.
    pub fn deployed(&self) -> &[DeployedComponent] {
        &self.deployed
    }

    pub fn plan_fingerprint(&self) -> &str {
        &self.plan_fingerprint
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn success_count(&self) -> usize {
        self.deployed.len()
    }

    /// The first failed outcome, if any.
    pub fn first_failure(&self) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.is_failure())
    }

    /// Address of a deployed component.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.deployed
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.address)
    }

    /// Final address of every successfully deployed component.
    pub fn addresses(&self) -> BTreeMap<String, Address> {
        self.deployed
            .iter()
            .map(|d| (d.name.clone(), d.address))
            .collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether every planned component was deployed.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.success_count() == self.planned
    }

    /// Write the address map as JSON.
    pub fn save_addresses(&self, path: &Path) -> Result<()> {
        let file = AddressFile {
            plan_fingerprint: self.plan_fingerprint.clone(),
            started_at: self.started_at,
            addresses: self.addresses(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize addresses")?;

        std::fs::write(path, json)
            .context(format!("Failed to write addresses to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Addresses saved");
        Ok(())
    }

    /// Render the outcomes as a table for terminal output.
    pub fn render_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Component", "Status", "Address / error", "Elapsed"]);

        for outcome in &self.outcomes {
            let (status, detail) = match &outcome.status {
                Status::Success { address } => ("deployed".to_string(), address.to_string()),
                Status::Failed { kind, message } => (format!("failed ({kind})"), message.clone()),
                Status::Skipped { blocked_by } => {
                    ("skipped".to_string(), format!("blocked by {blocked_by}"))
                }
            };
            table.add_row(vec![
                outcome.name.clone(),
                status,
                detail,
                format!("{:.2?}", outcome.elapsed),
            ]);
        }
        table
    }

    /// Turn an incomplete run into an error describing why it stopped.
    pub fn into_result(self) -> Result<Self> {
        if let Some(failure) = self.first_failure() {
            if let Status::Failed { kind, message } = &failure.status {
                anyhow::bail!("{} failed ({kind}): {message}", failure.name);
            }
        }
        if self.cancelled {
            anyhow::bail!(
                "Run cancelled after {} of {} deployments",
                self.success_count(),
                self.planned
            );
        }
        Ok(self)
    }
}
