//! JSON-RPC ledger client for development nodes with unlocked accounts
//! (Anvil, Ganache, Hardhat).

use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use super::{ArtifactStore, LedgerClient, LedgerError, ResolvedArg, encode_constructor_args};

/// Default timeout for a single RPC request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time to wait for a deployment transaction to be mined.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Why a JSON-RPC call did not produce a result.
#[derive(Debug)]
enum RpcFailure {
    /// The request could not be sent or the response could not be decoded.
    Transport(anyhow::Error),
    /// The node answered with a JSON-RPC error object.
    Node(String),
}

impl RpcFailure {
    fn into_ledger_error(self) -> LedgerError {
        match self {
            RpcFailure::Transport(e) => LedgerError::Transport(format!("{e:#}")),
            RpcFailure::Node(message) if message.to_lowercase().contains("revert") => {
                LedgerError::Reverted(message)
            }
            RpcFailure::Node(message) => LedgerError::Transport(message),
        }
    }
}

/// Make a JSON-RPC call and deserialize the result.
async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcFailure> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))
        .map_err(RpcFailure::Transport)?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))
        .map_err(RpcFailure::Transport)?;

    if let Some(error) = result.get("error") {
        return Err(RpcFailure::Node(
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string(),
        ));
    }

    let result_value = result
        .get("result")
        .context("No result in response")
        .map_err(RpcFailure::Transport)?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
        .map_err(RpcFailure::Transport)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    status: Option<String>,
    contract_address: Option<Address>,
}

/// Why a receipt poll did not yield a receipt.
#[derive(Debug)]
enum ReceiptPoll {
    Pending,
    Failed(LedgerError),
}

/// Ledger client that deploys through `eth_sendTransaction` on a node that
/// holds the deployer's key.
#[derive(Debug)]
pub struct RpcLedgerClient {
    client: reqwest::Client,
    url: Url,
    artifacts: ArtifactStore,
    deployer: Option<Address>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    accounts: OnceCell<Vec<Address>>,
}

impl RpcLedgerClient {
    /// Create a client for the node at `url`, loading bytecode from `artifacts`.
    pub fn new(url: Url, artifacts: ArtifactStore) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url,
            artifacts,
            deployer: None,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            accounts: OnceCell::new(),
        })
    }

    /// Send deployments from `deployer` instead of the node's first account.
    pub fn deployer(mut self, deployer: Address) -> Self {
        self.deployer = Some(deployer);
        self
    }

    /// Maximum time to wait for a deployment to be mined.
    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Interval between receipt polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn cached_accounts(&self) -> Result<&Vec<Address>, LedgerError> {
        self.accounts
            .get_or_try_init(|| async {
                json_rpc_call::<Vec<Address>>(&self.client, &self.url, "eth_accounts", vec![])
                    .await
                    .map_err(RpcFailure::into_ledger_error)
            })
            .await
    }

    async fn sender(&self) -> Result<Address, LedgerError> {
        if let Some(deployer) = self.deployer {
            return Ok(deployer);
        }
        self.cached_accounts()
            .await?
            .first()
            .copied()
            .ok_or_else(|| LedgerError::Transport("node exposes no unlocked accounts".to_string()))
    }

    async fn poll_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, ReceiptPoll> {
        let receipt: Option<TransactionReceipt> = json_rpc_call(
            &self.client,
            &self.url,
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx_hash)],
        )
        .await
        .map_err(|e| ReceiptPoll::Failed(e.into_ledger_error()))?;

        receipt.ok_or(ReceiptPoll::Pending)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, LedgerError> {
        let poll_interval = self.poll_interval.max(Duration::from_millis(1));
        let attempts = (self.confirmation_timeout.as_millis() / poll_interval.as_millis()).max(1);

        let backoff = ConstantBuilder::default()
            .with_delay(poll_interval)
            .with_max_times(attempts as usize);

        (|| self.poll_receipt(tx_hash))
            .retry(backoff)
            .when(|e| matches!(e, ReceiptPoll::Pending))
            .notify(|_, after| {
                tracing::trace!(tx = %tx_hash, retry_in = ?after, "Deployment not mined yet");
            })
            .await
            .map_err(|e| match e {
                ReceiptPoll::Pending => LedgerError::Transport(format!(
                    "transaction {tx_hash} not mined after {:?}",
                    self.confirmation_timeout
                )),
                ReceiptPoll::Failed(e) => e,
            })
    }
}

impl LedgerClient for RpcLedgerClient {
    async fn deploy(&self, name: &str, args: &[ResolvedArg]) -> Result<Address, LedgerError> {
        let mut data = self.artifacts.bytecode(name)?;
        data.extend(encode_constructor_args(args));
        let from = self.sender().await?;

        tracing::debug!(
            component = %name,
            from = %from,
            bytes = data.len(),
            "Submitting deployment transaction"
        );

        let tx_hash: B256 = json_rpc_call(
            &self.client,
            &self.url,
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": from,
                "data": format!("0x{}", hex::encode(&data)),
            })],
        )
        .await
        .map_err(RpcFailure::into_ledger_error)?;

        let receipt = self.wait_for_receipt(tx_hash).await?;

        if receipt.status.as_deref() == Some("0x0") {
            return Err(LedgerError::Reverted(format!(
                "transaction {tx_hash} reverted"
            )));
        }

        receipt.contract_address.ok_or_else(|| {
            LedgerError::Reverted(format!(
                "receipt of transaction {tx_hash} has no contract address"
            ))
        })
    }

    async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
        self.cached_accounts().await.cloned()
    }
}
