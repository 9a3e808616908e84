//! plinth deploys a set of interdependent contracts in dependency order and
//! reports their addresses.

mod cli;
mod config;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;

use cli::{Cli, Command};
use config::PlinthConfig;
use plinth_deploy::{AccountsResolver, ArtifactStore, Executor, LedgerClient, RpcLedgerClient};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut config = PlinthConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Plan => {
            let plan = plinth_deploy::plan(&config.components)?;
            tracing::info!(
                components = plan.len(),
                fingerprint = %plan.fingerprint(),
                "Deployment plan"
            );
            println!("{}", plan.render_table());
        }
        Command::Deploy(args) => {
            args.apply(&mut config);
            deploy(config).await?;
        }
    }

    Ok(())
}

async fn deploy(config: PlinthConfig) -> Result<()> {
    tracing::info!(
        rpc_url = %config.rpc_url,
        artifacts_dir = %config.artifacts_dir.display(),
        components = config.components.len(),
        "Starting deployment process..."
    );

    let mut ledger = RpcLedgerClient::new(
        config.rpc_url.clone(),
        ArtifactStore::new(&config.artifacts_dir),
    )?
    .confirmation_timeout(Duration::from_secs(config.confirmation_timeout_secs));
    if let Some(deployer) = config.deployer {
        ledger = ledger.deployer(deployer);
    }

    let accounts = ledger
        .accounts()
        .await
        .context("Failed to fetch ledger accounts")?;
    tracing::debug!(accounts = accounts.len(), "Ledger accounts fetched");

    // Ctrl+C stops the run before the next deployment is submitted.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received, stopping after the current deployment...");
            let _ = cancel_tx.send(true);
        }
    });

    let executor = Executor::new(ledger)
        .resolver(AccountsResolver::new(accounts))
        .policy(config.failure_policy)
        .cancel_on(cancel_rx);

    let report = plinth_deploy::deploy(&config.components, &executor).await?;

    println!("{}", report.render_table());

    if let Some(path) = &config.addresses_out {
        report.save_addresses(path)?;
    }

    let report = report.into_result()?;

    tracing::info!("✓ Deployment complete!");
    for (name, address) in report.addresses() {
        tracing::info!("{:<32} {}", name, address);
    }

    Ok(())
}
