//! helix-deployer deploys the message endpoints, backing and mapping token factory
//! of a Helix bridge and registers its first token.

mod cli;

use std::str::FromStr;

use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, FailedTransferArgs, RecoverCmd};
use helix_deploy::{
    AddressTable, CancelToken, ChainClient, DeploymentReport, FailedTransfer, HelixConfig,
    Journal, Orchestrator, Recovery, RpcChainClient, artifacts::BridgeArtifacts,
    orchestrator::keys,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = HelixConfig::load(&cli.config)?;
    let signer = PrivateKeySigner::from_str(cli.private_key.trim_start_matches("0x"))
        .context("Invalid private key")?;
    let state_file = cli.state_file.clone().unwrap_or_else(|| config.state_file.clone());

    tracing::info!(
        config_path = %cli.config.display(),
        state_file = %state_file.display(),
        backing = %config.pair.backing,
        issuing = %config.pair.issuing,
        sender = %signer.address(),
        "Loading deployment from config file..."
    );

    let backing_network = config.backing_network()?;
    let backing = RpcChainClient::connect(
        &backing_network.rpc_url,
        backing_network.chain_id,
        signer.clone(),
    )
    .await
    .with_context(|| format!("Failed to connect to {}", config.pair.backing))?;
    let issuing_network = config.issuing_network()?;
    let issuing =
        RpcChainClient::connect(&issuing_network.rpc_url, issuing_network.chain_id, signer)
            .await
            .with_context(|| format!("Failed to connect to {}", config.pair.issuing))?;

    let (handle, cancel) = CancelToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current operation");
            handle.cancel();
        }
    });

    if let Some(Command::Recover(cmd)) = cli.command {
        let journal = Journal::load_from_file(&state_file)
            .context("Recovery needs the state file of the deployment")?;
        return recover(cmd, &config, &journal.addresses, &backing, &issuing, &cancel).await;
    }

    let artifacts = BridgeArtifacts::load(&config.artifacts, &config.contracts)?;
    let orchestrator = Orchestrator::new(config, artifacts, backing, issuing)
        .with_journal(state_file)
        .fresh(cli.fresh)
        .skip_smoke(cli.skip_smoke_test);

    match orchestrator.run(&cancel).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            if !err.table.is_empty() {
                println!("{}", address_table(&err.table));
            }
            Err(err.into())
        }
    }
}

async fn recover(
    cmd: RecoverCmd,
    config: &HelixConfig,
    addresses: &AddressTable,
    backing: &RpcChainClient,
    issuing: &RpcChainClient,
    cancel: &CancelToken,
) -> Result<()> {
    let (backing_network, issuing_network) = (&config.pair.backing, &config.pair.issuing);
    let failed = |args: FailedTransferArgs, token| FailedTransfer {
        transfer_id: args.transfer_id,
        token,
        sender: args.sender.unwrap_or_else(|| backing.sender()),
        amount: args.amount,
    };
    let recovery = Recovery::new(backing, issuing, config.relay.waiter(), config.gas.call);

    let outcome = match cmd {
        RecoverCmd::UnlockFailedIssue(args) => {
            let transfer = failed(args, addresses.require(backing_network, keys::WRAPPED_TOKEN)?);
            recovery
                .unlock_failed_issue(
                    addresses.require(issuing_network, keys::FACTORY_PROXY)?,
                    &transfer,
                    &config.remote_call(issuing_network)?,
                    cancel,
                )
                .await?
        }
        RecoverCmd::ReissueFailedUnlock(args) => {
            let transfer = failed(args, addresses.require(issuing_network, keys::MAPPING_TOKEN)?);
            recovery
                .reissue_failed_unlock(
                    addresses.require(backing_network, keys::BACKING_PROXY)?,
                    &transfer,
                    &config.remote_call(backing_network)?,
                    cancel,
                )
                .await?
        }
    };

    tracing::info!(
        tx_hash = %outcome.tx_hash,
        amount = %outcome.amount,
        polls = outcome.polls,
        "Transfer refunded"
    );
    Ok(())
}

fn address_table(addresses: &AddressTable) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Network", "Contract", "Address"]);
    for (key, address) in addresses.iter() {
        let (network, contract) = key.split_once('.').unwrap_or((key.as_str(), ""));
        table.add_row(vec![network.to_string(), contract.to_string(), address.to_string()]);
    }
    table
}

fn print_report(report: &DeploymentReport) {
    let mut steps = Table::new();
    steps.load_preset(UTF8_FULL).set_header(vec!["Step", "Status", "Elapsed"]);
    for outcome in &report.outcomes {
        steps.add_row(vec![
            outcome.step.to_string(),
            outcome.status.to_string(),
            format!("{:.1?}", outcome.elapsed),
        ]);
    }
    println!("{steps}");
    println!("{}", address_table(&report.table));

    for transfer in &report.transfers {
        tracing::info!(
            tx_hash = %transfer.tx_hash,
            amount = %transfer.amount,
            polls = transfer.polls,
            "Transfer relayed"
        );
    }
}
