use std::path::PathBuf;

use alloy_core::primitives::{Address, U256};
use clap::{Args, Parser, Subcommand};
use helix_deploy::config::DEFAULT_CONFIG_FILE;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "helix-deployer")]
#[command(
    author,
    version,
    about = "Deploy and wire a Helix token bridge between two chains"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "HELIX_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the deployment configuration file.
    ///
    /// Any entry can be overridden with `HELIX_` prefixed environment variables,
    /// nested keys being separated by `__` (e.g. `HELIX_RELAY__MAX_WAIT_SECS`).
    #[arg(short, long, alias = "conf", env = "HELIX_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Hex-encoded private key of the account signing on both chains.
    #[arg(long, env = "HELIX_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Where to persist deployment progress.
    ///
    /// Defaults to the `state_file` entry of the configuration.
    #[arg(long, env = "HELIX_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Ignore any saved progress and run every step again.
    #[arg(long, env = "HELIX_FRESH")]
    pub fresh: bool,

    /// Skip the lock and burn transfers run after the token registration.
    #[arg(long, env = "HELIX_SKIP_SMOKE_TEST")]
    pub skip_smoke_test: bool,

    /// Deploys the bridge when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Refund a transfer whose message was delivered but failed on the other chain.
    ///
    /// Addresses are read from the state file of the deployment.
    #[command(subcommand)]
    Recover(RecoverCmd),
}

#[derive(Subcommand)]
pub enum RecoverCmd {
    /// Unlock on the backing chain the tokens of a lock whose issuing failed.
    UnlockFailedIssue(FailedTransferArgs),
    /// Issue again on the issuing chain the mapping tokens of a burn whose unlock failed.
    ReissueFailedUnlock(FailedTransferArgs),
}

#[derive(Args)]
pub struct FailedTransferArgs {
    /// Id of the failed message, e.g. `0x726f6c69000000000000009e`.
    #[arg(long)]
    pub transfer_id: U256,

    /// Amount of the transfer, in wei.
    #[arg(long)]
    pub amount: U256,

    /// Account the tokens were taken from. Defaults to the signing account.
    #[arg(long)]
    pub sender: Option<Address>,
}
