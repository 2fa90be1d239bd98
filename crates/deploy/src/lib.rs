//! helix-deploy - Deployment library for a Helix sub-to-sub token bridge.
//!
//! This crate plans, deploys and wires the message endpoints, proxied backing and
//! mapping token factory, and the registered token of a bridge between two
//! EVM-compatible chains.

pub mod abi;
pub mod artifacts;

mod cancel;
pub use cancel::{CancelHandle, CancelToken};

pub mod client;
pub use client::{ChainClient, RpcChainClient, TxReceipt, TxRequest};

pub mod config;
pub use config::HelixConfig;

mod deployer;
pub use deployer::Deployer;

pub mod endpoint;
pub use endpoint::{ConfiguredPair, EndpointConfigurator, EndpointSide};

mod error;
pub use error::{DeployError, Result};

pub mod orchestrator;
pub use orchestrator::{
    DeploymentReport, Orchestrator, PipelineError, Step, StepOutcome, StepStatus,
};

pub mod planner;
pub use planner::Salt;

pub mod proxy;
pub use proxy::{ProxyManager, ProxyRequest};

pub mod recovery;
pub use recovery::{FailedTransfer, Recovery};

pub mod relay;
pub use relay::{Poll, RelayWaiter};

mod rpc;

pub mod smoke;
pub use smoke::{SmokeTest, TransferOutcome};

pub mod state;
pub use state::Journal;

mod types;
pub use types::{
    AddressTable, BridgePair, ChainEndpoint, DeployedContract, DeploymentPlan, ProxyInstance,
    RemoteCall, RemoteIdentity, RoleGrant,
};

#[cfg(test)]
pub(crate) mod mock;
