//! Error taxonomy for the deployment pipeline.

use std::time::Duration;

use alloy_core::primitives::{Address, B256};

/// Convenience alias used throughout the crate.
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// Errors produced by the deployment primitives and the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Missing or malformed configuration / registry entry.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// ABI argument / type mismatch while encoding a call or constructor.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// No code at the planned address after the deployment transaction was included.
    #[error("deployment of {contract} left no code at planned address {address} (tx {tx_hash})")]
    DeploymentMismatch {
        contract: String,
        address: Address,
        tx_hash: B256,
    },

    /// A submitted transaction was included but reverted.
    #[error("{call} reverted in tx {tx_hash}: {reason}")]
    TransactionReverted {
        call: String,
        tx_hash: B256,
        reason: String,
    },

    /// Attempt to run a proxy initializer against an existing proxy.
    #[error("proxy {proxy} is already initialized")]
    AlreadyInitialized { proxy: Address },

    /// A role could not be granted.
    #[error("failed to grant role {role} to {grantee}: {reason}")]
    RoleGrantFailure {
        role: B256,
        grantee: Address,
        reason: String,
    },

    /// A polled condition did not become true in time.
    #[error("timed out waiting for {condition} after {polls} polls ({elapsed:?})")]
    PollTimeout {
        condition: String,
        polls: u32,
        elapsed: Duration,
    },

    /// A polled condition reported a permanent failure.
    #[error("relay failed while waiting for {condition}: {reason}")]
    RelayFailed { condition: String, reason: String },

    /// The pipeline was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The deployment journal could not be read or written.
    #[error("state journal error: {0:#}")]
    Journal(anyhow::Error),

    /// Transport or JSON-RPC level failure.
    #[error("rpc {method} failed: {message}")]
    Rpc { method: String, message: String },
}

impl DeployError {
    /// Build a configuration error from anything displayable.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Build an encoding error from anything displayable.
    pub fn encoding(msg: impl std::fmt::Display) -> Self {
        Self::Encoding(msg.to_string())
    }

    /// The message a node attached to a failed call, if this error carries one.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Rpc { message, .. } => Some(message),
            Self::TransactionReverted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
