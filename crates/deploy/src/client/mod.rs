//! Per-chain client session.
//!
//! Every component receives the client of the chain it acts on explicitly; there is
//! no process-wide provider or wallet.

mod http;
mod tx;

use std::future::Future;

use alloy_core::{
    primitives::{Address, B256, Bytes, U256},
    sol_types::SolCall,
};

pub use http::RpcChainClient;

use crate::{
    abi::{decode_returns, encode_call},
    cancel::CancelToken,
    error::{DeployError, Result},
};

/// A state-changing call to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// Human readable name of the call, used in logs and errors.
    pub label: String,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
}

impl TxRequest {
    pub fn new(label: impl Into<String>, to: Address, data: Bytes, gas_limit: u64) -> Self {
        Self {
            label: label.into(),
            to,
            value: U256::ZERO,
            data,
            gas_limit,
        }
    }

    /// Attach native value to the call.
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Inclusion result of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub status: bool,
}

/// Submit-and-confirm access to one chain.
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Address of the signing account.
    fn sender(&self) -> Address;

    fn get_code(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;

    /// Read-only call against the latest state.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Execute `tx` as a read-only call from the sender, used to recover revert reasons.
    fn simulate(&self, tx: &TxRequest) -> impl Future<Output = Result<Bytes>> + Send;

    /// Sign and submit `tx`, returning its hash without waiting for inclusion.
    fn send_transaction(&self, tx: &TxRequest) -> impl Future<Output = Result<B256>> + Send;

    fn wait_for_receipt(
        &self,
        tx_hash: B256,
        cancel: &CancelToken,
    ) -> impl Future<Output = Result<TxReceipt>> + Send;

    /// Typed read-only call.
    fn view<T>(&self, to: Address, call: T) -> impl Future<Output = Result<T::Return>> + Send
    where
        T: SolCall + Send,
        T::Return: Send,
    {
        async move {
            let data = self.call(to, encode_call(&call)).await?;
            decode_returns::<T>(&data)
        }
    }

    fn has_code(&self, address: Address) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(!self.get_code(address).await?.is_empty()) }
    }

    /// Submit `tx`, wait for inclusion and turn a failed receipt into
    /// [`DeployError::TransactionReverted`].
    fn transact(
        &self,
        tx: TxRequest,
        cancel: &CancelToken,
    ) -> impl Future<Output = Result<TxReceipt>> + Send {
        async move {
            cancel.check()?;
            let tx_hash = self.send_transaction(&tx).await?;
            tracing::debug!(
                call = %tx.label,
                to = %tx.to,
                tx_hash = %tx_hash,
                "Transaction submitted"
            );

            let receipt = self.wait_for_receipt(tx_hash, cancel).await?;
            if receipt.status {
                tracing::info!(
                    call = %tx.label,
                    tx_hash = %tx_hash,
                    block = receipt.block_number,
                    "Transaction confirmed"
                );
                return Ok(receipt);
            }

            // Replaying against the latest state is best effort.
            let reason = match self.simulate(&tx).await {
                Ok(_) => "reverted without a reason".to_string(),
                Err(e) => e.revert_reason().map(str::to_string).unwrap_or_else(|| e.to_string()),
            };
            tracing::error!(
                call = %tx.label,
                tx_hash = %tx_hash,
                reason = %reason,
                "Transaction reverted"
            );
            Err(DeployError::TransactionReverted {
                call: tx.label,
                tx_hash,
                reason,
            })
        }
    }
}
