//! JSON-RPC backed chain client that signs locally.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use alloy_signer_local::PrivateKeySigner;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::json;

use super::{
    ChainClient, TxReceipt, TxRequest,
    tx::{self, TxParams},
};
use crate::{
    cancel::CancelToken,
    error::{DeployError, Result},
    rpc::{self, json_rpc_call, parse_quantity, quantity},
};

/// Default delay between receipt polls.
pub const DEFAULT_RECEIPT_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of receipt polls before giving up.
pub const DEFAULT_RECEIPT_ATTEMPTS: usize = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "rpc::deserialize_u64_from_hex")]
    block_number: u64,
    #[serde(deserialize_with = "rpc::deserialize_u64_from_hex")]
    gas_used: u64,
    /// Absent on pre-Byzantium chains.
    #[serde(default)]
    status: Option<String>,
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<TxReceipt> {
        let status = match self.status.as_deref() {
            None => true,
            Some(s) => parse_quantity(s).map_err(|message| DeployError::Rpc {
                method: "eth_getTransactionReceipt".to_string(),
                message,
            })? == 1,
        };
        Ok(TxReceipt {
            tx_hash: self.transaction_hash,
            block_number: self.block_number,
            gas_used: self.gas_used,
            status,
        })
    }
}

enum ReceiptPoll {
    Pending,
    Failed(DeployError),
}

/// Client for one chain, bound to the signing account.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    http: reqwest::Client,
    url: String,
    chain_id: u64,
    signer: PrivateKeySigner,
    receipt_interval: Duration,
    receipt_attempts: usize,
}

impl RpcChainClient {
    /// Connect to `url` and check that the node serves `expected_chain_id`.
    pub async fn connect(
        url: &str,
        expected_chain_id: u64,
        signer: PrivateKeySigner,
    ) -> Result<Self> {
        let http = rpc::create_client(rpc::DEFAULT_TIMEOUT)?;
        let reported: String = json_rpc_call(&http, url, "eth_chainId", vec![]).await?;
        let chain_id = parse_quantity(&reported).map_err(|message| DeployError::Rpc {
            method: "eth_chainId".to_string(),
            message,
        })?;

        if chain_id != expected_chain_id {
            return Err(DeployError::config(format!(
                "{url} serves chain {chain_id}, expected {expected_chain_id}"
            )));
        }

        tracing::debug!(url, chain_id, sender = %signer.address(), "Connected to chain");

        Ok(Self {
            http,
            url: url.to_string(),
            chain_id,
            signer,
            receipt_interval: DEFAULT_RECEIPT_INTERVAL,
            receipt_attempts: DEFAULT_RECEIPT_ATTEMPTS,
        })
    }

    /// Override how receipts are polled.
    pub fn with_receipt_polling(mut self, interval: Duration, attempts: usize) -> Self {
        self.receipt_interval = interval;
        self.receipt_attempts = attempts;
        self
    }

    async fn nonce(&self) -> Result<u64> {
        let count: String = json_rpc_call(
            &self.http,
            &self.url,
            "eth_getTransactionCount",
            vec![json!(self.signer.address()), json!("pending")],
        )
        .await?;
        parse_quantity(&count).map_err(|message| DeployError::Rpc {
            method: "eth_getTransactionCount".to_string(),
            message,
        })
    }

    async fn gas_price(&self) -> Result<u128> {
        let price: U256 = json_rpc_call(&self.http, &self.url, "eth_gasPrice", vec![]).await?;
        u128::try_from(price).map_err(|_| DeployError::Rpc {
            method: "eth_gasPrice".to_string(),
            message: format!("gas price {price} out of range"),
        })
    }
}

impl ChainClient for RpcChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Address {
        self.signer.address()
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        json_rpc_call(
            &self.http,
            &self.url,
            "eth_getCode",
            vec![json!(address), json!("latest")],
        )
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        json_rpc_call(
            &self.http,
            &self.url,
            "eth_call",
            vec![json!({ "to": to, "data": data }), json!("latest")],
        )
        .await
    }

    async fn simulate(&self, tx: &TxRequest) -> Result<Bytes> {
        json_rpc_call(
            &self.http,
            &self.url,
            "eth_call",
            vec![
                json!({
                    "from": self.signer.address(),
                    "to": tx.to,
                    "value": tx.value,
                    "data": tx.data,
                    "gas": quantity(tx.gas_limit),
                }),
                json!("latest"),
            ],
        )
        .await
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256> {
        let nonce = self.nonce().await?;
        let gas_price = self.gas_price().await?;

        let raw = tx::sign_raw(
            &self.signer,
            tx,
            TxParams {
                chain_id: self.chain_id,
                nonce,
                gas_price,
            },
        )?;

        tracing::trace!(call = %tx.label, nonce, gas_price, "Sending raw transaction");
        json_rpc_call(&self.http, &self.url, "eth_sendRawTransaction", vec![json!(raw)]).await
    }

    async fn wait_for_receipt(&self, tx_hash: B256, cancel: &CancelToken) -> Result<TxReceipt> {
        let fetch = || async move {
            let receipt: Option<RpcReceipt> = json_rpc_call(
                &self.http,
                &self.url,
                "eth_getTransactionReceipt",
                vec![json!(tx_hash)],
            )
            .await
            .map_err(ReceiptPoll::Failed)?;
            receipt.ok_or(ReceiptPoll::Pending)
        };

        let polled = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.receipt_interval)
                    .with_max_times(self.receipt_attempts),
            )
            .when(|e| matches!(e, ReceiptPoll::Pending));

        let outcome = tokio::select! {
            outcome = polled => outcome,
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
        };

        match outcome {
            Ok(receipt) => receipt.into_receipt(),
            Err(ReceiptPoll::Failed(e)) => Err(e),
            Err(ReceiptPoll::Pending) => {
                let attempts = u32::try_from(self.receipt_attempts).unwrap_or(u32::MAX);
                Err(DeployError::PollTimeout {
                    condition: format!("receipt of {tx_hash}"),
                    polls: attempts.saturating_add(1),
                    elapsed: self.receipt_interval * attempts,
                })
            }
        }
    }
}
