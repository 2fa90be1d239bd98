//! Legacy transactions with EIP-155 replay protection, signed with the local key.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Bytes, TxKind};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_signer_local::PrivateKeySigner;

use super::TxRequest;
use crate::error::{DeployError, Result};

/// Nonce and gas price fetched from the node for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TxParams {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
}

pub(crate) fn legacy_transaction(tx: &TxRequest, params: TxParams) -> TxLegacy {
    TxLegacy {
        chain_id: Some(params.chain_id),
        nonce: params.nonce,
        gas_price: params.gas_price,
        gas_limit: tx.gas_limit,
        to: TxKind::Call(tx.to),
        value: tx.value,
        input: tx.data.clone(),
    }
}

/// Sign `tx` and return the raw bytes for `eth_sendRawTransaction`.
pub(crate) fn sign_raw(
    signer: &PrivateKeySigner,
    tx: &TxRequest,
    params: TxParams,
) -> Result<Bytes> {
    let mut unsigned = legacy_transaction(tx, params);
    let signature = signer
        .sign_transaction_sync(&mut unsigned)
        .map_err(|e| DeployError::encoding(format!("failed to sign {}: {e}", tx.label)))?;
    let envelope = TxEnvelope::from(unsigned.into_signed(signature));
    Ok(envelope.encoded_2718().into())
}
