//! Refunds of transfers whose message was delivered but failed on the target chain.
//!
//! A lock whose issuing failed leaves the original tokens in the backing, and a
//! burn whose unlock failed leaves the mapping tokens destroyed. The target side
//! of the failed message asks the source side, over the same lanes, to undo its
//! half of the transfer. Contracts refuse the request unless the message was
//! delivered and its dispatch failed.

use alloy_core::primitives::{Address, FixedBytes, U256};
use serde::{Deserialize, Serialize};

use crate::{
    abi::{IBacking, IMappingTokenFactory, encode_call},
    cancel::CancelToken,
    client::{ChainClient, TxRequest},
    error::Result,
    relay::RelayWaiter,
    smoke::{TransferOutcome, balance_of, wait_for_balance},
    types::RemoteCall,
};

/// Identifier of a message: the outbound lane of the sending endpoint followed by
/// the message nonce on that lane, e.g. `0x726f6c69000000000000009e`.
pub fn transfer_id(lane: FixedBytes<4>, nonce: u64) -> U256 {
    let mut id = [0u8; 12];
    id[..4].copy_from_slice(lane.as_slice());
    id[4..].copy_from_slice(&nonce.to_be_bytes());
    U256::from_be_slice(&id)
}

/// A transfer to refund, as it was sent on its source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTransfer {
    pub transfer_id: U256,
    /// Token taken from the sender: the original token of a lock, the mapping
    /// token of a burn.
    pub token: Address,
    pub sender: Address,
    pub amount: U256,
}

#[derive(Debug)]
pub struct Recovery<'a, C> {
    backing: &'a C,
    issuing: &'a C,
    waiter: RelayWaiter,
    gas_limit: u64,
}

impl<'a, C: ChainClient> Recovery<'a, C> {
    pub fn new(backing: &'a C, issuing: &'a C, waiter: RelayWaiter, gas_limit: u64) -> Self {
        Self {
            backing,
            issuing,
            waiter,
            gas_limit,
        }
    }

    /// Ask the backing, from the issuing chain, to unlock a lock whose issuing
    /// failed, then wait for the tokens to be back with the sender.
    pub async fn unlock_failed_issue(
        &self,
        factory_proxy: Address,
        transfer: &FailedTransfer,
        remote: &RemoteCall,
        cancel: &CancelToken,
    ) -> Result<TransferOutcome> {
        tracing::info!(
            factory = %factory_proxy,
            transfer_id = %transfer.transfer_id,
            token = %transfer.token,
            sender = %transfer.sender,
            amount = %transfer.amount,
            "Requesting unlock of a failed issue"
        );

        let before = balance_of(self.backing, transfer.token, transfer.sender).await?;
        let data = encode_call(&IMappingTokenFactory::remoteUnlockFailureCall {
            specVersion: remote.spec_version,
            gasLimit: U256::from(remote.gas_limit),
            transferId: transfer.transfer_id,
            originalToken: transfer.token,
            originalSender: transfer.sender,
            amount: transfer.amount,
        });
        let receipt = self
            .issuing
            .transact(
                TxRequest::new("remoteUnlockFailure", factory_proxy, data, self.gas_limit)
                    .with_value(remote.fee),
                cancel,
            )
            .await?;

        let polls = wait_for_balance(
            &self.waiter,
            self.backing,
            transfer.token,
            transfer.sender,
            before + transfer.amount,
            "failed issue unlocked",
            cancel,
        )
        .await?;
        Ok(TransferOutcome {
            tx_hash: receipt.tx_hash,
            amount: transfer.amount,
            polls,
        })
    }

    /// Ask the factory, from the backing chain, to issue again the mapping tokens
    /// of a burn whose unlock failed.
    pub async fn reissue_failed_unlock(
        &self,
        backing_proxy: Address,
        transfer: &FailedTransfer,
        remote: &RemoteCall,
        cancel: &CancelToken,
    ) -> Result<TransferOutcome> {
        tracing::info!(
            backing = %backing_proxy,
            transfer_id = %transfer.transfer_id,
            mapping_token = %transfer.token,
            sender = %transfer.sender,
            amount = %transfer.amount,
            "Requesting issue of a failed unlock"
        );

        let before = balance_of(self.issuing, transfer.token, transfer.sender).await?;
        let data = encode_call(&IBacking::remoteIssuingFailureCall {
            specVersion: remote.spec_version,
            gasLimit: U256::from(remote.gas_limit),
            transferId: transfer.transfer_id,
            mappingToken: transfer.token,
            originalSender: transfer.sender,
            amount: transfer.amount,
        });
        let receipt = self
            .backing
            .transact(
                TxRequest::new("remoteIssuingFailure", backing_proxy, data, self.gas_limit)
                    .with_value(remote.fee),
                cancel,
            )
            .await?;

        let polls = wait_for_balance(
            &self.waiter,
            self.issuing,
            transfer.token,
            transfer.sender,
            before + transfer.amount,
            "failed unlock issued again",
            cancel,
        )
        .await?;
        Ok(TransferOutcome {
            tx_hash: receipt.tx_hash,
            amount: transfer.amount,
            polls,
        })
    }
}
