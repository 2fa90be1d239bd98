//! End-to-end transfers across a freshly wired bridge.

use alloy_core::primitives::{Address, B256, U256};

use crate::{
    abi::{IBacking, IErc20, IMappingTokenFactory, encode_call},
    cancel::CancelToken,
    client::{ChainClient, TxRequest},
    error::Result,
    relay::{Poll, RelayWaiter},
    types::RemoteCall,
};

/// A transfer that was relayed and observed on the other chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub tx_hash: B256,
    pub amount: U256,
    /// Balance polls until the transfer was observed.
    pub polls: u32,
}

pub async fn balance_of<C: ChainClient>(
    client: &C,
    token: Address,
    holder: Address,
) -> Result<U256> {
    client.view(token, IErc20::balanceOfCall { account: holder }).await
}

/// Poll the balance of `holder` until it reaches `target`.
pub(crate) async fn wait_for_balance<C: ChainClient>(
    waiter: &RelayWaiter,
    client: &C,
    token: Address,
    holder: Address,
    target: U256,
    condition: &str,
    cancel: &CancelToken,
) -> Result<u32> {
    waiter
        .wait_until(
            condition,
            move || async move {
                let balance = balance_of(client, token, holder).await?;
                tracing::debug!(
                    token = %token,
                    holder = %holder,
                    balance = %balance,
                    target = %target,
                    "Polled balance"
                );
                Ok(if balance >= target { Poll::Ready } else { Poll::Pending })
            },
            cancel,
        )
        .await
}

/// Sends value from the backing chain to the issuing chain and back.
///
/// The same account signs on both chains and receives on both chains.
#[derive(Debug)]
pub struct SmokeTest<'a, C> {
    backing: &'a C,
    issuing: &'a C,
    waiter: RelayWaiter,
    gas_limit: u64,
}

impl<'a, C: ChainClient> SmokeTest<'a, C> {
    pub fn new(backing: &'a C, issuing: &'a C, waiter: RelayWaiter, gas_limit: u64) -> Self {
        Self {
            backing,
            issuing,
            waiter,
            gas_limit,
        }
    }

    /// Wrap `amount` of native currency, lock it in the backing and wait for the
    /// mapping token to be issued on the issuing chain.
    pub async fn lock_and_remote_issue(
        &self,
        backing_proxy: Address,
        token: Address,
        mapping_token: Address,
        amount: U256,
        remote: &RemoteCall,
        cancel: &CancelToken,
    ) -> Result<TransferOutcome> {
        let recipient = self.issuing.sender();
        tracing::info!(
            backing = %backing_proxy,
            token = %token,
            recipient = %recipient,
            amount = %amount,
            "Locking and issuing remotely"
        );

        let deposit = encode_call(&IErc20::depositCall {});
        self.backing
            .transact(
                TxRequest::new("WToken.deposit", token, deposit, self.gas_limit).with_value(amount),
                cancel,
            )
            .await?;
        self.approve(self.backing, token, backing_proxy, amount, cancel).await?;

        let before = balance_of(self.issuing, mapping_token, recipient).await?;
        let data = encode_call(&IBacking::lockAndRemoteIssuingCall {
            specVersion: remote.spec_version,
            gasLimit: U256::from(remote.gas_limit),
            token,
            recipient,
            amount,
        });
        let receipt = self
            .backing
            .transact(
                TxRequest::new("lockAndRemoteIssuing", backing_proxy, data, self.gas_limit)
                    .with_value(remote.fee),
                cancel,
            )
            .await?;

        let polls = wait_for_balance(
            &self.waiter,
            self.issuing,
            mapping_token,
            recipient,
            before + amount,
            "mapping token issued",
            cancel,
        )
        .await?;
        Ok(TransferOutcome {
            tx_hash: receipt.tx_hash,
            amount,
            polls,
        })
    }

    /// Burn `amount` of the mapping token and wait for the original token to be
    /// unlocked on the backing chain.
    pub async fn burn_and_remote_unlock(
        &self,
        factory_proxy: Address,
        mapping_token: Address,
        token: Address,
        amount: U256,
        remote: &RemoteCall,
        cancel: &CancelToken,
    ) -> Result<TransferOutcome> {
        let recipient = self.backing.sender();
        tracing::info!(
            factory = %factory_proxy,
            mapping_token = %mapping_token,
            recipient = %recipient,
            amount = %amount,
            "Burning and unlocking remotely"
        );

        self.approve(self.issuing, mapping_token, factory_proxy, amount, cancel)
            .await?;

        let before = balance_of(self.backing, token, recipient).await?;
        let data = encode_call(&IMappingTokenFactory::burnAndRemoteUnlockCall {
            specVersion: remote.spec_version,
            gasLimit: U256::from(remote.gas_limit),
            mappingToken: mapping_token,
            recipient,
            amount,
        });
        let receipt = self
            .issuing
            .transact(
                TxRequest::new("burnAndRemoteUnlock", factory_proxy, data, self.gas_limit)
                    .with_value(remote.fee),
                cancel,
            )
            .await?;

        let polls = wait_for_balance(
            &self.waiter,
            self.backing,
            token,
            recipient,
            before + amount,
            "original token unlocked",
            cancel,
        )
        .await?;
        Ok(TransferOutcome {
            tx_hash: receipt.tx_hash,
            amount,
            polls,
        })
    }

    async fn approve(
        &self,
        client: &C,
        token: Address,
        spender: Address,
        amount: U256,
        cancel: &CancelToken,
    ) -> Result<()> {
        let data = encode_call(&IErc20::approveCall { spender, amount });
        client
            .transact(TxRequest::new("approve", token, data, self.gas_limit), cancel)
            .await?;
        Ok(())
    }
}
