//! Idempotent deploy-if-absent through a CREATE2 deployer contract.

use alloy_core::primitives::Address;

use crate::{
    abi::{ICreate2Deployer, encode_call},
    cancel::CancelToken,
    client::{ChainClient, TxRequest},
    error::{DeployError, Result},
    types::{DeployedContract, DeploymentPlan},
};

/// Places contracts at their planned address on one chain.
#[derive(Debug)]
pub struct Deployer<'a, C> {
    client: &'a C,
    factory: Address,
}

impl<'a, C: ChainClient> Deployer<'a, C> {
    /// A deployer submitting through the CREATE2 deployer contract at `factory`.
    pub fn new(client: &'a C, factory: Address) -> Self {
        Self { client, factory }
    }

    pub fn client(&self) -> &'a C {
        self.client
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    /// Address the plan lands at on this chain.
    pub fn plan_address(&self, plan: &DeploymentPlan) -> Result<Address> {
        plan.address(self.factory)
    }

    /// Deploy `plan` unless code already exists at its planned address.
    ///
    /// Submits zero or one transaction. When a transaction is sent, the planned
    /// address is re-read afterwards and a missing contract is reported as
    /// [`DeployError::DeploymentMismatch`].
    pub async fn deploy_if_absent(
        &self,
        plan: &DeploymentPlan,
        gas_limit: u64,
        cancel: &CancelToken,
    ) -> Result<DeployedContract> {
        let address = self.plan_address(plan)?;
        let chain_id = self.client.chain_id();

        if self.client.has_code(address).await? {
            tracing::info!(
                contract = %plan.contract_name,
                address = %address,
                chain_id,
                "Contract already deployed, skipping"
            );
            return Ok(DeployedContract {
                name: plan.contract_name.clone(),
                address,
                tx_hash: None,
                confirmed: true,
            });
        }

        if !self.client.has_code(self.factory).await? {
            return Err(DeployError::config(format!(
                "no CREATE2 deployer at {} on chain {chain_id}",
                self.factory
            )));
        }

        tracing::info!(
            contract = %plan.contract_name,
            address = %address,
            salt = %plan.salt,
            chain_id,
            "Deploying contract"
        );

        let data = encode_call(&ICreate2Deployer::deployCall {
            bytecode: plan.creation_code()?,
            salt: plan.salt.as_b256(),
        });
        let receipt = self
            .client
            .transact(
                TxRequest::new(
                    format!("deploy {}", plan.contract_name),
                    self.factory,
                    data,
                    gas_limit,
                ),
                cancel,
            )
            .await?;

        if !self.client.has_code(address).await? {
            return Err(DeployError::DeploymentMismatch {
                contract: plan.contract_name.clone(),
                address,
                tx_hash: receipt.tx_hash,
            });
        }

        Ok(DeployedContract {
            name: plan.contract_name.clone(),
            address,
            tx_hash: Some(receipt.tx_hash),
            confirmed: true,
        })
    }
}
