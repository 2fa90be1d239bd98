//! Symmetric configuration of a pair of message endpoints and dispatch role grants.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, FixedBytes},
};

use crate::{
    abi::{ConstructorArgs, IAccessControl, IMessageEndpoint, encode_call},
    artifacts,
    cancel::CancelToken,
    client::{ChainClient, TxRequest},
    error::{DeployError, Result},
    planner::Salt,
    types::{BridgePair, ChainEndpoint, DeployedContract, DeploymentPlan, RemoteIdentity, RoleGrant},
};

fn bytes4(value: FixedBytes<4>) -> DynSolValue {
    DynSolValue::FixedBytes(B256::right_padding_from(value.as_slice()), 4)
}

/// Plan of the message endpoint of `local`: its own outbound lane, the peer's
/// outbound lane as inbound lane, and the admin allowed to configure it.
pub fn endpoint_plan(
    init_code: Bytes,
    local: &ChainEndpoint,
    remote: &ChainEndpoint,
    admin: Address,
    salt: Salt,
) -> Result<DeploymentPlan> {
    let args = ConstructorArgs::new(
        "(bytes4,bytes4,address)",
        vec![
            bytes4(local.outbound_lane_id),
            bytes4(remote.outbound_lane_id),
            DynSolValue::Address(admin),
        ],
    )?;
    Ok(DeploymentPlan::new(artifacts::MESSAGE_ENDPOINT, init_code, args, salt))
}

/// One endpoint of the pair as seen from its own chain.
#[derive(Debug)]
pub struct EndpointSide<'a, C> {
    pub client: &'a C,
    pub endpoint: &'a ChainEndpoint,
    pub contract: DeployedContract,
    /// Contracts that must be able to dispatch through this endpoint.
    pub dispatchers: Vec<Address>,
}

impl<C: ChainClient> EndpointSide<'_, C> {
    fn address(&self) -> Address {
        self.contract.address
    }

    fn check_chain(&self) -> Result<()> {
        if self.client.chain_id() != self.endpoint.chain_id {
            return Err(DeployError::config(format!(
                "client for {} is connected to chain {}, expected {}",
                self.endpoint.network,
                self.client.chain_id(),
                self.endpoint.chain_id
            )));
        }
        Ok(())
    }
}

/// Result of configuring both endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredPair {
    pub pair: BridgePair,
    pub role_grants: Vec<RoleGrant>,
}

/// Issues the setter sequence and role grants of a bridge pair.
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfigurator {
    gas_limit: u64,
}

impl EndpointConfigurator {
    pub fn new(gas_limit: u64) -> Self {
        Self { gas_limit }
    }

    /// The ordered setter calls making the endpoint at `local_address` point at the
    /// endpoint of `remote` deployed at `remote_address`.
    pub fn setter_calls(
        &self,
        local_address: Address,
        local: &ChainEndpoint,
        remote: &ChainEndpoint,
        remote_address: Address,
    ) -> Vec<TxRequest> {
        let calls = [
            (
                "setRemoteHelix",
                encode_call(&IMessageEndpoint::setRemoteHelixCall {
                    remoteBridgeNetworkId: remote.bridge_network_id,
                    remoteChainId: remote.chain_id,
                    remoteHelix: remote_address,
                }),
            ),
            (
                "setRemoteCallIndex",
                encode_call(&IMessageEndpoint::setRemoteCallIndexCall {
                    remoteMessageTransactCallIndex: FixedBytes::new(
                        remote.transact_call_index.to_be_bytes(),
                    ),
                }),
            ),
            (
                "setLocalCallInfo",
                encode_call(&IMessageEndpoint::setLocalCallInfoCall {
                    callIndexOfSendMessage: FixedBytes::new(local.send_msg_index.to_be_bytes()),
                }),
            ),
            (
                "setLocalStorageKey",
                encode_call(&IMessageEndpoint::setLocalStorageKeyCall {
                    storageKeyForMarketFee: local.storage_key_fee,
                    storageKeyForLatestNonce: local.storage_key_latest_nonce,
                    storageKeyForLastDeliveredNonce: local.storage_key_delivered_nonce,
                }),
            ),
        ];

        calls
            .into_iter()
            .map(|(name, data)| {
                let label = format!("{}.{name}", local.network);
                TxRequest::new(label, local_address, data, self.gas_limit)
            })
            .collect()
    }

    /// Run the setter sequence on one endpoint. The first revert aborts the rest;
    /// setters already applied stay in place.
    pub async fn configure_endpoint<C: ChainClient>(
        &self,
        client: &C,
        local_address: Address,
        local: &ChainEndpoint,
        remote: &ChainEndpoint,
        remote_address: Address,
        cancel: &CancelToken,
    ) -> Result<()> {
        tracing::info!(
            network = %local.network,
            endpoint = %local_address,
            remote_network = %remote.network,
            remote_endpoint = %remote_address,
            "Configuring message endpoint"
        );
        for call in self.setter_calls(local_address, local, remote, remote_address) {
            client.transact(call, cancel).await?;
        }
        Ok(())
    }

    /// Configure endpoint A, then endpoint B, then grant dispatch roles on both.
    pub async fn configure_pair<C: ChainClient>(
        &self,
        a: EndpointSide<'_, C>,
        b: EndpointSide<'_, C>,
        cancel: &CancelToken,
    ) -> Result<ConfiguredPair> {
        a.check_chain()?;
        b.check_chain()?;

        self.configure_endpoint(a.client, a.address(), a.endpoint, b.endpoint, b.address(), cancel)
            .await?;
        self.configure_endpoint(b.client, b.address(), b.endpoint, a.endpoint, a.address(), cancel)
            .await?;

        let mut role_grants = self.grant_dispatch_roles(&a, cancel).await?;
        role_grants.extend(self.grant_dispatch_roles(&b, cancel).await?);

        Ok(ConfiguredPair {
            pair: BridgePair {
                a: a.endpoint.clone(),
                b: b.endpoint.clone(),
                endpoint_a: a.contract,
                endpoint_b: b.contract,
            },
            role_grants,
        })
    }

    /// Grant the endpoint's `CALLER_ROLE` to every dispatcher of `side`.
    pub async fn grant_dispatch_roles<C: ChainClient>(
        &self,
        side: &EndpointSide<'_, C>,
        cancel: &CancelToken,
    ) -> Result<Vec<RoleGrant>> {
        let role = side
            .client
            .view(side.address(), IMessageEndpoint::CALLER_ROLECall {})
            .await?;

        let mut grants = Vec::with_capacity(side.dispatchers.len());
        for dispatcher in &side.dispatchers {
            grants.push(
                self.grant_role(side.client, side.address(), role, *dispatcher, cancel)
                    .await?,
            );
        }
        Ok(grants)
    }

    /// Grant `role` on `contract` unless `grantee` already holds it.
    pub async fn grant_role<C: ChainClient>(
        &self,
        client: &C,
        contract: Address,
        role: B256,
        grantee: Address,
        cancel: &CancelToken,
    ) -> Result<RoleGrant> {
        if has_role(client, contract, role, grantee).await? {
            tracing::debug!(
                contract = %contract,
                role = %role,
                grantee = %grantee,
                "Role already held"
            );
            return Ok(RoleGrant {
                contract,
                role_id: role,
                grantee_address: grantee,
                granted: true,
                tx_hash: None,
            });
        }

        let data = encode_call(&IAccessControl::grantRoleCall {
            role,
            account: grantee,
        });
        let receipt = client
            .transact(TxRequest::new("grantRole", contract, data, self.gas_limit), cancel)
            .await
            .map_err(|e| match e {
                DeployError::TransactionReverted { reason, .. } => DeployError::RoleGrantFailure {
                    role,
                    grantee,
                    reason,
                },
                other => other,
            })?;

        if !has_role(client, contract, role, grantee).await? {
            return Err(DeployError::RoleGrantFailure {
                role,
                grantee,
                reason: format!("role not held after tx {}", receipt.tx_hash),
            });
        }

        tracing::info!(contract = %contract, role = %role, grantee = %grantee, "Role granted");
        Ok(RoleGrant {
            contract,
            role_id: role,
            grantee_address: grantee,
            granted: true,
            tx_hash: Some(receipt.tx_hash),
        })
    }

    /// Read back both endpoints and check each points at the other.
    pub async fn verify_symmetry<C: ChainClient>(
        &self,
        a: &EndpointSide<'_, C>,
        b: &EndpointSide<'_, C>,
    ) -> Result<()> {
        for (local, remote) in [(a, b), (b, a)] {
            let stored = read_remote_identity(local.client, local.address()).await?;
            let expected = RemoteIdentity::of(remote.endpoint, remote.address());
            if stored != expected {
                return Err(DeployError::config(format!(
                    "endpoint {} on {} stores remote {stored:?}, expected {expected:?}",
                    local.address(),
                    local.endpoint.network
                )));
            }
        }
        Ok(())
    }
}

pub async fn has_role<C: ChainClient>(
    client: &C,
    contract: Address,
    role: B256,
    account: Address,
) -> Result<bool> {
    client.view(contract, IAccessControl::hasRoleCall { role, account }).await
}

/// Remote identity stored on the endpoint at `endpoint`.
pub async fn read_remote_identity<C: ChainClient>(
    client: &C,
    endpoint: Address,
) -> Result<RemoteIdentity> {
    Ok(RemoteIdentity {
        bridge_network_id: client
            .view(endpoint, IMessageEndpoint::remoteBridgeNetworkIdCall {})
            .await?,
        chain_id: client.view(endpoint, IMessageEndpoint::remoteChainIdCall {}).await?,
        endpoint: client.view(endpoint, IMessageEndpoint::remoteHelixCall {}).await?,
    })
}
