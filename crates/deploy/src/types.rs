//! Values produced and consumed by the deployment steps.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, B256, Bytes, FixedBytes, U256};
use serde::{Deserialize, Serialize};

use crate::{
    abi::ConstructorArgs,
    error::{DeployError, Result},
    planner::{self, Salt},
};

/// One side of a bridge pair and the dispatch coordinates the relay reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoint {
    /// Registry name of the network, e.g. `pangoro`.
    pub network: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub bridge_network_id: FixedBytes<4>,
    /// Call index of the message-transact call on this chain (sent as `bytes2`).
    pub transact_call_index: u16,
    /// Call index of the send-message dispatch on this chain (sent as `bytes2`).
    pub send_msg_index: u16,
    pub outbound_lane_id: FixedBytes<4>,
    pub storage_key_fee: B256,
    pub storage_key_latest_nonce: B256,
    pub storage_key_delivered_nonce: B256,
}

/// Everything that determines where a contract lands.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentPlan {
    pub contract_name: String,
    pub init_code: Bytes,
    pub constructor_args: ConstructorArgs,
    pub salt: Salt,
}

impl DeploymentPlan {
    pub fn new(
        contract_name: impl Into<String>,
        init_code: Bytes,
        constructor_args: ConstructorArgs,
        salt: Salt,
    ) -> Self {
        Self {
            contract_name: contract_name.into(),
            init_code,
            constructor_args,
            salt,
        }
    }

    /// The planned address for a CREATE2 deployer at `factory`.
    pub fn address(&self, factory: Address) -> Result<Address> {
        planner::plan(factory, self.salt, &self.init_code, &self.constructor_args)
    }

    /// Init code with the encoded constructor arguments appended.
    pub fn creation_code(&self) -> Result<Bytes> {
        planner::creation_code(&self.init_code, &self.constructor_args).map(Bytes::from)
    }
}

/// A contract known to have code at its planned address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    /// Deployment transaction, `None` when the contract was already present.
    pub tx_hash: Option<B256>,
    pub confirmed: bool,
}

/// A transparent upgradeable proxy in front of a logic contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInstance {
    pub proxy_address: Address,
    pub admin_address: Address,
    pub implementation_address: Address,
    pub initializer_calldata: Bytes,
    pub initialized: bool,
}

/// Both message endpoints of a bridge, each aware of the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgePair {
    pub a: ChainEndpoint,
    pub b: ChainEndpoint,
    pub endpoint_a: DeployedContract,
    pub endpoint_b: DeployedContract,
}

/// Remote identity a message endpoint stores about its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub bridge_network_id: FixedBytes<4>,
    pub chain_id: u64,
    pub endpoint: Address,
}

impl RemoteIdentity {
    /// The identity `endpoint` presents to its peer.
    pub fn of(endpoint: &ChainEndpoint, address: Address) -> Self {
        Self {
            bridge_network_id: endpoint.bridge_network_id,
            chain_id: endpoint.chain_id,
            endpoint: address,
        }
    }
}

/// Access-control fact on a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub contract: Address,
    pub role_id: B256,
    pub grantee_address: Address,
    pub granted: bool,
    /// `None` when the role was already held and no transaction was sent.
    pub tx_hash: Option<B256>,
}

/// Parameters of a call dispatched to the remote chain: the runtime spec version and
/// gas limit the remote side executes with, and the fee paid to the relay as value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub spec_version: u32,
    pub gas_limit: u64,
    pub fee: U256,
}

/// Addresses produced so far, keyed by `<network>.<contract>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressTable(BTreeMap<String, Address>);

impl AddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(network: &str, contract: &str) -> String {
        format!("{network}.{contract}")
    }

    pub fn insert(&mut self, network: &str, contract: &str, address: Address) {
        self.0.insert(Self::key(network, contract), address);
    }

    pub fn get(&self, network: &str, contract: &str) -> Option<Address> {
        self.0.get(&Self::key(network, contract)).copied()
    }

    /// Like [`Self::get`] but missing entries are a configuration error.
    pub fn require(&self, network: &str, contract: &str) -> Result<Address> {
        self.get(network, contract).ok_or_else(|| {
            DeployError::config(format!(
                "address of {contract} on {network} is not in the address table"
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Address)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
