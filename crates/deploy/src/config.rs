//! Network registry and bridge configuration.
//!
//! Loaded once at startup from a TOML file merged with `HELIX_`-prefixed
//! environment variables (`__` separates nested keys, e.g. `HELIX_GAS__CALL`).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, FixedBytes, U256, utils::parse_ether};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    abi::ConstructorArgs,
    error::{DeployError, Result},
    planner::Salt,
    relay::RelayWaiter,
    types::{ChainEndpoint, RemoteCall},
};

/// Prefix of environment variables overriding the file.
pub const ENV_PREFIX: &str = "HELIX_";

/// Default name of the configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "helix.toml";

/// Accept `"1.5"`, `1.5` or `10000` and read it as an amount of ether.
fn deserialize_ether<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Int(u64),
        Float(f64),
        Text(String),
    }

    let text = match Amount::deserialize(deserializer)? {
        Amount::Int(n) => n.to_string(),
        Amount::Float(f) => f.to_string(),
        Amount::Text(s) => s,
    };
    parse_ether(text.trim())
        .map_err(|e| serde::de::Error::custom(format!("invalid ether amount `{text}`: {e}")))
}

/// One entry of the network registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// CREATE2 deployer contract available on this network.
    pub create2_deployer: Address,
    /// Name the peer's backing uses for this network in `setChainName`.
    #[serde(default)]
    pub chain_name: Option<String>,
    /// Existing proxy admin to reuse instead of deploying one.
    #[serde(default)]
    pub proxy_admin: Option<Address>,
    /// Addresses already deployed, keyed by contract name. Each one must match the
    /// planned address.
    #[serde(default)]
    pub known: BTreeMap<String, Address>,
}

/// Dispatch coordinates of one side of the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub bridge_network_id: FixedBytes<4>,
    pub transact_call_index: u16,
    pub send_msg_index: u16,
    pub outbound_lane_id: FixedBytes<4>,
    pub storage_key_fee: B256,
    pub storage_key_latest_nonce: B256,
    pub storage_key_delivered_nonce: B256,
    /// Runtime spec version of the peer executing messages sent from this side.
    pub remote_spec_version: u32,
    /// Gas the peer may spend executing a message sent from this side.
    #[serde(default = "default_remote_gas_limit")]
    pub remote_gas_limit: u64,
    /// Relay fee paid as value with every dispatched message.
    #[serde(deserialize_with = "deserialize_ether")]
    pub dispatch_fee: U256,
}

fn default_remote_gas_limit() -> u64 {
    1_000_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    /// Network hosting the backing (lock side).
    pub backing: String,
    /// Network hosting the mapping token factory (mint side).
    pub issuing: String,
}

/// Gas limits attached to submitted transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub call: u64,
    pub deploy: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            call: 1_000_000,
            deploy: 8_000_000,
        }
    }
}

/// The wrapped native token registered on the backing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(deserialize_with = "deserialize_ether")]
    pub daily_limit: U256,
    /// Gas the issuing chain may spend creating the mapping token.
    #[serde(default = "default_register_gas_limit")]
    pub register_gas_limit: u64,
}

fn default_decimals() -> u8 {
    18
}

fn default_register_gas_limit() -> u64 {
    5_000_000
}

/// Bounds of every wait on the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub poll_interval_ms: u64,
    pub max_wait_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            max_wait_secs: 600,
        }
    }
}

impl RelayConfig {
    pub fn waiter(&self) -> RelayWaiter {
        RelayWaiter::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_secs(self.max_wait_secs),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Native amount wrapped, locked and issued on the other side.
    #[serde(deserialize_with = "deserialize_ether")]
    pub lock_amount: U256,
    /// Burn the issued amount again and wait for the unlock.
    #[serde(default = "default_true")]
    pub burn_back: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1.5 ether
            lock_amount: U256::from(1_500_000_000_000_000_000u128),
            burn_back: true,
        }
    }
}

/// A contract outside the bridge deployed through the CREATE2 deployer of one side,
/// such as a guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Key of the deployed address in the address table.
    pub name: String,
    pub network: String,
    /// Artifact holding the init code, `name` when omitted.
    #[serde(default)]
    pub artifact: Option<String>,
    /// Overrides the salt of the run for this contract.
    #[serde(default)]
    pub salt: Option<Salt>,
    /// Constructor parameter types, e.g. `["address[]", "uint256"]`.
    #[serde(default)]
    pub types: Vec<String>,
    /// Constructor arguments in the textual form of their type.
    #[serde(default)]
    pub values: Vec<String>,
}

impl ContractConfig {
    pub fn artifact(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.name)
    }

    pub fn constructor_args(&self) -> Result<ConstructorArgs> {
        ConstructorArgs::from_strs(&self.types, &self.values)
    }
}

/// Complete configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixConfig {
    /// Label or 0x-prefixed 32-byte value salting every deployment.
    pub salt: Salt,
    /// Directory holding the compiled contract artifacts.
    pub artifacts: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default)]
    pub gas: GasConfig,
    pub networks: BTreeMap<String, NetworkConfig>,
    pub pair: PairConfig,
    pub endpoints: BTreeMap<String, EndpointConfig>,
    pub token: TokenConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub smoke: SmokeConfig,
    /// Deployed after the bridge, in order.
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("helix-state.json")
}

impl HelixConfig {
    /// Load `path`, apply environment overrides and validate the result.
    ///
    /// Relative `artifacts` and `state_file` paths are resolved against the
    /// directory of the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DeployError::config(format!(
                "configuration file {} not found",
                path.display()
            )));
        }

        let mut config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| {
                DeployError::config(format!("invalid configuration in {}: {e}", path.display()))
            })?;

        if let Some(base) = path.parent() {
            if config.artifacts.is_relative() {
                config.artifacts = base.join(&config.artifacts);
            }
            if config.state_file.is_relative() {
                config.state_file = base.join(&config.state_file);
            }
        }

        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            backing = %config.pair.backing,
            issuing = %config.pair.issuing,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.pair.backing == self.pair.issuing {
            return Err(DeployError::config(format!(
                "backing and issuing must be different networks, both are `{}`",
                self.pair.backing
            )));
        }

        for name in [&self.pair.backing, &self.pair.issuing] {
            let network = self.network(name)?;
            let url = url::Url::parse(&network.rpc_url).map_err(|e| {
                let rpc_url = &network.rpc_url;
                DeployError::config(format!("invalid rpc_url `{rpc_url}` for {name}: {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(DeployError::config(format!(
                    "rpc_url of {name} must be http(s), got `{}`",
                    url.scheme()
                )));
            }
            self.endpoint(name)?;
        }

        let (backing, issuing) = (self.backing_network()?, self.issuing_network()?);
        if backing.chain_id == issuing.chain_id {
            return Err(DeployError::config(format!(
                "backing and issuing share chain id {}",
                backing.chain_id
            )));
        }

        if self.gas.call == 0 || self.gas.deploy == 0 {
            return Err(DeployError::config("gas limits must be non-zero"));
        }
        if self.relay.poll_interval_ms == 0 {
            return Err(DeployError::config("relay.poll_interval_ms must be non-zero"));
        }
        if Duration::from_secs(self.relay.max_wait_secs)
            < Duration::from_millis(self.relay.poll_interval_ms)
        {
            return Err(DeployError::config(
                "relay.max_wait_secs must cover at least one poll interval",
            ));
        }
        if self.smoke.enabled {
            if self.smoke.lock_amount.is_zero() {
                return Err(DeployError::config("smoke.lock_amount must be non-zero"));
            }
            if self.smoke.lock_amount > self.token.daily_limit {
                return Err(DeployError::config(format!(
                    "smoke.lock_amount {} exceeds the daily limit {}",
                    self.smoke.lock_amount, self.token.daily_limit
                )));
            }
        }

        let mut names = std::collections::BTreeSet::new();
        for contract in &self.contracts {
            let name = &contract.name;
            if contract.network != self.pair.backing && contract.network != self.pair.issuing {
                return Err(DeployError::config(format!(
                    "contract `{name}` targets `{}`, which is not a side of the pair",
                    contract.network
                )));
            }
            if !names.insert((&contract.network, name)) {
                return Err(DeployError::config(format!(
                    "contract `{name}` is listed twice on {}",
                    contract.network
                )));
            }
            contract.constructor_args().map_err(|e| {
                DeployError::config(format!("invalid constructor of contract `{name}`: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks
            .get(name)
            .ok_or_else(|| DeployError::config(format!("network `{name}` is not in the registry")))
    }

    pub fn endpoint(&self, name: &str) -> Result<&EndpointConfig> {
        self.endpoints
            .get(name)
            .ok_or_else(|| DeployError::config(format!("no [endpoints.{name}] section")))
    }

    pub fn backing_network(&self) -> Result<&NetworkConfig> {
        self.network(&self.pair.backing)
    }

    pub fn issuing_network(&self) -> Result<&NetworkConfig> {
        self.network(&self.pair.issuing)
    }

    /// Registry entry and endpoint parameters of `name`, combined.
    pub fn chain_endpoint(&self, name: &str) -> Result<ChainEndpoint> {
        let network = self.network(name)?;
        let endpoint = self.endpoint(name)?;
        Ok(ChainEndpoint {
            network: name.to_string(),
            rpc_url: network.rpc_url.clone(),
            chain_id: network.chain_id,
            bridge_network_id: endpoint.bridge_network_id,
            transact_call_index: endpoint.transact_call_index,
            send_msg_index: endpoint.send_msg_index,
            outbound_lane_id: endpoint.outbound_lane_id,
            storage_key_fee: endpoint.storage_key_fee,
            storage_key_latest_nonce: endpoint.storage_key_latest_nonce,
            storage_key_delivered_nonce: endpoint.storage_key_delivered_nonce,
        })
    }

    /// Parameters of messages dispatched from `name` to its peer.
    pub fn remote_call(&self, name: &str) -> Result<RemoteCall> {
        let endpoint = self.endpoint(name)?;
        Ok(RemoteCall {
            spec_version: endpoint.remote_spec_version,
            gas_limit: endpoint.remote_gas_limit,
            fee: endpoint.dispatch_fee,
        })
    }

    /// Chain name the backing is told about: the issuing network's own name.
    pub fn issuing_chain_name(&self) -> Result<String> {
        let issuing = self.issuing_network()?;
        Ok(issuing
            .chain_name
            .clone()
            .unwrap_or_else(|| self.pair.issuing.clone()))
    }
}
