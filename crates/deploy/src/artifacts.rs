//! Compiled contract artifacts.
//!
//! Artifacts are hardhat-style JSON files named `<ContractName>.json` with the
//! creation bytecode under `bytecode`.

use std::{collections::BTreeMap, path::Path};

use alloy_core::primitives::Bytes;
use serde::Deserialize;

use crate::{
    config::ContractConfig,
    error::{DeployError, Result},
};

pub const MESSAGE_ENDPOINT: &str = "DarwiniaSub2SubMessageEndpoint";
pub const MAPPING_TOKEN_LOGIC: &str = "Erc20";
pub const BACKING_LOGIC: &str = "Erc20Sub2SubBacking";
pub const FACTORY_LOGIC: &str = "Erc20Sub2SubMappingTokenFactory";
pub const WRAPPED_TOKEN: &str = "WToken";
pub const PROXY_ADMIN: &str = "ProxyAdmin";
pub const PROXY: &str = "TransparentUpgradeableProxy";

#[derive(Debug, Deserialize)]
struct HardhatArtifact {
    #[serde(rename = "contractName", default)]
    contract_name: Option<String>,
    bytecode: Bytes,
}

/// Read the creation bytecode of `name` from `dir`.
pub fn load_init_code(dir: &Path, name: &str) -> Result<Bytes> {
    let path = dir.join(format!("{name}.json"));
    let content = std::fs::read_to_string(&path).map_err(|e| {
        DeployError::config(format!("failed to read artifact {}: {e}", path.display()))
    })?;
    let artifact: HardhatArtifact = serde_json::from_str(&content).map_err(|e| {
        DeployError::config(format!("failed to parse artifact {}: {e}", path.display()))
    })?;

    match &artifact.contract_name {
        Some(contract_name) if contract_name != name => {
            return Err(DeployError::config(format!(
                "artifact {} holds {contract_name}, expected {name}",
                path.display()
            )));
        }
        _ => {}
    }
    if artifact.bytecode.is_empty() {
        return Err(DeployError::config(format!(
            "artifact {name} has no creation bytecode (abstract contract or interface?)"
        )));
    }

    tracing::debug!(contract = name, size = artifact.bytecode.len(), "Loaded artifact");
    Ok(artifact.bytecode)
}

/// Init code of every contract the bridge pipeline deploys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeArtifacts {
    pub message_endpoint: Bytes,
    pub mapping_token_logic: Bytes,
    pub backing_logic: Bytes,
    pub factory_logic: Bytes,
    pub wrapped_token: Bytes,
    pub proxy_admin: Bytes,
    pub proxy: Bytes,
    /// Init code of the extra `[[contracts]]`, by artifact name.
    pub contracts: BTreeMap<String, Bytes>,
}

impl BridgeArtifacts {
    pub fn load(dir: &Path, contracts: &[ContractConfig]) -> Result<Self> {
        let contracts = contracts
            .iter()
            .map(|c| Ok((c.artifact().to_string(), load_init_code(dir, c.artifact())?)))
            .collect::<Result<_>>()?;
        Ok(Self {
            message_endpoint: load_init_code(dir, MESSAGE_ENDPOINT)?,
            mapping_token_logic: load_init_code(dir, MAPPING_TOKEN_LOGIC)?,
            backing_logic: load_init_code(dir, BACKING_LOGIC)?,
            factory_logic: load_init_code(dir, FACTORY_LOGIC)?,
            wrapped_token: load_init_code(dir, WRAPPED_TOKEN)?,
            proxy_admin: load_init_code(dir, PROXY_ADMIN)?,
            proxy: load_init_code(dir, PROXY)?,
            contracts,
        })
    }

    pub fn contract(&self, artifact: &str) -> Result<&Bytes> {
        self.contracts
            .get(artifact)
            .ok_or_else(|| DeployError::config(format!("artifact {artifact} was not loaded")))
    }
}
