//! Persisted progress of a deployment run.
//!
//! The journal records which configuration steps completed and every address
//! produced so far, together with a hash of the configuration they were produced
//! with. A journal written for a different configuration is ignored.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use alloy_core::primitives::{Address, B256, keccak256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    artifacts::BridgeArtifacts,
    config::{EndpointConfig, HelixConfig, NetworkConfig, PairConfig, TokenConfig},
    orchestrator::Step,
    planner::Salt,
    types::AddressTable,
};

/// Configuration parameters that decide what gets deployed and how it is wired.
///
/// Gas limits, relay bounds, smoke-test amounts and file locations do not change
/// the resulting contracts and are left out. So are the extra `[[contracts]]`, which
/// are checked for code on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentFingerprint<'a> {
    pub salt: Salt,
    pub networks: &'a BTreeMap<String, NetworkConfig>,
    pub pair: &'a PairConfig,
    pub endpoints: &'a BTreeMap<String, EndpointConfig>,
    pub token: &'a TokenConfig,
    /// keccak256 of the init code of every artifact, by contract.
    pub artifacts: BTreeMap<&'static str, B256>,
}

impl<'a> DeploymentFingerprint<'a> {
    pub fn new(config: &'a HelixConfig, artifacts: &BridgeArtifacts) -> Self {
        let artifacts = [
            (crate::artifacts::MESSAGE_ENDPOINT, &artifacts.message_endpoint),
            (crate::artifacts::MAPPING_TOKEN_LOGIC, &artifacts.mapping_token_logic),
            (crate::artifacts::BACKING_LOGIC, &artifacts.backing_logic),
            (crate::artifacts::FACTORY_LOGIC, &artifacts.factory_logic),
            (crate::artifacts::WRAPPED_TOKEN, &artifacts.wrapped_token),
            (crate::artifacts::PROXY_ADMIN, &artifacts.proxy_admin),
            (crate::artifacts::PROXY, &artifacts.proxy),
        ]
        .into_iter()
        .map(|(name, code)| (name, keccak256(code)))
        .collect();

        Self {
            salt: config.salt,
            networks: &config.networks,
            pair: &config.pair,
            endpoints: &config.endpoints,
            token: &config.token,
            artifacts,
        }
    }

    /// Hex-encoded SHA-256 of the JSON serialization. Maps are ordered, so equal
    /// configurations always hash the same.
    pub fn compute_hash(&self) -> Result<String> {
        let json =
            serde_json::to_string(self).context("Failed to serialize deployment fingerprint")?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// A token registration that was submitted but not yet observed on the issuing chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub token: Address,
    pub tx_hash: B256,
    /// Mapping token count of the factory before the registration was sent.
    pub token_length_before: u64,
}

/// Progress record written after every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub config_hash: String,
    pub updated_at: DateTime<Utc>,
    /// Version of the deployer that wrote the journal.
    pub helix_version: String,
    #[serde(default)]
    pub completed: BTreeSet<Step>,
    #[serde(default)]
    pub addresses: AddressTable,
    #[serde(default)]
    pub registration: Option<PendingRegistration>,
}

impl Journal {
    pub fn new(config_hash: String) -> Self {
        Self {
            config_hash,
            updated_at: Utc::now(),
            helix_version: env!("CARGO_PKG_VERSION").to_string(),
            completed: BTreeSet::new(),
            addresses: AddressTable::new(),
            registration: None,
        }
    }

    /// Load the journal at `path` if it was written for `config_hash`.
    ///
    /// A missing file or a journal of another configuration yields `None`. A file
    /// that cannot be read or parsed is an error.
    pub fn resume(path: &Path, config_hash: &str) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let journal = Self::load_from_file(path)?;
        if journal.config_hash != config_hash {
            tracing::warn!(
                path = %path.display(),
                saved = %journal.config_hash,
                current = %config_hash,
                "Configuration changed since the journal was written, starting over"
            );
            return Ok(None);
        }
        Ok(Some(journal))
    }

    pub fn is_complete(&self, step: Step) -> bool {
        self.completed.contains(&step)
    }

    pub fn mark_complete(&mut self, step: Step) {
        self.completed.insert(step);
        self.updated_at = Utc::now();
    }

    /// Forget `step` and every step after it.
    pub fn invalidate_from(&mut self, step: Step) {
        let before = self.completed.len();
        self.completed.retain(|done| *done < step);
        if self.completed.len() != before {
            tracing::info!(step = %step, "Journal entries invalidated by a new deployment");
            self.updated_at = Utc::now();
        }
    }

    /// Write the journal as formatted JSON, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize journal")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write journal to {}", path.display()))?;
        tracing::debug!(path = %path.display(), steps = self.completed.len(), "Journal saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Journal file does not exist: {}", path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read journal from {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse journal JSON")
    }
}
