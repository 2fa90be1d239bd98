//! The fixed deployment pipeline across the backing and issuing chains.
//!
//! Steps run strictly in order and the first failure aborts the run. Every
//! address is planned up front, so configuration that refers to contracts of a
//! later step (dispatch roles for the proxies) can be sent before they exist.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, U256},
};
use serde::{Deserialize, Serialize};

use crate::{
    abi::{ConstructorArgs, IBacking, IMappingTokenFactory, encode_call},
    artifacts::{self, BridgeArtifacts},
    cancel::CancelToken,
    client::{ChainClient, TxRequest},
    config::HelixConfig,
    deployer::Deployer,
    endpoint::{EndpointConfigurator, EndpointSide, endpoint_plan},
    error::{DeployError, Result},
    proxy::{ProxyManager, ProxyRequest},
    relay::Poll,
    smoke::{SmokeTest, TransferOutcome},
    state::{DeploymentFingerprint, Journal, PendingRegistration},
    types::{AddressTable, ChainEndpoint, DeployedContract, DeploymentPlan, RoleGrant},
};

/// Keys of the address table, per network.
pub mod keys {
    pub const MESSAGE_ENDPOINT: &str = "messageEndpoint";
    pub const MAPPING_TOKEN_LOGIC: &str = "mappingTokenLogic";
    pub const BACKING_LOGIC: &str = "backingLogic";
    pub const FACTORY_LOGIC: &str = "mappingTokenFactoryLogic";
    pub const PROXY_ADMIN: &str = "proxyAdmin";
    pub const BACKING_PROXY: &str = "backingProxy";
    pub const FACTORY_PROXY: &str = "mappingTokenFactoryProxy";
    pub const WRAPPED_TOKEN: &str = "wrappedToken";
    pub const MAPPING_TOKEN: &str = "mappingToken";
}

/// A step of the pipeline, in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    DeployEndpoints,
    ConfigurePair,
    DeployBridge,
    ConfigureBridge,
    RegisterToken,
    SmokeTest,
    DeployContracts,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::DeployEndpoints,
        Step::ConfigurePair,
        Step::DeployBridge,
        Step::ConfigureBridge,
        Step::RegisterToken,
        Step::SmokeTest,
        Step::DeployContracts,
    ];

    /// Steps whose completion is recorded in the journal and skipped on re-run.
    /// Deployment steps always run: they only read when the contracts exist.
    pub fn is_journaled(&self) -> bool {
        matches!(self, Step::ConfigurePair | Step::ConfigureBridge | Step::RegisterToken)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// The step ran.
    Executed,
    /// Completed in an earlier run with the same configuration.
    Resumed,
    /// Disabled for this run.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
    pub elapsed: Duration,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReport {
    pub outcomes: Vec<StepOutcome>,
    pub table: AddressTable,
    pub role_grants: Vec<RoleGrant>,
    pub transfers: Vec<TransferOutcome>,
}

/// A failed run: the failing step, what was built before it and the cause.
#[derive(Debug, thiserror::Error)]
#[error("{} failed: {source}", step_label(.step))]
pub struct PipelineError {
    /// `None` when the run failed before the first step.
    pub step: Option<Step>,
    pub table: AddressTable,
    #[source]
    pub source: DeployError,
}

fn step_label(step: &Option<Step>) -> String {
    match step {
        Some(step) => format!("step `{step}`"),
        None => "pipeline setup".to_string(),
    }
}

/// Every planned address of the run.
#[derive(Debug, Clone)]
struct Layout {
    backing: ChainEndpoint,
    issuing: ChainEndpoint,
    backing_endpoint: DeploymentPlan,
    issuing_endpoint: DeploymentPlan,
    mapping_token_logic: DeploymentPlan,
    backing_logic: DeploymentPlan,
    factory_logic: DeploymentPlan,
    wrapped_token: DeploymentPlan,
    backing_admin: Address,
    issuing_admin: Address,
    backing_proxy: ProxyRequest,
    factory_proxy: ProxyRequest,
    backing_proxy_address: Address,
    factory_proxy_address: Address,
}

struct RunState {
    journal: Journal,
    journal_path: Option<PathBuf>,
    outcomes: Vec<StepOutcome>,
    started: Instant,
}

impl RunState {
    fn table(&self) -> &AddressTable {
        &self.journal.addresses
    }

    fn begin(&mut self, step: Step) {
        tracing::info!(step = %step, "Starting step");
        self.started = Instant::now();
    }

    fn fail(&self, step: Option<Step>, source: DeployError) -> PipelineError {
        tracing::error!(step = ?step, error = %source, "Pipeline aborted");
        PipelineError {
            step,
            table: self.table().clone(),
            source,
        }
    }

    fn save(&self) -> Result<()> {
        match &self.journal_path {
            Some(path) => self.journal.save_to_file(path).map_err(DeployError::Journal),
            None => Ok(()),
        }
    }

    fn finish(&mut self, step: Step, status: StepStatus) -> Result<(), PipelineError> {
        if status == StepStatus::Executed && step.is_journaled() {
            self.journal.mark_complete(step);
        }
        self.save().map_err(|e| self.fail(Some(step), e))?;

        let elapsed = self.started.elapsed();
        tracing::info!(
            step = %step,
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Step finished"
        );
        self.outcomes.push(StepOutcome { step, status, elapsed });
        Ok(())
    }
}

/// Runs the pipeline with one client per chain.
#[derive(Debug)]
pub struct Orchestrator<C> {
    config: HelixConfig,
    artifacts: BridgeArtifacts,
    backing: C,
    issuing: C,
    journal_path: Option<PathBuf>,
    fresh: bool,
    skip_smoke: bool,
}

impl<C: ChainClient> Orchestrator<C> {
    pub fn new(config: HelixConfig, artifacts: BridgeArtifacts, backing: C, issuing: C) -> Self {
        Self {
            config,
            artifacts,
            backing,
            issuing,
            journal_path: None,
            fresh: false,
            skip_smoke: false,
        }
    }

    /// Persist progress to `path` and resume from it.
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// Ignore a saved journal.
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn skip_smoke(mut self, skip: bool) -> Self {
        self.skip_smoke = skip;
        self
    }

    pub fn config(&self) -> &HelixConfig {
        &self.config
    }

    /// Run every step in order.
    pub async fn run(&self, cancel: &CancelToken) -> Result<DeploymentReport, PipelineError> {
        let mut state = RunState {
            journal: Journal::new(String::new()),
            journal_path: self.journal_path.clone(),
            outcomes: Vec::with_capacity(Step::ALL.len()),
            started: Instant::now(),
        };

        let layout = match self.prepare(&mut state) {
            Ok(layout) => layout,
            Err(e) => return Err(state.fail(None, e)),
        };
        tracing::info!(
            backing = %layout.backing.network,
            issuing = %layout.issuing.network,
            backing_proxy = %layout.backing_proxy_address,
            factory_proxy = %layout.factory_proxy_address,
            "Deployment planned"
        );

        let mut role_grants = Vec::new();
        let mut transfers = Vec::new();

        for step in Step::ALL {
            state.begin(step);
            if let Err(e) = cancel.check() {
                return Err(state.fail(Some(step), e));
            }

            let status = if step.is_journaled() && state.journal.is_complete(step) {
                tracing::info!(step = %step, "Completed in a previous run, skipping");
                StepStatus::Resumed
            } else if self.is_disabled(step) {
                tracing::info!(step = %step, "Disabled, skipping");
                StepStatus::Skipped
            } else {
                let result = match step {
                    Step::DeployEndpoints => {
                        self.deploy_endpoints(&layout, &mut state, cancel).await
                    }
                    Step::ConfigurePair => self
                        .configure_pair(&layout, cancel)
                        .await
                        .map(|grants| role_grants.extend(grants)),
                    Step::DeployBridge => self.deploy_bridge(&layout, &mut state, cancel).await,
                    Step::ConfigureBridge => self
                        .configure_bridge(&layout, cancel)
                        .await
                        .map(|grants| role_grants.extend(grants)),
                    Step::RegisterToken => self.register_token(&layout, &mut state, cancel).await,
                    Step::SmokeTest => self
                        .smoke_test(&layout, &state, cancel)
                        .await
                        .map(|done| transfers.extend(done)),
                    Step::DeployContracts => self.deploy_contracts(&mut state, cancel).await,
                };
                if let Err(e) = result {
                    // Keep addresses recorded before the failure.
                    if let Err(save) = state.save() {
                        tracing::warn!(error = %save, "Failed to save journal after failure");
                    }
                    return Err(state.fail(Some(step), e));
                }
                StepStatus::Executed
            };

            state.finish(step, status)?;
        }

        tracing::info!(contracts = state.table().len(), "Deployment complete");
        Ok(DeploymentReport {
            outcomes: state.outcomes,
            table: state.journal.addresses,
            role_grants,
            transfers,
        })
    }

    fn is_disabled(&self, step: Step) -> bool {
        match step {
            Step::SmokeTest => self.skip_smoke || !self.config.smoke.enabled,
            Step::DeployContracts => self.config.contracts.is_empty(),
            _ => false,
        }
    }

    /// Check the clients, resume the journal and plan every address.
    fn prepare(&self, state: &mut RunState) -> Result<Layout> {
        let backing_network = self.config.backing_network()?;
        let issuing_network = self.config.issuing_network()?;
        for (client, network, name) in [
            (&self.backing, backing_network, &self.config.pair.backing),
            (&self.issuing, issuing_network, &self.config.pair.issuing),
        ] {
            if client.chain_id() != network.chain_id {
                return Err(DeployError::config(format!(
                    "client for {name} is connected to chain {}, registry says {}",
                    client.chain_id(),
                    network.chain_id
                )));
            }
        }

        let hash = DeploymentFingerprint::new(&self.config, &self.artifacts)
            .compute_hash()
            .map_err(DeployError::Journal)?;
        let resumed = match (&self.journal_path, self.fresh) {
            (Some(path), false) => Journal::resume(path, &hash).map_err(DeployError::Journal)?,
            _ => None,
        };
        state.journal = match resumed {
            Some(journal) => {
                tracing::info!(
                    completed = ?journal.completed,
                    "Resuming from journal"
                );
                journal
            }
            None => Journal::new(hash),
        };

        self.layout()
    }

    fn layout(&self) -> Result<Layout> {
        let backing = self.config.chain_endpoint(&self.config.pair.backing)?;
        let issuing = self.config.chain_endpoint(&self.config.pair.issuing)?;
        let backing_network = self.config.backing_network()?;
        let issuing_network = self.config.issuing_network()?;
        let salt = self.config.salt;
        let signer = self.backing.sender();
        let a = &self.artifacts;

        let token = &self.config.token;
        let erc20_args = || {
            ConstructorArgs::new(
                "(string,string,uint8)",
                vec![
                    DynSolValue::String(token.name.clone()),
                    DynSolValue::String(token.symbol.clone()),
                    DynSolValue::Uint(U256::from(token.decimals), 8),
                ],
            )
        };

        let code = &a.message_endpoint;
        let backing_endpoint = endpoint_plan(code.clone(), &backing, &issuing, signer, salt)?;
        let issuing_endpoint = endpoint_plan(code.clone(), &issuing, &backing, signer, salt)?;

        let plan = |name: &str, code: &Bytes, args| {
            DeploymentPlan::new(name, code.clone(), args, salt)
        };
        let mapping_token_logic =
            plan(artifacts::MAPPING_TOKEN_LOGIC, &a.mapping_token_logic, erc20_args()?);
        let backing_logic =
            plan(artifacts::BACKING_LOGIC, &a.backing_logic, ConstructorArgs::none());
        let factory_logic =
            plan(artifacts::FACTORY_LOGIC, &a.factory_logic, ConstructorArgs::none());
        let wrapped_token = plan(artifacts::WRAPPED_TOKEN, &a.wrapped_token, erc20_args()?);

        let backing_proxies = self.proxy_manager(&self.backing, backing_network.create2_deployer);
        let issuing_proxies = self.proxy_manager(&self.issuing, issuing_network.create2_deployer);
        let backing_admin = match backing_network.proxy_admin {
            Some(admin) => admin,
            None => backing_proxies.admin_plan()?.address(backing_network.create2_deployer)?,
        };
        let issuing_admin = match issuing_network.proxy_admin {
            Some(admin) => admin,
            None => issuing_proxies.admin_plan()?.address(issuing_network.create2_deployer)?,
        };

        let backing_proxy = ProxyRequest::new(
            format!("{} proxy", artifacts::BACKING_LOGIC),
            backing_admin,
            backing_logic.address(backing_network.create2_deployer)?,
            vec![
                DynSolValue::Address(backing_endpoint.address(backing_network.create2_deployer)?),
                DynSolValue::Address(signer),
            ],
        );
        let factory_proxy = ProxyRequest::new(
            format!("{} proxy", artifacts::FACTORY_LOGIC),
            issuing_admin,
            factory_logic.address(issuing_network.create2_deployer)?,
            vec![
                DynSolValue::Address(issuing_endpoint.address(issuing_network.create2_deployer)?),
                DynSolValue::Address(self.issuing.sender()),
            ],
        );
        let backing_proxy_address = backing_proxies.plan_proxy_address(&backing_proxy)?;
        let factory_proxy_address = issuing_proxies.plan_proxy_address(&factory_proxy)?;

        Ok(Layout {
            backing,
            issuing,
            backing_endpoint,
            issuing_endpoint,
            mapping_token_logic,
            backing_logic,
            factory_logic,
            wrapped_token,
            backing_admin,
            issuing_admin,
            backing_proxy,
            factory_proxy,
            backing_proxy_address,
            factory_proxy_address,
        })
    }

    fn proxy_manager<'a>(&self, client: &'a C, factory: Address) -> ProxyManager<'a, C> {
        ProxyManager::new(
            Deployer::new(client, factory),
            self.artifacts.proxy_admin.clone(),
            self.artifacts.proxy.clone(),
            self.config.salt,
            self.config.gas.deploy,
        )
    }

    fn client(&self, network: &str) -> Result<&C> {
        if network == self.config.pair.backing {
            Ok(&self.backing)
        } else if network == self.config.pair.issuing {
            Ok(&self.issuing)
        } else {
            Err(DeployError::config(format!("`{network}` is not a side of the pair")))
        }
    }

    fn deployer<'a>(&self, client: &'a C, network: &str) -> Result<Deployer<'a, C>> {
        Ok(Deployer::new(client, self.config.network(network)?.create2_deployer))
    }

    /// Insert `address` into the table after checking it against the registry.
    fn record(
        &self,
        state: &mut RunState,
        network: &str,
        key: &str,
        address: Address,
    ) -> Result<()> {
        if let Some(known) = self.config.network(network)?.known.get(key) {
            if *known != address {
                return Err(DeployError::config(format!(
                    "registry lists {key} on {network} at {known}, but it is at {address}"
                )));
            }
        }
        state.journal.addresses.insert(network, key, address);
        Ok(())
    }

    async fn deploy_endpoints(
        &self,
        layout: &Layout,
        state: &mut RunState,
        cancel: &CancelToken,
    ) -> Result<()> {
        let gas = self.config.gas.deploy;
        let sides = [
            (&self.backing, &layout.backing, &layout.backing_endpoint),
            (&self.issuing, &layout.issuing, &layout.issuing_endpoint),
        ];

        // Both planned addresses are checked against the registry before anything is sent.
        for (client, endpoint, plan) in sides {
            let deployer = self.deployer(client, &endpoint.network)?;
            let address = deployer.plan_address(plan)?;
            self.record(state, &endpoint.network, keys::MESSAGE_ENDPOINT, address)?;
        }

        let mut deployed_any = false;
        for (client, endpoint, plan) in sides {
            let deployed = self
                .deployer(client, &endpoint.network)?
                .deploy_if_absent(plan, gas, cancel)
                .await?;
            deployed_any |= deployed.tx_hash.is_some();
        }

        if deployed_any {
            state.journal.invalidate_from(Step::ConfigurePair);
        }
        Ok(())
    }

    fn endpoint_contract(&self, layout: &Layout, backing_side: bool) -> Result<DeployedContract> {
        let (network, plan) = if backing_side {
            (&layout.backing.network, &layout.backing_endpoint)
        } else {
            (&layout.issuing.network, &layout.issuing_endpoint)
        };
        Ok(DeployedContract {
            name: plan.contract_name.clone(),
            address: plan.address(self.config.network(network)?.create2_deployer)?,
            tx_hash: None,
            confirmed: true,
        })
    }

    fn sides<'a>(
        &'a self,
        layout: &'a Layout,
    ) -> Result<(EndpointSide<'a, C>, EndpointSide<'a, C>)> {
        Ok((
            EndpointSide {
                client: &self.backing,
                endpoint: &layout.backing,
                contract: self.endpoint_contract(layout, true)?,
                dispatchers: vec![layout.backing_proxy_address],
            },
            EndpointSide {
                client: &self.issuing,
                endpoint: &layout.issuing,
                contract: self.endpoint_contract(layout, false)?,
                dispatchers: vec![layout.factory_proxy_address],
            },
        ))
    }

    async fn configure_pair(
        &self,
        layout: &Layout,
        cancel: &CancelToken,
    ) -> Result<Vec<RoleGrant>> {
        let configurator = EndpointConfigurator::new(self.config.gas.call);
        let (a, b) = self.sides(layout)?;
        let configured = configurator.configure_pair(a, b, cancel).await?;

        let (a, b) = self.sides(layout)?;
        configurator.verify_symmetry(&a, &b).await?;
        Ok(configured.role_grants)
    }

    async fn deploy_bridge(
        &self,
        layout: &Layout,
        state: &mut RunState,
        cancel: &CancelToken,
    ) -> Result<()> {
        let gas = self.config.gas.deploy;
        let (backing, issuing) = (&layout.backing.network, &layout.issuing.network);
        let mut deployed = Vec::new();
        let mut created_proxy = false;

        for (client, network, key, plan) in [
            (&self.issuing, issuing, keys::MAPPING_TOKEN_LOGIC, &layout.mapping_token_logic),
            (&self.backing, backing, keys::BACKING_LOGIC, &layout.backing_logic),
            (&self.issuing, issuing, keys::FACTORY_LOGIC, &layout.factory_logic),
        ] {
            let deployer = self.deployer(client, network)?;
            self.record(state, network, key, deployer.plan_address(plan)?)?;
            deployed.push(deployer.deploy_if_absent(plan, gas, cancel).await?);
        }

        for (client, network, request, admin, planned, key) in [
            (
                &self.backing,
                backing,
                &layout.backing_proxy,
                layout.backing_admin,
                layout.backing_proxy_address,
                keys::BACKING_PROXY,
            ),
            (
                &self.issuing,
                issuing,
                &layout.factory_proxy,
                layout.issuing_admin,
                layout.factory_proxy_address,
                keys::FACTORY_PROXY,
            ),
        ] {
            let registry = self.config.network(network)?;
            let proxies = self.proxy_manager(client, registry.create2_deployer);

            self.record(state, network, keys::PROXY_ADMIN, admin)?;
            let admin_contract = proxies.deploy_proxy_admin(registry.proxy_admin, cancel).await?;
            if admin_contract.address != admin {
                return Err(DeployError::config(format!(
                    "proxy admin on {network} landed at {}, planned {admin}",
                    admin_contract.address
                )));
            }
            deployed.push(admin_contract);

            self.record(state, network, key, planned)?;
            let existed = client.has_code(planned).await?;
            let instance = proxies.ensure_proxy(request, cancel).await?;
            if instance.proxy_address != planned {
                return Err(DeployError::config(format!(
                    "{} landed at {}, planned {planned}",
                    request.name, instance.proxy_address
                )));
            }
            created_proxy |= !existed;
        }

        if created_proxy || deployed.iter().any(|c| c.tx_hash.is_some()) {
            state.journal.invalidate_from(Step::ConfigureBridge);
        }
        Ok(())
    }

    async fn configure_bridge(
        &self,
        layout: &Layout,
        cancel: &CancelToken,
    ) -> Result<Vec<RoleGrant>> {
        let gas = self.config.gas.call;
        let backing_proxy = layout.backing_proxy_address;
        let factory_proxy = layout.factory_proxy_address;

        let chain_name = self.config.issuing_chain_name()?;
        tracing::info!(
            backing = %backing_proxy,
            factory = %factory_proxy,
            chain_name = %chain_name,
            "Wiring backing and factory"
        );
        self.backing
            .transact(
                TxRequest::new(
                    "setChainName",
                    backing_proxy,
                    encode_call(&IBacking::setChainNameCall { chainName: chain_name }),
                    gas,
                ),
                cancel,
            )
            .await?;
        self.backing
            .transact(
                TxRequest::new(
                    "setRemoteMappingTokenFactory",
                    backing_proxy,
                    encode_call(&IBacking::setRemoteMappingTokenFactoryCall {
                        remoteMappingTokenFactory: factory_proxy,
                    }),
                    gas,
                ),
                cancel,
            )
            .await?;
        self.issuing
            .transact(
                TxRequest::new(
                    "setRemoteBacking",
                    factory_proxy,
                    encode_call(&IMappingTokenFactory::setRemoteBackingCall {
                        remoteBacking: backing_proxy,
                    }),
                    gas,
                ),
                cancel,
            )
            .await?;

        let configurator = EndpointConfigurator::new(gas);
        let (a, b) = self.sides(layout)?;
        let mut grants = configurator.grant_dispatch_roles(&a, cancel).await?;
        grants.extend(configurator.grant_dispatch_roles(&b, cancel).await?);

        let operator = self.backing.view(backing_proxy, IBacking::OPERATOR_ROLECall {}).await?;
        grants.push(
            configurator
                .grant_role(&self.backing, backing_proxy, operator, self.backing.sender(), cancel)
                .await?,
        );
        Ok(grants)
    }

    async fn token_length(&self, factory: Address) -> Result<U256> {
        self.issuing.view(factory, IMappingTokenFactory::tokenLengthCall {}).await
    }

    async fn register_token(
        &self,
        layout: &Layout,
        state: &mut RunState,
        cancel: &CancelToken,
    ) -> Result<()> {
        let backing = &layout.backing.network;
        let deployer = self.deployer(&self.backing, backing)?;
        let planned = deployer.plan_address(&layout.wrapped_token)?;
        self.record(state, backing, keys::WRAPPED_TOKEN, planned)?;
        let token = deployer
            .deploy_if_absent(&layout.wrapped_token, self.config.gas.deploy, cancel)
            .await?
            .address;

        let factory = layout.factory_proxy_address;
        let pending = match state.journal.registration.filter(|p| p.token == token) {
            Some(pending) => {
                tracing::info!(
                    token = %token,
                    tx_hash = %pending.tx_hash,
                    "Registration already sent, waiting for relay"
                );
                pending
            }
            _ => {
                let before = self.token_length(factory).await?;
                let remote = self.config.remote_call(backing)?;
                let token_config = &self.config.token;
                let data = encode_call(&IBacking::registerCall {
                    specVersion: remote.spec_version,
                    gasLimit: U256::from(token_config.register_gas_limit),
                    token,
                    name: token_config.name.clone(),
                    symbol: token_config.symbol.clone(),
                    decimals: token_config.decimals,
                    dailyLimit: token_config.daily_limit,
                });
                let backing_proxy = layout.backing_proxy_address;
                let receipt = self
                    .backing
                    .transact(
                        TxRequest::new("register", backing_proxy, data, self.config.gas.call)
                            .with_value(remote.fee),
                        cancel,
                    )
                    .await?;
                let token_length_before = u64::try_from(before).map_err(|_| {
                    DeployError::encoding(format!("token length {before} overflows u64"))
                })?;
                let pending = PendingRegistration {
                    token,
                    tx_hash: receipt.tx_hash,
                    token_length_before,
                };
                state.journal.registration = Some(pending);
                state.save()?;
                pending
            }
        };

        let before = U256::from(pending.token_length_before);
        let issuing = &self.issuing;
        let waiter = self.config.relay.waiter();
        waiter
            .wait_until(
                "mapping token registered",
                move || async move {
                    let length =
                        issuing.view(factory, IMappingTokenFactory::tokenLengthCall {}).await?;
                    Ok(if length > before { Poll::Ready } else { Poll::Pending })
                },
                cancel,
            )
            .await?;

        let mapping_token = self
            .issuing
            .view(factory, IMappingTokenFactory::allMappingTokensCall { index: before })
            .await?;
        tracing::info!(token = %token, mapping_token = %mapping_token, "Token registered");
        self.record(state, &layout.issuing.network, keys::MAPPING_TOKEN, mapping_token)?;
        state.journal.registration = None;
        Ok(())
    }

    async fn deploy_contracts(&self, state: &mut RunState, cancel: &CancelToken) -> Result<()> {
        for contract in &self.config.contracts {
            let plan = DeploymentPlan::new(
                contract.artifact(),
                self.artifacts.contract(contract.artifact())?.clone(),
                contract.constructor_args()?,
                contract.salt.unwrap_or(self.config.salt),
            );
            let deployer = self.deployer(self.client(&contract.network)?, &contract.network)?;
            self.record(state, &contract.network, &contract.name, deployer.plan_address(&plan)?)?;
            deployer.deploy_if_absent(&plan, self.config.gas.deploy, cancel).await?;
        }
        Ok(())
    }

    async fn smoke_test(
        &self,
        layout: &Layout,
        state: &RunState,
        cancel: &CancelToken,
    ) -> Result<Vec<TransferOutcome>> {
        let (backing, issuing) = (&layout.backing.network, &layout.issuing.network);
        let table = state.table();
        let token = table.require(backing, keys::WRAPPED_TOKEN)?;
        let mapping_token = table.require(issuing, keys::MAPPING_TOKEN)?;
        let amount = self.config.smoke.lock_amount;

        let smoke = SmokeTest::new(
            &self.backing,
            &self.issuing,
            self.config.relay.waiter(),
            self.config.gas.call,
        );
        let mut transfers = vec![
            smoke
                .lock_and_remote_issue(
                    layout.backing_proxy_address,
                    token,
                    mapping_token,
                    amount,
                    &self.config.remote_call(backing)?,
                    cancel,
                )
                .await?,
        ];

        if self.config.smoke.burn_back {
            transfers.push(
                smoke
                    .burn_and_remote_unlock(
                        layout.factory_proxy_address,
                        mapping_token,
                        token,
                        amount,
                        &self.config.remote_call(issuing)?,
                        cancel,
                    )
                    .await?,
            );
        }
        Ok(transfers)
    }
}
