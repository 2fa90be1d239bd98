//! Admin-controlled transparent upgradeable proxies.
//!
//! The initializer calldata is handed to the proxy constructor, so initialization
//! happens atomically with proxy creation and is never sent again afterwards.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes},
};

use crate::{
    abi::{ConstructorArgs, IProxyAdmin, encode_call, encode_function_call},
    artifacts,
    cancel::CancelToken,
    client::{ChainClient, TxRequest},
    deployer::Deployer,
    error::{DeployError, Result},
    planner::Salt,
    types::{DeployedContract, DeploymentPlan, ProxyInstance},
};

/// Initializer of the backing and mapping token factory logic: `(endpoint, admin)`.
pub const DEFAULT_INITIALIZER: &str = "initialize(address,address)";

/// Selector followed by the ABI-encoded initializer arguments.
pub fn initializer_calldata(signature: &str, args: &[DynSolValue]) -> Result<Bytes> {
    encode_function_call(signature, args)
}

/// What to put behind a new proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    /// Name used in logs and transaction labels, e.g. `backing proxy`.
    pub name: String,
    pub admin: Address,
    pub implementation: Address,
    pub initializer: String,
    pub init_args: Vec<DynSolValue>,
}

impl ProxyRequest {
    pub fn new(
        name: impl Into<String>,
        admin: Address,
        implementation: Address,
        init_args: Vec<DynSolValue>,
    ) -> Self {
        Self {
            name: name.into(),
            admin,
            implementation,
            initializer: DEFAULT_INITIALIZER.to_string(),
            init_args,
        }
    }
}

/// Deploys proxy admins and proxies on one chain.
#[derive(Debug)]
pub struct ProxyManager<'a, C> {
    deployer: Deployer<'a, C>,
    admin_code: Bytes,
    proxy_code: Bytes,
    salt: Salt,
    gas_limit: u64,
}

impl<'a, C: ChainClient> ProxyManager<'a, C> {
    pub fn new(
        deployer: Deployer<'a, C>,
        admin_code: Bytes,
        proxy_code: Bytes,
        salt: Salt,
        gas_limit: u64,
    ) -> Self {
        Self {
            deployer,
            admin_code,
            proxy_code,
            salt,
            gas_limit,
        }
    }

    /// Plan of a proxy admin owned by the signer.
    pub fn admin_plan(&self) -> Result<DeploymentPlan> {
        let owner = self.deployer.client().sender();
        Ok(DeploymentPlan::new(
            artifacts::PROXY_ADMIN,
            self.admin_code.clone(),
            ConstructorArgs::new("(address)", vec![DynSolValue::Address(owner)])?,
            self.salt,
        ))
    }

    /// Plan of the proxy for `request`, together with its initializer calldata.
    pub fn proxy_plan(&self, request: &ProxyRequest) -> Result<(DeploymentPlan, Bytes)> {
        let calldata = initializer_calldata(&request.initializer, &request.init_args)?;
        let args = ConstructorArgs::new(
            "(address,address,bytes)",
            vec![
                DynSolValue::Address(request.implementation),
                DynSolValue::Address(request.admin),
                DynSolValue::Bytes(calldata.to_vec()),
            ],
        )?;
        let plan =
            DeploymentPlan::new(request.name.clone(), self.proxy_code.clone(), args, self.salt);
        Ok((plan, calldata))
    }

    /// Planned proxy address, without touching the chain.
    pub fn plan_proxy_address(&self, request: &ProxyRequest) -> Result<Address> {
        let (plan, _) = self.proxy_plan(request)?;
        self.deployer.plan_address(&plan)
    }

    /// Deploy the proxy admin, or reuse `known` when the registry already has one.
    pub async fn deploy_proxy_admin(
        &self,
        known: Option<Address>,
        cancel: &CancelToken,
    ) -> Result<DeployedContract> {
        if let Some(address) = known {
            if !self.deployer.client().has_code(address).await? {
                return Err(DeployError::config(format!(
                    "registered proxy admin {address} has no code on chain {}",
                    self.deployer.client().chain_id()
                )));
            }
            tracing::info!(address = %address, "Reusing registered proxy admin");
            return Ok(DeployedContract {
                name: artifacts::PROXY_ADMIN.to_string(),
                address,
                tx_hash: None,
                confirmed: true,
            });
        }

        self.deployer
            .deploy_if_absent(&self.admin_plan()?, self.gas_limit, cancel)
            .await
    }

    /// Deploy a new proxy and run its initializer.
    ///
    /// Fails with [`DeployError::AlreadyInitialized`], without sending anything, if
    /// the planned proxy already exists.
    pub async fn deploy_proxy(
        &self,
        request: &ProxyRequest,
        cancel: &CancelToken,
    ) -> Result<ProxyInstance> {
        let (plan, calldata) = self.proxy_plan(request)?;
        let address = self.deployer.plan_address(&plan)?;
        if self.deployer.client().has_code(address).await? {
            return Err(DeployError::AlreadyInitialized { proxy: address });
        }
        self.create(request, &plan, calldata, cancel).await
    }

    /// Like [`Self::deploy_proxy`] but an existing proxy is returned as is.
    pub async fn ensure_proxy(
        &self,
        request: &ProxyRequest,
        cancel: &CancelToken,
    ) -> Result<ProxyInstance> {
        let (plan, calldata) = self.proxy_plan(request)?;
        let address = self.deployer.plan_address(&plan)?;
        if self.deployer.client().has_code(address).await? {
            tracing::info!(
                proxy = %request.name,
                address = %address,
                "Proxy already deployed, initializer not resent"
            );
            return Ok(ProxyInstance {
                proxy_address: address,
                admin_address: request.admin,
                implementation_address: request.implementation,
                initializer_calldata: calldata,
                initialized: true,
            });
        }
        self.create(request, &plan, calldata, cancel).await
    }

    async fn create(
        &self,
        request: &ProxyRequest,
        plan: &DeploymentPlan,
        calldata: Bytes,
        cancel: &CancelToken,
    ) -> Result<ProxyInstance> {
        if !self.deployer.client().has_code(request.implementation).await? {
            return Err(DeployError::config(format!(
                "implementation {} of {} has no code",
                request.implementation, request.name
            )));
        }

        let deployed = self.deployer.deploy_if_absent(plan, self.gas_limit, cancel).await?;
        tracing::info!(
            proxy = %request.name,
            address = %deployed.address,
            implementation = %request.implementation,
            initializer = %request.initializer,
            "Proxy deployed and initialized"
        );

        Ok(ProxyInstance {
            proxy_address: deployed.address,
            admin_address: request.admin,
            implementation_address: request.implementation,
            initializer_calldata: calldata,
            initialized: true,
        })
    }

    /// Point `instance` at a new implementation through its admin.
    pub async fn upgrade(
        &self,
        instance: &ProxyInstance,
        implementation: Address,
        cancel: &CancelToken,
    ) -> Result<ProxyInstance> {
        let client = self.deployer.client();
        let current = self.implementation_of(instance).await?;
        let upgraded = ProxyInstance {
            implementation_address: implementation,
            ..instance.clone()
        };
        if current == implementation {
            tracing::info!(
                proxy = %instance.proxy_address,
                "Proxy already points at implementation"
            );
            return Ok(upgraded);
        }

        let data = encode_call(&IProxyAdmin::upgradeCall {
            proxy: instance.proxy_address,
            implementation,
        });
        client
            .transact(
                TxRequest::new("upgrade", instance.admin_address, data, self.gas_limit),
                cancel,
            )
            .await?;

        let now = self.implementation_of(instance).await?;
        if now != implementation {
            return Err(DeployError::config(format!(
                "proxy {} points at {now} after upgrade to {implementation}",
                instance.proxy_address
            )));
        }
        tracing::info!(
            proxy = %instance.proxy_address,
            from = %current,
            to = %implementation,
            "Proxy upgraded"
        );
        Ok(upgraded)
    }

    async fn implementation_of(&self, instance: &ProxyInstance) -> Result<Address> {
        self.deployer
            .client()
            .view(
                instance.admin_address,
                IProxyAdmin::getProxyImplementationCall {
                    proxy: instance.proxy_address,
                },
            )
            .await
    }
}
