//! Contract ABI surface and encoding helpers.
//!
//! The bridge, token and proxy contracts are external collaborators: this module
//! only mirrors their function signatures so that calldata is byte-compatible.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt},
    json_abi::Function,
    primitives::Bytes,
    sol,
    sol_types::SolCall,
};

use crate::error::{DeployError, Result};

sol! {
    /// CREATE2 deployer contract used for every deterministic deployment.
    interface ICreate2Deployer {
        function deploy(bytes bytecode, bytes32 salt) external returns (address addr);
    }

    /// Cross-chain message endpoint (one per chain).
    interface IMessageEndpoint {
        function CALLER_ROLE() external view returns (bytes32);
        function setRemoteHelix(
            bytes4 remoteBridgeNetworkId,
            uint64 remoteChainId,
            address remoteHelix
        ) external;
        function setRemoteCallIndex(bytes2 remoteMessageTransactCallIndex) external;
        function setLocalCallInfo(bytes2 callIndexOfSendMessage) external;
        function setLocalStorageKey(
            bytes32 storageKeyForMarketFee,
            bytes32 storageKeyForLatestNonce,
            bytes32 storageKeyForLastDeliveredNonce
        ) external;
        function remoteBridgeNetworkId() external view returns (bytes4);
        function remoteChainId() external view returns (uint64);
        function remoteHelix() external view returns (address);
    }

    interface IAccessControl {
        function grantRole(bytes32 role, address account) external;
        function hasRole(bytes32 role, address account) external view returns (bool);
    }

    /// Admin contract of a transparent upgradeable proxy.
    interface IProxyAdmin {
        function upgrade(address proxy, address implementation) external;
        function getProxyImplementation(address proxy) external view returns (address);
    }

    /// Lock side of the bridge.
    interface IBacking {
        function OPERATOR_ROLE() external view returns (bytes32);
        function setChainName(string chainName) external;
        function setRemoteMappingTokenFactory(address remoteMappingTokenFactory) external;
        function register(
            uint32 specVersion,
            uint256 gasLimit,
            address token,
            string name,
            string symbol,
            uint8 decimals,
            uint256 dailyLimit
        ) external payable;
        function lockAndRemoteIssuing(
            uint32 specVersion,
            uint256 gasLimit,
            address token,
            address recipient,
            uint256 amount
        ) external payable;
        /// Ask the factory to mint again the mapping tokens of a burn whose unlock failed.
        function remoteIssuingFailure(
            uint32 specVersion,
            uint256 gasLimit,
            uint256 transferId,
            address mappingToken,
            address originalSender,
            uint256 amount
        ) external payable;
    }

    /// Mint side of the bridge.
    interface IMappingTokenFactory {
        function setRemoteBacking(address remoteBacking) external;
        function tokenLength() external view returns (uint256);
        function allMappingTokens(uint256 index) external view returns (address);
        function burnAndRemoteUnlock(
            uint32 specVersion,
            uint256 gasLimit,
            address mappingToken,
            address recipient,
            uint256 amount
        ) external payable;
        /// Ask the backing to release the tokens of a lock whose issuing failed.
        function remoteUnlockFailure(
            uint32 specVersion,
            uint256 gasLimit,
            uint256 transferId,
            address originalToken,
            address originalSender,
            uint256 amount
        ) external payable;
    }

    /// ERC20 surface shared by the wrapped native token and mapping tokens.
    interface IErc20 {
        function deposit() external payable;
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }
}

/// Encode a typed call into calldata.
pub fn encode_call<T: SolCall>(call: &T) -> Bytes {
    call.abi_encode().into()
}

/// Decode the return data of a typed call.
pub fn decode_returns<T: SolCall>(data: &[u8]) -> Result<T::Return> {
    T::abi_decode_returns(data).map_err(|e| {
        DeployError::encoding(format!("failed to decode `{}` return data: {e}", T::SIGNATURE))
    })
}

/// Parse a human-readable signature such as `initialize(address,address)`.
pub fn parse_function(signature: &str) -> Result<Function> {
    Function::parse(signature)
        .map_err(|e| DeployError::encoding(format!("invalid signature `{signature}`: {e}")))
}

/// Selector of `signature` followed by the ABI-encoded arguments.
pub fn encode_function_call(signature: &str, args: &[DynSolValue]) -> Result<Bytes> {
    parse_function(signature)?
        .abi_encode_input(args)
        .map(Bytes::from)
        .map_err(|e| {
            DeployError::encoding(format!("arguments {args:?} do not match `{signature}`: {e}"))
        })
}

/// Ordered, typed constructor arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorArgs {
    params: DynSolType,
    values: Vec<DynSolValue>,
}

impl Default for ConstructorArgs {
    fn default() -> Self {
        Self::none()
    }
}

impl ConstructorArgs {
    /// A constructor taking no arguments.
    pub fn none() -> Self {
        Self {
            params: DynSolType::Tuple(vec![]),
            values: vec![],
        }
    }

    /// Arguments declared by a parameter list such as `(bytes4,bytes4)`.
    ///
    /// Types are checked against the values when encoding.
    pub fn new(params: &str, values: Vec<DynSolValue>) -> Result<Self> {
        let params = DynSolType::parse(params)
            .map_err(|e| DeployError::encoding(format!("invalid parameter list `{params}`: {e}")))?;
        if !matches!(params, DynSolType::Tuple(_)) {
            return Err(DeployError::encoding(
                "constructor parameters must be a tuple such as `(address,uint256)`",
            ));
        }
        Ok(Self { params, values })
    }

    /// Coerce string values (as found in configuration files) into typed arguments.
    pub fn from_strs<S: AsRef<str>>(types: &[S], values: &[S]) -> Result<Self> {
        if types.len() != values.len() {
            return Err(DeployError::encoding(format!(
                "{} constructor types but {} values",
                types.len(),
                values.len()
            )));
        }
        let types = types
            .iter()
            .map(|t| {
                let t = t.as_ref();
                DynSolType::parse(t)
                    .map_err(|e| DeployError::encoding(format!("invalid type `{t}`: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let values = types
            .iter()
            .zip(values)
            .map(|(ty, v)| {
                let v = v.as_ref();
                ty.coerce_str(v)
                    .map_err(|e| DeployError::encoding(format!("`{v}` is not a valid {ty}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            params: DynSolType::Tuple(types),
            values,
        })
    }

    /// ABI-encode the arguments as they are appended to init code.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let value = DynSolValue::Tuple(self.values.clone());
        if !self.params.matches(&value) {
            return Err(DeployError::encoding(format!(
                "constructor arguments {:?} do not match {}",
                self.values, self.params
            )));
        }
        Ok(value.abi_encode_params())
    }
}
