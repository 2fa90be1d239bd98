//! In-memory two-chain network for tests.
//!
//! Each chain keeps a ledger of contracts interpreted from their ABI surface. Contract
//! kinds are recognised from the init code prefix of the fake artifacts below.
//! Dispatched cross-chain messages are delivered by a background relay task after a
//! delay, with the same identity and lane checks a real endpoint performs.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt},
    primitives::{
        Address, B256, Bytes, FixedBytes, U256, address, b256, fixed_bytes, hex, keccak256,
    },
    sol_types::SolCall,
};

use crate::{
    abi::{
        IAccessControl, IBacking, ICreate2Deployer, IErc20, IMappingTokenFactory,
        IMessageEndpoint, IProxyAdmin, parse_function,
    },
    artifacts::BridgeArtifacts,
    cancel::CancelToken,
    client::{ChainClient, TxReceipt, TxRequest},
    config::{
        ContractConfig, EndpointConfig, GasConfig, HelixConfig, NetworkConfig, PairConfig,
        RelayConfig, SmokeConfig, TokenConfig,
    },
    error::{DeployError, Result},
    planner::Salt,
    proxy::DEFAULT_INITIALIZER,
    recovery::transfer_id,
    types::ChainEndpoint,
};

pub(crate) const FACTORY: Address = address!("4e59b44847b379578588920ca78fbf26c0b4956c");
pub(crate) const SIGNER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
pub(crate) const STRANGER: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");
pub(crate) const BACKING_CHAIN: u64 = 45;
pub(crate) const ISSUING_CHAIN: u64 = 43;

const ENDPOINT_CODE: &[u8] = b"\x60\x80helix:endpoint\x00";
const ERC20_CODE: &[u8] = b"\x60\x80helix:erc20\x00";
const BACKING_CODE: &[u8] = b"\x60\x80helix:backing\x00";
const FACTORY_CODE: &[u8] = b"\x60\x80helix:factory\x00";
const WTOKEN_CODE: &[u8] = b"\x60\x80helix:wtoken\x00";
const PROXY_ADMIN_CODE: &[u8] = b"\x60\x80helix:proxy-admin\x00";
const PROXY_CODE: &[u8] = b"\x60\x80helix:proxy\x00";
const GUARD_CODE: &[u8] = b"\x60\x80helix:guard\x00";

/// Artifact of a guard taking `(address[] guards, address depositor, uint256 threshold,
/// uint256 maxUnclaimableTime)`.
pub(crate) const GUARD_ARTIFACT: &str = "GuardV3";

/// Fake artifacts understood by the mock ledger.
pub(crate) fn artifacts() -> BridgeArtifacts {
    BridgeArtifacts {
        message_endpoint: Bytes::from_static(ENDPOINT_CODE),
        mapping_token_logic: Bytes::from_static(ERC20_CODE),
        backing_logic: Bytes::from_static(BACKING_CODE),
        factory_logic: Bytes::from_static(FACTORY_CODE),
        wrapped_token: Bytes::from_static(WTOKEN_CODE),
        proxy_admin: Bytes::from_static(PROXY_ADMIN_CODE),
        proxy: Bytes::from_static(PROXY_CODE),
        contracts: [(GUARD_ARTIFACT.to_string(), Bytes::from_static(GUARD_CODE))]
            .into_iter()
            .collect(),
    }
}

/// Backing side with the Pangoro coordinates.
pub(crate) fn backing_endpoint() -> ChainEndpoint {
    ChainEndpoint {
        network: "pangoro".to_string(),
        rpc_url: "http://127.0.0.1:8545".to_string(),
        chain_id: BACKING_CHAIN,
        bridge_network_id: fixed_bytes!("70616772"),
        transact_call_index: 9728,
        send_msg_index: 10499,
        outbound_lane_id: fixed_bytes!("726f6c69"),
        storage_key_fee: b256!("30d35416864cf657db51d3bc8505602f2edb70953213f33a6ef6b8a5e3ffcab2"),
        storage_key_latest_nonce: b256!(
            "d86d7f611f4d004e041fda08f633f10196c246acb9b55077390e3ca723a0ca1f"
        ),
        storage_key_delivered_nonce: b256!(
            "d86d7f611f4d004e041fda08f633f101e5f83cf83f2127eb47afdc35d6e43fab"
        ),
    }
}

/// Issuing side with the Pangolin coordinates and its own outbound lane.
pub(crate) fn issuing_endpoint() -> ChainEndpoint {
    ChainEndpoint {
        network: "pangolin".to_string(),
        rpc_url: "http://127.0.0.1:9545".to_string(),
        chain_id: ISSUING_CHAIN,
        bridge_network_id: fixed_bytes!("7061676c"),
        transact_call_index: 10497,
        send_msg_index: 11011,
        outbound_lane_id: fixed_bytes!("726f6c6a"),
        storage_key_fee: b256!("7621b367d09b75f6876b13089ee0ded52edb70953213f33a6ef6b8a5e3ffcab2"),
        storage_key_latest_nonce: b256!(
            "c9b76e645ba80b6ca47619d64cb5e58d96c246acb9b55077390e3ca723a0ca1f"
        ),
        storage_key_delivered_nonce: b256!(
            "c9b76e645ba80b6ca47619d64cb5e58de5f83cf83f2127eb47afdc35d6e43fab"
        ),
    }
}

/// Configuration of the mock pair, relaying fast and waiting briefly.
pub(crate) fn config() -> HelixConfig {
    let endpoint = |e: &ChainEndpoint, spec_version: u32| EndpointConfig {
        bridge_network_id: e.bridge_network_id,
        transact_call_index: e.transact_call_index,
        send_msg_index: e.send_msg_index,
        outbound_lane_id: e.outbound_lane_id,
        storage_key_fee: e.storage_key_fee,
        storage_key_latest_nonce: e.storage_key_latest_nonce,
        storage_key_delivered_nonce: e.storage_key_delivered_nonce,
        remote_spec_version: spec_version,
        remote_gas_limit: 1_000_000,
        dispatch_fee: U256::from(100u64),
    };
    let network = |e: &ChainEndpoint, chain_name: Option<&str>| NetworkConfig {
        rpc_url: e.rpc_url.clone(),
        chain_id: e.chain_id,
        create2_deployer: FACTORY,
        chain_name: chain_name.map(str::to_string),
        proxy_admin: None,
        known: Default::default(),
    };
    let (backing, issuing) = (backing_endpoint(), issuing_endpoint());

    HelixConfig {
        salt: Salt::from_label("helix-test"),
        artifacts: "artifacts".into(),
        state_file: "helix-state.json".into(),
        gas: GasConfig::default(),
        networks: [
            (backing.network.clone(), network(&backing, None)),
            (issuing.network.clone(), network(&issuing, Some("Pangolin"))),
        ]
        .into_iter()
        .collect(),
        pair: PairConfig {
            backing: backing.network.clone(),
            issuing: issuing.network.clone(),
        },
        endpoints: [
            (backing.network.clone(), endpoint(&backing, 6009)),
            (issuing.network.clone(), endpoint(&issuing, 6006)),
        ]
        .into_iter()
        .collect(),
        token: TokenConfig {
            name: "wrapped oring".to_string(),
            symbol: "WORING".to_string(),
            decimals: 18,
            daily_limit: U256::from(10_000u64),
            register_gas_limit: 5_000_000,
        },
        relay: RelayConfig {
            poll_interval_ms: 5,
            max_wait_secs: 5,
        },
        smoke: SmokeConfig {
            enabled: true,
            lock_amount: U256::from(1_500u64),
            burn_back: true,
        },
        contracts: vec![],
    }
}

/// Guard on the issuing side, guarded by [`STRANGER`] alone.
pub(crate) fn guard_contract() -> ContractConfig {
    ContractConfig {
        name: "guard".to_string(),
        network: issuing_endpoint().network,
        artifact: Some(GUARD_ARTIFACT.to_string()),
        salt: Some(Salt::from_label("guardv3-v1.0.0")),
        types: ["address[]", "address", "uint256", "uint256"].map(String::from).to_vec(),
        values: vec![
            format!("[{}]", hex::encode_prefixed(STRANGER)),
            hex::encode_prefixed(SIGNER),
            "1".to_string(),
            "259200".to_string(),
        ],
    }
}

pub(crate) fn caller_role() -> B256 {
    keccak256("CALLER_ROLE")
}

pub(crate) fn operator_role() -> B256 {
    keccak256("OPERATOR_ROLE")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Endpoint,
    Erc20Logic,
    BackingLogic,
    FactoryLogic,
    WToken,
    ProxyAdmin,
    Proxy,
    Guard,
}

const KINDS: [(Kind, &[u8]); 8] = [
    (Kind::Endpoint, ENDPOINT_CODE),
    (Kind::Erc20Logic, ERC20_CODE),
    (Kind::BackingLogic, BACKING_CODE),
    (Kind::FactoryLogic, FACTORY_CODE),
    (Kind::WToken, WTOKEN_CODE),
    (Kind::ProxyAdmin, PROXY_ADMIN_CODE),
    (Kind::Proxy, PROXY_CODE),
    (Kind::Guard, GUARD_CODE),
];

fn kind_of(creation_code: &[u8]) -> Option<(Kind, &[u8])> {
    KINDS
        .iter()
        .find(|(_, code)| creation_code.starts_with(code))
        .map(|(kind, code)| (*kind, &creation_code[code.len()..]))
}

#[derive(Debug, Clone, Default)]
struct Roles(HashMap<B256, HashSet<Address>>);

impl Roles {
    fn with_admin(admin: Address) -> Self {
        let mut roles = Self::default();
        roles.grant(B256::ZERO, admin);
        roles
    }

    fn has(&self, role: B256, account: Address) -> bool {
        self.0.get(&role).is_some_and(|members| members.contains(&account))
    }

    fn grant(&mut self, role: B256, account: Address) {
        self.0.entry(role).or_default().insert(account);
    }

    fn require_admin(&self, account: Address) -> Result<(), String> {
        if self.has(B256::ZERO, account) {
            Ok(())
        } else {
            Err(format!("AccessControl: account {account} is missing role 0x00"))
        }
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    outbound_lane: FixedBytes<4>,
    inbound_lane: FixedBytes<4>,
    roles: Roles,
    remote_network: FixedBytes<4>,
    remote_chain_id: u64,
    remote_helix: Address,
    remote_call_index: Option<FixedBytes<2>>,
    local_call_index: Option<FixedBytes<2>>,
    storage_keys: Option<[B256; 3]>,
    /// Last nonce sent on the outbound lane.
    nonce: u64,
    /// Dispatch result of every inbound message, by id.
    delivered: HashMap<U256, bool>,
}

#[derive(Debug, Clone)]
struct Backing {
    endpoint: Address,
    roles: Roles,
    chain_name: String,
    remote_factory: Address,
    daily_limits: HashMap<Address, U256>,
    locks: HashMap<U256, Transfer>,
    refunds: HashSet<U256>,
}

#[derive(Debug, Clone)]
struct MappingFactory {
    endpoint: Address,
    roles: Roles,
    remote_backing: Address,
    tokens: Vec<Address>,
    mapping_of: HashMap<Address, Address>,
    burns: HashMap<U256, Transfer>,
    refunds: HashSet<U256>,
}

/// Token, sender and amount of a lock or burn.
type Transfer = (Address, Address, U256);

#[derive(Debug, Clone)]
enum App {
    Backing(Backing),
    Factory(MappingFactory),
}

impl App {
    fn roles_mut(&mut self) -> &mut Roles {
        match self {
            Self::Backing(b) => &mut b.roles,
            Self::Factory(f) => &mut f.roles,
        }
    }

    fn roles(&self) -> &Roles {
        match self {
            Self::Backing(b) => &b.roles,
            Self::Factory(f) => &f.roles,
        }
    }

    fn kind(&self) -> Kind {
        match self {
            Self::Backing(_) => Kind::BackingLogic,
            Self::Factory(_) => Kind::FactoryLogic,
        }
    }
}

#[derive(Debug, Clone)]
struct Proxy {
    implementation: Address,
    admin: Address,
    app: App,
}

#[derive(Debug, Clone, Default)]
struct Token {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

#[derive(Debug, Clone)]
enum Contract {
    Create2Deployer,
    Endpoint(Endpoint),
    ProxyAdmin { owner: Address },
    Proxy(Proxy),
    Logic(Kind),
    Token(Token),
    Guard { guards: Vec<Address>, threshold: U256 },
}

type Ledger = HashMap<Address, Contract>;

#[derive(Debug, Clone)]
enum Payload {
    Register { token: Address },
    Issue { token: Address, recipient: Address, amount: U256 },
    Unlock { token: Address, recipient: Address, amount: U256 },
    RefundLock { transfer_id: U256, transfer: Transfer },
    RefundBurn { transfer_id: U256, transfer: Transfer },
}

#[derive(Debug, Clone)]
struct Message {
    id: U256,
    source_chain: u64,
    source_endpoint: Address,
    lane: FixedBytes<4>,
    target_chain: u64,
    target_endpoint: Address,
    sender_app: Address,
    target_app: Address,
    payload: Payload,
}

struct Ctx {
    chain_id: u64,
    from: Address,
    to: Address,
    value: U256,
    drop_deploys: bool,
}

fn is<T: SolCall>(selector: [u8; 4]) -> bool {
    selector == T::SELECTOR
}

fn selector_of(data: &[u8]) -> Result<[u8; 4], String> {
    data.get(..4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .ok_or_else(|| "missing selector".to_string())
}

fn decode_input(signature: &str, data: &[u8]) -> Result<Vec<DynSolValue>, String> {
    let function = parse_function(signature).map_err(|e| e.to_string())?;
    if selector_of(data)? != function.selector().0 {
        return Err(format!("calldata is not a call to {signature}"));
    }
    function
        .abi_decode_input(&data[4..])
        .map_err(|e| format!("failed to decode {signature} calldata: {e}"))
}

fn args<T: SolCall>(data: &[u8]) -> Result<Vec<DynSolValue>, String> {
    decode_input(T::SIGNATURE, data)
}

fn ctor_args(types: &str, data: &[u8]) -> Result<Vec<DynSolValue>, String> {
    let ty = DynSolType::parse(types).map_err(|e| e.to_string())?;
    match ty.abi_decode_params(data) {
        Ok(DynSolValue::Tuple(values)) => Ok(values),
        Ok(other) => Ok(vec![other]),
        Err(e) => Err(format!("bad constructor arguments for {types}: {e}")),
    }
}

fn address_at(v: &[DynSolValue], i: usize) -> Address {
    v[i].as_address().unwrap()
}

fn uint_at(v: &[DynSolValue], i: usize) -> U256 {
    v[i].as_uint().unwrap().0
}

fn fixed_at<const N: usize>(v: &[DynSolValue], i: usize) -> FixedBytes<N> {
    FixedBytes::from_slice(v[i].as_fixed_bytes().unwrap().0)
}

fn word_address(a: Address) -> Vec<u8> {
    B256::left_padding_from(a.as_slice()).to_vec()
}

fn word_u256(u: U256) -> Vec<u8> {
    u.to_be_bytes::<32>().to_vec()
}

fn word_bool(b: bool) -> Vec<u8> {
    word_u256(U256::from(u8::from(b)))
}

fn word_fixed(bytes: &[u8]) -> Vec<u8> {
    B256::right_padding_from(bytes).to_vec()
}

fn mapping_token_address(factory: Address, original: Address) -> Address {
    let mut preimage = factory.to_vec();
    preimage.extend_from_slice(original.as_slice());
    Address::from_slice(&keccak256(preimage)[12..])
}

fn token_mut(ledger: &mut Ledger, token: Address) -> Result<&mut Token, String> {
    match ledger.get_mut(&token) {
        Some(Contract::Token(t)) => Ok(t),
        _ => Err(format!("{token} is not a token")),
    }
}

fn app_mut(ledger: &mut Ledger, proxy: Address) -> Result<&mut App, String> {
    match ledger.get_mut(&proxy) {
        Some(Contract::Proxy(p)) => Ok(&mut p.app),
        _ => Err(format!("{proxy} is not a proxy")),
    }
}

fn transfer_from(
    ledger: &mut Ledger,
    token: Address,
    owner: Address,
    spender: Address,
    to: Address,
    amount: U256,
) -> Result<(), String> {
    let t = token_mut(ledger, token)?;
    let allowance = t.allowances.get(&(owner, spender)).copied().unwrap_or_default();
    if allowance < amount {
        return Err("ERC20: insufficient allowance".into());
    }
    let balance = t.balances.get(&owner).copied().unwrap_or_default();
    if balance < amount {
        return Err("ERC20: transfer amount exceeds balance".into());
    }
    t.allowances.insert((owner, spender), allowance - amount);
    t.balances.insert(owner, balance - amount);
    *t.balances.entry(to).or_default() += amount;
    Ok(())
}

fn execute(ledger: &mut Ledger, ctx: &Ctx, data: &[u8]) -> Result<Vec<Message>, String> {
    let selector = selector_of(data)?;
    let contract = ledger
        .get(&ctx.to)
        .cloned()
        .ok_or_else(|| format!("call to {} which has no code", ctx.to))?;

    match contract {
        Contract::Create2Deployer => deploy(ledger, ctx, data).map(|_| vec![]),
        Contract::Endpoint(_) => endpoint_tx(ledger, ctx, selector, data).map(|_| vec![]),
        Contract::ProxyAdmin { owner } => {
            proxy_admin_tx(ledger, ctx, owner, selector, data).map(|_| vec![])
        }
        Contract::Proxy(proxy) => {
            if ctx.from == proxy.admin {
                return Err("TransparentUpgradeableProxy: admin cannot fallback".into());
            }
            match proxy.app {
                App::Backing(backing) => backing_tx(ledger, ctx, backing, selector, data),
                App::Factory(factory) => factory_tx(ledger, ctx, factory, selector, data),
            }
        }
        Contract::Token(_) => token_tx(ledger, ctx, selector, data).map(|_| vec![]),
        Contract::Logic(_) => Err("logic contracts are only reachable through a proxy".into()),
        Contract::Guard { .. } => Err("unknown guard function".into()),
    }
}

fn deploy(ledger: &mut Ledger, ctx: &Ctx, data: &[u8]) -> Result<(), String> {
    if !is::<ICreate2Deployer::deployCall>(selector_of(data)?) {
        return Err("unknown deployer function".into());
    }
    let v = args::<ICreate2Deployer::deployCall>(data)?;
    let code = v[0].as_bytes().unwrap().to_vec();
    let salt: B256 = fixed_at(&v, 1);

    let address = ctx.to.create2_from_code(salt, &code);
    if ledger.contains_key(&address) {
        return Err("Create2: Failed on deploy".into());
    }
    if ctx.drop_deploys {
        return Ok(());
    }

    let (kind, ctor) = kind_of(&code).ok_or("unknown init code")?;
    let contract = match kind {
        Kind::Endpoint => {
            let v = ctor_args("(bytes4,bytes4,address)", ctor)?;
            Contract::Endpoint(Endpoint {
                outbound_lane: fixed_at(&v, 0),
                inbound_lane: fixed_at(&v, 1),
                roles: Roles::with_admin(address_at(&v, 2)),
                remote_network: FixedBytes::ZERO,
                remote_chain_id: 0,
                remote_helix: Address::ZERO,
                remote_call_index: None,
                local_call_index: None,
                storage_keys: None,
                nonce: 0,
                delivered: HashMap::new(),
            })
        }
        Kind::ProxyAdmin => {
            let v = ctor_args("(address)", ctor)?;
            Contract::ProxyAdmin {
                owner: address_at(&v, 0),
            }
        }
        Kind::Proxy => {
            let v = ctor_args("(address,address,bytes)", ctor)?;
            let implementation = address_at(&v, 0);
            let logic = match ledger.get(&implementation) {
                Some(Contract::Logic(kind)) => *kind,
                _ => return Err("ERC1967: new implementation is not a contract".into()),
            };
            let app = initialize(logic, v[2].as_bytes().unwrap())?;
            Contract::Proxy(Proxy {
                implementation,
                admin: address_at(&v, 1),
                app,
            })
        }
        Kind::Erc20Logic | Kind::BackingLogic | Kind::FactoryLogic => {
            if kind == Kind::Erc20Logic {
                ctor_args("(string,string,uint8)", ctor)?;
            }
            Contract::Logic(kind)
        }
        Kind::WToken => {
            ctor_args("(string,string,uint8)", ctor)?;
            Contract::Token(Token::default())
        }
        Kind::Guard => {
            let v = ctor_args("(address[],address,uint256,uint256)", ctor)?;
            let guards: Vec<Address> =
                v[0].as_array().unwrap().iter().filter_map(DynSolValue::as_address).collect();
            let threshold = uint_at(&v, 2);
            if threshold.is_zero() || threshold > U256::from(guards.len()) {
                return Err("Guard: invalid threshold".into());
            }
            Contract::Guard { guards, threshold }
        }
    };
    ledger.insert(address, contract);
    Ok(())
}

fn initialize(logic: Kind, calldata: &[u8]) -> Result<App, String> {
    let v = decode_input(DEFAULT_INITIALIZER, calldata)
        .map_err(|_| "unknown initializer".to_string())?;
    let endpoint = address_at(&v, 0);
    let roles = Roles::with_admin(address_at(&v, 1));
    match logic {
        Kind::BackingLogic => Ok(App::Backing(Backing {
            endpoint,
            roles,
            chain_name: String::new(),
            remote_factory: Address::ZERO,
            daily_limits: HashMap::new(),
            locks: HashMap::new(),
            refunds: HashSet::new(),
        })),
        Kind::FactoryLogic => Ok(App::Factory(MappingFactory {
            endpoint,
            roles,
            remote_backing: Address::ZERO,
            tokens: vec![],
            mapping_of: HashMap::new(),
            burns: HashMap::new(),
            refunds: HashSet::new(),
        })),
        _ => Err("implementation has no initializer".into()),
    }
}

fn endpoint_tx(
    ledger: &mut Ledger,
    ctx: &Ctx,
    selector: [u8; 4],
    data: &[u8],
) -> Result<(), String> {
    let Some(Contract::Endpoint(ep)) = ledger.get_mut(&ctx.to) else {
        return Err("not an endpoint".into());
    };
    ep.roles.require_admin(ctx.from)?;

    if is::<IAccessControl::grantRoleCall>(selector) {
        let v = args::<IAccessControl::grantRoleCall>(data)?;
        ep.roles.grant(fixed_at(&v, 0), address_at(&v, 1));
    } else if is::<IMessageEndpoint::setRemoteHelixCall>(selector) {
        let v = args::<IMessageEndpoint::setRemoteHelixCall>(data)?;
        ep.remote_network = fixed_at(&v, 0);
        ep.remote_chain_id = uint_at(&v, 1).to::<u64>();
        ep.remote_helix = address_at(&v, 2);
    } else if is::<IMessageEndpoint::setRemoteCallIndexCall>(selector) {
        let v = args::<IMessageEndpoint::setRemoteCallIndexCall>(data)?;
        ep.remote_call_index = Some(fixed_at(&v, 0));
    } else if is::<IMessageEndpoint::setLocalCallInfoCall>(selector) {
        let v = args::<IMessageEndpoint::setLocalCallInfoCall>(data)?;
        ep.local_call_index = Some(fixed_at(&v, 0));
    } else if is::<IMessageEndpoint::setLocalStorageKeyCall>(selector) {
        let v = args::<IMessageEndpoint::setLocalStorageKeyCall>(data)?;
        ep.storage_keys = Some([fixed_at(&v, 0), fixed_at(&v, 1), fixed_at(&v, 2)]);
    } else {
        return Err("unknown endpoint function".into());
    }
    Ok(())
}

fn proxy_admin_tx(
    ledger: &mut Ledger,
    ctx: &Ctx,
    owner: Address,
    selector: [u8; 4],
    data: &[u8],
) -> Result<(), String> {
    if !is::<IProxyAdmin::upgradeCall>(selector) {
        return Err("unknown proxy admin function".into());
    }
    if ctx.from != owner {
        return Err("Ownable: caller is not the owner".into());
    }
    let v = args::<IProxyAdmin::upgradeCall>(data)?;
    let (proxy, implementation) = (address_at(&v, 0), address_at(&v, 1));
    let new_kind = match ledger.get(&implementation) {
        Some(Contract::Logic(kind)) => *kind,
        _ => return Err("ERC1967: new implementation is not a contract".into()),
    };
    match ledger.get_mut(&proxy) {
        Some(Contract::Proxy(p)) if p.admin == ctx.to => {
            if p.app.kind() != new_kind {
                return Err("incompatible implementation".into());
            }
            p.implementation = implementation;
            Ok(())
        }
        _ => Err("proxy is not administered by this admin".into()),
    }
}

fn send_message(
    ledger: &mut Ledger,
    ctx: &Ctx,
    endpoint: Address,
    target_app: Address,
    payload: Payload,
) -> Result<Message, String> {
    let Some(Contract::Endpoint(ep)) = ledger.get_mut(&endpoint) else {
        return Err("message endpoint has no code".into());
    };
    if !ep.roles.has(caller_role(), ctx.to) {
        return Err(format!("AccessControl: account {} is missing CALLER_ROLE", ctx.to));
    }
    if ep.remote_helix == Address::ZERO
        || ep.remote_call_index.is_none()
        || ep.local_call_index.is_none()
        || ep.storage_keys.is_none()
    {
        return Err("message endpoint is not configured".into());
    }
    if ctx.value.is_zero() {
        return Err("insufficient dispatch fee".into());
    }
    ep.nonce += 1;
    Ok(Message {
        id: transfer_id(ep.outbound_lane, ep.nonce),
        source_chain: ctx.chain_id,
        source_endpoint: endpoint,
        lane: ep.outbound_lane,
        target_chain: ep.remote_chain_id,
        target_endpoint: ep.remote_helix,
        sender_app: ctx.to,
        target_app,
        payload,
    })
}

/// Refunds are only possible for messages that arrived and failed to dispatch.
fn require_failed_dispatch(
    ledger: &Ledger,
    endpoint: Address,
    transfer_id: U256,
) -> Result<(), String> {
    let Some(Contract::Endpoint(ep)) = ledger.get(&endpoint) else {
        return Err("message endpoint has no code".into());
    };
    match ep.delivered.get(&transfer_id) {
        None => Err("message not delivered".into()),
        Some(true) => Err("success message can't refund".into()),
        Some(false) => Ok(()),
    }
}

fn backing_tx(
    ledger: &mut Ledger,
    ctx: &Ctx,
    backing: Backing,
    selector: [u8; 4],
    data: &[u8],
) -> Result<Vec<Message>, String> {
    if is::<IAccessControl::grantRoleCall>(selector) {
        backing.roles.require_admin(ctx.from)?;
        let v = args::<IAccessControl::grantRoleCall>(data)?;
        app_mut(ledger, ctx.to)?
            .roles_mut()
            .grant(fixed_at(&v, 0), address_at(&v, 1));
        return Ok(vec![]);
    }
    if is::<IBacking::setChainNameCall>(selector) {
        backing.roles.require_admin(ctx.from)?;
        let v = args::<IBacking::setChainNameCall>(data)?;
        if let App::Backing(b) = app_mut(ledger, ctx.to)? {
            b.chain_name = v[0].as_str().unwrap().to_string();
        }
        return Ok(vec![]);
    }
    if is::<IBacking::setRemoteMappingTokenFactoryCall>(selector) {
        backing.roles.require_admin(ctx.from)?;
        let v = args::<IBacking::setRemoteMappingTokenFactoryCall>(data)?;
        if let App::Backing(b) = app_mut(ledger, ctx.to)? {
            b.remote_factory = address_at(&v, 0);
        }
        return Ok(vec![]);
    }
    if is::<IBacking::registerCall>(selector) {
        if !backing.roles.has(operator_role(), ctx.from) {
            return Err("Backing: caller is not operator".into());
        }
        let v = args::<IBacking::registerCall>(data)?;
        let token = address_at(&v, 2);
        if !matches!(ledger.get(&token), Some(Contract::Token(_))) {
            return Err("Backing: token has no code".into());
        }
        if backing.daily_limits.contains_key(&token) {
            return Err("Backing: token has been registered".into());
        }
        if backing.remote_factory == Address::ZERO {
            return Err("Backing: remote factory not set".into());
        }
        let message = send_message(
            ledger,
            ctx,
            backing.endpoint,
            backing.remote_factory,
            Payload::Register { token },
        )?;
        if let App::Backing(b) = app_mut(ledger, ctx.to)? {
            b.daily_limits.insert(token, uint_at(&v, 6));
        }
        return Ok(vec![message]);
    }
    if is::<IBacking::lockAndRemoteIssuingCall>(selector) {
        let v = args::<IBacking::lockAndRemoteIssuingCall>(data)?;
        let (token, recipient, amount) = (address_at(&v, 2), address_at(&v, 3), uint_at(&v, 4));
        let limit = backing
            .daily_limits
            .get(&token)
            .copied()
            .ok_or("Backing: token is not registered")?;
        if amount > limit {
            return Err("Backing: exceeds daily limit".into());
        }
        transfer_from(ledger, token, ctx.from, ctx.to, ctx.to, amount)?;
        let message = send_message(
            ledger,
            ctx,
            backing.endpoint,
            backing.remote_factory,
            Payload::Issue {
                token,
                recipient,
                amount,
            },
        )?;
        if let App::Backing(b) = app_mut(ledger, ctx.to)? {
            b.locks.insert(message.id, (token, ctx.from, amount));
        }
        return Ok(vec![message]);
    }
    if is::<IBacking::remoteIssuingFailureCall>(selector) {
        let v = args::<IBacking::remoteIssuingFailureCall>(data)?;
        let transfer_id = uint_at(&v, 2);
        require_failed_dispatch(ledger, backing.endpoint, transfer_id)?;
        if backing.refunds.contains(&transfer_id) {
            return Err("Backing: refund already requested".into());
        }
        let message = send_message(
            ledger,
            ctx,
            backing.endpoint,
            backing.remote_factory,
            Payload::RefundBurn {
                transfer_id,
                transfer: (address_at(&v, 3), address_at(&v, 4), uint_at(&v, 5)),
            },
        )?;
        if let App::Backing(b) = app_mut(ledger, ctx.to)? {
            b.refunds.insert(transfer_id);
        }
        return Ok(vec![message]);
    }
    Err("unknown backing function".into())
}

fn factory_tx(
    ledger: &mut Ledger,
    ctx: &Ctx,
    factory: MappingFactory,
    selector: [u8; 4],
    data: &[u8],
) -> Result<Vec<Message>, String> {
    if is::<IAccessControl::grantRoleCall>(selector) {
        factory.roles.require_admin(ctx.from)?;
        let v = args::<IAccessControl::grantRoleCall>(data)?;
        app_mut(ledger, ctx.to)?
            .roles_mut()
            .grant(fixed_at(&v, 0), address_at(&v, 1));
        return Ok(vec![]);
    }
    if is::<IMappingTokenFactory::setRemoteBackingCall>(selector) {
        factory.roles.require_admin(ctx.from)?;
        let v = args::<IMappingTokenFactory::setRemoteBackingCall>(data)?;
        if let App::Factory(f) = app_mut(ledger, ctx.to)? {
            f.remote_backing = address_at(&v, 0);
        }
        return Ok(vec![]);
    }
    if is::<IMappingTokenFactory::burnAndRemoteUnlockCall>(selector) {
        let v = args::<IMappingTokenFactory::burnAndRemoteUnlockCall>(data)?;
        let (mapping, recipient, amount) = (address_at(&v, 2), address_at(&v, 3), uint_at(&v, 4));
        let original = factory
            .mapping_of
            .iter()
            .find(|(_, m)| **m == mapping)
            .map(|(original, _)| *original)
            .ok_or("MappingTokenFactory: unknown mapping token")?;
        transfer_from(ledger, mapping, ctx.from, ctx.to, ctx.to, amount)?;
        let t = token_mut(ledger, mapping)?;
        *t.balances.entry(ctx.to).or_default() -= amount;

        let message = send_message(
            ledger,
            ctx,
            factory.endpoint,
            factory.remote_backing,
            Payload::Unlock {
                token: original,
                recipient,
                amount,
            },
        )?;
        if let App::Factory(f) = app_mut(ledger, ctx.to)? {
            f.burns.insert(message.id, (mapping, ctx.from, amount));
        }
        return Ok(vec![message]);
    }
    if is::<IMappingTokenFactory::remoteUnlockFailureCall>(selector) {
        let v = args::<IMappingTokenFactory::remoteUnlockFailureCall>(data)?;
        let transfer_id = uint_at(&v, 2);
        require_failed_dispatch(ledger, factory.endpoint, transfer_id)?;
        if factory.refunds.contains(&transfer_id) {
            return Err("MappingTokenFactory: refund already requested".into());
        }
        let message = send_message(
            ledger,
            ctx,
            factory.endpoint,
            factory.remote_backing,
            Payload::RefundLock {
                transfer_id,
                transfer: (address_at(&v, 3), address_at(&v, 4), uint_at(&v, 5)),
            },
        )?;
        if let App::Factory(f) = app_mut(ledger, ctx.to)? {
            f.refunds.insert(transfer_id);
        }
        return Ok(vec![message]);
    }
    Err("unknown mapping token factory function".into())
}

fn token_tx(ledger: &mut Ledger, ctx: &Ctx, selector: [u8; 4], data: &[u8]) -> Result<(), String> {
    let t = token_mut(ledger, ctx.to)?;
    if is::<IErc20::depositCall>(selector) {
        *t.balances.entry(ctx.from).or_default() += ctx.value;
        Ok(())
    } else if is::<IErc20::approveCall>(selector) {
        let v = args::<IErc20::approveCall>(data)?;
        t.allowances.insert((ctx.from, address_at(&v, 0)), uint_at(&v, 1));
        Ok(())
    } else {
        Err("unknown token function".into())
    }
}

fn view(ledger: &Ledger, to: Address, data: &[u8]) -> Result<Vec<u8>, String> {
    let selector = selector_of(data)?;
    let Some(contract) = ledger.get(&to) else {
        return Ok(vec![]);
    };

    match contract {
        Contract::Endpoint(ep) => {
            if is::<IMessageEndpoint::CALLER_ROLECall>(selector) {
                Ok(caller_role().to_vec())
            } else if is::<IAccessControl::hasRoleCall>(selector) {
                let v = args::<IAccessControl::hasRoleCall>(data)?;
                Ok(word_bool(ep.roles.has(fixed_at(&v, 0), address_at(&v, 1))))
            } else if is::<IMessageEndpoint::remoteBridgeNetworkIdCall>(selector) {
                Ok(word_fixed(ep.remote_network.as_slice()))
            } else if is::<IMessageEndpoint::remoteChainIdCall>(selector) {
                Ok(word_u256(U256::from(ep.remote_chain_id)))
            } else if is::<IMessageEndpoint::remoteHelixCall>(selector) {
                Ok(word_address(ep.remote_helix))
            } else {
                Err("unknown endpoint view".into())
            }
        }
        Contract::Proxy(p) => {
            if is::<IAccessControl::hasRoleCall>(selector) {
                let v = args::<IAccessControl::hasRoleCall>(data)?;
                return Ok(word_bool(p.app.roles().has(fixed_at(&v, 0), address_at(&v, 1))));
            }
            match &p.app {
                App::Backing(_) if is::<IBacking::OPERATOR_ROLECall>(selector) => {
                    Ok(operator_role().to_vec())
                }
                App::Factory(f) if is::<IMappingTokenFactory::tokenLengthCall>(selector) => {
                    Ok(word_u256(U256::from(f.tokens.len())))
                }
                App::Factory(f) if is::<IMappingTokenFactory::allMappingTokensCall>(selector) => {
                    let v = args::<IMappingTokenFactory::allMappingTokensCall>(data)?;
                    let index = uint_at(&v, 0).to::<usize>();
                    f.tokens
                        .get(index)
                        .map(|t| word_address(*t))
                        .ok_or_else(|| "index out of bounds".to_string())
                }
                _ => Err("unknown proxy view".into()),
            }
        }
        Contract::ProxyAdmin { .. } => {
            let read = |proxy: Address| match ledger.get(&proxy) {
                Some(Contract::Proxy(p)) => Ok(p.clone()),
                _ => Err("not a proxy".to_string()),
            };
            if is::<IProxyAdmin::getProxyImplementationCall>(selector) {
                let v = args::<IProxyAdmin::getProxyImplementationCall>(data)?;
                Ok(word_address(read(address_at(&v, 0))?.implementation))
            } else {
                Err("unknown proxy admin view".into())
            }
        }
        Contract::Token(t) => {
            if is::<IErc20::balanceOfCall>(selector) {
                let v = args::<IErc20::balanceOfCall>(data)?;
                Ok(word_u256(t.balances.get(&address_at(&v, 0)).copied().unwrap_or_default()))
            } else {
                Err("unknown token view".into())
            }
        }
        _ => Err("contract has no views".into()),
    }
}

fn deliver(ledger: &mut Ledger, msg: &Message) -> Result<(), String> {
    let Some(Contract::Endpoint(ep)) = ledger.get(&msg.target_endpoint) else {
        return Err(format!("no endpoint at {} on chain {}", msg.target_endpoint, msg.target_chain));
    };
    if ep.remote_helix != msg.source_endpoint || ep.remote_chain_id != msg.source_chain {
        return Err("endpoint does not trust the source endpoint".into());
    }
    if ep.inbound_lane != msg.lane {
        return Err("message arrived on an unexpected lane".into());
    }

    match (app_mut(ledger, msg.target_app)?, &msg.payload) {
        (App::Factory(f), Payload::Register { token }) => {
            if f.endpoint != msg.target_endpoint || f.remote_backing != msg.sender_app {
                return Err("factory rejects the sender".into());
            }
            if f.mapping_of.contains_key(token) {
                return Err("token already registered".into());
            }
            let mapping = mapping_token_address(msg.target_app, *token);
            f.tokens.push(mapping);
            f.mapping_of.insert(*token, mapping);
            ledger.insert(mapping, Contract::Token(Token::default()));
        }
        (App::Factory(f), Payload::Issue { token, recipient, amount }) => {
            if f.endpoint != msg.target_endpoint || f.remote_backing != msg.sender_app {
                return Err("factory rejects the sender".into());
            }
            let mapping = *f.mapping_of.get(token).ok_or("token not registered")?;
            *token_mut(ledger, mapping)?.balances.entry(*recipient).or_default() += *amount;
        }
        (App::Factory(f), Payload::RefundBurn { transfer_id, transfer }) => {
            if f.endpoint != msg.target_endpoint || f.remote_backing != msg.sender_app {
                return Err("factory rejects the sender".into());
            }
            if f.burns.remove(transfer_id) != Some(*transfer) {
                return Err("MappingTokenFactory: invalid refund".into());
            }
            let (mapping, sender, amount) = *transfer;
            *token_mut(ledger, mapping)?.balances.entry(sender).or_default() += amount;
        }
        (App::Backing(b), Payload::Unlock { token, recipient, amount }) => {
            if b.endpoint != msg.target_endpoint || b.remote_factory != msg.sender_app {
                return Err("backing rejects the sender".into());
            }
            release(ledger, *token, msg.target_app, *recipient, *amount)?;
        }
        (App::Backing(b), Payload::RefundLock { transfer_id, transfer }) => {
            if b.endpoint != msg.target_endpoint || b.remote_factory != msg.sender_app {
                return Err("backing rejects the sender".into());
            }
            if b.locks.remove(transfer_id) != Some(*transfer) {
                return Err("Backing: invalid refund".into());
            }
            let (token, sender, amount) = *transfer;
            release(ledger, token, msg.target_app, sender, amount)?;
        }
        _ => return Err("payload does not match the target".into()),
    }
    Ok(())
}

/// Move locked tokens out of the backing.
fn release(
    ledger: &mut Ledger,
    token: Address,
    backing: Address,
    to: Address,
    amount: U256,
) -> Result<(), String> {
    let t = token_mut(ledger, token)?;
    let locked = t.balances.get(&backing).copied().unwrap_or_default();
    if locked < amount {
        return Err("backing has not enough locked".into());
    }
    t.balances.insert(backing, locked - amount);
    *t.balances.entry(to).or_default() += amount;
    Ok(())
}

/// How dispatched messages reach the other chain.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RelayMode {
    /// Deliver every message after a delay.
    Auto(Duration),
    /// Hold messages until [`MockNetwork::release_stalled`].
    Stalled,
}

#[derive(Debug, Default)]
struct Chain {
    ledger: Ledger,
    nonce: u64,
    receipts: HashMap<B256, TxReceipt>,
    sent: Vec<String>,
    reverts: HashMap<[u8; 4], String>,
    drop_deploys: bool,
    fail_dispatch: bool,
}

impl Chain {
    fn run(&self, ledger: &mut Ledger, ctx: &Ctx, data: &[u8]) -> Result<Vec<Message>, String> {
        if let Some(reason) = self.reverts.get(&selector_of(data)?) {
            return Err(reason.clone());
        }
        execute(ledger, ctx, data)
    }
}

#[derive(Debug)]
struct World {
    chains: HashMap<u64, Chain>,
    relay: RelayMode,
    stalled: Vec<Message>,
    failed_deliveries: Vec<String>,
}

impl World {
    fn chain(&self, chain_id: u64) -> &Chain {
        self.chains.get(&chain_id).unwrap()
    }

    fn deliver(&mut self, msg: Message) {
        let Some(chain) = self.chains.get_mut(&msg.target_chain) else {
            self.failed_deliveries.push(format!("unknown chain {}", msg.target_chain));
            return;
        };
        let mut scratch = chain.ledger.clone();
        let result = if chain.fail_dispatch {
            Err("dispatch failed on the target chain".to_string())
        } else {
            deliver(&mut scratch, &msg)
        };
        let dispatched = result.is_ok();
        match result {
            Ok(()) => chain.ledger = scratch,
            Err(reason) => self.failed_deliveries.push(reason),
        }
        if let Some(Contract::Endpoint(ep)) = chain.ledger.get_mut(&msg.target_endpoint) {
            ep.delivered.insert(msg.id, dispatched);
        }
    }
}

fn relay(world: &Arc<Mutex<World>>, messages: Vec<Message>) {
    if messages.is_empty() {
        return;
    }
    let mode = world.lock().unwrap().relay;
    match mode {
        RelayMode::Stalled => world.lock().unwrap().stalled.extend(messages),
        RelayMode::Auto(delay) => {
            for msg in messages {
                let world = Arc::clone(world);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    world.lock().unwrap().deliver(msg);
                });
            }
        }
    }
}

/// Two chains sharing a relay.
#[derive(Debug, Clone)]
pub(crate) struct MockNetwork {
    world: Arc<Mutex<World>>,
}

impl MockNetwork {
    /// Backing and issuing chains, each with a CREATE2 deployer at [`FACTORY`].
    pub(crate) fn new() -> Self {
        let mut chains = HashMap::new();
        for chain_id in [BACKING_CHAIN, ISSUING_CHAIN] {
            let mut chain = Chain::default();
            chain.ledger.insert(FACTORY, Contract::Create2Deployer);
            chains.insert(chain_id, chain);
        }
        Self {
            world: Arc::new(Mutex::new(World {
                chains,
                relay: RelayMode::Auto(Duration::from_millis(10)),
                stalled: vec![],
                failed_deliveries: vec![],
            })),
        }
    }

    pub(crate) fn client(&self, chain_id: u64) -> MockClient {
        self.client_as(chain_id, SIGNER)
    }

    pub(crate) fn client_as(&self, chain_id: u64, sender: Address) -> MockClient {
        MockClient {
            world: Arc::clone(&self.world),
            chain_id,
            sender,
        }
    }

    pub(crate) fn set_relay(&self, mode: RelayMode) {
        self.world.lock().unwrap().relay = mode;
    }

    /// Deliver every message held while the relay was stalled.
    pub(crate) fn release_stalled(&self) {
        let mut world = self.world.lock().unwrap();
        let stalled = std::mem::take(&mut world.stalled);
        for msg in stalled {
            world.deliver(msg);
        }
    }

    /// Make every call with this selector revert on `chain_id`.
    pub(crate) fn revert_on(&self, chain_id: u64, selector: [u8; 4], reason: &str) {
        let mut world = self.world.lock().unwrap();
        world
            .chains
            .get_mut(&chain_id)
            .unwrap()
            .reverts
            .insert(selector, reason.to_string());
    }

    pub(crate) fn clear_reverts(&self, chain_id: u64) {
        self.world.lock().unwrap().chains.get_mut(&chain_id).unwrap().reverts.clear();
    }

    /// Deployments succeed without leaving code behind.
    pub(crate) fn drop_deploys(&self, chain_id: u64, drop: bool) {
        self.world.lock().unwrap().chains.get_mut(&chain_id).unwrap().drop_deploys = drop;
    }

    /// Messages reaching `chain_id` are delivered but fail to dispatch.
    pub(crate) fn fail_dispatch(&self, chain_id: u64, fail: bool) {
        self.world.lock().unwrap().chains.get_mut(&chain_id).unwrap().fail_dispatch = fail;
    }

    pub(crate) fn remove_factory(&self, chain_id: u64) {
        self.world
            .lock()
            .unwrap()
            .chains
            .get_mut(&chain_id)
            .unwrap()
            .ledger
            .remove(&FACTORY);
    }

    /// Labels of every transaction submitted on `chain_id`, in order.
    pub(crate) fn sent(&self, chain_id: u64) -> Vec<String> {
        self.world.lock().unwrap().chain(chain_id).sent.clone()
    }

    pub(crate) fn sent_count(&self, chain_id: u64) -> usize {
        self.world.lock().unwrap().chain(chain_id).sent.len()
    }

    pub(crate) fn failed_deliveries(&self) -> Vec<String> {
        self.world.lock().unwrap().failed_deliveries.clone()
    }

    /// Current implementation behind a proxy.
    pub(crate) fn implementation_of(&self, chain_id: u64, proxy: Address) -> Option<Address> {
        match self.world.lock().unwrap().chain(chain_id).ledger.get(&proxy) {
            Some(Contract::Proxy(p)) => Some(p.implementation),
            _ => None,
        }
    }

    /// Guard set and threshold of a guard contract.
    pub(crate) fn guard_of(&self, chain_id: u64, guard: Address) -> Option<(Vec<Address>, U256)> {
        match self.world.lock().unwrap().chain(chain_id).ledger.get(&guard) {
            Some(Contract::Guard { guards, threshold }) => Some((guards.clone(), *threshold)),
            _ => None,
        }
    }

    /// Chain name stored on a backing proxy.
    pub(crate) fn chain_name_of(&self, chain_id: u64, backing: Address) -> Option<String> {
        match self.world.lock().unwrap().chain(chain_id).ledger.get(&backing) {
            Some(Contract::Proxy(Proxy {
                app: App::Backing(b),
                ..
            })) => Some(b.chain_name.clone()),
            _ => None,
        }
    }
}

/// Client of one mock chain.
#[derive(Debug, Clone)]
pub(crate) struct MockClient {
    world: Arc<Mutex<World>>,
    chain_id: u64,
    sender: Address,
}

impl MockClient {
    fn ctx(&self, tx: &TxRequest, drop_deploys: bool) -> Ctx {
        Ctx {
            chain_id: self.chain_id,
            from: self.sender,
            to: tx.to,
            value: tx.value,
            drop_deploys,
        }
    }

    fn submit(&self, tx: &TxRequest) -> (B256, Vec<Message>) {
        let mut world = self.world.lock().unwrap();
        let chain = world.chains.get_mut(&self.chain_id).unwrap();
        chain.nonce += 1;

        let mut preimage = self.chain_id.to_be_bytes().to_vec();
        preimage.extend_from_slice(&chain.nonce.to_be_bytes());
        let tx_hash = keccak256(preimage);
        chain.sent.push(tx.label.clone());

        let ctx = self.ctx(tx, chain.drop_deploys);
        let mut scratch = chain.ledger.clone();
        let (status, messages) = match chain.run(&mut scratch, &ctx, &tx.data) {
            Ok(messages) => {
                chain.ledger = scratch;
                (true, messages)
            }
            Err(reason) => {
                tracing::debug!(call = %tx.label, reason = %reason, "Mock transaction reverted");
                (false, vec![])
            }
        };
        chain.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: chain.nonce,
                gas_used: 21_000,
                status,
            },
        );
        (tx_hash, messages)
    }
}

fn reverted(reason: String) -> DeployError {
    DeployError::Rpc {
        method: "eth_call".to_string(),
        message: format!("execution reverted: {reason}"),
    }
}

impl ChainClient for MockClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        let world = self.world.lock().unwrap();
        Ok(if world.chain(self.chain_id).ledger.contains_key(&address) {
            Bytes::from_static(&[0x60, 0x80])
        } else {
            Bytes::new()
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let world = self.world.lock().unwrap();
        view(&world.chain(self.chain_id).ledger, to, &data)
            .map(Bytes::from)
            .map_err(reverted)
    }

    async fn simulate(&self, tx: &TxRequest) -> Result<Bytes> {
        let world = self.world.lock().unwrap();
        let chain = world.chain(self.chain_id);
        let mut scratch = chain.ledger.clone();
        chain
            .run(&mut scratch, &self.ctx(tx, chain.drop_deploys), &tx.data)
            .map(|_| Bytes::new())
            .map_err(reverted)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256> {
        let (tx_hash, messages) = self.submit(tx);
        relay(&self.world, messages);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256, cancel: &CancelToken) -> Result<TxReceipt> {
        cancel.check()?;
        let world = self.world.lock().unwrap();
        world
            .chain(self.chain_id)
            .receipts
            .get(&tx_hash)
            .copied()
            .ok_or_else(|| DeployError::Rpc {
                method: "eth_getTransactionReceipt".to_string(),
                message: format!("unknown transaction {tx_hash}"),
            })
    }
}
