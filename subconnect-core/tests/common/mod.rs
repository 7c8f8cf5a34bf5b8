#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use subconnect_connector::{
    address,
    injected::{AccountsCallback, InjectedAccount, InjectedConnector, InjectedExtension, InjectedProvider, StaticDiscovery},
    relay::{PairingProposal, RelayClient, RelayConnector, RelayNamespace, RelaySession, SessionDeleteHandler},
    Chain, ConnectorError, ConnectorInfo, NativeCurrency, RpcUrls, SignRawPayload, Signer,
    SignerResult, Unsubscribe, WalletConnector,
};
use subconnect_core::{
    api::NotificationCallback, ApiFactory, ChainApi, ChainProperties, KeyValueStorage,
    MemoryStorage, SessionConfig, SessionState, SessionStore, StorageError, Transport,
};
use tokio::sync::{oneshot, Notify};

pub const POLKADOT: &str = "0x91b171bb158e2d3848fa23a9f1c25182fb8e20313b2c1eb49219da7a70ce90c3";
pub const KUSAMA: &str = "0xb0a8d493285c2df73290dfb7e61f870f17b41801197a149ca93654499ea3dafe";

pub fn chain(genesis_hash: &str, name: &str) -> Chain {
    Chain {
        genesis_hash: genesis_hash.to_string(),
        name: name.to_string(),
        ss58_format: 0,
        native_currency: NativeCurrency {
            name: name.to_string(),
            symbol: "UNIT".to_string(),
            decimals: 10,
        },
        rpc_urls: RpcUrls::default(),
        testnet: false,
        block_explorer: None,
    }
}

pub fn address_for(seed: u8, prefix: u16) -> String {
    address::encode(prefix, &[seed; 32])
}

pub fn public_key_for(seed: u8) -> String {
    format!("0x{}", hex::encode([seed; 32]))
}

/// Lets spawned tasks on the current-thread runtime make progress.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Waits until the store state satisfies `predicate`.
pub async fn wait_for(store: &SessionStore, predicate: impl Fn(&SessionState) -> bool) {
    let mut rx = store.watch();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for store state")
        .expect("store dropped");
}

// --- Injected wallet fakes ---

pub struct FakeSigner;

#[async_trait]
impl Signer for FakeSigner {
    async fn sign_raw(&self, payload: SignRawPayload) -> Result<SignerResult, ConnectorError> {
        Ok(SignerResult {
            id: 1,
            signature: format!("sig:{}", payload.data),
        })
    }
}

type SharedCallback = Arc<dyn Fn(Vec<InjectedAccount>) + Send + Sync>;

#[derive(Default)]
pub struct FakeExtension {
    accounts: Mutex<Vec<InjectedAccount>>,
    callbacks: Arc<Mutex<Vec<(u64, SharedCallback)>>>,
    next_id: AtomicU64,
}

impl FakeExtension {
    pub fn new(accounts: Vec<InjectedAccount>) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(accounts),
            ..Self::default()
        })
    }

    pub fn push_accounts(&self, accounts: Vec<InjectedAccount>) {
        *self.accounts.lock().unwrap() = accounts.clone();
        let callbacks: Vec<SharedCallback> = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(accounts.clone());
        }
    }
}

#[async_trait]
impl InjectedExtension for FakeExtension {
    async fn accounts(&self) -> Result<Vec<InjectedAccount>, ConnectorError> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    fn subscribe_accounts(&self, callback: AccountsCallback) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks
            .lock()
            .unwrap()
            .push((id, SharedCallback::from(callback)));
        let callbacks = self.callbacks.clone();
        Box::new(move || {
            callbacks.lock().unwrap().retain(|(existing, _)| *existing != id);
        })
    }

    fn signer(&self) -> Arc<dyn Signer> {
        Arc::new(FakeSigner)
    }
}

pub struct FakeProvider {
    pub extension: Arc<FakeExtension>,
    pub reject: AtomicBool,
    pub enable_calls: AtomicUsize,
    /// When set, `enable` waits for the sender to fire.
    pub hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeProvider {
    pub fn new(extension: Arc<FakeExtension>) -> Arc<Self> {
        Arc::new(Self {
            extension,
            reject: AtomicBool::new(false),
            enable_calls: AtomicUsize::new(0),
            hold: Mutex::new(None),
        })
    }

    pub fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }
}

#[async_trait]
impl InjectedProvider for FakeProvider {
    async fn enable(&self, app_name: &str) -> Result<Arc<dyn InjectedExtension>, ConnectorError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().take();
        if let Some(rx) = hold {
            let _ = rx.await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(ConnectorError::Rejected {
                connector: "fake".into(),
                reason: format!("user rejected {}", app_name),
            });
        }
        Ok(self.extension.clone())
    }
}

pub fn injected_account(seed: u8, name: &str) -> InjectedAccount {
    InjectedAccount::new(address_for(seed, 42)).named(name)
}

pub fn injected(id: &str, accounts: Vec<InjectedAccount>) -> (Arc<WalletConnector>, Arc<FakeProvider>) {
    let provider = FakeProvider::new(FakeExtension::new(accounts));
    let discovery = StaticDiscovery::new().with_provider(id, provider.clone());
    let connector = InjectedConnector::new(ConnectorInfo::new(id, id, "icon.svg"), id, Arc::new(discovery));
    (Arc::new(connector.into()), provider)
}

// --- Relay fake, enough for restored sessions ---

type SharedDeleteHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
pub struct FakeRelay {
    pub session: Mutex<Option<RelaySession>>,
    pub fail_disconnect: AtomicBool,
    handlers: Arc<Mutex<Vec<(u64, SharedDeleteHandler)>>>,
    next_id: AtomicU64,
}

impl FakeRelay {
    pub fn with_session(session: RelaySession) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(Some(session)),
            ..Self::default()
        })
    }

    pub fn delete_session(&self, topic: &str) {
        let handlers: Vec<SharedDeleteHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(topic);
        }
    }
}

#[async_trait]
impl RelayClient for FakeRelay {
    async fn restore_session(&self) -> Result<Option<RelaySession>, ConnectorError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn pair(&self, _namespace: RelayNamespace) -> Result<PairingProposal, ConnectorError> {
        Err(ConnectorError::Relay("pairing unavailable".into()))
    }

    async fn request(
        &self,
        _topic: &str,
        _chain_id: &str,
        _method: &str,
        params: Value,
    ) -> Result<Value, ConnectorError> {
        Ok(serde_json::json!({ "signature": format!("relay-sig:{}", params["message"]) }))
    }

    async fn disconnect(&self, _topic: &str) -> Result<(), ConnectorError> {
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ConnectorError::Relay("relay unreachable".into()));
        }
        Ok(())
    }

    fn on_session_delete(&self, handler: SessionDeleteHandler) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap()
            .push((id, SharedDeleteHandler::from(handler)));
        let handlers = self.handlers.clone();
        Box::new(move || {
            handlers.lock().unwrap().retain(|(existing, _)| *existing != id);
        })
    }
}

pub fn relay(id: &str, relay: Arc<FakeRelay>) -> Arc<WalletConnector> {
    let connector = RelayConnector::new(ConnectorInfo::new(id, id, "relay.svg"), relay);
    Arc::new(connector.into())
}

pub fn relay_session(topic: &str, genesis_hash: &str, seeds: &[u8]) -> RelaySession {
    let chain = subconnect_connector::caip_chain_id(genesis_hash);
    RelaySession {
        topic: topic.to_string(),
        accounts: seeds
            .iter()
            .map(|seed| format!("{}:{}", chain, address_for(*seed, 0)))
            .collect(),
        peer_name: None,
    }
}

// --- Storage ---

/// A storage whose operations can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_remove: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn unavailable() -> StorageError {
    StorageError::Backend("storage unavailable".into())
}

impl KeyValueStorage for FlakyStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.remove_item(key)
    }
}

pub fn config(
    connectors: Vec<Arc<WalletConnector>>,
    storage: Arc<dyn KeyValueStorage>,
) -> SessionConfig {
    let mut builder = SessionConfig::builder()
        .app_name("test-dapp")
        .chain(chain(POLKADOT, "Polkadot"))
        .chain(chain(KUSAMA, "Kusama"))
        .transport(POLKADOT, Transport::websocket("wss://rpc.polkadot.io"))
        .transport(KUSAMA, Transport::websocket("wss://kusama-rpc.polkadot.io"))
        .storage(storage);
    for connector in connectors {
        builder = builder.connector(connector);
    }
    builder.build().unwrap()
}

// --- Chain API fakes ---

type SharedNotification = Arc<dyn Fn(Value) + Send + Sync>;

pub struct FakeApi {
    pub genesis_hash: String,
    pub is_ethereum: bool,
    pub fail_connect: bool,
    pub gate: Option<Arc<Notify>>,
    pub connected: AtomicBool,
    pub disconnects: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub unsubscribes: Arc<AtomicUsize>,
    /// When set, the next `subscribe` waits for the sender to fire.
    pub subscribe_hold: Mutex<Option<oneshot::Receiver<()>>>,
    subscribers: Arc<Mutex<Vec<(u64, String, Vec<Value>, SharedNotification)>>>,
    next_id: AtomicU64,
}

impl FakeApi {
    pub fn new(genesis_hash: &str) -> Self {
        Self {
            genesis_hash: genesis_hash.to_string(),
            is_ethereum: false,
            fail_connect: false,
            gate: None,
            connected: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            unsubscribes: Arc::new(AtomicUsize::new(0)),
            subscribe_hold: Mutex::new(None),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn hold_subscribe(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.subscribe_hold.lock().unwrap() = Some(rx);
        tx
    }

    /// Pushes `value` to every live subscriber. Returns how many received it.
    pub fn notify(&self, value: Value) -> usize {
        let subscribers: Vec<SharedNotification> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, _, cb)| cb.clone())
            .collect();
        for subscriber in &subscribers {
            subscriber(value.clone());
        }
        subscribers.len()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn last_params(&self) -> Option<Vec<Value>> {
        self.subscribers
            .lock()
            .unwrap()
            .last()
            .map(|(_, _, params, _)| params.clone())
    }
}

#[async_trait]
impl ChainApi for FakeApi {
    async fn connect(&self) -> anyhow::Result<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_connect {
            anyhow::bail!("connection refused");
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn genesis_hash(&self) -> anyhow::Result<String> {
        Ok(self.genesis_hash.clone())
    }

    async fn properties(&self) -> anyhow::Result<ChainProperties> {
        Ok(ChainProperties {
            ss58_format: Some(0),
            token_decimals: vec![10],
            token_symbol: vec!["DOT".into()],
            is_ethereum: self.is_ethereum,
        })
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
        callback: NotificationCallback,
    ) -> anyhow::Result<Unsubscribe> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let hold = self.subscribe_hold.lock().unwrap().take();
        if let Some(rx) = hold {
            let _ = rx.await;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().unwrap().push((
            id,
            method.to_string(),
            params,
            SharedNotification::from(callback),
        ));
        let subscribers = self.subscribers.clone();
        let unsubscribes = self.unsubscribes.clone();
        Ok(Box::new(move || {
            unsubscribes.fetch_add(1, Ordering::SeqCst);
            subscribers.lock().unwrap().retain(|(existing, ..)| *existing != id);
        }))
    }
}

/// Builds [`FakeApi`]s and keeps every instance it handed out.
#[derive(Default)]
pub struct FakeFactory {
    /// Genesis hash reported by nodes of a chain, if it should differ.
    pub reported: Mutex<HashMap<String, String>>,
    pub failing: Mutex<Vec<String>>,
    pub gates: Mutex<HashMap<String, Arc<Notify>>>,
    pub ethereum: Mutex<Vec<String>>,
    pub built: Mutex<Vec<Arc<FakeApi>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn built_for(&self, genesis_hash: &str) -> Vec<Arc<FakeApi>> {
        self.built
            .lock()
            .unwrap()
            .iter()
            .filter(|api| api.genesis_hash == genesis_hash)
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Arc<FakeApi> {
        self.built.lock().unwrap().last().cloned().expect("no api built")
    }

    pub fn gate(&self, genesis_hash: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(genesis_hash.to_string(), gate.clone());
        gate
    }
}

impl ApiFactory for FakeFactory {
    fn build(&self, chain: &Chain, _transport: &Transport) -> anyhow::Result<Arc<dyn ChainApi>> {
        let reported = self
            .reported
            .lock()
            .unwrap()
            .get(&chain.genesis_hash)
            .cloned()
            .unwrap_or_else(|| chain.genesis_hash.clone());
        let mut api = FakeApi::new(&reported);
        api.fail_connect = self.failing.lock().unwrap().contains(&chain.genesis_hash);
        api.is_ethereum = self.ethereum.lock().unwrap().contains(&chain.genesis_hash);
        api.gate = self.gates.lock().unwrap().get(&chain.genesis_hash).cloned();
        let api = Arc::new(api);
        self.built.lock().unwrap().push(api.clone());
        Ok(api)
    }
}
