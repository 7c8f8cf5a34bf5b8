#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use subconnect_connector::{
    address,
    injected::{AccountsCallback, InjectedAccount, InjectedExtension, InjectedProvider},
    relay::{PairingProposal, RelayClient, RelayNamespace, RelaySession, SessionDeleteHandler},
    Chain, ConnectorError, NativeCurrency, RpcUrls, SignRawPayload, Signer, SignerResult,
    Unsubscribe,
};
use tokio::sync::oneshot;

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

/// A deterministic SS58 address for a one-byte seed.
pub fn address_for(seed: u8, prefix: u16) -> String {
    address::encode(prefix, &[seed; 32])
}

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

    pub fn subscriptions(&self) -> usize {
        self.callbacks.lock().unwrap().len()
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
}

impl FakeProvider {
    pub fn new(extension: Arc<FakeExtension>) -> Arc<Self> {
        Arc::new(Self {
            extension,
            reject: AtomicBool::new(false),
            enable_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl InjectedProvider for FakeProvider {
    async fn enable(&self, app_name: &str) -> Result<Arc<dyn InjectedExtension>, ConnectorError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(ConnectorError::Rejected {
                connector: "fake".into(),
                reason: format!("user rejected {}", app_name),
            });
        }
        Ok(self.extension.clone())
    }
}

type SharedDeleteHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
pub struct FakeRelay {
    pub restorable: Mutex<Option<RelaySession>>,
    pub pair_calls: AtomicUsize,
    pub requests: Mutex<Vec<(String, String, String, Value)>>,
    pub disconnected: Mutex<Vec<String>>,
    pub fail_disconnect: AtomicBool,
    /// When set, the next `pair` waits for the sender; `false` refuses it.
    pub pair_hold: Mutex<Option<oneshot::Receiver<bool>>>,
    approver: Mutex<Option<oneshot::Sender<Result<RelaySession, ConnectorError>>>>,
    handlers: Arc<Mutex<Vec<(u64, SharedDeleteHandler)>>>,
    next_id: AtomicU64,
}

impl FakeRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Completes the pending pairing, if any.
    pub fn approve(&self, session: RelaySession) -> bool {
        match self.approver.lock().unwrap().take() {
            Some(tx) => tx.send(Ok(session)).is_ok(),
            None => false,
        }
    }

    pub fn hold_pair(&self) -> oneshot::Sender<bool> {
        let (tx, rx) = oneshot::channel();
        *self.pair_hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn reject(&self) -> bool {
        match self.approver.lock().unwrap().take() {
            Some(tx) => tx
                .send(Err(ConnectorError::Relay("proposal rejected".into())))
                .is_ok(),
            None => false,
        }
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

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

pub fn relay_session(topic: &str, accounts: Vec<String>) -> RelaySession {
    RelaySession {
        topic: topic.to_string(),
        accounts,
        peer_name: Some("Phone Wallet".to_string()),
    }
}

#[async_trait]
impl RelayClient for FakeRelay {
    async fn restore_session(&self) -> Result<Option<RelaySession>, ConnectorError> {
        Ok(self.restorable.lock().unwrap().clone())
    }

    async fn pair(&self, _namespace: RelayNamespace) -> Result<PairingProposal, ConnectorError> {
        self.pair_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.pair_hold.lock().unwrap().take();
        if let Some(hold) = hold {
            if !hold.await.unwrap_or(false) {
                return Err(ConnectorError::Relay("pairing refused".into()));
            }
        }
        let (tx, rx) = oneshot::channel();
        *self.approver.lock().unwrap() = Some(tx);
        let approval: BoxFuture<'static, Result<RelaySession, ConnectorError>> =
            Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| Err(ConnectorError::Relay("pairing dropped".into())))
            });
        Ok(PairingProposal {
            uri: "wc:topic@2?relay-protocol=irn&symKey=abc".to_string(),
            approval,
        })
    }

    async fn request(
        &self,
        topic: &str,
        chain_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ConnectorError> {
        self.requests.lock().unwrap().push((
            topic.to_string(),
            chain_id.to_string(),
            method.to_string(),
            params.clone(),
        ));
        Ok(json!({ "signature": format!("relay-sig:{}", params["message"].as_str().unwrap_or_default()) }))
    }

    async fn disconnect(&self, topic: &str) -> Result<(), ConnectorError> {
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ConnectorError::Relay("relay unreachable".into()));
        }
        self.disconnected.lock().unwrap().push(topic.to_string());
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
