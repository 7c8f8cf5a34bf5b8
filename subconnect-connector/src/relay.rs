//! # Relay Connectors
//!
//! A relay connector talks to a wallet running elsewhere (typically a phone)
//! through a relay service. When no session can be restored it starts a
//! pairing handshake: the pairing URI is published once through the
//! `get_uri` event and through [`RelayConnector::connection_uri`], and the
//! connection completes when the remote party approves.
//!
//! Accounts come from the negotiated session namespace, filtered by the
//! target chain's CAIP-2 id. Signing always round-trips through the relay.
//! A session-deleted notification from the relay tears the connection down
//! exactly as a local `disconnect` does.

use crate::{
    account::Account,
    address,
    chain::{caip_chain_id, Chain},
    connector::{Connector, ConnectorInfo, ConnectorState},
    error::ConnectorError,
    events::{ConnectorEvent, EventEmitter},
    signer::{SignRawPayload, Signer, SignerResult},
    sync::lock,
    Unsubscribe,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Relay methods requested for Polkadot namespaces.
pub const RELAY_METHODS: [&str; 2] = ["polkadot_signTransaction", "polkadot_signMessage"];
/// Relay events requested for Polkadot namespaces.
pub const RELAY_EVENTS: [&str; 2] = ["chainChanged", "accountsChanged"];

/// A negotiated relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySession {
    pub topic: String,
    /// CAIP-10 account ids, `polkadot:<chain reference>:<address>`.
    pub accounts: Vec<String>,
    pub peer_name: Option<String>,
}

/// The namespace requested during pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayNamespace {
    pub chains: Vec<String>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

impl RelayNamespace {
    pub fn for_chains(chains: &[Chain]) -> Self {
        Self {
            chains: chains.iter().map(Chain::caip_id).collect(),
            methods: RELAY_METHODS.iter().map(|m| m.to_string()).collect(),
            events: RELAY_EVENTS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// A pairing attempt: the URI to display and a future that resolves once the
/// remote wallet approves or rejects.
pub struct PairingProposal {
    pub uri: String,
    pub approval: BoxFuture<'static, Result<RelaySession, ConnectorError>>,
}

pub type SessionDeleteHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Transport to the relay service.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Returns a previously established session, if one is still alive.
    async fn restore_session(&self) -> Result<Option<RelaySession>, ConnectorError>;

    async fn pair(&self, namespace: RelayNamespace) -> Result<PairingProposal, ConnectorError>;

    async fn request(
        &self,
        topic: &str,
        chain_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ConnectorError>;

    async fn disconnect(&self, topic: &str) -> Result<(), ConnectorError>;

    /// Registers `handler` for session-deleted notifications. The handler
    /// receives the deleted topic. Handlers must be invoked without holding
    /// any lock the returned closure needs.
    fn on_session_delete(&self, handler: SessionDeleteHandler) -> Unsubscribe;
}

/// Signs by forwarding requests through the relay.
pub struct RelaySigner {
    client: Arc<dyn RelayClient>,
    topic: String,
    chain_id: String,
}

#[async_trait]
impl Signer for RelaySigner {
    async fn sign_raw(&self, payload: SignRawPayload) -> Result<SignerResult, ConnectorError> {
        let params = json!({ "address": payload.address, "message": payload.data });
        let response = self
            .client
            .request(&self.topic, &self.chain_id, "polkadot_signMessage", params)
            .await?;
        let signature = response
            .get("signature")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectorError::Relay("signature missing from relay response".into()))?;
        Ok(SignerResult {
            id: 0,
            signature: signature.to_string(),
        })
    }
}

#[derive(Default)]
struct RelayInner {
    state: ConnectorState,
    session: Option<RelaySession>,
    accounts: Vec<Account>,
    signer: Option<Arc<dyn Signer>>,
    on_delete: Option<Unsubscribe>,
}

/// A connector backed by a remote relay session.
pub struct RelayConnector {
    info: ConnectorInfo,
    client: Arc<dyn RelayClient>,
    events: Arc<EventEmitter>,
    inner: Arc<Mutex<RelayInner>>,
    uri: watch::Sender<Option<String>>,
}

impl RelayConnector {
    pub fn new(info: ConnectorInfo, client: Arc<dyn RelayClient>) -> Self {
        let (uri, _) = watch::channel(None);
        Self {
            info,
            client,
            events: Arc::new(EventEmitter::new()),
            inner: Arc::new(Mutex::new(RelayInner::default())),
            uri,
        }
    }

    /// The live relay session, if connected.
    pub fn session(&self) -> Option<RelaySession> {
        lock(&self.inner).session.clone()
    }

    async fn establish(
        &self,
        chains: &[Chain],
        target_chain_id: Option<&str>,
    ) -> Result<Vec<Account>, ConnectorError> {
        let target = target_chain_id
            .map(caip_chain_id)
            .or_else(|| chains.first().map(Chain::caip_id))
            .ok_or_else(|| ConnectorError::Relay("no chain to request accounts for".into()))?;

        let session = match self.client.restore_session().await? {
            Some(session) => {
                tracing::info!(connector = %self.info.id, topic = %session.topic, "Reusing relay session");
                session
            }
            None => self.pair(chains).await?,
        };

        let accounts = accounts_for_chain(&self.info.id, &session, &target);
        if accounts.is_empty() {
            if let Err(e) = self.client.disconnect(&session.topic).await {
                tracing::warn!(connector = %self.info.id, error = %e, "Failed to close empty relay session");
            }
            return Err(ConnectorError::NoAccounts {
                connector: self.info.id.clone(),
            });
        }

        let on_delete = self
            .client
            .on_session_delete(self.session_delete_handler(session.topic.clone()));
        let signer: Arc<dyn Signer> = Arc::new(RelaySigner {
            client: self.client.clone(),
            topic: session.topic.clone(),
            chain_id: target,
        });

        let mut inner = lock(&self.inner);
        inner.state = ConnectorState::Connected;
        inner.session = Some(session);
        inner.accounts = accounts.clone();
        inner.signer = Some(signer);
        inner.on_delete = Some(on_delete);
        Ok(accounts)
    }

    async fn pair(&self, chains: &[Chain]) -> Result<RelaySession, ConnectorError> {
        let proposal = self.client.pair(RelayNamespace::for_chains(chains)).await?;
        tracing::info!(connector = %self.info.id, "Pairing URI ready, waiting for approval");
        self.uri.send_replace(Some(proposal.uri.clone()));
        self.events.emit(ConnectorEvent::GetUri(proposal.uri));
        proposal.approval.await
    }

    fn session_delete_handler(&self, topic: String) -> SessionDeleteHandler {
        let inner = self.inner.clone();
        let events = self.events.clone();
        let id = self.info.id.clone();
        Box::new(move |deleted: &str| {
            if deleted != topic.as_str() {
                return;
            }
            let on_delete = {
                let mut guard = lock(&inner);
                if guard.state != ConnectorState::Connected {
                    return;
                }
                clear(&mut guard)
            };
            if let Some(unsubscribe) = on_delete {
                unsubscribe();
            }
            tracing::info!(connector = %id, topic = %topic, "Relay session deleted remotely");
            events.emit(ConnectorEvent::Disconnect);
        })
    }
}

fn clear(inner: &mut RelayInner) -> Option<Unsubscribe> {
    inner.state = ConnectorState::Idle;
    inner.session = None;
    inner.accounts.clear();
    inner.signer = None;
    inner.on_delete.take()
}

/// Extracts the accounts of `session` that belong to `chain` (a CAIP-2 id).
fn accounts_for_chain(source: &str, session: &RelaySession, chain: &str) -> Vec<Account> {
    session
        .accounts
        .iter()
        .filter_map(|caip10| {
            let (chain_part, address) = caip10.rsplit_once(':')?;
            if chain_part != chain {
                return None;
            }
            let mut account = Account::new(address, source);
            account.public_key = address::public_key_hex(address);
            Some(account)
        })
        .collect()
}

#[async_trait]
impl Connector for RelayConnector {
    fn info(&self) -> &ConnectorInfo {
        &self.info
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn state(&self) -> ConnectorState {
        lock(&self.inner).state
    }

    fn is_installed(&self) -> bool {
        true
    }

    async fn connect(
        &self,
        _app_name: &str,
        chains: &[Chain],
        target_chain_id: Option<&str>,
    ) -> Result<Vec<Account>, ConnectorError> {
        {
            let mut inner = lock(&self.inner);
            match inner.state {
                ConnectorState::Connected if inner.signer.is_some() => {
                    return Ok(inner.accounts.clone());
                }
                ConnectorState::Connecting => {
                    return Err(ConnectorError::AlreadyConnecting {
                        connector: self.info.id.clone(),
                    });
                }
                _ => inner.state = ConnectorState::Connecting,
            }
        }

        let result = self.establish(chains, target_chain_id).await;
        if result.is_err() {
            let on_delete = clear(&mut lock(&self.inner));
            if let Some(unsubscribe) = on_delete {
                unsubscribe();
            }
        }
        // The pairing attempt is over; wakes `connection_uri` waiters after the
        // state has settled.
        self.uri.send_replace(None);

        match result {
            Ok(accounts) => {
                tracing::info!(connector = %self.info.id, count = accounts.len(), "Relay session connected");
                self.events.emit(ConnectorEvent::Connect(accounts.clone()));
                Ok(accounts)
            }
            Err(e) => {
                tracing::warn!(connector = %self.info.id, error = %e, "Relay connection failed");
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        let topic = {
            let mut inner = lock(&self.inner);
            if inner.state == ConnectorState::Idle {
                return Ok(());
            }
            inner.state = ConnectorState::Disconnecting;
            inner.session.as_ref().map(|s| s.topic.clone())
        };

        if let Some(topic) = topic {
            if let Err(e) = self.client.disconnect(&topic).await {
                lock(&self.inner).state = ConnectorState::Connected;
                return Err(e);
            }
        }

        let on_delete = clear(&mut lock(&self.inner));
        if let Some(unsubscribe) = on_delete {
            unsubscribe();
        }
        tracing::info!(connector = %self.info.id, "Relay session disconnected");
        self.events.emit(ConnectorEvent::Disconnect);
        Ok(())
    }

    fn accounts(&self) -> Vec<Account> {
        lock(&self.inner).accounts.clone()
    }

    fn signer(&self) -> Option<Arc<dyn Signer>> {
        let signer = lock(&self.inner).signer.clone();
        if signer.is_none() {
            tracing::warn!(connector = %self.info.id, "No relay signer available, connect first");
        }
        signer
    }

    async fn sign_message(
        &self,
        message: &str,
        address: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let (known, signer) = {
            let inner = lock(&self.inner);
            let known = inner
                .accounts
                .iter()
                .any(|account| address::same_identity(&account.address, address));
            (known, inner.signer.clone())
        };
        if !known {
            return Err(ConnectorError::UnknownAddress {
                connector: self.info.id.clone(),
                address: address.to_string(),
            });
        }
        let signer = signer.ok_or_else(|| ConnectorError::NoSigner {
            connector: self.info.id.clone(),
        })?;
        let result = signer.sign_raw(SignRawPayload::bytes(address, message)).await?;
        Ok(Some(result.signature))
    }

    fn has_connection_uri(&self) -> bool {
        true
    }

    /// Waits for the pairing URI of the current attempt. Returns `None` when
    /// no connection attempt is in progress or the attempt ends without one.
    async fn connection_uri(&self) -> Option<String> {
        let mut rx = self.uri.subscribe();
        loop {
            let current = rx.borrow_and_update().as_deref().map(str::to_owned);
            if current.is_some() {
                return current;
            }
            if self.state() != ConnectorState::Connecting {
                return None;
            }
            rx.changed().await.ok()?;
        }
    }
}
