//! # Injected Connectors
//!
//! Browser extensions register themselves in a well-known global registry of
//! the host page. That registry is modelled here as the [`ProviderDiscovery`]
//! capability, so the connector can run against any host (or a test fake).
//!
//! Connecting enables the named provider, fetches its accounts and subscribes
//! to the provider's native account stream, which is re-emitted as
//! `accountsChanged`.

use crate::{
    account::Account,
    address,
    chain::Chain,
    connector::{Connector, ConnectorInfo, ConnectorState},
    error::ConnectorError,
    events::{ConnectorEvent, EventEmitter},
    signer::{SignRawPayload, Signer},
    sync::lock,
    Unsubscribe,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// An account as reported by an injected provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InjectedAccount {
    pub address: String,
    pub name: Option<String>,
    /// Some providers report the raw public key, others only the address.
    pub public_key: Option<String>,
    /// Key type, e.g. `sr25519` or `ethereum`.
    pub key_type: Option<String>,
    pub genesis_hash: Option<String>,
}

impl InjectedAccount {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

pub type AccountsCallback = Box<dyn Fn(Vec<InjectedAccount>) + Send + Sync>;

/// Looks up injected providers by their registry key.
pub trait ProviderDiscovery: Send + Sync {
    fn provider(&self, key: &str) -> Option<Arc<dyn InjectedProvider>>;

    fn provider_keys(&self) -> Vec<String>;
}

/// A provider found in the registry, not yet enabled for this application.
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    fn version(&self) -> Option<String> {
        None
    }

    /// Asks the user to authorize `app_name`. May never resolve.
    async fn enable(&self, app_name: &str) -> Result<Arc<dyn InjectedExtension>, ConnectorError>;
}

/// An enabled provider.
#[async_trait]
pub trait InjectedExtension: Send + Sync {
    async fn accounts(&self) -> Result<Vec<InjectedAccount>, ConnectorError>;

    /// Subscribes to account list changes. The returned closure ends the
    /// subscription.
    fn subscribe_accounts(&self, callback: AccountsCallback) -> Unsubscribe;

    fn signer(&self) -> Arc<dyn Signer>;
}

/// A [`ProviderDiscovery`] backed by a fixed map, for hosts that resolve the
/// registry up front.
#[derive(Default, Clone)]
pub struct StaticDiscovery {
    providers: HashMap<String, Arc<dyn InjectedProvider>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, key: impl Into<String>, provider: Arc<dyn InjectedProvider>) -> Self {
        self.providers.insert(key.into(), provider);
        self
    }
}

impl ProviderDiscovery for StaticDiscovery {
    fn provider(&self, key: &str) -> Option<Arc<dyn InjectedProvider>> {
        self.providers.get(key).cloned()
    }

    fn provider_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[derive(Default)]
struct InjectedInner {
    state: ConnectorState,
    accounts: Vec<Account>,
    signer: Option<Arc<dyn Signer>>,
    unsubscribe: Option<Unsubscribe>,
}

/// A connector for one injected provider.
pub struct InjectedConnector {
    info: ConnectorInfo,
    provider_key: String,
    discovery: Arc<dyn ProviderDiscovery>,
    events: Arc<EventEmitter>,
    inner: Arc<Mutex<InjectedInner>>,
}

impl InjectedConnector {
    /// Creates a connector for the provider registered under `provider_key`.
    pub fn new(
        info: ConnectorInfo,
        provider_key: impl Into<String>,
        discovery: Arc<dyn ProviderDiscovery>,
    ) -> Self {
        Self {
            info,
            provider_key: provider_key.into(),
            discovery,
            events: Arc::new(EventEmitter::new()),
            inner: Arc::new(Mutex::new(InjectedInner::default())),
        }
    }

    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    async fn establish(&self, app_name: &str) -> Result<Vec<Account>, ConnectorError> {
        let provider = self
            .discovery
            .provider(&self.provider_key)
            .ok_or_else(|| ConnectorError::NotInstalled {
                connector: self.info.id.clone(),
            })?;

        let extension = provider.enable(app_name).await?;
        let accounts = map_accounts(&self.info.id, extension.accounts().await?);
        if accounts.is_empty() {
            return Err(ConnectorError::NoAccounts {
                connector: self.info.id.clone(),
            });
        }

        let unsubscribe = extension.subscribe_accounts(self.accounts_callback());

        let mut inner = lock(&self.inner);
        inner.state = ConnectorState::Connected;
        inner.accounts = accounts.clone();
        inner.signer = Some(extension.signer());
        inner.unsubscribe = Some(unsubscribe);
        Ok(accounts)
    }

    fn accounts_callback(&self) -> AccountsCallback {
        let inner = self.inner.clone();
        let events = self.events.clone();
        let source = self.info.id.clone();
        Box::new(move |raw| {
            let accounts = map_accounts(&source, raw);
            {
                let mut guard = lock(&inner);
                if guard.state == ConnectorState::Idle {
                    return;
                }
                guard.accounts = accounts.clone();
            }
            tracing::debug!(connector = %source, count = accounts.len(), "Provider accounts changed");
            events.emit(ConnectorEvent::AccountsChanged(accounts));
        })
    }

    fn reset(&self) -> Option<Unsubscribe> {
        let mut inner = lock(&self.inner);
        inner.state = ConnectorState::Idle;
        inner.accounts.clear();
        inner.signer = None;
        inner.unsubscribe.take()
    }
}

/// Converts provider accounts into session accounts tagged with `source`.
///
/// The public key is taken from the provider when reported, otherwise derived
/// from the address.
fn map_accounts(source: &str, raw: Vec<InjectedAccount>) -> Vec<Account> {
    raw.into_iter()
        .map(|injected| {
            let public_key = injected
                .public_key
                .clone()
                .or_else(|| address::public_key_hex(&injected.address));
            let mut account = Account::new(injected.address, source);
            account.public_key = public_key;
            account.name = injected.name;
            if let Some(key_type) = injected.key_type {
                account = account.with_meta("type", key_type);
            }
            if let Some(genesis_hash) = injected.genesis_hash {
                account = account.with_meta("genesisHash", genesis_hash);
            }
            account
        })
        .collect()
}

#[async_trait]
impl Connector for InjectedConnector {
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
        self.discovery.provider(&self.provider_key).is_some()
    }

    async fn connect(
        &self,
        app_name: &str,
        _chains: &[Chain],
        _target_chain_id: Option<&str>,
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

        tracing::info!(connector = %self.info.id, provider = %self.provider_key, "Connecting injected provider");
        match self.establish(app_name).await {
            Ok(accounts) => {
                self.events.emit(ConnectorEvent::Connect(accounts.clone()));
                Ok(accounts)
            }
            Err(e) => {
                if let Some(unsubscribe) = self.reset() {
                    unsubscribe();
                }
                tracing::warn!(connector = %self.info.id, error = %e, "Injected connection failed");
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        {
            let mut inner = lock(&self.inner);
            if inner.state == ConnectorState::Idle {
                return Ok(());
            }
            inner.state = ConnectorState::Disconnecting;
        }

        if let Some(unsubscribe) = self.reset() {
            unsubscribe();
        }
        tracing::info!(connector = %self.info.id, "Injected provider disconnected");
        self.events.emit(ConnectorEvent::Disconnect);
        Ok(())
    }

    fn accounts(&self) -> Vec<Account> {
        lock(&self.inner).accounts.clone()
    }

    fn signer(&self) -> Option<Arc<dyn Signer>> {
        let signer = lock(&self.inner).signer.clone();
        if signer.is_none() {
            tracing::warn!(connector = %self.info.id, "No signer available, connect first");
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
}
