//! # Session Store
//!
//! The single authority for session state: connection status, the active
//! connector, its accounts, the selected account and the selected chain.
//!
//! State is published through a [`tokio::sync::watch`] channel. Every mutation
//! happens inside one `send_modify`/`send_if_modified` call, so observers never
//! see a half-applied transition. No lock is held across an `.await`.
//!
//! Listener attachment follows a strict order: the registry of the previously
//! active connector is drained before new listeners are attached, and the new
//! listeners are attached before the connector's `connect` is awaited.

use crate::{
    api::ChainClient,
    config::SessionConfig,
    error::{ApiError, ConfigError, SessionError, StorageError},
    listeners::{self, ListenerRegistry},
    storage::{
        KeyValueStorage, PersistedAccount, LAST_CHAIN_ID, LAST_CONNECTOR_ID,
        LAST_SELECTED_ACCOUNT, SESSION_KEYS,
    },
    sync::lock,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, Weak,
};
use subconnect_connector::{
    address, Account, Chain, Connector, ConnectorEvent, EventKind, WalletConnector,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Connection status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// A snapshot of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub active_connector: Option<Arc<WalletConnector>>,
    pub accounts: Vec<Account>,
    /// Always an element of `accounts`, compared by public key.
    pub selected_account: Option<Account>,
    pub current_chain_id: Option<String>,
    pub current_chain: Option<Chain>,
    pub current_api: Option<ChainClient>,
    pub is_api_ready: bool,
    pub api_error: Option<String>,
    /// Bumped whenever the chain selection is (re)committed and a new client
    /// is wanted.
    pub chain_generation: u64,
    pub config: Option<Arc<SessionConfig>>,
}

impl SessionState {
    fn is_on_chain(&self, chain_id: &str) -> bool {
        self.current_chain_id
            .as_deref()
            .is_some_and(|current| current.eq_ignore_ascii_case(chain_id))
    }

    fn select_chain(&mut self, chain: Chain) {
        self.current_chain_id = Some(chain.genesis_hash.clone());
        self.current_chain = Some(chain);
        self.current_api = None;
        self.is_api_ready = false;
        self.api_error = None;
        self.chain_generation += 1;
    }

    fn clear_connection(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.active_connector = None;
        self.accounts.clear();
        self.selected_account = None;
    }
}

/// What to select with [`SessionStore::set_account`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountSelector {
    Account(Account),
    /// A public key (any hex case) or an exact address.
    Key(String),
}

impl From<Account> for AccountSelector {
    fn from(account: Account) -> Self {
        AccountSelector::Account(account)
    }
}

impl From<&Account> for AccountSelector {
    fn from(account: &Account) -> Self {
        AccountSelector::Account(account.clone())
    }
}

impl From<&str> for AccountSelector {
    fn from(key: &str) -> Self {
        AccountSelector::Key(key.to_string())
    }
}

impl From<String> for AccountSelector {
    fn from(key: String) -> Self {
        AccountSelector::Key(key)
    }
}

impl AccountSelector {
    fn describe(&self) -> String {
        match self {
            AccountSelector::Account(account) => account
                .public_key
                .clone()
                .unwrap_or_else(|| account.address.clone()),
            AccountSelector::Key(key) => key.clone(),
        }
    }

    fn matches(&self, candidate: &Account) -> bool {
        match self {
            AccountSelector::Account(account) => match &account.public_key {
                Some(key) => candidate.matches_public_key(key),
                None => address::public_key_hex(&account.address)
                    .is_some_and(|key| candidate.matches_public_key(&key)),
            },
            AccountSelector::Key(key) => {
                candidate.matches_public_key(key) || candidate.address == *key
            }
        }
    }
}

struct StoreInner {
    state: watch::Sender<SessionState>,
    listeners: Mutex<ListenerRegistry>,
    /// Identifies the connect attempt that currently owns the session.
    attempt: AtomicU64,
}

/// Orchestrates connect, disconnect, chain switching and account selection
/// against one active connector. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(StoreInner {
                state,
                listeners: Mutex::new(ListenerRegistry::new()),
                attempt: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a store and applies `config`.
    pub fn with_config(config: SessionConfig) -> Self {
        let store = Self::new();
        store.set_config(config);
        store
    }

    /// Installs the configuration and restores the last active chain.
    ///
    /// A stored chain id that is unreadable or no longer configured falls back
    /// to the first configured chain.
    pub fn set_config(&self, config: SessionConfig) -> Arc<SessionConfig> {
        let config = Arc::new(config);
        let chain = restore_chain(&config);
        info!(chain_id = %chain.genesis_hash, "Session configured, active chain {}", chain.name);

        let installed = config.clone();
        self.inner.state.send_modify(move |s| {
            s.config = Some(installed);
            s.select_chain(chain);
        });
        config
    }

    // --- Accessors ---

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.inner.state.borrow().accounts.clone()
    }

    pub fn selected_account(&self) -> Option<Account> {
        self.inner.state.borrow().selected_account.clone()
    }

    pub fn active_connector(&self) -> Option<Arc<WalletConnector>> {
        self.inner.state.borrow().active_connector.clone()
    }

    pub fn current_chain_id(&self) -> Option<String> {
        self.inner.state.borrow().current_chain_id.clone()
    }

    pub fn current_chain(&self) -> Option<Chain> {
        self.inner.state.borrow().current_chain.clone()
    }

    pub fn current_api(&self) -> Option<ChainClient> {
        self.inner.state.borrow().current_api.clone()
    }

    /// Id of the installed chain client, if any.
    pub fn current_api_id(&self) -> Option<u64> {
        self.inner.state.borrow().current_api.as_ref().map(|c| c.id)
    }

    pub fn is_api_ready(&self) -> bool {
        self.inner.state.borrow().is_api_ready
    }

    pub fn api_error(&self) -> Option<String> {
        self.inner.state.borrow().api_error.clone()
    }

    pub fn config(&self) -> Option<Arc<SessionConfig>> {
        self.inner.state.borrow().config.clone()
    }

    /// Number of connector listeners currently registered by the store.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// Configured connectors whose provider is present locally.
    pub fn installed_connectors(&self) -> Vec<Arc<WalletConnector>> {
        self.config()
            .map(|config| {
                config
                    .connectors
                    .iter()
                    .filter(|c| c.is_installed())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // --- Actions ---

    /// Connects to `connector_id` and makes it the active connector.
    ///
    /// The target chain is `target_chain_id`, else the persisted chain, else
    /// the first configured chain. On failure the session is rolled back to
    /// `Disconnected` with no connector, accounts or listeners.
    pub async fn connect(
        &self,
        connector_id: &str,
        target_chain_id: Option<&str>,
    ) -> Result<Vec<Account>, SessionError> {
        let (config, connector) = match self.resolve_connector(connector_id) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(connector = %connector_id, "Cannot connect: {}", e);
                if self.has_session() {
                    self.clear_session();
                } else {
                    self.inner
                        .state
                        .send_modify(|s| s.status = SessionStatus::Disconnected);
                }
                return Err(e);
            }
        };

        let attempt = self.inner.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let drained = self.drain_listeners();
        debug!(connector = %connector_id, drained, "Cleared previous connector listeners");

        let active = connector.clone();
        self.inner.state.send_modify(move |s| {
            s.status = SessionStatus::Connecting;
            s.active_connector = Some(active);
        });
        info!(connector = %connector_id, "Connecting");

        match self
            .establish(attempt, &config, &connector, target_chain_id)
            .await
        {
            Ok(accounts) => Ok(accounts),
            Err(SessionError::Superseded) => {
                info!(connector = %connector_id, "Connect attempt superseded, result discarded");
                Err(SessionError::Superseded)
            }
            Err(e) => {
                if self.is_current(attempt) {
                    self.drain_listeners();
                    self.inner.state.send_modify(SessionState::clear_connection);
                }
                error!(connector = %connector_id, "Connection failed: {}", e);
                Err(SessionError::Connection {
                    connector: connector_id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Reconnects to the persisted connector when the configuration enables
    /// it. Returns whether a connection was made.
    pub async fn auto_connect(&self) -> Result<bool, SessionError> {
        let config = self.config().ok_or(ConfigError::NotConfigured)?;
        if !config.auto_connect {
            return Ok(false);
        }

        let connector_id = match config.storage.get_item(LAST_CONNECTOR_ID) {
            Ok(Some(id)) => id,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("Failed to read {}: {}", LAST_CONNECTOR_ID, e);
                return Ok(false);
            }
        };

        if config.connector(&connector_id).is_none() {
            warn!(connector = %connector_id, "Persisted connector is no longer configured");
            if let Err(e) = config.storage.remove_item(LAST_CONNECTOR_ID) {
                warn!("Failed to remove {}: {}", LAST_CONNECTOR_ID, e);
            }
            return Ok(false);
        }

        self.connect(&connector_id, None).await?;
        Ok(true)
    }

    /// Disconnects the active connector and clears the session.
    ///
    /// A no-op while disconnecting, or while disconnected with nothing left to
    /// clear. If the connector fails to disconnect, the previous status is
    /// restored and the error is returned.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (previous, connector) = {
            let state = self.inner.state.borrow();
            (state.status, state.active_connector.clone())
        };
        let idle = previous == SessionStatus::Disconnected && !self.has_session();
        if idle || previous == SessionStatus::Disconnecting {
            debug!(status = ?previous, "Disconnect ignored");
            return Ok(());
        }

        self.inner
            .state
            .send_modify(|s| s.status = SessionStatus::Disconnecting);

        if let Some(connector) = &connector {
            info!(connector = %connector.id(), "Disconnecting");
            if let Err(e) = connector.disconnect().await {
                error!(connector = %connector.id(), "Disconnect failed: {}", e);
                self.inner.state.send_modify(|s| s.status = previous);
                return Err(SessionError::Disconnect {
                    connector: connector.id().to_string(),
                    source: e,
                });
            }
        }

        self.clear_session();
        Ok(())
    }

    /// Selects another configured chain.
    ///
    /// The new chain is committed and the current client dropped before this
    /// returns. Only the persistence of the new chain id can fail after that
    /// point, and the chain selection stays committed when it does.
    pub fn switch_chain(&self, chain_id: &str) -> Result<(), SessionError> {
        if self.inner.state.borrow().is_on_chain(chain_id) {
            debug!(chain_id = %chain_id, "Already on chain, switch ignored");
            return Ok(());
        }

        let config = self.config().ok_or(ConfigError::NotConfigured)?;
        let chain = config
            .chain(chain_id)
            .cloned()
            .ok_or_else(|| SessionError::ChainNotFound(chain_id.to_string()))?;
        let genesis_hash = chain.genesis_hash.clone();

        info!(chain_id = %genesis_hash, "Switching chain to {}", chain.name);
        self.inner.state.send_modify(move |s| s.select_chain(chain));

        config
            .storage
            .set_item(LAST_CHAIN_ID, &genesis_hash)
            .map_err(|e| {
                error!(chain_id = %genesis_hash, "Failed to persist chain selection: {}", e);
                SessionError::Persistence(e)
            })
    }

    /// Selects one of the current accounts.
    ///
    /// Fails with [`SessionError::AccountNotFound`] and leaves the selection
    /// untouched if no current account matches.
    pub fn set_account(
        &self,
        selector: impl Into<AccountSelector>,
    ) -> Result<Account, SessionError> {
        let selector = selector.into();
        let found = self
            .inner
            .state
            .borrow()
            .accounts
            .iter()
            .find(|a| selector.matches(a))
            .cloned();
        let account = found.ok_or_else(|| {
            warn!(account = %selector.describe(), "Account not in current account list");
            SessionError::AccountNotFound(selector.describe())
        })?;

        let selected = account.clone();
        self.inner
            .state
            .send_modify(move |s| s.selected_account = Some(selected));
        debug!(address = %account.address, "Selected account");

        if let Some(config) = self.config() {
            persist_selection(config.storage.as_ref(), &account);
        }
        Ok(account)
    }

    /// Signs `message` with the selected account through the active connector.
    pub async fn sign_message(&self, message: &str) -> Result<Option<String>, SessionError> {
        let (connector, account) = {
            let state = self.inner.state.borrow();
            (state.active_connector.clone(), state.selected_account.clone())
        };
        let connector = connector.ok_or_else(|| SessionError::ConnectorNotFound("<none>".into()))?;
        let account =
            account.ok_or_else(|| SessionError::AccountNotFound("<no selection>".into()))?;
        Ok(connector.sign_message(message, &account.address).await?)
    }

    // --- Chain client bookkeeping ---

    /// Installs `client` if the selection it was built for is still current.
    /// Returns `false` when the client is stale and must be discarded.
    pub fn install_api(&self, generation: u64, client: ChainClient) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.chain_generation != generation || !s.is_on_chain(&client.chain_id) {
                return false;
            }
            s.current_api = Some(client);
            s.is_api_ready = true;
            s.api_error = None;
            true
        })
    }

    /// Records a client creation failure for the current selection. Chain
    /// selection itself is kept.
    pub fn fail_api(&self, generation: u64, chain_id: &str, err: &ApiError) -> bool {
        let message = err.to_string();
        self.inner.state.send_if_modified(|s| {
            if s.chain_generation != generation || !s.is_on_chain(chain_id) {
                return false;
            }
            s.current_api = None;
            s.is_api_ready = false;
            s.api_error = Some(message);
            true
        })
    }

    // --- Internals ---

    fn resolve_connector(
        &self,
        connector_id: &str,
    ) -> Result<(Arc<SessionConfig>, Arc<WalletConnector>), SessionError> {
        let config = self.config().ok_or(ConfigError::NotConfigured)?;
        let connector = config
            .connector(connector_id)
            .cloned()
            .ok_or_else(|| SessionError::ConnectorNotFound(connector_id.to_string()))?;
        Ok((config, connector))
    }

    async fn establish(
        &self,
        attempt: u64,
        config: &SessionConfig,
        connector: &Arc<WalletConnector>,
        target_chain_id: Option<&str>,
    ) -> Result<Vec<Account>, SessionError> {
        self.attach_listeners(connector);

        let chain = resolve_target_chain(config, target_chain_id)?;
        let accounts = connector
            .connect(&config.app_name, &config.chains, Some(&chain.genesis_hash))
            .await?;

        if !self.is_current(attempt) {
            return Err(SessionError::Superseded);
        }

        warn_missing_public_keys(&accounts);
        let selected = restore_selection(config.storage.as_ref(), &accounts);

        let committed = accounts.clone();
        let selection = selected.clone();
        let chain_id = chain.genesis_hash.clone();
        self.inner.state.send_modify(move |s| {
            s.status = SessionStatus::Connected;
            s.accounts = committed;
            s.selected_account = selection;
            if !s.is_on_chain(&chain.genesis_hash) || s.current_api.is_none() {
                s.select_chain(chain);
            }
        });
        info!(
            connector = %connector.id(),
            chain_id = %chain_id,
            accounts = accounts.len(),
            "Connected"
        );

        let storage = config.storage.as_ref();
        persist(storage, LAST_CONNECTOR_ID, connector.id());
        persist(storage, LAST_CHAIN_ID, &chain_id);
        if let Some(account) = &selected {
            persist_selection(storage, account);
        }
        Ok(accounts)
    }

    fn attach_listeners(&self, connector: &Arc<WalletConnector>) {
        let weak = Arc::downgrade(&self.inner);
        let accounts_id = connector.on(EventKind::AccountsChanged, move |event| {
            if let ConnectorEvent::AccountsChanged(accounts) = event {
                if let Some(store) = upgrade(&weak) {
                    store.handle_accounts_changed(accounts.clone());
                }
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let disconnect_id = connector.on(EventKind::Disconnect, move |_| {
            if let Some(store) = upgrade(&weak) {
                store.handle_remote_disconnect();
            }
        });

        let mut registry = lock(&self.inner.listeners);
        let owner = connector.clone();
        registry.push("accountsChanged", move || {
            owner.off(accounts_id);
        });
        let owner = connector.clone();
        registry.push("disconnect", move || {
            owner.off(disconnect_id);
        });
    }

    fn drain_listeners(&self) -> usize {
        // Run the cleanups outside the registry lock.
        let entries = lock(&self.inner.listeners).take();
        listeners::run(entries)
    }

    /// Whether any connection state or connector listener is held.
    fn has_session(&self) -> bool {
        let held = {
            let state = self.inner.state.borrow();
            state.status != SessionStatus::Disconnected
                || state.active_connector.is_some()
                || !state.accounts.is_empty()
                || state.selected_account.is_some()
        };
        held || self.listener_count() > 0
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.inner.attempt.load(Ordering::SeqCst) == attempt
    }

    fn handle_accounts_changed(&self, accounts: Vec<Account>) {
        if self.status() == SessionStatus::Disconnected {
            return;
        }
        warn_missing_public_keys(&accounts);

        let mut reselected = None;
        self.inner.state.send_modify(|s| {
            let kept = s
                .selected_account
                .as_ref()
                .and_then(|current| accounts.iter().find(|a| a.same_key_as(current)));
            let next = kept.or_else(|| accounts.first()).cloned();
            if next != s.selected_account {
                reselected = next.clone();
            }
            s.selected_account = next;
            s.accounts = accounts;
        });
        debug!("Accounts changed");

        if let (Some(account), Some(config)) = (reselected, self.config()) {
            persist_selection(config.storage.as_ref(), &account);
        }
    }

    fn handle_remote_disconnect(&self) {
        let status = self.status();
        if matches!(
            status,
            SessionStatus::Disconnected | SessionStatus::Disconnecting
        ) {
            return;
        }
        info!("Connector disconnected remotely");
        self.clear_session();
    }

    /// Removes persisted keys, drains listeners and resets the connection.
    fn clear_session(&self) {
        self.inner.attempt.fetch_add(1, Ordering::SeqCst);
        if let Some(config) = self.config() {
            for key in SESSION_KEYS {
                if let Err(e) = config.storage.remove_item(key) {
                    warn!(key, "Failed to remove persisted session value: {}", e);
                }
            }
        }
        let drained = self.drain_listeners();
        self.inner.state.send_modify(SessionState::clear_connection);
        info!(drained, "Disconnected");
    }
}

fn upgrade(weak: &Weak<StoreInner>) -> Option<SessionStore> {
    weak.upgrade().map(|inner| SessionStore { inner })
}

fn restore_chain(config: &SessionConfig) -> Chain {
    let stored = match config.storage.get_item(LAST_CHAIN_ID) {
        Ok(stored) => stored,
        Err(e) => {
            warn!("Failed to read {}, using the first configured chain: {}", LAST_CHAIN_ID, e);
            None
        }
    };
    stored
        .and_then(|id| config.chain(&id).cloned())
        .unwrap_or_else(|| config.default_chain().clone())
}

fn resolve_target_chain(
    config: &SessionConfig,
    explicit: Option<&str>,
) -> Result<Chain, SessionError> {
    if let Some(chain_id) = explicit {
        return config
            .chain(chain_id)
            .cloned()
            .ok_or_else(|| SessionError::ChainNotFound(chain_id.to_string()));
    }
    Ok(restore_chain(config))
}

/// Picks the account to select after a connect.
///
/// Tries the persisted public key, then the persisted address by decoded
/// identity, then the first account. The first match wins.
fn restore_selection(storage: &dyn KeyValueStorage, accounts: &[Account]) -> Option<Account> {
    let persisted = match read_selection(storage) {
        Ok(persisted) => persisted,
        Err(e) => {
            warn!("Failed to restore selected account: {}", e);
            None
        }
    };

    let restored = persisted.and_then(|snapshot| {
        let by_key = snapshot
            .public_key
            .as_deref()
            .and_then(|key| accounts.iter().find(|a| a.matches_public_key(key)));
        by_key.or_else(|| {
            accounts
                .iter()
                .find(|a| address::same_identity(&a.address, &snapshot.address))
        })
    });
    restored.or_else(|| accounts.first()).cloned()
}

fn read_selection(storage: &dyn KeyValueStorage) -> Result<Option<PersistedAccount>, StorageError> {
    match storage.get_item(LAST_SELECTED_ACCOUNT)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn persist(storage: &dyn KeyValueStorage, key: &str, value: &str) {
    if let Err(e) = storage.set_item(key, value) {
        warn!(key, "Failed to persist session value: {}", e);
    }
}

fn persist_selection(storage: &dyn KeyValueStorage, account: &Account) {
    match serde_json::to_string(&PersistedAccount::from(account)) {
        Ok(json) => persist(storage, LAST_SELECTED_ACCOUNT, &json),
        Err(e) => warn!("Failed to serialize selected account: {}", e),
    }
}

fn warn_missing_public_keys(accounts: &[Account]) {
    for account in accounts.iter().filter(|a| a.public_key.is_none()) {
        error!(
            address = %account.address,
            source = %account.source(),
            "CRITICAL: account has no public key and cannot be restored across sessions"
        );
    }
}
