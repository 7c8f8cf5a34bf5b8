use crate::{
    account::Account,
    chain::Chain,
    dispatch::EnvironmentConnector,
    error::ConnectorError,
    events::{ConnectorEvent, EventEmitter, EventKind, ListenerId},
    injected::InjectedConnector,
    relay::RelayConnector,
    signer::Signer,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Static description of a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorInfo {
    /// Stable identifier, unique within a configuration.
    pub id: String,
    pub name: String,
    pub icon: String,
}

impl ConnectorInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
        }
    }
}

/// Lifecycle of a single connector.
///
/// `Idle -> Connecting -> Connected -> Disconnecting -> Idle`. A failure while
/// `Connecting` returns the connector to `Idle` with no accounts or signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

/// The capability contract shared by every wallet provider.
#[async_trait]
pub trait Connector: Send + Sync {
    fn info(&self) -> &ConnectorInfo;

    fn events(&self) -> &EventEmitter;

    fn state(&self) -> ConnectorState;

    /// Synchronous, side-effect-free probe of local availability.
    fn is_installed(&self) -> bool;

    /// May probe beyond [`Connector::is_installed`].
    async fn is_available(&self) -> bool {
        self.is_installed()
    }

    /// Connects and returns the provider's accounts.
    ///
    /// Calling this while already connected with a live signer returns the
    /// current accounts without prompting again. On failure no accounts or
    /// signer are retained.
    async fn connect(
        &self,
        app_name: &str,
        chains: &[Chain],
        target_chain_id: Option<&str>,
    ) -> Result<Vec<Account>, ConnectorError>;

    /// Clears accounts and signer and emits `disconnect`. Safe to call when
    /// already disconnected.
    async fn disconnect(&self) -> Result<(), ConnectorError>;

    /// A copy of the current account list.
    fn accounts(&self) -> Vec<Account>;

    /// The cached signer. Logs when none is present.
    fn signer(&self) -> Option<Arc<dyn Signer>>;

    /// Signs `message` with `address`, which must be one of the current accounts.
    async fn sign_message(
        &self,
        message: &str,
        address: &str,
    ) -> Result<Option<String>, ConnectorError>;

    fn has_connection_uri(&self) -> bool {
        false
    }

    async fn connection_uri(&self) -> Option<String> {
        None
    }
}

/// Variant tag of a [`WalletConnector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    Injected,
    Relay,
    EnvironmentDispatch,
}

/// The concrete connectors the session layer can drive.
pub enum WalletConnector {
    Injected(InjectedConnector),
    Relay(RelayConnector),
    EnvironmentDispatch(EnvironmentConnector),
}

impl WalletConnector {
    pub fn kind(&self) -> ConnectorKind {
        match self {
            WalletConnector::Injected(_) => ConnectorKind::Injected,
            WalletConnector::Relay(_) => ConnectorKind::Relay,
            WalletConnector::EnvironmentDispatch(_) => ConnectorKind::EnvironmentDispatch,
        }
    }

    pub fn id(&self) -> &str {
        &self.as_connector().info().id
    }

    pub fn name(&self) -> &str {
        &self.as_connector().info().name
    }

    /// Shorthand for registering a listener on this connector's emitter.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ConnectorEvent) + Send + Sync + 'static,
    {
        self.events().on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events().off(id)
    }

    fn as_connector(&self) -> &dyn Connector {
        match self {
            WalletConnector::Injected(c) => c,
            WalletConnector::Relay(c) => c,
            WalletConnector::EnvironmentDispatch(c) => c,
        }
    }
}

impl std::fmt::Debug for WalletConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnector")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl From<InjectedConnector> for WalletConnector {
    fn from(connector: InjectedConnector) -> Self {
        WalletConnector::Injected(connector)
    }
}

impl From<RelayConnector> for WalletConnector {
    fn from(connector: RelayConnector) -> Self {
        WalletConnector::Relay(connector)
    }
}

impl From<EnvironmentConnector> for WalletConnector {
    fn from(connector: EnvironmentConnector) -> Self {
        WalletConnector::EnvironmentDispatch(connector)
    }
}

#[async_trait]
impl Connector for WalletConnector {
    fn info(&self) -> &ConnectorInfo {
        self.as_connector().info()
    }

    fn events(&self) -> &EventEmitter {
        self.as_connector().events()
    }

    fn state(&self) -> ConnectorState {
        self.as_connector().state()
    }

    fn is_installed(&self) -> bool {
        self.as_connector().is_installed()
    }

    async fn is_available(&self) -> bool {
        self.as_connector().is_available().await
    }

    async fn connect(
        &self,
        app_name: &str,
        chains: &[Chain],
        target_chain_id: Option<&str>,
    ) -> Result<Vec<Account>, ConnectorError> {
        self.as_connector()
            .connect(app_name, chains, target_chain_id)
            .await
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.as_connector().disconnect().await
    }

    fn accounts(&self) -> Vec<Account> {
        self.as_connector().accounts()
    }

    fn signer(&self) -> Option<Arc<dyn Signer>> {
        self.as_connector().signer()
    }

    async fn sign_message(
        &self,
        message: &str,
        address: &str,
    ) -> Result<Option<String>, ConnectorError> {
        self.as_connector().sign_message(message, address).await
    }

    fn has_connection_uri(&self) -> bool {
        self.as_connector().has_connection_uri()
    }

    async fn connection_uri(&self) -> Option<String> {
        self.as_connector().connection_uri().await
    }
}
