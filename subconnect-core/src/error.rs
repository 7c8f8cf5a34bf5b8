use subconnect_connector::ConnectorError;
use thiserror::Error;

/// Problems with the configuration surface. Fatal at setup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No configuration has been set")]
    NotConfigured,

    #[error("At least one chain must be configured")]
    NoChains,

    #[error("Chain {0} is configured more than once")]
    DuplicateChain(String),

    #[error("No transport configured for chain {0}")]
    MissingTransport(String),

    #[error("Connector {0} is configured more than once")]
    DuplicateConnector(String),

    #[error("Chain {0} is not configured")]
    UnknownChain(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Failures of the key/value storage capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Stored value could not be (de)serialized: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors returned by [`crate::store::SessionStore`] actions.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Connector {0} not found")]
    ConnectorNotFound(String),

    #[error("Failed to connect to {connector}: {source}")]
    Connection {
        connector: String,
        #[source]
        source: Box<SessionError>,
    },

    #[error("Failed to disconnect from {connector}: {source}")]
    Disconnect {
        connector: String,
        #[source]
        source: ConnectorError,
    },

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("Chain {0} is not configured")]
    ChainNotFound(String),

    #[error("Account {0} is not in the current account list")]
    AccountNotFound(String),

    #[error("Connection attempt was superseded by a newer one")]
    Superseded,

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),
}

/// Errors from building and verifying a chain client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to connect to {chain_name}: {reason}")]
    Connection { chain_name: String, reason: String },

    #[error("Chain mismatch: expected genesis {expected}, node reported {actual}")]
    ChainMismatch { expected: String, actual: String },

    #[error("Failed to read properties of {chain_name}: {reason}")]
    Properties { chain_name: String, reason: String },
}

/// Errors surfaced in a subscription's state. Never propagated to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Subscribe call failed: {0}")]
    Subscribe(String),

    #[error("Transform failed: {0}")]
    Transform(String),
}
