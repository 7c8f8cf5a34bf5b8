use thiserror::Error;

/// Errors raised by wallet connectors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("{connector} is not installed or not available")]
    NotInstalled { connector: String },

    #[error("{connector} rejected the request: {reason}")]
    Rejected { connector: String, reason: String },

    #[error("{connector} returned no accounts")]
    NoAccounts { connector: String },

    #[error("{connector} is already connecting")]
    AlreadyConnecting { connector: String },

    #[error("address {address} is not an account of {connector}")]
    UnknownAddress { connector: String, address: String },

    #[error("{connector} has no signer, connect first")]
    NoSigner { connector: String },

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Provider error: {0}")]
    Provider(String),
}
