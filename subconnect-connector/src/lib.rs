//! Wallet connectors for Substrate-style networks.
//!
//! A connector represents one wallet provider behind a uniform capability
//! surface, regardless of how the provider is reached.
//!
//! # Key Components
//!
//! *   [`Connector`]: the capability contract every wallet provider implements.
//! *   [`WalletConnector`]: the tagged set of concrete connectors (`Injected`,
//!     `Relay`, `EnvironmentDispatch`) the session layer works with.
//! *   [`EventEmitter`]: the per-connector event surface (`connect`,
//!     `disconnect`, `accountsChanged`, `get_uri`).
//! *   [`address`]: SS58 decoding used to compare account identities across
//!     address encodings.
pub mod account;
pub mod address;
pub mod chain;
/// The capability trait and the tagged connector enum.
pub mod connector;
/// Connectors that pick a delegate based on the runtime environment.
pub mod dispatch;
pub mod error;
pub mod events;
/// Connectors backed by a provider injected into the host page.
pub mod injected;
/// Connectors backed by a remote relay session (pairing URI / QR code).
pub mod relay;
pub mod signer;
mod sync;

pub use account::{Account, AccountMeta};
pub use chain::{caip_chain_id, Chain, NativeCurrency, RpcUrls};
pub use connector::{Connector, ConnectorInfo, ConnectorKind, ConnectorState, WalletConnector};
pub use error::ConnectorError;
pub use events::{ConnectorEvent, EventEmitter, EventKind, ListenerId};
pub use signer::{SignRawPayload, Signer, SignerResult};

/// A cleanup closure returned by provider-side subscriptions.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;
