//! Session management for Substrate-style wallet connections.
//!
//! This crate tracks exactly one active wallet connection, one active chain and
//! one selected account, and exposes chain data through cancellable,
//! auto-refreshing subscriptions.
//!
//! # Key Components
//!
//! *   [`store::SessionStore`]: the single authority for connection status,
//!     accounts and chain selection (`connect`, `disconnect`, `switch_chain`,
//!     `set_account`).
//! *   [`api::create_api`]: builds, connects and verifies the chain client for
//!     a genesis hash.
//! *   [`chain_sync::ChainSync`]: the background effect that keeps the store's
//!     chain client in step with its selected chain.
//! *   [`subscription::Subscription`]: binds a query factory to the current
//!     chain client and re-subscribes whenever its dependencies change.
pub mod api;
pub mod chain_sync;
/// Runtime and file configuration.
pub mod config;
pub mod error;
/// The listener cleanup registry owned by the store.
pub mod listeners;
/// The key/value persistence contract and its backends.
pub mod storage;
pub mod store;
pub mod subscription;
mod sync;

pub use api::{create_api, ApiFactory, ChainApi, ChainClient, ChainProperties};
pub use chain_sync::{ChainSync, ChainSyncHandle};
pub use config::{load_settings, SessionConfig, SessionConfigBuilder, Settings, Transport};
pub use error::{ApiError, ConfigError, SessionError, StorageError, SubscriptionError};
pub use storage::{KeyValueStorage, MemoryStorage, SledStorage};
pub use store::{AccountSelector, SessionState, SessionStatus, SessionStore};
pub use subscription::{Params, Subscription, SubscriptionHandle, SubscriptionOptions, SubscriptionState};
pub use subconnect_connector::{Account, Chain, ConnectorError, WalletConnector};
