use crate::{error::StorageError, sync::lock};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::{collections::HashMap, sync::Mutex};
use subconnect_connector::Account;

/// Id of the last successfully connected connector.
pub const LAST_CONNECTOR_ID: &str = "lastConnectorId";
/// Genesis hash of the last active chain.
pub const LAST_CHAIN_ID: &str = "lastChainId";
/// JSON snapshot of the last selected account, see [`PersistedAccount`].
pub const LAST_SELECTED_ACCOUNT: &str = "lastSelectedAccountInfo";

/// All keys owned by the session layer.
pub const SESSION_KEYS: [&str; 3] = [LAST_CONNECTOR_ID, LAST_CHAIN_ID, LAST_SELECTED_ACCOUNT];

/// The minimal key/value capability supplied by the host.
///
/// Mirrors browser `localStorage`: string keys, string values, and any call
/// may fail.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// The minimal snapshot persisted for the selected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAccount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: String,
}

impl From<&Account> for PersistedAccount {
    fn from(account: &Account) -> Self {
        Self {
            public_key: account.public_key.clone(),
            address: account.address.clone(),
            name: account.name.clone(),
            source: account.meta.source.clone(),
        }
    }
}

/// An in-process [`KeyValueStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.items).remove(key);
        Ok(())
    }
}

/// A `sled`-backed [`KeyValueStorage`] for native hosts.
///
/// Keys are namespaced under `subconnect::` so the database can be shared.
#[derive(Clone)]
pub struct SledStorage {
    db: Db,
}

impl SledStorage {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Opens (or creates) a database at `path`.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Ok(Self::new(sled::open(path)?))
    }

    fn key(key: &str) -> String {
        format!("subconnect::{}", key)
    }
}

impl KeyValueStorage for SledStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .db
            .get(Self::key(key))?
            .map(|v| String::from_utf8(v.to_vec()))
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.db.insert(Self::key(key), value.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.db.remove(Self::key(key))?;
        self.db.flush()?;
        Ok(())
    }
}
