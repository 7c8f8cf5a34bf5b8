//! The account model shared by connectors and the session layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An account exposed by a wallet provider.
///
/// `address` is chain-encoded and may differ between providers for the same
/// key. `public_key` is the stable identity and is what selection and
/// restoration key on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub meta: AccountMeta,
}

/// Provider metadata attached to an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    /// Id of the connector the account originates from.
    pub source: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Account {
    pub fn new(address: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            public_key: None,
            name: None,
            meta: AccountMeta {
                source: source.into(),
                extra: BTreeMap::new(),
            },
        }
    }

    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.extra.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.meta.source
    }

    /// Compares the account's public key with `key`, ignoring hex case.
    pub fn matches_public_key(&self, key: &str) -> bool {
        self.public_key
            .as_deref()
            .is_some_and(|pk| pk.eq_ignore_ascii_case(key))
    }

    /// Whether two accounts share a public key.
    pub fn same_key_as(&self, other: &Account) -> bool {
        other
            .public_key
            .as_deref()
            .is_some_and(|pk| self.matches_public_key(pk))
    }
}
