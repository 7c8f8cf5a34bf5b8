//! # Chain Client Lifecycle
//!
//! Builds, connects and verifies the client used to talk to one chain.
//!
//! The network transport itself is a capability supplied by the host through
//! [`ApiFactory`] and [`ChainApi`]. This module only owns the lifecycle around
//! it: genesis verification, feature-flag derivation and teardown of clients
//! that fail verification.

use crate::{config::SessionConfig, error::ApiError, error::ConfigError, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use subconnect_connector::{Chain, Unsubscribe};

/// Callback receiving raw notifications of a chain subscription.
pub type NotificationCallback = Box<dyn Fn(Value) + Send + Sync>;

/// Chain-level properties read once after connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainProperties {
    #[serde(default)]
    pub ss58_format: Option<u16>,
    #[serde(default)]
    pub token_decimals: Vec<u8>,
    #[serde(default)]
    pub token_symbol: Vec<String>,
    #[serde(default)]
    pub is_ethereum: bool,
}

/// A live connection to one chain node.
///
/// Implemented by the host's RPC transport. The encoding of individual
/// queries is opaque to the session layer: subscriptions address the node by
/// method name and JSON parameters.
#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;

    /// Genesis hash reported by the connected node, `0x`-prefixed hex.
    async fn genesis_hash(&self) -> anyhow::Result<String>;

    async fn properties(&self) -> anyhow::Result<ChainProperties>;

    async fn disconnect(&self) -> anyhow::Result<()>;

    fn is_connected(&self) -> bool;

    /// Opens a node subscription. The returned closure ends it.
    async fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
        callback: NotificationCallback,
    ) -> anyhow::Result<Unsubscribe>;
}

/// Constructs transport-bound [`ChainApi`] instances.
pub trait ApiFactory: Send + Sync {
    fn build(&self, chain: &Chain, transport: &Transport) -> anyhow::Result<Arc<dyn ChainApi>>;
}

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// A verified chain client.
///
/// Tied 1:1 to a genesis hash. Each instance carries a process-unique `id`
/// so dependents can tell a replaced client apart from the one they bound to.
#[derive(Clone)]
pub struct ChainClient {
    pub id: u64,
    pub chain_id: String,
    pub chain_name: String,
    pub api: Arc<dyn ChainApi>,
    pub is_ethereum: bool,
    pub properties: ChainProperties,
}

impl ChainClient {
    pub fn is_for(&self, chain_id: &str) -> bool {
        self.chain_id.eq_ignore_ascii_case(chain_id)
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.api.disconnect().await {
            tracing::warn!(chain_id = %self.chain_id, "Failed to disconnect chain client: {}", e);
        }
    }
}

impl fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainClient")
            .field("id", &self.id)
            .field("chain_id", &self.chain_id)
            .field("chain_name", &self.chain_name)
            .field("is_ethereum", &self.is_ethereum)
            .finish()
    }
}

/// Builds, connects and verifies a client for `chain_id`.
///
/// The node's genesis hash must match `chain_id` byte for byte, otherwise the
/// fresh client is disconnected and [`ApiError::ChainMismatch`] is returned.
/// Disconnecting any previously installed client is the caller's job.
pub async fn create_api(
    config: &SessionConfig,
    chain_id: &str,
    factory: &dyn ApiFactory,
) -> Result<ChainClient, ApiError> {
    let chain = config
        .chain(chain_id)
        .ok_or_else(|| ConfigError::UnknownChain(chain_id.to_string()))?;
    let transport = config
        .transport(&chain.genesis_hash)
        .ok_or_else(|| ConfigError::MissingTransport(chain.genesis_hash.clone()))?;

    tracing::info!(
        chain_id = %chain.genesis_hash,
        endpoint = transport.preferred_endpoint().unwrap_or("<none>"),
        "Creating chain client for {}",
        chain.name
    );

    let connection_error = |e: anyhow::Error| ApiError::Connection {
        chain_name: chain.name.clone(),
        reason: e.to_string(),
    };

    let api = factory.build(chain, transport).map_err(connection_error)?;
    if let Err(e) = api.connect().await {
        release(&api, &chain.genesis_hash).await;
        return Err(connection_error(e));
    }

    let actual = match api.genesis_hash().await {
        Ok(hash) => hash,
        Err(e) => {
            release(&api, &chain.genesis_hash).await;
            return Err(connection_error(e));
        }
    };
    if !same_genesis(&actual, &chain.genesis_hash) {
        tracing::error!(
            expected = %chain.genesis_hash,
            actual = %actual,
            "Node reported an unexpected genesis hash"
        );
        release(&api, &chain.genesis_hash).await;
        return Err(ApiError::ChainMismatch {
            expected: chain.genesis_hash.clone(),
            actual,
        });
    }

    let properties = match api.properties().await {
        Ok(properties) => properties,
        Err(e) => {
            release(&api, &chain.genesis_hash).await;
            return Err(ApiError::Properties {
                chain_name: chain.name.clone(),
                reason: e.to_string(),
            });
        }
    };

    let client = ChainClient {
        id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
        chain_id: chain.genesis_hash.clone(),
        chain_name: chain.name.clone(),
        is_ethereum: properties.is_ethereum,
        api,
        properties,
    };
    tracing::info!(chain_id = %client.chain_id, client_id = client.id, "Chain client ready");
    Ok(client)
}

async fn release(api: &Arc<dyn ChainApi>, chain_id: &str) {
    if let Err(e) = api.disconnect().await {
        tracing::warn!(chain_id = %chain_id, "Failed to disconnect rejected client: {}", e);
    }
}

/// Compares two genesis hashes by their decoded bytes.
///
/// Falls back to a case-insensitive string comparison when either side is
/// not valid hex.
fn same_genesis(a: &str, b: &str) -> bool {
    let decode = |s: &str| hex::decode(s.trim_start_matches("0x"));
    match (decode(a), decode(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.eq_ignore_ascii_case(b),
    }
}

#[cfg(test)]
mod tests {
    use super::same_genesis;

    #[test]
    fn genesis_comparison_ignores_case_and_prefix() {
        assert!(same_genesis("0xABCDEF", "abcdef"));
        assert!(!same_genesis("0xabcdef", "0xabcdee"));
    }

    #[test]
    fn genesis_comparison_falls_back_for_invalid_hex() {
        assert!(same_genesis("not-hex", "NOT-HEX"));
        assert!(!same_genesis("not-hex", "0x00"));
    }
}
