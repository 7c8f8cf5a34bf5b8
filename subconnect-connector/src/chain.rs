//! Static chain reference data.
//!
//! Chains are looked up by genesis hash and never mutated by the session layer.

use serde::{Deserialize, Serialize};

/// A Substrate-style chain as configured by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Chain {
    /// Hex-encoded genesis hash, `0x`-prefixed. This is the chain id.
    pub genesis_hash: String,
    pub name: String,
    #[serde(default = "default_ss58_format")]
    pub ss58_format: u16,
    pub native_currency: NativeCurrency,
    #[serde(default)]
    pub rpc_urls: RpcUrls,
    #[serde(default)]
    pub testnet: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_explorer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RpcUrls {
    #[serde(default)]
    pub websocket: Vec<String>,
    #[serde(default)]
    pub http: Vec<String>,
}

fn default_ss58_format() -> u16 {
    42
}

impl Chain {
    /// The chain identifier used in relay namespaces (`polkadot:<hash prefix>`).
    pub fn caip_id(&self) -> String {
        caip_chain_id(&self.genesis_hash)
    }

    /// Whether `chain_id` names this chain. Hex case is ignored.
    pub fn is(&self, chain_id: &str) -> bool {
        self.genesis_hash.eq_ignore_ascii_case(chain_id)
    }
}

/// Builds the CAIP-2 identifier for a genesis hash: the `polkadot` namespace
/// followed by the first 32 hex characters of the hash.
pub fn caip_chain_id(genesis_hash: &str) -> String {
    let hex = genesis_hash.trim_start_matches("0x").to_ascii_lowercase();
    let reference = hex.get(..32).unwrap_or(&hex);
    format!("polkadot:{}", reference)
}
