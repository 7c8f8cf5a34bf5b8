use crate::error::ConnectorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A raw-bytes signing request, in the shape wallet providers expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRawPayload {
    pub address: String,
    /// Hex-encoded, `0x`-prefixed message bytes.
    pub data: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SignRawPayload {
    /// Builds a `bytes` payload. Messages that are already `0x` hex are passed
    /// through, anything else is hex-encoded as UTF-8.
    pub fn bytes(address: &str, message: &str) -> Self {
        let data = if message.starts_with("0x") {
            message.to_string()
        } else {
            format!("0x{}", hex::encode(message.as_bytes()))
        };
        Self {
            address: address.to_string(),
            data,
            kind: "bytes".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerResult {
    pub id: u64,
    pub signature: String,
}

/// The signing capability a connected wallet hands out.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign_raw(&self, payload: SignRawPayload) -> Result<SignerResult, ConnectorError>;
}
