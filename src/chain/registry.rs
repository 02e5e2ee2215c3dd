//! Batch registry reads over JSON-RPC.

use super::{format_address, normalize_batch_id, parse_address, strip_hex_prefix};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha3::{Digest, Keccak256};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// View function returning the payer of a batch.
pub const BATCH_PAYER_SIGNATURE: &str = "getBatchPayer(bytes32)";

/// Client for the batch registry contract.
pub struct RegistryClient {
    http: reqwest::Client,
    rpc_url: String,
    contract: String,
    selector: [u8; 4],
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RegistryClient {
    /// Create a client for the registry at `contract` reachable via `rpc_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `contract` is not a valid address or the HTTP
    /// client cannot be built.
    pub fn new(rpc_url: &str, contract: &str) -> Result<Self> {
        let contract = format_address(&parse_address(contract)?);
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build RPC client: {e}")))?;

        Ok(Self {
            http,
            rpc_url: rpc_url.to_string(),
            contract,
            selector: function_selector(BATCH_PAYER_SIGNATURE),
            next_id: AtomicU64::new(1),
        })
    }

    /// Registry contract address, lowercase.
    #[must_use]
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Read the payer of `batch_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for a batch id that is not hex or longer
    /// than 32 bytes, and `Error::Registry` for any transport, RPC or decoding
    /// failure.
    pub async fn batch_payer(&self, batch_id: &str) -> Result<String> {
        let batch_id = normalize_batch_id(batch_id);
        let call_data = encode_batch_payer_call(self.selector, &batch_id)?;

        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "eth_call",
            params: json!([{ "to": self.contract, "data": call_data }, "latest"]),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        debug!("eth_call {} on {} for batch {}", BATCH_PAYER_SIGNATURE, self.contract, batch_id);

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("RPC call failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Registry(format!("RPC call failed: {e}")))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::Registry(format!("Failed to parse response: {e}")))?;

        if let Some(err) = body.error {
            return Err(Error::Registry(format!(
                "RPC error {}: {}",
                err.code, err.message
            )));
        }

        let result = body
            .result
            .ok_or_else(|| Error::Registry("RPC response has no result".to_string()))?;
        decode_address_word(&result)
    }
}

/// First four bytes of the Keccak-256 hash of a function signature.
#[must_use]
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// ABI-encode `selector(bytes32 batch_id)` as `0x` hex.
///
/// Shorter ids are left-aligned and zero padded, as `bytes32` values are.
fn encode_batch_payer_call(selector: [u8; 4], batch_id: &str) -> Result<String> {
    let digits = strip_hex_prefix(batch_id);
    let mut word = hex::decode(if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    })
    .map_err(|e| Error::InvalidInput(format!("batch id '{batch_id}' is not hex: {e}")))?;

    if word.len() > 32 {
        return Err(Error::InvalidInput(format!(
            "batch id '{batch_id}' is longer than 32 bytes"
        )));
    }
    word.resize(32, 0);

    Ok(format!("0x{}{}", hex::encode(selector), hex::encode(word)))
}

/// Decode an ABI `address` return value.
fn decode_address_word(result: &str) -> Result<String> {
    let digits = strip_hex_prefix(result).get(..64).ok_or_else(|| {
        Error::Registry(format!(
            "unexpected return data '{result}' (contract missing or reverted?)"
        ))
    })?;

    let word = hex::decode(digits)
        .map_err(|e| Error::Registry(format!("return data is not hex: {e}")))?;
    let mut address = [0u8; 20];
    address.copy_from_slice(&word[12..]);
    Ok(format_address(&address))
}
