//! Chain access for upload authorization.
//!
//! The gateway depends only on [`ChainVerifier`]. [`RpcChainVerifier`] is the
//! production implementation: signatures are recovered locally and the batch
//! registry is read with `eth_call` over JSON-RPC.

mod registry;
mod signature;

pub use registry::{RegistryClient, BATCH_PAYER_SIGNATURE};
pub use signature::{eip191_hash, recover_signer, verify_personal_signature};

use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::info;

/// Address every unregistered batch resolves to.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Signature and registry checks consumed by the gateway.
#[async_trait]
pub trait ChainVerifier: Send + Sync {
    /// Returns whether `signature` over `message` was produced by `address`.
    ///
    /// # Errors
    ///
    /// Fails on malformed address or signature input.
    async fn verify_signature(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> Result<bool>;

    /// Address that produced `signature` over `message`, reported alongside
    /// a rejected signature. Verifiers that cannot recover signers return
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Fails on a malformed signature.
    async fn recover_signer(&self, _message: &str, _signature: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Reads the registered payer of `batch_id` (`0x`-prefixed hex).
    ///
    /// # Errors
    ///
    /// Returns `Error::Registry` when the registry cannot be read.
    async fn batch_payer(&self, batch_id: &str) -> Result<String>;
}

/// Verifier backed by local ECDSA recovery and a JSON-RPC registry read.
pub struct RpcChainVerifier {
    registry: Option<RegistryClient>,
}

impl RpcChainVerifier {
    /// Create a verifier. Without a registry address, `batch_payer` always fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry address is malformed or the HTTP
    /// client cannot be built.
    pub fn new(rpc_url: &str, registry_address: Option<&str>) -> Result<Self> {
        let registry = registry_address
            .map(|address| RegistryClient::new(rpc_url, address))
            .transpose()?;
        if let Some(ref registry) = registry {
            info!("Reading batch payers from {} via {rpc_url}", registry.contract());
        }
        Ok(Self { registry })
    }
}

#[async_trait]
impl ChainVerifier for RpcChainVerifier {
    async fn verify_signature(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> Result<bool> {
        verify_personal_signature(address, message, signature)
    }

    async fn recover_signer(&self, message: &str, signature: &str) -> Result<Option<String>> {
        recover_signer(message, signature).map(|address| Some(format_address(&address)))
    }

    async fn batch_payer(&self, batch_id: &str) -> Result<String> {
        match self.registry {
            Some(ref registry) => registry.batch_payer(batch_id).await,
            None => Err(Error::Registry("no batch registry configured".to_string())),
        }
    }
}

/// Parse a `0x`-prefixed (or bare) 20-byte hex address.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the value is not 40 hex digits.
pub fn parse_address(address: &str) -> Result<[u8; 20]> {
    let digits = strip_hex_prefix(address);
    if digits.len() != 40 {
        return Err(Error::InvalidInput(format!(
            "address must be 20 bytes, got '{address}'"
        )));
    }
    let mut out = [0u8; 20];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| Error::InvalidInput(format!("address '{address}' is not hex: {e}")))?;
    Ok(out)
}

/// Render an address as lowercase `0x` hex.
#[must_use]
pub fn format_address(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}

/// Prefix `batch_id` with `0x` unless it already has one.
#[must_use]
pub fn normalize_batch_id(batch_id: &str) -> String {
    if batch_id.starts_with("0x") || batch_id.starts_with("0X") {
        batch_id.to_string()
    } else {
        format!("0x{batch_id}")
    }
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}
