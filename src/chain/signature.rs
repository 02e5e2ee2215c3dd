//! EIP-191 `personal_sign` signature verification.
//!
//! Wallets sign `"\x19Ethereum Signed Message:\n" + len(message) + message`
//! with secp256k1; the signer's address is the low 20 bytes of the Keccak-256
//! hash of the recovered public key.

use super::{format_address, parse_address, strip_hex_prefix};
use crate::error::{Error, Result};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use tracing::debug;

/// Prefix wallets prepend before hashing a personal message.
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// `r || s || v` signature size in bytes.
pub const SIGNATURE_SIZE: usize = 65;

/// Hash `message` the way `personal_sign` does.
#[must_use]
pub fn eip191_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Recover the address that produced `signature` over `message`.
///
/// # Arguments
///
/// * `message` - The exact message string the wallet signed
/// * `signature` - Hex encoded 65-byte signature, `0x` optional
///
/// # Errors
///
/// Returns an error if:
/// - The signature is not hex or has the wrong size
/// - The recovery byte is not one of 0, 1, 27, 28
/// - No public key can be recovered
pub fn recover_signer(message: &str, signature: &str) -> Result<[u8; 20]> {
    let bytes = hex::decode(strip_hex_prefix(signature))
        .map_err(|e| Error::Signature(format!("signature is not hex: {e}")))?;

    if bytes.len() != SIGNATURE_SIZE {
        return Err(Error::Signature(format!(
            "Invalid signature size: expected {SIGNATURE_SIZE}, got {}",
            bytes.len()
        )));
    }

    let v = bytes[64];
    let recovery_byte = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => {
            return Err(Error::Signature(format!("Invalid recovery id: {other}")));
        }
    };
    let mut recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| Error::Signature(format!("Invalid recovery id: {v}")))?;

    let mut sig = Signature::from_slice(&bytes[..64])
        .map_err(|e| Error::Signature(format!("Invalid signature format: {e}")))?;

    // k256 only verifies low-S signatures; flipping S flips the parity of R.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let hash = eip191_hash(message);
    let key = VerifyingKey::recover_from_prehash(&hash, &sig, recovery_id)
        .map_err(|e| Error::Signature(format!("Signature recovery failed: {e}")))?;

    Ok(address_of(&key))
}

/// Check that `signature` over `message` was produced by `address`.
///
/// A well-formed signature from a different key yields `Ok(false)`.
///
/// # Errors
///
/// Returns an error if `address` or `signature` is malformed.
pub fn verify_personal_signature(address: &str, message: &str, signature: &str) -> Result<bool> {
    let expected = parse_address(address)?;
    let recovered = recover_signer(message, signature)?;

    if recovered == expected {
        debug!("Signature verified for {}", format_address(&expected));
        Ok(true)
    } else {
        debug!(
            "Signature mismatch: recovered {}, expected {}",
            format_address(&recovered),
            format_address(&expected)
        );
        Ok(false)
    }
}

fn address_of(key: &VerifyingKey) -> [u8; 20] {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag.
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}
