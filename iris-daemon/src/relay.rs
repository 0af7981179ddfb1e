//! Relay-side stream-cipher contract.
//!
//! The message-relay layer holds the derived key as a binary digest string
//! and uses it as a repeating symmetric key: the string is regrouped into
//! bytes, 8 bits per byte, and each ciphertext byte is XORed with the key
//! byte at `i mod key_len`. Only the decode side lives here; how the peer
//! encodes and transports payloads is its own business.

use iris_qkd::FinalKey;

use crate::errors::{DaemonError, Result};

/// Regroup an 8-bit-aligned '0'/'1' string into key bytes.
pub fn key_stream_bytes(binary_key: &str) -> Result<Vec<u8>> {
    if binary_key.is_empty() || binary_key.len() % 8 != 0 {
        return Err(DaemonError::InvalidKeyMaterial(format!(
            "key length {} is not a positive multiple of 8",
            binary_key.len()
        )));
    }
    binary_key
        .as_bytes()
        .chunks(8)
        .map(|chunk| {
            chunk.iter().try_fold(0u8, |acc, &c| match c {
                b'0' => Ok(acc << 1),
                b'1' => Ok(acc << 1 | 1),
                other => Err(DaemonError::InvalidKeyMaterial(format!(
                    "unexpected character {:?} in binary key",
                    other as char
                ))),
            })
        })
        .collect()
}

/// XOR every ciphertext byte with the repeating key stream.
pub fn xor_decrypt(key_bytes: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if key_bytes.is_empty() {
        return Err(DaemonError::InvalidKeyMaterial("empty key stream".into()));
    }
    Ok(ciphertext
        .iter()
        .enumerate()
        .map(|(i, &byte)| byte ^ key_bytes[i % key_bytes.len()])
        .collect())
}

/// Decrypt an inbound payload with a connection's derived key.
pub fn decrypt(key: &FinalKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    xor_decrypt(&key.key_bytes(), ciphertext)
}
