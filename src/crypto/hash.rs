//! Hashing and address encoding utilities
//!
//! Provides the SHA-256 / HASH160 primitives used for transaction
//! signatures, record digests and every derived ledger address.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
/// Used for Base58Check checksums
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// RIPEMD160(SHA256(data)), the 20-byte digest behind every address
pub fn hash160(data: &[u8]) -> Vec<u8> {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(data));
    ripemd.finalize().to_vec()
}

/// Base58Check(version || payload || checksum)
///
/// The checksum is the first 4 bytes of the double SHA-256 of
/// `version || payload`.
pub fn base58check(version: u8, payload: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(payload.len() + 5);
    bytes.push(version);
    bytes.extend_from_slice(payload);

    let checksum = double_sha256(&bytes);
    bytes.extend_from_slice(&checksum[..4]);

    bs58::encode(bytes).into_string()
}

/// Derive an address from a version byte and the HASH160 of `data`
pub fn derive_address(version: u8, data: &[u8]) -> String {
    base58check(version, &hash160(data))
}

/// Check that a Base58Check string decodes and its checksum matches
pub fn is_valid_base58check(address: &str) -> bool {
    let bytes = match bs58::decode(address).into_vec() {
        Ok(b) if b.len() > 4 => b,
        _ => return false,
    };
    let (body, checksum) = bytes.split_at(bytes.len() - 4);
    double_sha256(body)[..4] == *checksum
}
