//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 / HASH160 hashing and Base58Check addresses
//! - ECDSA key management (secp256k1)
//! - The `Signer` capability used by the multisig workflow

pub mod hash;
pub mod keys;
pub mod signer;

pub use hash::{
    base58check, derive_address, double_sha256, hash160, is_valid_base58check, sha256,
};
pub use keys::{
    address_from_public_key_hex, canonical_public_key_hex, is_canonical_public_key_hex,
    public_key_from_hex, public_key_to_address, sign_message, verify_hex, verify_signature,
    KeyError, KeyPair, ACCOUNT_ADDRESS_VERSION,
};
pub use signer::{sign_hex, Signer};
