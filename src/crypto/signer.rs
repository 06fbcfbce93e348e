//! Signing capability handed to the multisig components
//!
//! Key custody stays behind this trait: callers only ever see the public
//! identity and the signatures it produces.

use super::keys::{KeyError, KeyPair};

/// Something that holds a private key and can sign on its behalf
pub trait Signer: Send + Sync {
    /// Hex-encoded compressed public key identifying the signer
    fn public_identity(&self) -> String;

    /// Sign an arbitrary message (hashed with SHA-256 before signing)
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError>;

    /// Ledger account address of this signer
    fn address(&self) -> String;
}

impl Signer for KeyPair {
    fn public_identity(&self) -> String {
        self.public_key_hex()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        KeyPair::sign(self, message)
    }

    fn address(&self) -> String {
        KeyPair::address(self)
    }
}

/// Sign a message and hex-encode the signature
pub fn sign_hex(signer: &dyn Signer, message: &[u8]) -> Result<String, KeyError> {
    Ok(hex::encode(signer.sign(message)?))
}
