//! ECDSA key management
//!
//! Provides key pair generation, signing, and verification using
//! the secp256k1 elliptic curve.

use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::{derive_address, sha256};

/// Version byte for single-key account addresses (mainnet style, '1...')
pub const ACCOUNT_ADDRESS_VERSION: u8 = 0x00;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Ledger account address controlled by this key
    pub fn address(&self) -> String {
        public_key_to_address(&self.public_key)
    }

    /// Sign a message with the private key
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_message(&self.secret_key, message)
    }

    /// Verify a signature against this key pair's public key
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        verify_signature(&self.public_key, message, signature)
    }
}

/// Convert a public key to a ledger account address
///
/// Base58Check(0x00 || RIPEMD160(SHA256(pubkey)))
pub fn public_key_to_address(public_key: &PublicKey) -> String {
    derive_address(ACCOUNT_ADDRESS_VERSION, &public_key.serialize())
}

/// Account address for a hex-encoded public key
pub fn address_from_public_key_hex(hex_key: &str) -> Result<String, KeyError> {
    Ok(public_key_to_address(&public_key_from_hex(hex_key)?))
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Canonical encoding of a hex public key: compressed, lower-case hex
///
/// Upper-case and uncompressed encodings of one key all map to the same
/// string, so identities can be compared as strings afterwards.
pub fn canonical_public_key_hex(hex_key: &str) -> Result<String, KeyError> {
    Ok(hex::encode(public_key_from_hex(hex_key)?.serialize()))
}

/// Whether `hex_key` is already in canonical form
pub fn is_canonical_public_key_hex(hex_key: &str) -> bool {
    canonical_public_key_hex(hex_key).map_or(false, |canonical| canonical == hex_key)
}

fn message_digest(message: &[u8]) -> Result<Message, KeyError> {
    // Messages that are not already a 32-byte digest get hashed first
    let hash = if message.len() == 32 {
        message.to_vec()
    } else {
        sha256(message)
    };
    Ok(Message::from_digest_slice(&hash)?)
}

/// Sign a message with a secret key
pub fn sign_message(secret_key: &SecretKey, message: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::new();
    let message = message_digest(message)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a signature against a public key
pub fn verify_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let message = message_digest(message)?;
    let sig = secp256k1::ecdsa::Signature::from_compact(signature)
        .map_err(|_| KeyError::InvalidSignature)?;

    match secp.verify_ecdsa(&message, &sig, public_key) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Verify a hex signature made by a hex public key
///
/// Malformed keys or signatures count as a failed verification.
pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(public_key) = public_key_from_hex(public_key_hex) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    verify_signature(&public_key, message, &signature).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert!(!kp.private_key_hex().is_empty());
        assert!(!kp.public_key_hex().is_empty());
        assert!(!kp.address().is_empty());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let message = b"approve proposal";

        let signature = kp.sign(message).unwrap();
        assert!(kp.verify(message, &signature).unwrap());
        assert!(!kp.verify(b"reject proposal", &signature).unwrap());
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let private_hex = kp1.private_key_hex();

        let kp2 = KeyPair::from_private_key_hex(&private_hex).unwrap();
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
        assert_eq!(kp1.address(), kp2.address());
    }

    #[test]
    fn test_address_format() {
        let kp = KeyPair::generate();
        assert!(kp.address().starts_with('1'));
        assert_eq!(
            address_from_public_key_hex(&kp.public_key_hex()).unwrap(),
            kp.address()
        );
    }

    #[test]
    fn test_verify_hex_rejects_garbage() {
        let kp = KeyPair::generate();
        let sig = hex::encode(kp.sign(b"msg").unwrap());
        assert!(verify_hex(&kp.public_key_hex(), b"msg", &sig));
        assert!(!verify_hex("zz", b"msg", &sig));
        assert!(!verify_hex(&kp.public_key_hex(), b"msg", "not-hex"));
    }

    #[test]
    fn test_canonical_public_key() {
        let kp = KeyPair::generate();
        let compressed = kp.public_key_hex();
        let upper = compressed.to_uppercase();
        let uncompressed = hex::encode(kp.public_key.serialize_uncompressed());

        assert_eq!(canonical_public_key_hex(&upper).unwrap(), compressed);
        assert_eq!(canonical_public_key_hex(&uncompressed).unwrap(), compressed);
        assert!(is_canonical_public_key_hex(&compressed));
        assert!(!is_canonical_public_key_hex(&upper));
        assert!(!is_canonical_public_key_hex(&uncompressed));
        assert!(canonical_public_key_hex("alice").is_err());
    }
}
