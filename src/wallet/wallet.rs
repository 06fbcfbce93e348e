//! Local key store
//!
//! Each wallet is one JSON credential file named after its account
//! address. Loaded wallets act as [`Signer`]s for the multisig workflow.

use crate::crypto::{canonical_public_key_hex, KeyError, KeyPair, Signer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("No wallet for {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// Serializable wallet data for persistence
#[derive(Debug, Serialize, Deserialize)]
struct WalletData {
    private_key_hex: String,
    address: String,
    label: Option<String>,
}

/// A signing key with an optional label
pub struct Wallet {
    key_pair: KeyPair,
    pub label: Option<String>,
}

impl Wallet {
    /// Create a new wallet with a fresh key pair
    pub fn new(label: Option<&str>) -> Self {
        Self {
            key_pair: KeyPair::generate(),
            label: label.map(str::to_string),
        }
    }

    /// Import a wallet from a private key
    pub fn from_private_key(private_key_hex: &str, label: Option<&str>) -> Result<Self, WalletError> {
        Ok(Self {
            key_pair: KeyPair::from_private_key_hex(private_key_hex)?,
            label: label.map(str::to_string),
        })
    }

    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// Public key (hex); the wallet's identity in multisig groups
    pub fn public_key(&self) -> String {
        self.key_pair.public_key_hex()
    }

    /// Get the wallet's private key (hex)
    /// WARNING: Keep this secret!
    pub fn private_key(&self) -> String {
        self.key_pair.private_key_hex()
    }

    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let data = WalletData {
            private_key_hex: self.private_key(),
            address: self.address(),
            label: self.label.clone(),
        };

        let json = serde_json::to_string_pretty(&data)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let data: WalletData = serde_json::from_str(&json)?;
        Self::from_private_key(&data.private_key_hex, data.label.as_deref())
    }

    /// Export wallet info (without private key)
    pub fn export_public_info(&self) -> WalletInfo {
        WalletInfo {
            address: self.address(),
            public_key: self.public_key(),
            label: self.label.clone(),
        }
    }
}

impl Signer for Wallet {
    fn public_identity(&self) -> String {
        self.public_key()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        self.key_pair.sign(message)
    }

    fn address(&self) -> String {
        self.key_pair.address()
    }
}

/// Public wallet information (safe to share)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletInfo {
    pub address: String,
    pub public_key: String,
    pub label: Option<String>,
}

/// Directory of wallet files
pub struct WalletManager {
    wallets_dir: PathBuf,
}

impl WalletManager {
    pub fn new(wallets_dir: &Path) -> Result<Self, WalletError> {
        fs::create_dir_all(wallets_dir)?;
        Ok(Self {
            wallets_dir: wallets_dir.to_path_buf(),
        })
    }

    fn path_for(&self, address: &str) -> PathBuf {
        self.wallets_dir.join(format!("{}.json", address))
    }

    /// Create and save a new wallet
    pub fn create_wallet(&self, label: Option<&str>) -> Result<Wallet, WalletError> {
        let wallet = Wallet::new(label);
        wallet.save(&self.path_for(&wallet.address()))?;
        log::info!("Created wallet {}", wallet.address());
        Ok(wallet)
    }

    /// Save an existing private key into the store
    pub fn import_wallet(
        &self,
        private_key_hex: &str,
        label: Option<&str>,
    ) -> Result<Wallet, WalletError> {
        let wallet = Wallet::from_private_key(private_key_hex, label)?;
        wallet.save(&self.path_for(&wallet.address()))?;
        log::info!("Imported wallet {}", wallet.address());
        Ok(wallet)
    }

    /// Public info of every stored wallet, sorted by address
    pub fn list_wallets(&self) -> Result<Vec<WalletInfo>, WalletError> {
        let mut wallets = Vec::new();

        for entry in fs::read_dir(&self.wallets_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match Wallet::load(&path) {
                    Ok(wallet) => wallets.push(wallet.export_public_info()),
                    Err(e) => log::warn!("Skipping unreadable wallet {:?}: {}", path, e),
                }
            }
        }

        wallets.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(wallets)
    }

    /// Load a wallet by its account address
    pub fn load_wallet(&self, address: &str) -> Result<Wallet, WalletError> {
        let path = self.path_for(address);
        if !path.exists() {
            return Err(WalletError::NotFound(address.to_string()));
        }
        Wallet::load(&path)
    }

    /// Public key for `reference`: a public key as-is, or the key of a
    /// stored wallet given by address
    pub fn resolve_identity(&self, reference: &str) -> Result<String, WalletError> {
        if let Ok(key) = canonical_public_key_hex(reference) {
            return Ok(key);
        }
        Ok(self.load_wallet(reference)?.public_key())
    }

    pub fn delete_wallet(&self, address: &str) -> Result<(), WalletError> {
        fs::remove_file(self.path_for(address))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify_hex;

    #[test]
    fn test_wallet_import() {
        let wallet1 = Wallet::new(None);
        let wallet2 = Wallet::from_private_key(&wallet1.private_key(), None).unwrap();
        assert_eq!(wallet1.address(), wallet2.address());
        assert_eq!(wallet1.public_key(), wallet2.public_key());
    }

    #[test]
    fn test_wallet_save_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test_wallet.json");

        let wallet1 = Wallet::new(Some("Treasurer"));
        wallet1.save(&path).unwrap();

        let wallet2 = Wallet::load(&path).unwrap();
        assert_eq!(wallet1.address(), wallet2.address());
        assert_eq!(wallet2.label.as_deref(), Some("Treasurer"));
    }

    #[test]
    fn test_wallet_signs_as_identity() {
        let wallet = Wallet::new(None);
        let signer: &dyn Signer = &wallet;

        let sig = hex::encode(signer.sign(b"vote").unwrap());
        assert!(verify_hex(&signer.public_identity(), b"vote", &sig));
        assert_eq!(signer.address(), wallet.address());
    }

    #[test]
    fn test_manager_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager = WalletManager::new(&temp_dir.path().join("wallets")).unwrap();

        let a = manager.create_wallet(Some("alice")).unwrap();
        let b = manager.create_wallet(None).unwrap();

        let listed = manager.list_wallets().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.windows(2).all(|w| w[0].address < w[1].address));

        let loaded = manager.load_wallet(&a.address()).unwrap();
        assert_eq!(loaded.public_key(), a.public_key());

        // Addresses and raw public keys both resolve to the public key
        assert_eq!(manager.resolve_identity(&b.address()).unwrap(), b.public_key());
        assert_eq!(manager.resolve_identity(&b.public_key()).unwrap(), b.public_key());
        assert_eq!(
            manager.resolve_identity(&b.public_key().to_uppercase()).unwrap(),
            b.public_key()
        );
        assert!(matches!(
            manager.resolve_identity("1Unknown"),
            Err(WalletError::NotFound(_))
        ));

        manager.delete_wallet(&b.address()).unwrap();
        assert_eq!(manager.list_wallets().unwrap().len(), 1);
    }

    #[test]
    fn test_manager_import() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager = WalletManager::new(&temp_dir.path().join("wallets")).unwrap();
        let exported = Wallet::new(None);

        let imported = manager
            .import_wallet(&exported.private_key(), Some("cold"))
            .unwrap();
        assert_eq!(imported.address(), exported.address());

        let loaded = manager.load_wallet(&exported.address()).unwrap();
        assert_eq!(loaded.public_key(), exported.public_key());
        assert_eq!(loaded.label.as_deref(), Some("cold"));

        assert!(matches!(
            manager.import_wallet("not-a-key", None),
            Err(WalletError::CryptoError(_))
        ));
    }
}
