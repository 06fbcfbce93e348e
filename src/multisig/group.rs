//! Multisig group definition
//!
//! A group is a fixed owner set plus a threshold. Its id and wallet
//! address are derived deterministically from those values and a nonce,
//! so anyone can recompute and check them.

use crate::crypto::canonical_public_key_hex;
use crate::multisig::error::MultisigError;
use crate::multisig::records::{group_id, wallet_address};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An M-of-N multisig group
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MultisigGroup {
    /// Deterministic group id (Base58Check)
    pub group_id: String,
    /// Canonical public keys (compressed hex) of every owner, in creation order
    pub owners: Vec<String>,
    /// Minimum approvals required (M in M-of-N)
    pub threshold: u8,
    /// Ledger account controlled by the group (P2SH-style, starts with '3')
    pub wallet_address: String,
    /// Seed mixed into the group id so identical owner sets can coexist
    pub nonce: u64,
    /// Optional human-readable label
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MultisigGroup {
    /// Build a new group definition
    ///
    /// Owners are stored in canonical form whatever encoding they were
    /// given in.
    ///
    /// # Errors
    /// `InvalidThreshold` if the threshold is 0 or exceeds the owner count,
    /// `InvalidOwner` if an owner is not a public key,
    /// `DuplicateOwner` if one key appears twice, in any encoding.
    pub fn new(
        owners: Vec<String>,
        threshold: u8,
        nonce: u64,
        label: Option<String>,
    ) -> Result<Self, MultisigError> {
        let owners = Self::validate_params(&owners, threshold)?;

        let group_id = group_id(&owners, threshold, nonce);
        let wallet_address = wallet_address(&group_id);

        Ok(Self {
            group_id,
            owners,
            threshold,
            wallet_address,
            nonce,
            label,
            created_at: Utc::now(),
        })
    }

    /// Check the threshold bounds and owner uniqueness, returning the
    /// owners in canonical form
    pub fn validate_params(owners: &[String], threshold: u8) -> Result<Vec<String>, MultisigError> {
        if threshold == 0 || threshold as usize > owners.len() {
            return Err(MultisigError::InvalidThreshold {
                threshold,
                owners: owners.len(),
            });
        }

        let mut canonical = Vec::with_capacity(owners.len());
        let mut seen = HashSet::with_capacity(owners.len());
        for owner in owners {
            let key = canonical_public_key_hex(owner)
                .map_err(|_| MultisigError::InvalidOwner(owner.clone()))?;
            if !seen.insert(key.clone()) {
                return Err(MultisigError::DuplicateOwner(owner.clone()));
            }
            canonical.push(key);
        }

        Ok(canonical)
    }

    /// Re-validate a group read back from somewhere untrusted
    pub fn verify(&self) -> Result<(), MultisigError> {
        let canonical = Self::validate_params(&self.owners, self.threshold)?;
        if canonical != self.owners {
            return Err(MultisigError::InvalidRecord(format!(
                "owners of group {} are not canonical public keys",
                self.group_id
            )));
        }

        let expected_id = group_id(&self.owners, self.threshold, self.nonce);
        if self.group_id != expected_id {
            return Err(MultisigError::InvalidRecord(format!(
                "group id {} does not match its owners and nonce",
                self.group_id
            )));
        }
        if self.wallet_address != wallet_address(&self.group_id) {
            return Err(MultisigError::InvalidRecord(format!(
                "wallet address {} does not belong to group {}",
                self.wallet_address, self.group_id
            )));
        }
        Ok(())
    }

    /// Check if a canonical public key is an owner
    pub fn is_owner(&self, identity: &str) -> bool {
        self.owners.iter().any(|o| o == identity)
    }

    /// Get the threshold (M)
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Get the owner count (N)
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    /// Same owner set (order-insensitive) and threshold
    pub fn matches(&self, owners: &[String], threshold: u8) -> bool {
        if self.threshold != threshold || self.owners.len() != owners.len() {
            return false;
        }
        let mine: HashSet<&str> = self.owners.iter().map(String::as_str).collect();
        owners.iter().all(|o| {
            canonical_public_key_hex(o).map_or(false, |key| mine.contains(key.as_str()))
        })
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.owners.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn sample_keys() -> Vec<KeyPair> {
        (1..=3u8)
            .map(|i| KeyPair::from_private_key_hex(&format!("{:064x}", i)).unwrap())
            .collect()
    }

    fn sample_owners() -> Vec<String> {
        sample_keys().iter().map(|k| k.public_key_hex()).collect()
    }

    #[test]
    fn test_group_creation() {
        let group = MultisigGroup::new(sample_owners(), 2, 7, Some("Treasury".to_string())).unwrap();

        assert_eq!(group.threshold(), 2);
        assert_eq!(group.owner_count(), 3);
        assert_eq!(group.description(), "2-of-3");
        assert!(group.wallet_address.starts_with('3'));
        assert!(group.verify().is_ok());
    }

    #[test]
    fn test_threshold_bounds() {
        for threshold in [0u8, 4, 255] {
            let result = MultisigGroup::new(sample_owners(), threshold, 0, None);
            assert!(matches!(
                result,
                Err(MultisigError::InvalidThreshold { owners: 3, .. })
            ));
        }

        // No owners at all can never satisfy 1 <= M <= N
        assert!(matches!(
            MultisigGroup::new(vec![], 1, 0, None),
            Err(MultisigError::InvalidThreshold { owners: 0, .. })
        ));

        // 1-of-1 is allowed
        assert!(MultisigGroup::new(sample_owners()[..1].to_vec(), 1, 0, None).is_ok());
    }

    #[test]
    fn test_duplicate_owner() {
        let owners = sample_owners();
        let repeated = vec![owners[0].clone(), owners[1].clone(), owners[0].clone()];
        let result = MultisigGroup::new(repeated, 2, 0, None);
        assert!(matches!(result, Err(MultisigError::DuplicateOwner(o)) if o == owners[0]));
    }

    #[test]
    fn test_same_key_in_another_encoding_is_duplicate() {
        let keys = sample_keys();
        let owners = sample_owners();

        let mixed_case = vec![owners[0].clone(), owners[0].to_uppercase(), owners[1].clone()];
        assert!(matches!(
            MultisigGroup::new(mixed_case, 2, 0, None),
            Err(MultisigError::DuplicateOwner(_))
        ));

        let uncompressed = hex::encode(keys[0].public_key.serialize_uncompressed());
        let both_forms = vec![owners[0].clone(), uncompressed, owners[2].clone()];
        assert!(matches!(
            MultisigGroup::new(both_forms, 2, 0, None),
            Err(MultisigError::DuplicateOwner(_))
        ));
    }

    #[test]
    fn test_owner_must_be_public_key() {
        let mut owners = sample_owners();
        owners.push("alice".to_string());
        assert!(matches!(
            MultisigGroup::new(owners, 2, 0, None),
            Err(MultisigError::InvalidOwner(o)) if o == "alice"
        ));
    }

    #[test]
    fn test_owners_stored_canonical() {
        let keys = sample_keys();
        let owners = vec![
            keys[0].public_key_hex().to_uppercase(),
            hex::encode(keys[1].public_key.serialize_uncompressed()),
        ];

        let group = MultisigGroup::new(owners, 2, 0, None).unwrap();
        assert_eq!(group.owners, sample_owners()[..2].to_vec());
        assert!(group.is_owner(&keys[0].public_key_hex()));
        assert!(group.verify().is_ok());

        let plain = MultisigGroup::new(sample_owners()[..2].to_vec(), 2, 0, None).unwrap();
        assert_eq!(group.group_id, plain.group_id);
    }

    #[test]
    fn test_id_determinism() {
        let a = MultisigGroup::new(sample_owners(), 2, 42, None).unwrap();
        let b = MultisigGroup::new(sample_owners(), 2, 42, None).unwrap();
        let c = MultisigGroup::new(sample_owners(), 2, 43, None).unwrap();

        assert_eq!(a.group_id, b.group_id);
        assert_eq!(a.wallet_address, b.wallet_address);
        assert_ne!(a.group_id, c.group_id);
        assert_ne!(a.wallet_address, c.wallet_address);
    }

    #[test]
    fn test_owner_order_does_not_change_id() {
        let mut reversed = sample_owners();
        reversed.reverse();

        let a = MultisigGroup::new(sample_owners(), 2, 1, None).unwrap();
        let b = MultisigGroup::new(reversed, 2, 1, None).unwrap();
        assert_eq!(a.group_id, b.group_id);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut group = MultisigGroup::new(sample_owners(), 2, 1, None).unwrap();
        group.threshold = 1;
        assert!(matches!(group.verify(), Err(MultisigError::InvalidRecord(_))));

        let mut group = MultisigGroup::new(sample_owners(), 2, 1, None).unwrap();
        group.wallet_address = "3Fake".to_string();
        assert!(matches!(group.verify(), Err(MultisigError::InvalidRecord(_))));

        // Hand-built record with an owner in upper case
        let mut group = MultisigGroup::new(sample_owners(), 2, 1, None).unwrap();
        group.owners[1] = group.owners[1].to_uppercase();
        assert!(matches!(group.verify(), Err(MultisigError::InvalidRecord(_))));
    }

    #[test]
    fn test_is_owner_and_matches() {
        let owners = sample_owners();
        let group = MultisigGroup::new(owners.clone(), 2, 1, None).unwrap();

        assert!(group.is_owner(&owners[0]));
        assert!(!group.is_owner("not_an_owner"));

        let mut shuffled = owners.clone();
        shuffled.swap(0, 2);
        assert!(group.matches(&shuffled, 2));
        assert!(!group.matches(&shuffled, 3));
        assert!(!group.matches(&owners[..2], 2));

        let upper: Vec<String> = owners.iter().map(|o| o.to_uppercase()).collect();
        assert!(group.matches(&upper, 2));
    }
}
