//! Transactions and instructions submitted to the ledger
//!
//! A transaction bundles an ordered list of instructions that the ledger
//! applies atomically. Its signature (the fee payer's) doubles as the
//! handle used to poll for confirmation.

use crate::crypto::{address_from_public_key_hex, sha256, sign_hex, verify_hex, KeyError, Signer};
use crate::multisig::group::MultisigGroup;
use crate::multisig::records::{ProposalRecord, VoteRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transaction construction and verification errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction has no instructions")]
    NoInstructions,
    #[error("Fee payer {0} did not sign the transaction")]
    MissingFeePayer(String),
    #[error("Invalid signature from {0}")]
    InvalidSignature(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// A single ledger instruction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Instruction {
    /// Move funds between accounts; `from` must be authorized
    Transfer { from: String, to: String, amount: u64 },
    /// Opaque payload recorded by the ledger without interpretation
    Memo { text: String },
    /// Register a multisig group and its wallet account
    CreateGroup { group: MultisigGroup },
    /// Open a proposal against a group
    CreateProposal { proposal: ProposalRecord },
    /// Record one owner's vote on a proposal
    CastVote { vote: VoteRecord },
    /// Run a fully approved proposal with the group wallet as authority
    ExecuteProposal {
        proposal_id: String,
        executor: String,
    },
}

impl Instruction {
    pub fn transfer(from: &str, to: &str, amount: u64) -> Self {
        Instruction::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        }
    }

    pub fn memo(text: &str) -> Self {
        Instruction::Memo {
            text: text.to_string(),
        }
    }

    /// Short name of the instruction type
    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Transfer { .. } => "transfer",
            Instruction::Memo { .. } => "memo",
            Instruction::CreateGroup { .. } => "create_group",
            Instruction::CreateProposal { .. } => "create_proposal",
            Instruction::CastVote { .. } => "cast_vote",
            Instruction::ExecuteProposal { .. } => "execute_proposal",
        }
    }

    /// Whether this instruction may be bundled into a proposal
    pub fn is_bundleable(&self) -> bool {
        matches!(self, Instruction::Transfer { .. } | Instruction::Memo { .. })
    }
}

/// An unsigned transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Public key (hex) of the account paying fees
    pub fee_payer: String,
    /// Random value distinguishing otherwise identical transactions
    pub nonce: u64,
    pub timestamp: DateTime<Utc>,
    pub instructions: Vec<Instruction>,
}

impl Transaction {
    /// Create a transaction paid for by `fee_payer`
    pub fn new(fee_payer: &str, instructions: Vec<Instruction>) -> Self {
        Self {
            fee_payer: fee_payer.to_string(),
            nonce: rand::random(),
            timestamp: Utc::now(),
            instructions,
        }
    }

    /// Digest every signer signs
    pub fn signing_data(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(sha256(&serde_json::to_vec(self)?))
    }

    /// Sign with every given signer; the fee payer must be among them
    pub fn sign(self, signers: &[&dyn Signer]) -> Result<SignedTransaction, TransactionError> {
        if self.instructions.is_empty() {
            return Err(TransactionError::NoInstructions);
        }

        let data = self.signing_data()?;

        // Fee payer signs first so its signature is the transaction handle
        let mut ordered: Vec<&dyn Signer> = signers
            .iter()
            .copied()
            .filter(|s| s.public_identity() == self.fee_payer)
            .take(1)
            .collect();
        if ordered.is_empty() {
            return Err(TransactionError::MissingFeePayer(self.fee_payer.clone()));
        }
        ordered.extend(
            signers
                .iter()
                .copied()
                .filter(|s| s.public_identity() != self.fee_payer),
        );

        let mut signatures = Vec::with_capacity(ordered.len());
        for signer in ordered {
            signatures.push(SignatureEntry {
                signer: signer.public_identity(),
                signature: sign_hex(signer, &data)?,
            });
        }

        Ok(SignedTransaction {
            transaction: self,
            signatures,
        })
    }
}

/// One signer's signature over a transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureEntry {
    pub signer: String,
    pub signature: String,
}

/// A transaction together with its signatures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signatures: Vec<SignatureEntry>,
}

impl SignedTransaction {
    /// The fee payer's signature, used as the transaction id
    pub fn signature(&self) -> &str {
        self.signatures
            .first()
            .map(|s| s.signature.as_str())
            .unwrap_or_default()
    }

    /// Check every signature and that the fee payer signed first
    pub fn verify(&self) -> Result<(), TransactionError> {
        let first = self
            .signatures
            .first()
            .ok_or_else(|| TransactionError::MissingFeePayer(self.transaction.fee_payer.clone()))?;
        if first.signer != self.transaction.fee_payer {
            return Err(TransactionError::MissingFeePayer(
                self.transaction.fee_payer.clone(),
            ));
        }

        let data = self.transaction.signing_data()?;
        for entry in &self.signatures {
            if !verify_hex(&entry.signer, &data, &entry.signature) {
                return Err(TransactionError::InvalidSignature(entry.signer.clone()));
            }
        }
        Ok(())
    }

    /// Account addresses of every signer
    pub fn signer_addresses(&self) -> Result<Vec<String>, TransactionError> {
        self.signatures
            .iter()
            .map(|s| address_from_public_key_hex(&s.signer).map_err(Into::into))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_sign_and_verify() {
        let payer = KeyPair::generate();
        let tx = Transaction::new(
            &payer.public_key_hex(),
            vec![Instruction::transfer(&payer.address(), "dest", 10)],
        );

        let signed = tx.sign(&[&payer]).unwrap();
        assert!(signed.verify().is_ok());
        assert_eq!(signed.signatures[0].signer, payer.public_key_hex());
        assert_eq!(signed.signature(), signed.signatures[0].signature);
        assert_eq!(signed.signer_addresses().unwrap(), vec![payer.address()]);
    }

    #[test]
    fn test_fee_payer_must_sign() {
        let payer = KeyPair::generate();
        let other = KeyPair::generate();
        let tx = Transaction::new(&payer.public_key_hex(), vec![Instruction::memo("hi")]);

        let result = tx.sign(&[&other]);
        assert!(matches!(result, Err(TransactionError::MissingFeePayer(_))));
    }

    #[test]
    fn test_fee_payer_signature_comes_first() {
        let payer = KeyPair::generate();
        let cosigner = KeyPair::generate();
        let tx = Transaction::new(&payer.public_key_hex(), vec![Instruction::memo("hi")]);

        let signed = tx.sign(&[&cosigner, &payer]).unwrap();
        assert_eq!(signed.signatures[0].signer, payer.public_key_hex());
        assert_eq!(signed.signatures.len(), 2);
        assert!(signed.verify().is_ok());
    }

    #[test]
    fn test_tampered_transaction_fails_verification() {
        let payer = KeyPair::generate();
        let tx = Transaction::new(
            &payer.public_key_hex(),
            vec![Instruction::transfer(&payer.address(), "dest", 10)],
        );
        let mut signed = tx.sign(&[&payer]).unwrap();

        signed.transaction.instructions = vec![Instruction::transfer(&payer.address(), "dest", 1_000)];
        assert!(matches!(
            signed.verify(),
            Err(TransactionError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_empty_transaction_rejected() {
        let payer = KeyPair::generate();
        let tx = Transaction::new(&payer.public_key_hex(), vec![]);
        assert!(matches!(
            tx.sign(&[&payer]),
            Err(TransactionError::NoInstructions)
        ));
    }

    #[test]
    fn test_bundleable_instructions() {
        assert!(Instruction::memo("x").is_bundleable());
        assert!(Instruction::transfer("a", "b", 1).is_bundleable());
        assert!(!Instruction::ExecuteProposal {
            proposal_id: "p".to_string(),
            executor: "e".to_string(),
        }
        .is_bundleable());
    }
}
