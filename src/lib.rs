//! Multisig Vault: an M-of-N approval workflow over an account-based ledger
//!
//! This crate provides:
//! - Multisig groups with deterministic ids and wallet addresses
//! - Proposals bundling transfers and memos out of a group wallet
//! - An approval state machine (single reject is final)
//! - Exactly-once execution of approved proposals
//! - A `Ledger` client trait with retry and confirmation handling
//! - An in-memory ledger running the multisig program, with JSON persistence
//! - ECDSA signing (secp256k1) behind a `Signer` trait
//!
//! # Example
//!
//! ```rust
//! use multisig_vault::config::ClientConfig;
//! use multisig_vault::crypto::KeyPair;
//! use multisig_vault::ledger::{Instruction, MemoryLedger, MemoryLedgerConfig};
//! use multisig_vault::multisig::{MultisigManager, ProposalState};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ledger = Arc::new(MemoryLedger::new(MemoryLedgerConfig::default()));
//! let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
//! for key in &keys {
//!     ledger.airdrop(&key.address(), 1_000_000).await;
//! }
//!
//! let manager = MultisigManager::new(ledger.clone(), ClientConfig::fast());
//! let owners = keys.iter().map(|k| k.public_key_hex()).collect();
//! let group = manager.create_group(&keys[0], owners, 2).await.unwrap();
//! manager.deposit(&keys[0], &group, 10_000).await.unwrap();
//!
//! let proposal = manager
//!     .create_proposal(
//!         &group,
//!         &keys[0],
//!         "Pay invoice",
//!         vec![Instruction::transfer(&group.wallet_address, "1Vendor", 2_500)],
//!     )
//!     .await
//!     .unwrap();
//!
//! manager.approve(&proposal.proposal_id, &keys[0]).await.unwrap();
//! manager.approve(&proposal.proposal_id, &keys[2]).await.unwrap();
//! let executed = manager.execute(&proposal.proposal_id, &keys[1]).await.unwrap();
//! assert_eq!(executed.proposal.state, ProposalState::Executed);
//! # });
//! ```

pub mod cli;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod multisig;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use config::ClientConfig;
pub use crypto::{KeyPair, Signer};
pub use ledger::{Instruction, Ledger, LedgerError, MemoryLedger, MemoryLedgerConfig};
pub use multisig::{
    Decision, MultisigError, MultisigGroup, MultisigManager, Proposal, ProposalState,
};
pub use storage::Storage;
pub use wallet::Wallet;
