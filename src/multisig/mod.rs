//! M-of-N multisig approval workflow
//!
//! A fixed owner set controls a shared wallet. Any owner can propose a
//! bundle of instructions; once `threshold` distinct owners approve it,
//! any owner can execute it exactly once. A single reject is final.
//!
//! All state lives on the ledger and is re-read before every decision,
//! so several clients can cooperate on the same group.
//!
//! # Example
//!
//! ```ignore
//! use multisig_vault::multisig::{MultisigManager, exact_match};
//!
//! let manager = MultisigManager::new(ledger, ClientConfig::default());
//!
//! // Create (or reuse) a 2-of-3 group
//! let group = manager
//!     .select_existing_or_create(&alice, owners.clone(), 2, exact_match(owners, 2))
//!     .await?;
//!
//! // Propose a withdrawal
//! let proposal = manager
//!     .create_proposal(&group, &alice, "Pay invoice", vec![
//!         Instruction::transfer(&group.wallet_address, recipient, 1_000),
//!     ])
//!     .await?;
//!
//! // Collect approvals, then execute
//! manager.approve(&proposal.proposal_id, &alice).await?;
//! manager.approve(&proposal.proposal_id, &bob).await?;
//! manager.execute(&proposal.proposal_id, &carol).await?;
//! ```

pub mod approval;
pub mod dispatcher;
pub mod error;
pub mod group;
pub mod manager;
pub mod proposal;
pub mod records;
pub mod registry;
mod submission;

pub use approval::{check_vote, derive_state, tally, voting_state, ApprovalMachine, Tally, VoteResult};
pub use dispatcher::{ExecutionDispatcher, ExecutionResult};
pub use error::MultisigError;
pub use group::MultisigGroup;
pub use manager::MultisigManager;
pub use proposal::{validate_bundle, Decision, Proposal, ProposalEngine, ProposalState};
pub use records::{ExecutionStatus, GroupRecord, ProposalRecord, VoteRecord};
pub use registry::{exact_match, GroupLookup, MultisigRegistry};
