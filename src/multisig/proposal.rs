//! Transaction proposals
//!
//! A proposal is an immutable bundle of instructions opened by one owner
//! of a group. The ledger record is the source of truth; [`Proposal`] is
//! the re-derived view including votes and current state.

use crate::config::ClientConfig;
use crate::crypto::Signer;
use crate::ledger::{short, Instruction, Ledger, Transaction};
use crate::multisig::approval::derive_state;
use crate::multisig::error::MultisigError;
use crate::multisig::group::MultisigGroup;
use crate::multisig::records::{
    proposal_id, vote_record_address, ExecutionStatus, GroupRecord, ProposalRecord, VoteRecord,
};
use crate::multisig::registry::MultisigRegistry;
use crate::multisig::submission::{fetch_record, submit_and_confirm, Outcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An owner's vote
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a proposal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProposalState {
    /// Collecting votes, threshold not reached
    Draft,
    /// At least one owner rejected; final
    Rejected,
    /// Approvals reached the threshold; waiting for execution
    Executable,
    /// Executed on the ledger; final
    Executed,
    /// Execution was attempted and the ledger failed it; final
    Failed,
}

impl ProposalState {
    /// Rejected, Executed and Failed never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Rejected | ProposalState::Executed | ProposalState::Failed
        )
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalState::Draft => "draft",
            ProposalState::Rejected => "rejected",
            ProposalState::Executable => "executable",
            ProposalState::Executed => "executed",
            ProposalState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Current view of a proposal, re-derived from ledger records
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub proposal_id: String,
    pub group_id: String,
    pub index: u64,
    pub proposer: String,
    pub description: String,
    pub instructions: Vec<Instruction>,
    /// Owner public key -> decision
    pub votes: BTreeMap<String, Decision>,
    pub state: ProposalState,
    /// Set once the ledger confirmed execution; the single "already executed" marker
    pub execution_signature: Option<String>,
    /// Ledger diagnostic for a failed execution
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    /// Combine a proposal record with its votes
    pub fn assemble(
        group: &MultisigGroup,
        record: ProposalRecord,
        votes: BTreeMap<String, Decision>,
    ) -> Self {
        let state = derive_state(group.threshold, &votes, &record.status);
        let (execution_signature, failure) = match &record.status {
            ExecutionStatus::Pending => (None, None),
            ExecutionStatus::Executed { signature, .. } => (Some(signature.clone()), None),
            ExecutionStatus::Failed { detail, .. } => (None, Some(detail.clone())),
        };

        Self {
            proposal_id: record.proposal_id,
            group_id: record.group_id,
            index: record.index,
            proposer: record.proposer,
            description: record.description,
            instructions: record.instructions,
            votes,
            state,
            execution_signature,
            failure,
            created_at: record.created_at,
        }
    }

    /// Number of approve votes
    pub fn approvals(&self) -> usize {
        self.votes.values().filter(|d| **d == Decision::Approve).count()
    }

    /// Number of reject votes
    pub fn rejections(&self) -> usize {
        self.votes.values().filter(|d| **d == Decision::Reject).count()
    }

    /// Sum of all transfers out of `address`
    pub fn total_outflow(&self, address: &str) -> u64 {
        self.instructions
            .iter()
            .filter_map(|ix| match ix {
                Instruction::Transfer { from, amount, .. } if from == address => Some(*amount),
                _ => None,
            })
            .fold(0u64, |acc, a| acc.saturating_add(a))
    }
}

/// Check that `instructions` may be bundled into a proposal of `group`
pub fn validate_bundle(
    group: &MultisigGroup,
    instructions: &[Instruction],
) -> Result<(), MultisigError> {
    if instructions.is_empty() {
        return Err(MultisigError::EmptyInstructionSet);
    }

    for ix in instructions {
        if !ix.is_bundleable() {
            return Err(MultisigError::UnsupportedInstruction(ix.kind().to_string()));
        }
        if let Instruction::Transfer { from, amount, .. } = ix {
            if from != &group.wallet_address {
                return Err(MultisigError::UnsupportedInstruction(format!(
                    "transfer source {} is not the group wallet",
                    from
                )));
            }
            if *amount == 0 {
                return Err(MultisigError::UnsupportedInstruction(
                    "zero-amount transfer".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Opens proposals and re-derives their current state from the ledger
#[derive(Clone)]
pub struct ProposalEngine {
    ledger: Arc<dyn Ledger>,
    config: ClientConfig,
    registry: MultisigRegistry,
}

impl ProposalEngine {
    pub fn new(ledger: Arc<dyn Ledger>, config: ClientConfig) -> Self {
        let registry = MultisigRegistry::new(ledger.clone(), config.clone());
        Self {
            ledger,
            config,
            registry,
        }
    }

    /// Open a proposal against `group`, signed and paid for by `proposer`
    ///
    /// The proposal index is read fresh from the group record on every
    /// attempt; losing a race for an index rebuilds and resubmits, bounded
    /// by the retry policy.
    pub async fn create_proposal(
        &self,
        group: &MultisigGroup,
        proposer: &dyn Signer,
        description: &str,
        instructions: Vec<Instruction>,
    ) -> Result<Proposal, MultisigError> {
        let proposer_id = proposer.public_identity();
        if !group.is_owner(&proposer_id) {
            return Err(MultisigError::NotAnOwner(proposer_id));
        }
        validate_bundle(group, &instructions)?;

        let attempts = self.config.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            let record = self.registry.group_record(&group.group_id).await?;
            if !record.group.is_owner(&proposer_id) {
                return Err(MultisigError::NotAnOwner(proposer_id));
            }

            let proposal = ProposalRecord::new(
                &group.group_id,
                record.proposal_count,
                &proposer_id,
                description,
                instructions.clone(),
            );
            let proposal_id = proposal.proposal_id.clone();
            let tx = Transaction::new(&proposer_id, vec![Instruction::CreateProposal { proposal }])
                .sign(&[proposer])?;

            let (signature, outcome) =
                submit_and_confirm(self.ledger.as_ref(), &self.config, &tx).await?;
            match outcome {
                Outcome::Confirmed => {
                    let created = self.get_proposal(&proposal_id).await?;
                    if created.instructions != instructions {
                        return Err(MultisigError::InvalidRecord(format!(
                            "proposal {} does not hold the submitted instructions",
                            proposal_id
                        )));
                    }
                    log::info!(
                        "Proposal #{} {} opened on group {} by {} ({})",
                        created.index,
                        short(&proposal_id),
                        short(&group.group_id),
                        short(&proposer_id),
                        short(&signature)
                    );
                    return Ok(created);
                }
                Outcome::Conflict(detail) => {
                    log::warn!(
                        "Proposal creation conflicted ({}), attempt {}/{}",
                        detail,
                        attempt,
                        attempts
                    );
                }
                Outcome::Rejected(detail) => return Err(MultisigError::LedgerRejected(detail)),
            }
        }

        Err(MultisigError::LedgerTransient(format!(
            "proposal creation kept conflicting after {} attempts",
            attempts
        )))
    }

    /// Current proposal state, re-read from the ledger
    pub async fn get_proposal(&self, proposal_id: &str) -> Result<Proposal, MultisigError> {
        let (_, proposal) = self.load(proposal_id).await?;
        Ok(proposal)
    }

    /// Every proposal of a group, in creation order
    pub async fn list_proposals_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<Proposal>, MultisigError> {
        let record = self.registry.group_record(group_id).await?;
        let mut proposals = Vec::with_capacity(record.proposal_count as usize);
        for index in 0..record.proposal_count {
            proposals.push(self.get_proposal(&proposal_id(group_id, index)).await?);
        }
        Ok(proposals)
    }

    /// Proposal together with its group, both fresh from the ledger
    pub(crate) async fn load(
        &self,
        proposal_id: &str,
    ) -> Result<(MultisigGroup, Proposal), MultisigError> {
        let record: ProposalRecord = fetch_record(self.ledger.as_ref(), &self.config, proposal_id)
            .await?
            .ok_or_else(|| MultisigError::NotFound(format!("proposal {}", proposal_id)))?;
        if record.proposal_id != proposal_id {
            return Err(MultisigError::InvalidRecord(format!(
                "account {} holds proposal {}",
                proposal_id, record.proposal_id
            )));
        }

        let GroupRecord { group, .. } = self.registry.group_record(&record.group_id).await?;
        let votes = self.load_votes(&group, &record).await?;
        log::debug!(
            "Loaded proposal {} with {} vote(s)",
            short(proposal_id),
            votes.len()
        );

        Ok((group.clone(), Proposal::assemble(&group, record, votes)))
    }

    /// Read every owner's vote record and verify its signature
    async fn load_votes(
        &self,
        group: &MultisigGroup,
        record: &ProposalRecord,
    ) -> Result<BTreeMap<String, Decision>, MultisigError> {
        let mut votes = BTreeMap::new();
        for owner in &group.owners {
            let address = vote_record_address(&record.proposal_id, owner);
            let Some(vote) =
                fetch_record::<VoteRecord>(self.ledger.as_ref(), &self.config, &address).await?
            else {
                continue;
            };

            if vote.proposal_id != record.proposal_id
                || &vote.voter != owner
                || !vote.verify(&record.instructions)
            {
                return Err(MultisigError::InvalidRecord(format!(
                    "vote record {} does not carry a valid signature from {}",
                    address, owner
                )));
            }
            votes.insert(vote.voter, vote.decision);
        }
        Ok(votes)
    }
}
