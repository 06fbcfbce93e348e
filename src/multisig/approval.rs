//! Approval state machine
//!
//! Votes are tallied against the group threshold:
//!
//! ```text
//!   Draft --approve (count < M)--> Draft
//!   Draft --approve (count = M)--> Executable --execute--> Executed | Failed
//!   Draft --reject-------------->  Rejected
//! ```
//!
//! A single reject is final. Each owner votes at most once.

use crate::config::ClientConfig;
use crate::crypto::Signer;
use crate::ledger::{short, Instruction, Ledger, Transaction};
use crate::multisig::error::MultisigError;
use crate::multisig::group::MultisigGroup;
use crate::multisig::proposal::{Decision, Proposal, ProposalEngine, ProposalState};
use crate::multisig::records::{ExecutionStatus, ProposalRecord, VoteRecord};
use crate::multisig::submission::{fetch_record, submit_and_confirm, Outcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Vote counts for one proposal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub approvals: usize,
    pub rejections: usize,
}

/// Count the votes cast so far
pub fn tally(votes: &BTreeMap<String, Decision>) -> Tally {
    votes.values().fold(Tally::default(), |mut t, d| {
        match d {
            Decision::Approve => t.approvals += 1,
            Decision::Reject => t.rejections += 1,
        }
        t
    })
}

/// State implied by the votes alone
pub fn voting_state(threshold: u8, votes: &BTreeMap<String, Decision>) -> ProposalState {
    let t = tally(votes);
    if t.rejections > 0 {
        ProposalState::Rejected
    } else if t.approvals >= threshold as usize {
        ProposalState::Executable
    } else {
        ProposalState::Draft
    }
}

/// State of a proposal; a recorded execution outcome overrides the votes
pub fn derive_state(
    threshold: u8,
    votes: &BTreeMap<String, Decision>,
    status: &ExecutionStatus,
) -> ProposalState {
    match status {
        ExecutionStatus::Executed { .. } => ProposalState::Executed,
        ExecutionStatus::Failed { .. } => ProposalState::Failed,
        ExecutionStatus::Pending => voting_state(threshold, votes),
    }
}

/// Check whether `voter` may cast a vote right now
///
/// Shared by the client and the ledger program so both reject the same
/// votes for the same reasons.
pub fn check_vote(
    group: &MultisigGroup,
    proposal_id: &str,
    state: ProposalState,
    votes: &BTreeMap<String, Decision>,
    voter: &str,
) -> Result<(), MultisigError> {
    if !group.is_owner(voter) {
        return Err(MultisigError::NotAnOwner(voter.to_string()));
    }
    if state.is_terminal() {
        return Err(MultisigError::ProposalAlreadyTerminal {
            proposal_id: proposal_id.to_string(),
            state,
        });
    }
    if let Some(existing) = votes.get(voter) {
        return Err(MultisigError::DuplicateVote {
            voter: voter.to_string(),
            existing: *existing,
        });
    }
    if state == ProposalState::Executable {
        return Err(MultisigError::VotingClosed(proposal_id.to_string()));
    }
    Ok(())
}

/// Outcome of a recorded vote
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoteResult {
    /// Ledger signature of the vote transaction
    pub signature: String,
    pub decision: Decision,
    /// Proposal as re-read after the vote landed
    pub proposal: Proposal,
}

/// Records owner votes and advances proposal state
#[derive(Clone)]
pub struct ApprovalMachine {
    ledger: Arc<dyn Ledger>,
    config: ClientConfig,
    engine: ProposalEngine,
}

impl ApprovalMachine {
    pub fn new(ledger: Arc<dyn Ledger>, config: ClientConfig) -> Self {
        let engine = ProposalEngine::new(ledger.clone(), config.clone());
        Self {
            ledger,
            config,
            engine,
        }
    }

    pub async fn approve(
        &self,
        proposal_id: &str,
        voter: &dyn Signer,
    ) -> Result<VoteResult, MultisigError> {
        self.vote(proposal_id, voter, Decision::Approve).await
    }

    pub async fn reject(
        &self,
        proposal_id: &str,
        voter: &dyn Signer,
    ) -> Result<VoteResult, MultisigError> {
        self.vote(proposal_id, voter, Decision::Reject).await
    }

    /// Record `voter`'s decision on a proposal
    pub async fn vote(
        &self,
        proposal_id: &str,
        voter: &dyn Signer,
        decision: Decision,
    ) -> Result<VoteResult, MultisigError> {
        let voter_id = voter.public_identity();
        let (group, proposal) = self.engine.load(proposal_id).await?;
        check_vote(
            &group,
            proposal_id,
            proposal.state,
            &proposal.votes,
            &voter_id,
        )?;

        let record: ProposalRecord = fetch_record(self.ledger.as_ref(), &self.config, proposal_id)
            .await?
            .ok_or_else(|| MultisigError::NotFound(format!("proposal {}", proposal_id)))?;
        let vote = VoteRecord::new_signed(&record, voter, decision)?;
        let tx = Transaction::new(&voter_id, vec![Instruction::CastVote { vote }]).sign(&[voter])?;

        let (signature, outcome) =
            submit_and_confirm(self.ledger.as_ref(), &self.config, &tx).await?;
        match outcome {
            Outcome::Confirmed => {}
            Outcome::Conflict(detail) | Outcome::Rejected(detail) => {
                // Another vote may have landed first; report the state-level reason
                let (group, fresh) = self.engine.load(proposal_id).await?;
                check_vote(&group, proposal_id, fresh.state, &fresh.votes, &voter_id)?;
                return Err(MultisigError::LedgerRejected(detail));
            }
        }

        let proposal = self.engine.get_proposal(proposal_id).await?;
        log::info!(
            "{} voted {} on proposal {} ({}/{} approvals, {})",
            short(&voter_id),
            decision,
            short(proposal_id),
            proposal.approvals(),
            group.threshold,
            proposal.state
        );

        Ok(VoteResult {
            signature,
            decision,
            proposal,
        })
    }
}
