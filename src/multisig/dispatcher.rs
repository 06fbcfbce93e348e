//! Execution dispatcher
//!
//! Submits a fully approved proposal's instruction bundle to the ledger,
//! authorized by the group wallet. At most one execution can succeed per
//! proposal: the ledger program refuses a second one and the recorded
//! execution signature is the single "already executed" marker.

use crate::config::ClientConfig;
use crate::crypto::Signer;
use crate::ledger::{short, Instruction, Ledger, Transaction};
use crate::multisig::error::MultisigError;
use crate::multisig::proposal::{Proposal, ProposalEngine, ProposalState};
use crate::multisig::submission::{submit_and_confirm, Outcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of a successful execution
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    /// Ledger signature of the execution transaction
    pub signature: String,
    /// Proposal as re-read after execution, in `Executed` state
    pub proposal: Proposal,
}

#[derive(Clone)]
pub struct ExecutionDispatcher {
    ledger: Arc<dyn Ledger>,
    config: ClientConfig,
    engine: ProposalEngine,
}

impl ExecutionDispatcher {
    pub fn new(ledger: Arc<dyn Ledger>, config: ClientConfig) -> Self {
        let engine = ProposalEngine::new(ledger.clone(), config.clone());
        Self {
            ledger,
            config,
            engine,
        }
    }

    /// Execute an `Executable` proposal, signed and paid for by `executor`
    ///
    /// # Errors
    /// `AlreadyExecuted` if an execution already landed, `NotExecutable`
    /// for any other non-executable state, `LedgerRejected` if the ledger
    /// failed the bundle (the proposal is then `Failed`), `OutcomeUnknown`
    /// if confirmation timed out.
    pub async fn execute(
        &self,
        proposal_id: &str,
        executor: &dyn Signer,
    ) -> Result<ExecutionResult, MultisigError> {
        let executor_id = executor.public_identity();
        let (group, proposal) = self.engine.load(proposal_id).await?;

        if let Some(signature) = proposal.execution_signature {
            return Err(MultisigError::AlreadyExecuted(signature));
        }
        if proposal.state != ProposalState::Executable {
            return Err(MultisigError::NotExecutable(proposal.state));
        }
        if !group.is_owner(&executor_id) {
            return Err(MultisigError::NotAnOwner(executor_id));
        }

        let tx = Transaction::new(
            &executor_id,
            vec![Instruction::ExecuteProposal {
                proposal_id: proposal_id.to_string(),
                executor: executor_id.clone(),
            }],
        )
        .sign(&[executor])?;

        let (signature, outcome) =
            submit_and_confirm(self.ledger.as_ref(), &self.config, &tx).await?;

        let proposal = self.engine.get_proposal(proposal_id).await?;
        match outcome {
            Outcome::Confirmed => {
                log::info!(
                    "Executed proposal {} of group {} ({} instruction(s), {})",
                    short(proposal_id),
                    short(&group.group_id),
                    proposal.instructions.len(),
                    short(&signature)
                );
                Ok(ExecutionResult {
                    signature,
                    proposal,
                })
            }
            Outcome::Conflict(detail) | Outcome::Rejected(detail) => {
                // Lost to a concurrent executor
                if let Some(existing) = proposal.execution_signature {
                    return Err(MultisigError::AlreadyExecuted(existing));
                }
                log::error!(
                    "Execution of proposal {} failed: {}",
                    short(proposal_id),
                    detail
                );
                Err(MultisigError::LedgerRejected(detail))
            }
        }
    }
}
