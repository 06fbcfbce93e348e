//! Errors surfaced by the multisig workflow

use crate::crypto::KeyError;
use crate::ledger::{LedgerError, TransactionError};
use crate::multisig::proposal::{Decision, ProposalState};
use thiserror::Error;

/// Errors related to multisig operations
#[derive(Error, Debug)]
pub enum MultisigError {
    #[error("Invalid threshold {threshold} for {owners} owner(s): need 1 <= threshold <= owners")]
    InvalidThreshold { threshold: u8, owners: usize },
    #[error("Owner is not a valid public key: {0}")]
    InvalidOwner(String),
    #[error("Duplicate owner: {0}")]
    DuplicateOwner(String),
    #[error("Not an owner of the multisig group: {0}")]
    NotAnOwner(String),
    #[error("Proposal must contain at least one instruction")]
    EmptyInstructionSet,
    #[error("Unsupported proposal instruction: {0}")]
    UnsupportedInstruction(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Proposal {proposal_id} is already {state}")]
    ProposalAlreadyTerminal {
        proposal_id: String,
        state: ProposalState,
    },
    #[error("Voting on proposal {0} is closed: threshold already reached")]
    VotingClosed(String),
    #[error("Signer {voter} already voted {existing} on this proposal")]
    DuplicateVote { voter: String, existing: Decision },
    #[error("Proposal is not executable (state: {0})")]
    NotExecutable(ProposalState),
    #[error("Proposal already executed in transaction {0}")]
    AlreadyExecuted(String),
    #[error("Transient ledger error: {0}")]
    LedgerTransient(String),
    #[error("Ledger rejected the transaction: {0}")]
    LedgerRejected(String),
    #[error("Outcome of transaction {0} is unknown; re-query before retrying")]
    OutcomeUnknown(String),
    #[error("Group lookup unavailable: {0}")]
    LookupUnavailable(String),
    #[error("Invalid ledger record: {0}")]
    InvalidRecord(String),
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

impl MultisigError {
    /// Only transient ledger errors are worth retrying unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, MultisigError::LedgerTransient(_))
    }
}

impl From<LedgerError> for MultisigError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Transient(reason) => MultisigError::LedgerTransient(reason),
            LedgerError::Rejected(reason) => MultisigError::LedgerRejected(reason),
            LedgerError::NotFound(what) => MultisigError::NotFound(what),
            LedgerError::Unsupported(what) => MultisigError::LookupUnavailable(what),
        }
    }
}
