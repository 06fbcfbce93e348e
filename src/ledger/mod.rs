//! Ledger collaborator
//!
//! The multisig workflow never touches balances or account data directly;
//! everything goes through the [`Ledger`] trait:
//! - `submit` hands over a signed transaction and returns its signature
//! - `get_status` reports pending / confirmed / failed
//! - `get_balance` and `get_account_record` read committed state
//! - `scan_records` is an optional query capability
//!
//! [`MemoryLedger`] is a complete in-process implementation with an
//! embedded multisig program, used by the tests and the CLI.

pub mod confirm;
pub mod memory;
pub mod program;
pub mod transaction;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use confirm::{await_confirmation, with_retry, Confirmation, ConfirmationConfig, RetryPolicy};
pub use memory::{Account, LedgerSnapshot, MemoryLedger, MemoryLedgerConfig, StoredRecord};
pub use transaction::{
    Instruction, SignatureEntry, SignedTransaction, Transaction, TransactionError,
};

/// Errors reported by a ledger client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Network hiccup, timeout or overload; safe to retry with backoff
    #[error("Transient ledger error: {0}")]
    Transient(String),
    /// The ledger refused the request (bad signature, malformed transaction)
    #[error("Ledger rejected request: {0}")]
    Rejected(String),
    #[error("Not found on ledger: {0}")]
    NotFound(String),
    /// The ledger does not offer this query capability
    #[error("Unsupported ledger capability: {0}")]
    Unsupported(String),
}

/// Kind tag stored alongside account data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Group,
    Proposal,
    Vote,
}

/// Why a confirmed-as-failed transaction failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    /// Lost a race against another write to the same account
    Conflict,
    /// Validation or execution failure; retrying the same thing will fail again
    Rejected,
}

/// Failure detail reported by the ledger for a processed transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl TxFailure {
    pub fn conflict(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Conflict,
            detail: detail.into(),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Rejected,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for TxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Conflict => write!(f, "conflict: {}", self.detail),
            FailureKind::Rejected => write!(f, "{}", self.detail),
        }
    }
}

/// Processing status of a submitted transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed(TxFailure),
}

/// Client interface to the underlying account-based ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit a signed transaction, returning its signature immediately.
    /// Resubmitting an identical transaction returns the same signature.
    async fn submit(&self, tx: &SignedTransaction) -> Result<String, LedgerError>;

    /// Current processing status of a submitted transaction
    async fn get_status(&self, signature: &str) -> Result<TxStatus, LedgerError>;

    /// Committed balance of an account (0 for unknown accounts)
    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError>;

    /// Committed account data, `None` if the account holds no record
    async fn get_account_record(&self, address: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    /// All records of one kind as `(address, data)` pairs
    async fn scan_records(&self, kind: RecordKind) -> Result<Vec<(String, Vec<u8>)>, LedgerError> {
        Err(LedgerError::Unsupported(format!("scan_records({:?})", kind)))
    }
}

/// Shorten a signature or address for log output
///
/// Cuts after 16 characters, never inside one.
pub fn short(id: &str) -> &str {
    id.char_indices().nth(16).map_or(id, |(end, _)| &id[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short() {
        assert_eq!(short("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"), "3J98t1WpEZ73CNmQ");
        assert_eq!(short("abc"), "abc");
        assert_eq!(short(""), "");
        // Multi-byte characters straddling byte 16
        assert_eq!(short("ключ-владельца-много"), "ключ-владельца-м");
        assert_eq!(short("🔑🔑🔑🔑🔑"), "🔑🔑🔑🔑🔑");
    }
}
