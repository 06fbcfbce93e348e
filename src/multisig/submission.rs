//! Ledger round-trips shared by the multisig components

use crate::config::ClientConfig;
use crate::ledger::{
    await_confirmation, short, with_retry, Confirmation, FailureKind, Ledger, SignedTransaction,
};
use crate::multisig::error::MultisigError;
use crate::multisig::records::decode;
use serde::de::DeserializeOwned;

/// What the ledger did with a submitted transaction
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Confirmed,
    /// Lost a serialization race; rebuild from fresh state and resubmit
    Conflict(String),
    Rejected(String),
}

/// Submit a transaction and wait for its outcome
///
/// Transient submission errors are retried; a confirmation timeout is
/// surfaced as `OutcomeUnknown` because the transaction may still land.
pub(crate) async fn submit_and_confirm(
    ledger: &dyn Ledger,
    config: &ClientConfig,
    tx: &SignedTransaction,
) -> Result<(String, Outcome), MultisigError> {
    let signature = with_retry(&config.retry, "submit", || ledger.submit(tx)).await?;
    log::debug!(
        "Submitted {} instruction(s) as {}",
        tx.transaction.instructions.len(),
        short(&signature)
    );

    let outcome =
        match await_confirmation(ledger, &signature, &config.confirmation, &config.retry).await? {
            Confirmation::Confirmed => Outcome::Confirmed,
            Confirmation::Failed(failure) => match failure.kind {
                FailureKind::Conflict => Outcome::Conflict(failure.detail),
                FailureKind::Rejected => Outcome::Rejected(failure.detail),
            },
            Confirmation::TimedOut => return Err(MultisigError::OutcomeUnknown(signature)),
        };

    Ok((signature, outcome))
}

/// Read and decode the record stored at `address`
pub(crate) async fn fetch_record<T: DeserializeOwned>(
    ledger: &dyn Ledger,
    config: &ClientConfig,
    address: &str,
) -> Result<Option<T>, MultisigError> {
    let data = with_retry(&config.retry, "get_account_record", || {
        ledger.get_account_record(address)
    })
    .await?;

    match data {
        Some(bytes) => Ok(Some(decode(address, &bytes)?)),
        None => Ok(None),
    }
}
