//! Confirmation waiting and transient-error retry
//!
//! Submission returns immediately with a signature. Waiting for the
//! ledger to process it lives here, separate from the business logic,
//! together with the bounded exponential backoff used for transient
//! ledger errors.

use super::{Ledger, LedgerError, TxFailure, TxStatus};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Bounded exponential backoff for transient ledger errors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// How long and how often to poll for confirmation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            poll_interval_ms: 200,
        }
    }
}

/// Final answer of a confirmation wait
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Confirmed,
    Failed(TxFailure),
    /// Outcome unknown: re-query before retrying anything
    TimedOut,
}

/// Run `f`, retrying transient errors with exponential backoff
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Err(LedgerError::Transient(reason)) if attempt + 1 < policy.attempts() => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "{} failed transiently ({}), retry {}/{} in {:?}",
                    operation,
                    reason,
                    attempt + 1,
                    policy.attempts() - 1,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Poll the ledger until `signature` is confirmed, failed, or the timeout hits
pub async fn await_confirmation<L: Ledger + ?Sized>(
    ledger: &L,
    signature: &str,
    config: &ConfirmationConfig,
    retry: &RetryPolicy,
) -> Result<Confirmation, LedgerError> {
    let deadline = Instant::now() + Duration::from_millis(config.timeout_ms);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    loop {
        let status = with_retry(retry, "get_status", move || ledger.get_status(signature)).await?;
        match status {
            TxStatus::Confirmed => return Ok(Confirmation::Confirmed),
            TxStatus::Failed(failure) => return Ok(Confirmation::Failed(failure)),
            TxStatus::Pending => {
                log::debug!("Transaction {} still pending", super::short(signature));
            }
        }

        if Instant::now() >= deadline {
            log::warn!(
                "Gave up waiting for {} after {}ms",
                super::short(signature),
                config.timeout_ms
            );
            return Ok(Confirmation::TimedOut);
        }
        sleep(poll_interval).await;
    }
}
