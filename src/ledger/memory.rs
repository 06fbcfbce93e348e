//! In-process ledger
//!
//! Holds accounts in memory and runs the multisig program on every
//! submitted transaction. Submissions are queued and applied in order;
//! `confirmation_lag` controls how many status polls a transaction waits
//! before it lands, which is enough to reproduce stale reads and races.

use super::program::process_transaction;
use super::{Ledger, LedgerError, RecordKind, SignedTransaction, TxStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::Mutex;

/// In-memory ledger settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryLedgerConfig {
    /// Fee charged to the fee payer per signature, also on failure
    pub fee_per_signature: u64,
    /// Status polls a transaction stays pending before it is applied
    pub confirmation_lag: u32,
    /// Whether `scan_records` is available
    pub enable_scan: bool,
}

impl Default for MemoryLedgerConfig {
    fn default() -> Self {
        Self {
            fee_per_signature: 5_000,
            confirmation_lag: 0,
            enable_scan: true,
        }
    }
}

/// Account data with its kind tag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    pub kind: RecordKind,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// A ledger account
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub balance: u64,
    pub record: Option<StoredRecord>,
}

/// Committed ledger state, for persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerSnapshot {
    pub accounts: BTreeMap<String, Account>,
    /// Final status of every processed transaction
    pub statuses: BTreeMap<String, TxStatus>,
}

struct Queued {
    signature: String,
    tx: SignedTransaction,
    remaining: u32,
}

struct LedgerState {
    config: MemoryLedgerConfig,
    accounts: BTreeMap<String, Account>,
    statuses: HashMap<String, TxStatus>,
    queue: VecDeque<Queued>,
    transient_failures: u32,
}

impl LedgerState {
    /// Advance the queue by one poll
    fn tick(&mut self) {
        while self.queue.front().map_or(false, |q| q.remaining == 0) {
            if let Some(queued) = self.queue.pop_front() {
                self.apply(queued);
            }
        }
        for queued in self.queue.iter_mut() {
            queued.remaining = queued.remaining.saturating_sub(1);
        }
    }

    /// Apply everything still queued
    fn settle(&mut self) {
        while let Some(queued) = self.queue.pop_front() {
            self.apply(queued);
        }
    }

    fn apply(&mut self, queued: Queued) {
        let fee = self
            .config
            .fee_per_signature
            .saturating_mul(queued.tx.signatures.len() as u64);

        let status = match process_transaction(&mut self.accounts, &queued.tx, &queued.signature, fee)
        {
            Ok(()) => {
                log::debug!("Applied transaction {}", super::short(&queued.signature));
                TxStatus::Confirmed
            }
            Err(failure) => {
                log::debug!(
                    "Transaction {} failed: {}",
                    super::short(&queued.signature),
                    failure
                );
                TxStatus::Failed(failure)
            }
        };
        self.statuses.insert(queued.signature, status);
    }
}

/// Ledger living entirely in process memory
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(config: MemoryLedgerConfig) -> Self {
        Self::from_snapshot(LedgerSnapshot::default(), config)
    }

    /// Restore a ledger from persisted state
    pub fn from_snapshot(snapshot: LedgerSnapshot, config: MemoryLedgerConfig) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                config,
                accounts: snapshot.accounts,
                statuses: snapshot.statuses.into_iter().collect(),
                queue: VecDeque::new(),
                transient_failures: 0,
            }),
        }
    }

    /// Committed state after applying everything still queued
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let mut state = self.state.lock().await;
        state.settle();
        LedgerSnapshot {
            accounts: state.accounts.clone(),
            statuses: state
                .statuses
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Mint funds into an account (local ledgers only)
    pub async fn airdrop(&self, address: &str, amount: u64) {
        let mut state = self.state.lock().await;
        let account = state.accounts.entry(address.to_string()).or_default();
        account.balance = account.balance.saturating_add(amount);
        log::info!("Airdropped {} to {}", amount, address);
    }

    /// Make the next `count` submissions fail transiently
    pub async fn inject_transient_failures(&self, count: u32) {
        self.state.lock().await.transient_failures = count;
    }

    pub async fn set_confirmation_lag(&self, lag: u32) {
        self.state.lock().await.config.confirmation_lag = lag;
    }

    /// Number of transactions waiting to be applied
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Overwrite account data, bypassing the program
    #[cfg(test)]
    pub(crate) async fn write_record(&self, address: &str, kind: RecordKind, data: Vec<u8>) {
        let mut state = self.state.lock().await;
        state.accounts.entry(address.to_string()).or_default().record =
            Some(StoredRecord { kind, data });
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit(&self, tx: &SignedTransaction) -> Result<String, LedgerError> {
        let mut state = self.state.lock().await;

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(LedgerError::Transient("ledger temporarily unavailable".to_string()));
        }

        if tx.transaction.instructions.is_empty() {
            return Err(LedgerError::Rejected("transaction has no instructions".to_string()));
        }
        tx.verify()
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let signature = tx.signature().to_string();
        if state.statuses.contains_key(&signature) {
            return Ok(signature);
        }

        state.statuses.insert(signature.clone(), TxStatus::Pending);
        let remaining = state.config.confirmation_lag;
        state.queue.push_back(Queued {
            signature: signature.clone(),
            tx: tx.clone(),
            remaining,
        });
        Ok(signature)
    }

    async fn get_status(&self, signature: &str) -> Result<TxStatus, LedgerError> {
        let mut state = self.state.lock().await;
        state.tick();
        state
            .statuses
            .get(signature)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", signature)))
    }

    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.accounts.get(address).map_or(0, |a| a.balance))
    }

    async fn get_account_record(&self, address: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .get(address)
            .and_then(|a| a.record.as_ref())
            .map(|r| r.data.clone()))
    }

    async fn scan_records(&self, kind: RecordKind) -> Result<Vec<(String, Vec<u8>)>, LedgerError> {
        let state = self.state.lock().await;
        if !state.config.enable_scan {
            return Err(LedgerError::Unsupported(format!("scan_records({:?})", kind)));
        }
        Ok(state
            .accounts
            .iter()
            .filter_map(|(address, account)| match &account.record {
                Some(r) if r.kind == kind => Some((address.clone(), r.data.clone())),
                _ => None,
            })
            .collect())
    }
}

/// Account data as a hex string in snapshots
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
