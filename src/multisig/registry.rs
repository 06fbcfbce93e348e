//! Multisig registry
//!
//! Creates groups on the ledger and looks them up again.

use crate::config::ClientConfig;
use crate::crypto::{canonical_public_key_hex, Signer};
use crate::ledger::{short, with_retry, Instruction, Ledger, LedgerError, RecordKind, Transaction};
use crate::multisig::error::MultisigError;
use crate::multisig::group::MultisigGroup;
use crate::multisig::records::{decode, GroupRecord};
use crate::multisig::submission::{fetch_record, submit_and_confirm, Outcome};
use std::sync::Arc;

/// Result of looking up the groups an identity owns
#[derive(Clone, Debug, PartialEq)]
pub enum GroupLookup {
    /// Groups containing the identity, oldest first
    Found(Vec<MultisigGroup>),
    NotFound,
    /// The ledger cannot answer; not the same as "no group"
    Unknown(String),
}

/// Selection policy reusing a group with exactly these owners and threshold
pub fn exact_match(
    owners: Vec<String>,
    threshold: u8,
) -> impl FnOnce(&[MultisigGroup]) -> Option<MultisigGroup> {
    move |groups| {
        groups
            .iter()
            .find(|g| g.matches(&owners, threshold))
            .cloned()
    }
}

#[derive(Clone)]
pub struct MultisigRegistry {
    ledger: Arc<dyn Ledger>,
    config: ClientConfig,
}

impl MultisigRegistry {
    pub fn new(ledger: Arc<dyn Ledger>, config: ClientConfig) -> Self {
        Self { ledger, config }
    }

    /// Create a group with a random nonce, paid for by `creator`
    pub async fn create_group(
        &self,
        creator: &dyn Signer,
        owners: Vec<String>,
        threshold: u8,
    ) -> Result<MultisigGroup, MultisigError> {
        self.create_group_with_nonce(creator, owners, threshold, rand::random(), None)
            .await
    }

    /// Create a group with an explicit nonce and optional label
    ///
    /// # Errors
    /// `InvalidThreshold` / `DuplicateOwner` before anything is submitted;
    /// `LedgerRejected` if the group account is already taken.
    pub async fn create_group_with_nonce(
        &self,
        creator: &dyn Signer,
        owners: Vec<String>,
        threshold: u8,
        nonce: u64,
        label: Option<String>,
    ) -> Result<MultisigGroup, MultisigError> {
        let group = MultisigGroup::new(owners, threshold, nonce, label)?;
        let group_id = group.group_id.clone();

        let creator_id = creator.public_identity();
        let tx = Transaction::new(&creator_id, vec![Instruction::CreateGroup { group }])
            .sign(&[creator])?;

        let (signature, outcome) =
            submit_and_confirm(self.ledger.as_ref(), &self.config, &tx).await?;
        match outcome {
            Outcome::Confirmed => {}
            Outcome::Conflict(detail) | Outcome::Rejected(detail) => {
                return Err(MultisigError::LedgerRejected(detail))
            }
        }

        let created = self.get_group(&group_id).await?;
        log::info!(
            "Created {} multisig group {} with wallet {} ({})",
            created.description(),
            short(&group_id),
            created.wallet_address,
            short(&signature)
        );
        Ok(created)
    }

    /// Read a group from the ledger
    pub async fn get_group(&self, group_id: &str) -> Result<MultisigGroup, MultisigError> {
        Ok(self.group_record(group_id).await?.group)
    }

    /// Read a group together with its proposal counter
    pub async fn group_record(&self, group_id: &str) -> Result<GroupRecord, MultisigError> {
        let record: GroupRecord = fetch_record(self.ledger.as_ref(), &self.config, group_id)
            .await?
            .ok_or_else(|| MultisigError::NotFound(format!("group {}", group_id)))?;

        if record.group.group_id != group_id {
            return Err(MultisigError::InvalidRecord(format!(
                "account {} holds group {}",
                group_id, record.group.group_id
            )));
        }
        record.group.verify()?;
        Ok(record)
    }

    /// Every group `identity` is an owner of
    pub async fn find_group(&self, identity: &str) -> Result<GroupLookup, MultisigError> {
        let scanned = with_retry(&self.config.retry, "scan_records", || {
            self.ledger.scan_records(RecordKind::Group)
        })
        .await;

        let records = match scanned {
            Ok(records) => records,
            Err(LedgerError::Unsupported(what)) | Err(LedgerError::Transient(what)) => {
                log::warn!("Group lookup unavailable: {}", what);
                return Ok(GroupLookup::Unknown(what));
            }
            Err(e) => return Err(e.into()),
        };

        // Owners are stored canonical; anything unparsable owns nothing
        let identity = canonical_public_key_hex(identity).unwrap_or_else(|_| identity.to_string());
        let mut groups = Vec::new();
        for (address, data) in records {
            let record: GroupRecord = decode(&address, &data)?;
            if record.group.is_owner(&identity) {
                groups.push(record.group);
            }
        }
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        log::debug!("{} group(s) found for {}", groups.len(), short(&identity));
        if groups.is_empty() {
            Ok(GroupLookup::NotFound)
        } else {
            Ok(GroupLookup::Found(groups))
        }
    }

    /// Reuse a group chosen by `policy` among the creator's groups, or
    /// create a new one
    ///
    /// An unanswerable lookup is `LookupUnavailable`; nothing is created
    /// in that case.
    pub async fn select_existing_or_create<F>(
        &self,
        creator: &dyn Signer,
        owners: Vec<String>,
        threshold: u8,
        policy: F,
    ) -> Result<MultisigGroup, MultisigError>
    where
        F: FnOnce(&[MultisigGroup]) -> Option<MultisigGroup>,
    {
        MultisigGroup::validate_params(&owners, threshold)?;

        let existing = match self.find_group(&creator.public_identity()).await? {
            GroupLookup::Found(groups) => policy(&groups),
            GroupLookup::NotFound => None,
            GroupLookup::Unknown(reason) => return Err(MultisigError::LookupUnavailable(reason)),
        };

        match existing {
            Some(group) => {
                log::info!(
                    "Reusing {} multisig group {}",
                    group.description(),
                    short(&group.group_id)
                );
                Ok(group)
            }
            None => self.create_group(creator, owners, threshold).await,
        }
    }
}
