//! Ledger-side multisig program
//!
//! Applies a transaction's instructions to the account map. Everything the
//! client checks is checked again here; the client's checks only save a
//! round trip.
//!
//! A transaction either commits all of its instructions or none of them.
//! The fee is charged in both cases.

use super::{Account, Instruction, RecordKind, SignedTransaction, StoredRecord, TxFailure};
use crate::crypto::{address_from_public_key_hex, is_canonical_public_key_hex};
use crate::multisig::approval::{check_vote, derive_state};
use crate::multisig::error::MultisigError;
use crate::multisig::group::MultisigGroup;
use crate::multisig::proposal::{validate_bundle, Decision, ProposalState};
use crate::multisig::records::{
    decode, encode, proposal_id, vote_record_address, ExecutionStatus, GroupRecord,
    ProposalRecord, VoteRecord,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

type Accounts = BTreeMap<String, Account>;

#[derive(Error, Debug)]
enum ProgramError {
    /// Stale read on the client side; rebuilding from fresh state may succeed
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Rejected(String),
    /// A proposal's bundled instructions failed
    #[error("execution of proposal {proposal_id} failed: {detail}")]
    Execution { proposal_id: String, detail: String },
}

impl From<MultisigError> for ProgramError {
    fn from(e: MultisigError) -> Self {
        ProgramError::Rejected(e.to_string())
    }
}

impl From<ProgramError> for TxFailure {
    fn from(e: ProgramError) -> Self {
        match e {
            ProgramError::Conflict(detail) => TxFailure::conflict(detail),
            other => TxFailure::rejected(other.to_string()),
        }
    }
}

/// Who signed the transaction being processed
struct Signers<'a> {
    signature: &'a str,
    identities: Vec<&'a str>,
    addresses: Vec<String>,
}

impl Signers<'_> {
    fn require(&self, identity: &str) -> Result<(), ProgramError> {
        if self.identities.iter().any(|s| *s == identity) {
            Ok(())
        } else {
            Err(ProgramError::Rejected(format!(
                "missing signature from {}",
                identity
            )))
        }
    }
}

/// Process one transaction against `accounts`
pub fn process_transaction(
    accounts: &mut Accounts,
    tx: &SignedTransaction,
    signature: &str,
    fee: u64,
) -> Result<(), TxFailure> {
    // Identities are compared as strings from here on
    if let Some(entry) = tx
        .signatures
        .iter()
        .find(|s| !is_canonical_public_key_hex(&s.signer))
    {
        return Err(TxFailure::rejected(format!(
            "signer {} is not a canonical public key",
            entry.signer
        )));
    }

    let payer = address_from_public_key_hex(&tx.transaction.fee_payer)
        .map_err(|e| TxFailure::rejected(format!("invalid fee payer: {}", e)))?;
    debit(accounts, &payer, fee)
        .map_err(|e| TxFailure::rejected(format!("cannot pay fee: {}", e)))?;

    let signers = Signers {
        signature,
        identities: tx.signatures.iter().map(|s| s.signer.as_str()).collect(),
        addresses: tx
            .signer_addresses()
            .map_err(|e| TxFailure::rejected(e.to_string()))?,
    };

    let mut scratch = accounts.clone();
    for instruction in &tx.transaction.instructions {
        match apply(&mut scratch, instruction, &signers) {
            Ok(()) => {}
            Err(ProgramError::Execution {
                proposal_id,
                detail,
            }) => {
                // Keep the fee, drop everything else, remember the failure
                mark_failed(accounts, &proposal_id, &detail)?;
                return Err(TxFailure::rejected(detail));
            }
            Err(e) => return Err(e.into()),
        }
    }

    *accounts = scratch;
    Ok(())
}

fn apply(
    accounts: &mut Accounts,
    instruction: &Instruction,
    signers: &Signers,
) -> Result<(), ProgramError> {
    match instruction {
        Instruction::Transfer { from, to, amount } => {
            if !signers.addresses.contains(from) {
                return Err(ProgramError::Rejected(format!(
                    "transfer from {} is not authorized",
                    from
                )));
            }
            transfer(accounts, from, to, *amount).map_err(ProgramError::Rejected)
        }
        Instruction::Memo { .. } => Ok(()),
        Instruction::CreateGroup { group } => create_group(accounts, group),
        Instruction::CreateProposal { proposal } => create_proposal(accounts, proposal, signers),
        Instruction::CastVote { vote } => cast_vote(accounts, vote, signers),
        Instruction::ExecuteProposal {
            proposal_id,
            executor,
        } => execute_proposal(accounts, proposal_id, executor, signers),
    }
}

fn create_group(accounts: &mut Accounts, group: &MultisigGroup) -> Result<(), ProgramError> {
    group.verify()?;
    if has_record(accounts, &group.group_id) {
        return Err(ProgramError::Rejected(format!(
            "account {} already in use",
            group.group_id
        )));
    }

    write_record(
        accounts,
        &group.group_id,
        RecordKind::Group,
        &GroupRecord {
            group: group.clone(),
            proposal_count: 0,
        },
    )?;
    accounts.entry(group.wallet_address.clone()).or_default();
    Ok(())
}

fn create_proposal(
    accounts: &mut Accounts,
    proposal: &ProposalRecord,
    signers: &Signers,
) -> Result<(), ProgramError> {
    signers.require(&proposal.proposer)?;

    let mut group_record = load_group(accounts, &proposal.group_id)?;
    let group = &group_record.group;
    if !group.is_owner(&proposal.proposer) {
        return Err(MultisigError::NotAnOwner(proposal.proposer.clone()).into());
    }
    validate_bundle(group, &proposal.instructions)?;

    if proposal.index != group_record.proposal_count {
        return Err(ProgramError::Conflict(format!(
            "proposal index {} is stale, next index is {}",
            proposal.index, group_record.proposal_count
        )));
    }
    if proposal.proposal_id != proposal_id(&proposal.group_id, proposal.index) {
        return Err(ProgramError::Rejected(format!(
            "proposal id {} does not match its group and index",
            proposal.proposal_id
        )));
    }
    if proposal.status != ExecutionStatus::Pending {
        return Err(ProgramError::Rejected(
            "new proposals must be pending".to_string(),
        ));
    }
    if has_record(accounts, &proposal.proposal_id) {
        return Err(ProgramError::Conflict(format!(
            "account {} already in use",
            proposal.proposal_id
        )));
    }

    write_record(accounts, &proposal.proposal_id, RecordKind::Proposal, proposal)?;
    group_record.proposal_count += 1;
    let group_id = group_record.group.group_id.clone();
    write_record(accounts, &group_id, RecordKind::Group, &group_record)
}

fn cast_vote(
    accounts: &mut Accounts,
    vote: &VoteRecord,
    signers: &Signers,
) -> Result<(), ProgramError> {
    if !is_canonical_public_key_hex(&vote.voter) {
        return Err(ProgramError::Rejected(format!(
            "voter {} is not a canonical public key",
            vote.voter
        )));
    }
    signers.require(&vote.voter)?;

    let proposal = load_proposal(accounts, &vote.proposal_id)?;
    let group = load_group(accounts, &proposal.group_id)?.group;
    let votes = load_votes(accounts, &group, &proposal.proposal_id)?;
    let state = derive_state(group.threshold, &votes, &proposal.status);

    check_vote(&group, &proposal.proposal_id, state, &votes, &vote.voter)?;
    if !vote.verify(&proposal.instructions) {
        return Err(ProgramError::Rejected(format!(
            "vote signature from {} does not verify",
            vote.voter
        )));
    }

    write_record(accounts, &vote.address(), RecordKind::Vote, vote)
}

fn execute_proposal(
    accounts: &mut Accounts,
    proposal_id: &str,
    executor: &str,
    signers: &Signers,
) -> Result<(), ProgramError> {
    signers.require(executor)?;

    let mut proposal = load_proposal(accounts, proposal_id)?;
    let group = load_group(accounts, &proposal.group_id)?.group;
    if !group.is_owner(executor) {
        return Err(MultisigError::NotAnOwner(executor.to_string()).into());
    }
    if let ExecutionStatus::Executed { signature, .. } = &proposal.status {
        return Err(MultisigError::AlreadyExecuted(signature.clone()).into());
    }
    let votes = load_votes(accounts, &group, proposal_id)?;
    let state = derive_state(group.threshold, &votes, &proposal.status);
    if state != ProposalState::Executable {
        return Err(MultisigError::NotExecutable(state).into());
    }

    let mut inner = accounts.clone();
    let wallet_signers = Signers {
        signature: signers.signature,
        identities: Vec::new(),
        addresses: vec![group.wallet_address.clone()],
    };
    let bundle = validate_bundle(&group, &proposal.instructions).map_err(ProgramError::from);
    let result = bundle.and_then(|()| {
        proposal
            .instructions
            .iter()
            .try_for_each(|ix| apply(&mut inner, ix, &wallet_signers))
    });
    if let Err(e) = result {
        return Err(ProgramError::Execution {
            proposal_id: proposal_id.to_string(),
            detail: e.to_string(),
        });
    }

    *accounts = inner;
    proposal.status = ExecutionStatus::Executed {
        signature: signers.signature.to_string(),
        executed_at: Utc::now(),
    };
    write_record(accounts, proposal_id, RecordKind::Proposal, &proposal)
}

/// Record a failed execution on the committed state
fn mark_failed(accounts: &mut Accounts, proposal_id: &str, detail: &str) -> Result<(), TxFailure> {
    let mut proposal = load_proposal(accounts, proposal_id).map_err(TxFailure::from)?;
    proposal.status = ExecutionStatus::Failed {
        detail: detail.to_string(),
        failed_at: Utc::now(),
    };
    write_record(accounts, proposal_id, RecordKind::Proposal, &proposal).map_err(TxFailure::from)
}

fn load_group(accounts: &Accounts, group_id: &str) -> Result<GroupRecord, ProgramError> {
    read_record(accounts, group_id, RecordKind::Group)?
        .ok_or_else(|| ProgramError::Rejected(format!("group {} not found", group_id)))
}

fn load_proposal(accounts: &Accounts, proposal_id: &str) -> Result<ProposalRecord, ProgramError> {
    read_record(accounts, proposal_id, RecordKind::Proposal)?
        .ok_or_else(|| ProgramError::Rejected(format!("proposal {} not found", proposal_id)))
}

fn load_votes(
    accounts: &Accounts,
    group: &MultisigGroup,
    proposal_id: &str,
) -> Result<BTreeMap<String, Decision>, ProgramError> {
    let mut votes = BTreeMap::new();
    for owner in &group.owners {
        let address = vote_record_address(proposal_id, owner);
        if let Some(vote) = read_record::<VoteRecord>(accounts, &address, RecordKind::Vote)? {
            votes.insert(vote.voter, vote.decision);
        }
    }
    Ok(votes)
}

fn has_record(accounts: &Accounts, address: &str) -> bool {
    accounts.get(address).map_or(false, |a| a.record.is_some())
}

fn read_record<T: DeserializeOwned>(
    accounts: &Accounts,
    address: &str,
    kind: RecordKind,
) -> Result<Option<T>, ProgramError> {
    match accounts.get(address).and_then(|a| a.record.as_ref()) {
        Some(record) if record.kind == kind => Ok(Some(decode(address, &record.data)?)),
        Some(record) => Err(ProgramError::Rejected(format!(
            "account {} holds a {:?} record, expected {:?}",
            address, record.kind, kind
        ))),
        None => Ok(None),
    }
}

fn write_record<T: Serialize>(
    accounts: &mut Accounts,
    address: &str,
    kind: RecordKind,
    record: &T,
) -> Result<(), ProgramError> {
    let data = encode(record)?;
    accounts.entry(address.to_string()).or_default().record = Some(StoredRecord { kind, data });
    Ok(())
}

fn debit(accounts: &mut Accounts, address: &str, amount: u64) -> Result<(), String> {
    let account = accounts
        .get_mut(address)
        .ok_or_else(|| format!("account {} does not exist", address))?;
    account.balance = account.balance.checked_sub(amount).ok_or_else(|| {
        format!(
            "insufficient funds in {}: have {}, need {}",
            address, account.balance, amount
        )
    })?;
    Ok(())
}

fn transfer(accounts: &mut Accounts, from: &str, to: &str, amount: u64) -> Result<(), String> {
    if amount == 0 {
        return Err("transfer amount must be positive".to_string());
    }
    if from == to {
        return Err(format!("cannot transfer from {} to itself", from));
    }
    let receiving = accounts.get(to).map_or(0, |a| a.balance);
    let credited = receiving
        .checked_add(amount)
        .ok_or_else(|| format!("balance overflow in {}", to))?;

    debit(accounts, from, amount)?;
    accounts.entry(to.to_string()).or_default().balance = credited;
    Ok(())
}
