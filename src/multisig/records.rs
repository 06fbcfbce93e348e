//! Ledger-resident records of the multisig workflow
//!
//! Groups, proposals and votes live in ledger accounts as `serde_json`
//! bytes. Every account address is derived from the record's identity,
//! so a proposal's full vote set can be re-read from its group's owner
//! list alone.

use crate::crypto::{derive_address, sha256, sign_hex, verify_hex, Signer};
use crate::ledger::Instruction;
use crate::multisig::error::MultisigError;
use crate::multisig::group::MultisigGroup;
use crate::multisig::proposal::Decision;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Version byte for group ids
pub const GROUP_ID_VERSION: u8 = 0x1c;
/// Version byte for wallet addresses (P2SH-style, '3...')
pub const WALLET_ADDRESS_VERSION: u8 = 0x05;
/// Version byte for proposal ids
pub const PROPOSAL_ID_VERSION: u8 = 0x38;
/// Version byte for vote record addresses
pub const VOTE_RECORD_VERSION: u8 = 0x41;

/// Group id = Base58Check(version || HASH160(threshold || sorted owners || nonce))
pub fn group_id(owners: &[String], threshold: u8, nonce: u64) -> String {
    // Sort public keys so owner order does not matter
    let mut sorted = owners.to_vec();
    sorted.sort();

    let mut data = vec![threshold];
    for owner in &sorted {
        data.extend_from_slice(owner.as_bytes());
    }
    data.extend_from_slice(&nonce.to_le_bytes());

    derive_address(GROUP_ID_VERSION, &data)
}

/// Wallet address controlled by a group
pub fn wallet_address(group_id: &str) -> String {
    derive_address(WALLET_ADDRESS_VERSION, group_id.as_bytes())
}

/// Address of the `index`-th proposal of a group
pub fn proposal_id(group_id: &str, index: u64) -> String {
    let mut data = group_id.as_bytes().to_vec();
    data.extend_from_slice(&index.to_le_bytes());
    derive_address(PROPOSAL_ID_VERSION, &data)
}

/// Address of `voter`'s vote record on a proposal
pub fn vote_record_address(proposal_id: &str, voter: &str) -> String {
    let mut data = proposal_id.as_bytes().to_vec();
    data.push(b':');
    data.extend_from_slice(voter.as_bytes());
    derive_address(VOTE_RECORD_VERSION, &data)
}

/// SHA-256 over the serialized instruction list
pub fn instructions_digest(instructions: &[Instruction]) -> Result<Vec<u8>, serde_json::Error> {
    Ok(sha256(&serde_json::to_vec(instructions)?))
}

/// Serialize a record into account data
pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, MultisigError> {
    serde_json::to_vec(record)
        .map_err(|e| MultisigError::InvalidRecord(format!("cannot encode record: {}", e)))
}

/// Deserialize account data stored at `address`
pub fn decode<T: DeserializeOwned>(address: &str, data: &[u8]) -> Result<T, MultisigError> {
    serde_json::from_slice(data)
        .map_err(|e| MultisigError::InvalidRecord(format!("account {}: {}", address, e)))
}

/// Group account contents
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GroupRecord {
    pub group: MultisigGroup,
    /// Number of proposals created so far; the next proposal gets this index
    pub proposal_count: u64,
}

/// Execution outcome recorded on a proposal
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ExecutionStatus {
    /// Not executed yet; state follows from the votes
    Pending,
    Executed {
        signature: String,
        executed_at: DateTime<Utc>,
    },
    Failed {
        detail: String,
        failed_at: DateTime<Utc>,
    },
}

/// Proposal account contents
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProposalRecord {
    pub proposal_id: String,
    pub group_id: String,
    pub index: u64,
    /// Public key (hex) of the proposing owner
    pub proposer: String,
    pub description: String,
    /// Instructions to run atomically; immutable once created
    pub instructions: Vec<Instruction>,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
}

impl ProposalRecord {
    /// New proposal at `index` of `group_id`
    pub fn new(
        group_id: &str,
        index: u64,
        proposer: &str,
        description: &str,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            proposal_id: proposal_id(group_id, index),
            group_id: group_id.to_string(),
            index,
            proposer: proposer.to_string(),
            description: description.to_string(),
            instructions,
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Vote account contents
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub proposal_id: String,
    /// Public key (hex) of the voting owner
    pub voter: String,
    pub decision: Decision,
    /// Voter's signature over [`VoteRecord::message`]
    pub signature: String,
    pub cast_at: DateTime<Utc>,
}

impl VoteRecord {
    /// Bytes a voter signs: proposal id, instruction digest and decision
    pub fn message(
        proposal_id: &str,
        instructions: &[Instruction],
        decision: Decision,
    ) -> Result<Vec<u8>, serde_json::Error> {
        let mut data = proposal_id.as_bytes().to_vec();
        data.extend_from_slice(&instructions_digest(instructions)?);
        data.extend_from_slice(decision.as_str().as_bytes());
        Ok(data)
    }

    /// Create a vote signed by `voter`
    pub fn new_signed(
        proposal: &ProposalRecord,
        voter: &dyn Signer,
        decision: Decision,
    ) -> Result<Self, MultisigError> {
        let message = Self::message(&proposal.proposal_id, &proposal.instructions, decision)
            .map_err(|e| MultisigError::InvalidRecord(e.to_string()))?;
        let signature = sign_hex(voter, &message)?;

        Ok(Self {
            proposal_id: proposal.proposal_id.clone(),
            voter: voter.public_identity(),
            decision,
            signature,
            cast_at: Utc::now(),
        })
    }

    /// Check the voter's signature against the proposal's instructions
    pub fn verify(&self, instructions: &[Instruction]) -> bool {
        match Self::message(&self.proposal_id, instructions, self.decision) {
            Ok(message) => verify_hex(&self.voter, &message, &self.signature),
            Err(_) => false,
        }
    }

    /// Address this record must be stored at
    pub fn address(&self) -> String {
        vote_record_address(&self.proposal_id, &self.voter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn sample_proposal() -> ProposalRecord {
        ProposalRecord::new(
            "group",
            0,
            "proposer",
            "Withdraw",
            vec![Instruction::transfer("3wallet", "1dest", 100)],
        )
    }

    #[test]
    fn test_addresses_are_distinct_per_input() {
        assert_ne!(proposal_id("g", 0), proposal_id("g", 1));
        assert_ne!(proposal_id("g", 0), proposal_id("h", 0));
        assert_ne!(
            vote_record_address("p", "alice"),
            vote_record_address("p", "bob")
        );
        assert!(wallet_address("g").starts_with('3'));
    }

    #[test]
    fn test_vote_signature_binds_decision_and_instructions() {
        let key = KeyPair::generate();
        let proposal = sample_proposal();
        let vote = VoteRecord::new_signed(&proposal, &key, Decision::Approve).unwrap();

        assert!(vote.verify(&proposal.instructions));

        // Flipping the decision invalidates the signature
        let mut flipped = vote.clone();
        flipped.decision = Decision::Reject;
        assert!(!flipped.verify(&proposal.instructions));

        // So does changing what is being voted on
        let other = vec![Instruction::transfer("3wallet", "1dest", 101)];
        assert!(!vote.verify(&other));
    }

    #[test]
    fn test_record_encoding() {
        let proposal = sample_proposal();
        let bytes = encode(&proposal).unwrap();
        let decoded: ProposalRecord = decode("addr", &bytes).unwrap();
        assert_eq!(decoded, proposal);

        let garbage: Result<ProposalRecord, _> = decode("addr", b"not json");
        assert!(matches!(garbage, Err(MultisigError::InvalidRecord(_))));
    }
}
