//! Multisig workflow facade
//!
//! Bundles the registry, proposal engine, approval machine and execution
//! dispatcher behind one handle sharing a ledger client and configuration.
//! This is what front ends drive.

use crate::config::ClientConfig;
use crate::crypto::Signer;
use crate::ledger::{short, with_retry, Instruction, Ledger, Transaction};
use crate::multisig::approval::{ApprovalMachine, VoteResult};
use crate::multisig::dispatcher::{ExecutionDispatcher, ExecutionResult};
use crate::multisig::error::MultisigError;
use crate::multisig::group::MultisigGroup;
use crate::multisig::proposal::{Decision, Proposal, ProposalEngine};
use crate::multisig::registry::{GroupLookup, MultisigRegistry};
use crate::multisig::submission::{submit_and_confirm, Outcome};
use std::sync::Arc;

#[derive(Clone)]
pub struct MultisigManager {
    ledger: Arc<dyn Ledger>,
    config: ClientConfig,
    registry: MultisigRegistry,
    engine: ProposalEngine,
    machine: ApprovalMachine,
    dispatcher: ExecutionDispatcher,
}

impl MultisigManager {
    pub fn new(ledger: Arc<dyn Ledger>, config: ClientConfig) -> Self {
        Self {
            registry: MultisigRegistry::new(ledger.clone(), config.clone()),
            engine: ProposalEngine::new(ledger.clone(), config.clone()),
            machine: ApprovalMachine::new(ledger.clone(), config.clone()),
            dispatcher: ExecutionDispatcher::new(ledger.clone(), config.clone()),
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ==================== Groups ====================

    pub async fn create_group(
        &self,
        creator: &dyn Signer,
        owners: Vec<String>,
        threshold: u8,
    ) -> Result<MultisigGroup, MultisigError> {
        self.registry.create_group(creator, owners, threshold).await
    }

    pub async fn create_group_with_nonce(
        &self,
        creator: &dyn Signer,
        owners: Vec<String>,
        threshold: u8,
        nonce: u64,
        label: Option<String>,
    ) -> Result<MultisigGroup, MultisigError> {
        self.registry
            .create_group_with_nonce(creator, owners, threshold, nonce, label)
            .await
    }

    pub async fn find_group(&self, identity: &str) -> Result<GroupLookup, MultisigError> {
        self.registry.find_group(identity).await
    }

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
        self.registry
            .select_existing_or_create(creator, owners, threshold, policy)
            .await
    }

    pub async fn get_group(&self, group_id: &str) -> Result<MultisigGroup, MultisigError> {
        self.registry.get_group(group_id).await
    }

    // ==================== Proposals ====================

    pub async fn create_proposal(
        &self,
        group: &MultisigGroup,
        proposer: &dyn Signer,
        description: &str,
        instructions: Vec<Instruction>,
    ) -> Result<Proposal, MultisigError> {
        self.engine
            .create_proposal(group, proposer, description, instructions)
            .await
    }

    pub async fn get_proposal(&self, proposal_id: &str) -> Result<Proposal, MultisigError> {
        self.engine.get_proposal(proposal_id).await
    }

    pub async fn list_proposals_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<Proposal>, MultisigError> {
        self.engine.list_proposals_for_group(group_id).await
    }

    // ==================== Votes and execution ====================

    pub async fn vote(
        &self,
        proposal_id: &str,
        voter: &dyn Signer,
        decision: Decision,
    ) -> Result<VoteResult, MultisigError> {
        self.machine.vote(proposal_id, voter, decision).await
    }

    pub async fn approve(
        &self,
        proposal_id: &str,
        voter: &dyn Signer,
    ) -> Result<VoteResult, MultisigError> {
        self.machine.approve(proposal_id, voter).await
    }

    pub async fn reject(
        &self,
        proposal_id: &str,
        voter: &dyn Signer,
    ) -> Result<VoteResult, MultisigError> {
        self.machine.reject(proposal_id, voter).await
    }

    pub async fn execute(
        &self,
        proposal_id: &str,
        executor: &dyn Signer,
    ) -> Result<ExecutionResult, MultisigError> {
        self.dispatcher.execute(proposal_id, executor).await
    }

    // ==================== Funds ====================

    /// Plain transfer from `from`'s own account into the group wallet
    pub async fn deposit(
        &self,
        from: &dyn Signer,
        group: &MultisigGroup,
        amount: u64,
    ) -> Result<String, MultisigError> {
        let tx = Transaction::new(
            &from.public_identity(),
            vec![Instruction::transfer(
                &from.address(),
                &group.wallet_address,
                amount,
            )],
        )
        .sign(&[from])?;

        let (signature, outcome) =
            submit_and_confirm(self.ledger.as_ref(), &self.config, &tx).await?;
        match outcome {
            Outcome::Confirmed => {
                log::info!(
                    "Deposited {} into {} ({})",
                    amount,
                    group.wallet_address,
                    short(&signature)
                );
                Ok(signature)
            }
            Outcome::Conflict(detail) | Outcome::Rejected(detail) => {
                Err(MultisigError::LedgerRejected(detail))
            }
        }
    }

    pub async fn balance(&self, address: &str) -> Result<u64, MultisigError> {
        let ledger = self.ledger.as_ref();
        Ok(with_retry(&self.config.retry, "get_balance", move || ledger.get_balance(address)).await?)
    }

    pub async fn wallet_balance(&self, group: &MultisigGroup) -> Result<u64, MultisigError> {
        self.balance(&group.wallet_address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::ledger::{MemoryLedger, MemoryLedgerConfig};
    use crate::multisig::proposal::ProposalState;
    use crate::multisig::registry::exact_match;

    const FEE: u64 = 5_000;

    struct Harness {
        ledger: Arc<MemoryLedger>,
        manager: MultisigManager,
        signers: Vec<KeyPair>,
    }

    async fn harness(owners: usize, config: MemoryLedgerConfig) -> Harness {
        let ledger = Arc::new(MemoryLedger::new(config));
        let signers: Vec<KeyPair> = (0..owners).map(|_| KeyPair::generate()).collect();
        for s in &signers {
            ledger.airdrop(&s.address(), 1_000_000).await;
        }
        Harness {
            manager: MultisigManager::new(ledger.clone(), ClientConfig::fast()),
            ledger,
            signers,
        }
    }

    fn identities(signers: &[KeyPair]) -> Vec<String> {
        signers.iter().map(|s| s.public_key_hex()).collect()
    }

    /// 2-of-3 group with a funded wallet and one open transfer proposal
    async fn funded_proposal(h: &Harness, amount: u64) -> (MultisigGroup, Proposal) {
        let group = h
            .manager
            .create_group(&h.signers[0], identities(&h.signers), 2)
            .await
            .unwrap();
        h.manager
            .deposit(&h.signers[0], &group, 10_000)
            .await
            .unwrap();
        let proposal = h
            .manager
            .create_proposal(
                &group,
                &h.signers[0],
                "Pay contractor",
                vec![Instruction::transfer(&group.wallet_address, "1Contractor", amount)],
            )
            .await
            .unwrap();
        (group, proposal)
    }

    #[tokio::test]
    async fn test_scenario_approve_and_execute() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let (group, proposal) = funded_proposal(&h, 2_500).await;
        let s1 = &h.signers[0];
        let s3 = &h.signers[2];

        let wallet_before = h.manager.wallet_balance(&group).await.unwrap();
        let s1_before = h.manager.balance(&s1.address()).await.unwrap();

        h.manager.approve(&proposal.proposal_id, s1).await.unwrap();
        let voted = h.manager.approve(&proposal.proposal_id, s3).await.unwrap();
        assert_eq!(voted.proposal.state, ProposalState::Executable);

        let executed = h.manager.execute(&proposal.proposal_id, s1).await.unwrap();
        assert_eq!(executed.proposal.state, ProposalState::Executed);
        assert_eq!(
            executed.proposal.execution_signature.as_deref(),
            Some(executed.signature.as_str())
        );

        assert_eq!(
            h.manager.wallet_balance(&group).await.unwrap(),
            wallet_before - 2_500
        );
        assert_eq!(h.manager.balance("1Contractor").await.unwrap(), 2_500);
        // S1 paid for its vote and the execution, nothing else
        assert_eq!(
            h.manager.balance(&s1.address()).await.unwrap(),
            s1_before - 2 * FEE
        );

        let again = h.manager.execute(&proposal.proposal_id, s3).await;
        assert!(matches!(again, Err(MultisigError::AlreadyExecuted(_))));
    }

    #[tokio::test]
    async fn test_scenario_reject_is_permanent() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let (_, proposal) = funded_proposal(&h, 2_500).await;

        let rejected = h
            .manager
            .reject(&proposal.proposal_id, &h.signers[1])
            .await
            .unwrap();
        assert_eq!(rejected.proposal.state, ProposalState::Rejected);

        let late = h
            .manager
            .approve(&proposal.proposal_id, &h.signers[2])
            .await;
        assert!(matches!(
            late,
            Err(MultisigError::ProposalAlreadyTerminal { .. })
        ));

        let current = h.manager.get_proposal(&proposal.proposal_id).await.unwrap();
        assert_eq!(current.state, ProposalState::Rejected);
        assert_eq!(current.approvals(), 0);
    }

    #[tokio::test]
    async fn test_scenario_draft_cannot_execute() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let (group, proposal) = funded_proposal(&h, 2_500).await;
        h.manager
            .approve(&proposal.proposal_id, &h.signers[0])
            .await
            .unwrap();

        let before = h.manager.wallet_balance(&group).await.unwrap();
        let result = h
            .manager
            .execute(&proposal.proposal_id, &h.signers[0])
            .await;
        assert!(matches!(
            result,
            Err(MultisigError::NotExecutable(ProposalState::Draft))
        ));
        assert_eq!(h.manager.wallet_balance(&group).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_threshold_reached_exactly_at_m() {
        for (owners, threshold) in [(1usize, 1u8), (3, 3), (4, 2), (5, 3)] {
            let h = harness(owners, MemoryLedgerConfig::default()).await;
            let group = h
                .manager
                .create_group(&h.signers[0], identities(&h.signers), threshold)
                .await
                .unwrap();
            let proposal = h
                .manager
                .create_proposal(&group, &h.signers[0], "Note", vec![Instruction::memo("m")])
                .await
                .unwrap();

            for (i, signer) in h.signers.iter().take(threshold as usize).enumerate() {
                let state = h
                    .manager
                    .approve(&proposal.proposal_id, signer)
                    .await
                    .unwrap()
                    .proposal
                    .state;
                if i + 1 < threshold as usize {
                    assert_eq!(state, ProposalState::Draft);
                } else {
                    assert_eq!(state, ProposalState::Executable);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_threshold_bounds_always_enforced() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        for n in 1..=3usize {
            let owners = identities(&h.signers[..n]);
            for threshold in [0u8, n as u8 + 1, u8::MAX] {
                let result = h
                    .manager
                    .create_group(&h.signers[0], owners.clone(), threshold)
                    .await;
                assert!(matches!(
                    result,
                    Err(MultisigError::InvalidThreshold { .. })
                ));
            }
        }
    }

    #[tokio::test]
    async fn test_non_owner_never_affects_votes() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let (_, proposal) = funded_proposal(&h, 100).await;
        let outsider = KeyPair::generate();
        h.ledger.airdrop(&outsider.address(), 1_000_000).await;

        for decision in [Decision::Approve, Decision::Reject] {
            let result = h
                .manager
                .vote(&proposal.proposal_id, &outsider, decision)
                .await;
            assert!(matches!(result, Err(MultisigError::NotAnOwner(_))));
        }
        let current = h.manager.get_proposal(&proposal.proposal_id).await.unwrap();
        assert!(current.votes.is_empty());
        assert_eq!(current.state, ProposalState::Draft);
    }

    /// Signs with a real key but reports its identity in upper case
    struct UpperCaseSigner(KeyPair);

    impl Signer for UpperCaseSigner {
        fn public_identity(&self) -> String {
            self.0.public_key_hex().to_uppercase()
        }

        fn sign(&self, message: &[u8]) -> Result<Vec<u8>, crate::crypto::KeyError> {
            self.0.sign(message)
        }

        fn address(&self) -> String {
            self.0.address()
        }
    }

    #[tokio::test]
    async fn test_one_key_cannot_hold_two_owner_slots() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let a = h.signers[0].public_key_hex();
        let b = h.signers[1].public_key_hex();

        let result = h
            .manager
            .create_group(&h.signers[0], vec![a.clone(), a.to_uppercase(), b.clone()], 2)
            .await;
        assert!(matches!(result, Err(MultisigError::DuplicateOwner(_))));

        let result = h
            .manager
            .create_group(&h.signers[0], vec![a.clone(), "not-a-key".to_string()], 1)
            .await;
        assert!(matches!(result, Err(MultisigError::InvalidOwner(_))));

        // Upper-case input is accepted but stored canonical
        let group = h
            .manager
            .create_group(&h.signers[0], vec![a.to_uppercase(), b.clone()], 2)
            .await
            .unwrap();
        assert_eq!(group.owners, vec![a, b]);
    }

    #[tokio::test]
    async fn test_second_vote_under_another_encoding_is_refused() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let (group, proposal) = funded_proposal(&h, 9_000).await;

        h.manager
            .approve(&proposal.proposal_id, &h.signers[0])
            .await
            .unwrap();
        let disguised = UpperCaseSigner(h.signers[0].clone());
        let result = h.manager.approve(&proposal.proposal_id, &disguised).await;
        assert!(matches!(result, Err(MultisigError::NotAnOwner(_))));

        let current = h.manager.get_proposal(&proposal.proposal_id).await.unwrap();
        assert_eq!(current.approvals(), 1);
        assert_eq!(current.state, ProposalState::Draft);

        let result = h.manager.execute(&proposal.proposal_id, &h.signers[0]).await;
        assert!(matches!(result, Err(MultisigError::NotExecutable(_))));
        assert_eq!(h.manager.wallet_balance(&group).await.unwrap(), 10_000);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let (_, proposal) = funded_proposal(&h, 100).await;

        h.ledger.inject_transient_failures(2).await;
        let voted = h
            .manager
            .approve(&proposal.proposal_id, &h.signers[1])
            .await
            .unwrap();
        assert_eq!(voted.proposal.approvals(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_transient() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let (_, proposal) = funded_proposal(&h, 100).await;

        h.ledger.inject_transient_failures(100).await;
        let result = h
            .manager
            .approve(&proposal.proposal_id, &h.signers[1])
            .await;
        match result {
            Err(e) => assert!(e.is_retryable(), "unexpected error {:?}", e),
            Ok(_) => panic!("vote should not have been submitted"),
        }

        h.ledger.inject_transient_failures(0).await;
        let current = h.manager.get_proposal(&proposal.proposal_id).await.unwrap();
        assert!(current.votes.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_voters() {
        let h = harness(3, MemoryLedgerConfig {
            confirmation_lag: 1,
            ..Default::default()
        })
        .await;
        let (_, proposal) = funded_proposal(&h, 100).await;
        let id = proposal.proposal_id.as_str();

        let (a, b) = tokio::join!(
            h.manager.approve(id, &h.signers[1]),
            h.manager.approve(id, &h.signers[2])
        );
        a.unwrap();
        b.unwrap();

        let current = h.manager.get_proposal(id).await.unwrap();
        assert_eq!(current.approvals(), 2);
        assert_eq!(current.state, ProposalState::Executable);
    }

    #[tokio::test]
    async fn test_concurrent_executors_move_funds_once() {
        let h = harness(3, MemoryLedgerConfig {
            confirmation_lag: 1,
            ..Default::default()
        })
        .await;
        let (group, proposal) = funded_proposal(&h, 4_000).await;
        let id = proposal.proposal_id.as_str();
        h.manager.approve(id, &h.signers[0]).await.unwrap();
        h.manager.approve(id, &h.signers[1]).await.unwrap();

        let (a, b) = tokio::join!(
            h.manager.execute(id, &h.signers[0]),
            h.manager.execute(id, &h.signers[2])
        );
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        for result in [a, b] {
            if let Err(e) = result {
                assert!(matches!(e, MultisigError::AlreadyExecuted(_)), "{:?}", e);
            }
        }

        assert_eq!(h.manager.balance("1Contractor").await.unwrap(), 4_000);
        assert_eq!(h.manager.wallet_balance(&group).await.unwrap(), 6_000);
    }

    #[tokio::test]
    async fn test_proposals_survive_a_new_client() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let (group, proposal) = funded_proposal(&h, 100).await;
        h.manager
            .approve(&proposal.proposal_id, &h.signers[0])
            .await
            .unwrap();

        // A second client sees the same state from the ledger alone
        let other = MultisigManager::new(h.ledger.clone(), ClientConfig::fast());
        let listed = other.list_proposals_for_group(&group.group_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].approvals(), 1);
        other
            .approve(&proposal.proposal_id, &h.signers[1])
            .await
            .unwrap();

        let seen = h.manager.get_proposal(&proposal.proposal_id).await.unwrap();
        assert_eq!(seen.state, ProposalState::Executable);
    }

    #[tokio::test]
    async fn test_group_reuse_policy() {
        let h = harness(3, MemoryLedgerConfig::default()).await;
        let owners = identities(&h.signers);

        let created = h
            .manager
            .select_existing_or_create(
                &h.signers[0],
                owners.clone(),
                2,
                exact_match(owners.clone(), 2),
            )
            .await
            .unwrap();
        let reused = h
            .manager
            .select_existing_or_create(
                &h.signers[0],
                owners.clone(),
                2,
                exact_match(owners.clone(), 2),
            )
            .await
            .unwrap();
        assert_eq!(created, reused);

        // A policy that never reuses always creates
        let fresh = h
            .manager
            .select_existing_or_create(&h.signers[0], owners, 2, |_| None)
            .await
            .unwrap();
        assert_ne!(fresh.group_id, created.group_id);

        match h
            .manager
            .find_group(&h.signers[2].public_key_hex())
            .await
            .unwrap()
        {
            GroupLookup::Found(groups) => assert_eq!(groups.len(), 2),
            other => panic!("unexpected lookup {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deposit_overdraft_rejected() {
        let h = harness(2, MemoryLedgerConfig::default()).await;
        let group = h
            .manager
            .create_group(&h.signers[0], identities(&h.signers), 1)
            .await
            .unwrap();

        let result = h.manager.deposit(&h.signers[1], &group, 5_000_000).await;
        assert!(matches!(result, Err(MultisigError::LedgerRejected(_))));
        assert_eq!(h.manager.wallet_balance(&group).await.unwrap(), 0);
    }
}
