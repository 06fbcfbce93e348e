//! CLI commands for the multisig vault
//!
//! Every command runs against the local ledger stored in the data
//! directory and saves it back afterwards.

use crate::config::ClientConfig;
use crate::crypto::is_valid_base58check;
use crate::ledger::{Instruction, LedgerSnapshot, MemoryLedger, MemoryLedgerConfig};
use crate::multisig::{
    exact_match, Decision, GroupLookup, MultisigGroup, MultisigManager, Proposal, ProposalState,
};
use crate::storage::{Storage, StorageConfig};
use crate::wallet::{Wallet, WalletManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub ledger: Arc<MemoryLedger>,
    pub manager: MultisigManager,
    pub storage: Storage,
    pub wallet_manager: WalletManager,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load the ledger, key store and client config from `data_dir`
    pub fn new(data_dir: PathBuf, config_path: Option<&Path>) -> CliResult<Self> {
        let storage = Storage::new(StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        })?;
        let wallet_manager = WalletManager::new(&data_dir.join("wallets"))?;
        let config = ClientConfig::load_or_default(config_path)?;

        let snapshot = if storage.exists() {
            storage.load()?
        } else {
            println!("🆕 No ledger found, starting an empty one...");
            LedgerSnapshot::default()
        };
        let ledger = Arc::new(MemoryLedger::from_snapshot(
            snapshot,
            MemoryLedgerConfig::default(),
        ));

        Ok(Self {
            manager: MultisigManager::new(ledger.clone(), config),
            ledger,
            storage,
            wallet_manager,
            data_dir,
        })
    }

    /// Persist the ledger
    pub async fn save(&self) -> CliResult<()> {
        self.storage.save(&self.ledger.snapshot().await)?;
        Ok(())
    }

    fn signer(&self, address: &str) -> CliResult<Wallet> {
        Ok(self.wallet_manager.load_wallet(address)?)
    }
}

/// Parse a `DESTINATION:AMOUNT` transfer argument
pub fn parse_transfer(arg: &str) -> Result<(String, u64), String> {
    let (to, amount) = arg
        .rsplit_once(':')
        .ok_or_else(|| format!("expected DESTINATION:AMOUNT, got '{}'", arg))?;
    if to.is_empty() {
        return Err(format!("missing destination in '{}'", arg));
    }
    let amount = amount
        .parse::<u64>()
        .map_err(|e| format!("invalid amount in '{}': {}", arg, e))?;
    Ok((to.to_string(), amount))
}

/// Create an empty ledger
pub fn cmd_init(data_dir: &Path) -> CliResult<()> {
    let storage = Storage::new(StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    })?;

    if storage.exists() {
        println!("⚠️  Ledger already exists at {:?}", data_dir);
        return Ok(());
    }

    storage.save(&LedgerSnapshot::default())?;
    println!("✅ Ledger initialized!");
    println!("   📁 Data directory: {:?}", data_dir);
    Ok(())
}

/// Create a new key
pub fn cmd_key_new(state: &AppState, label: Option<&str>) -> CliResult<()> {
    let wallet = state.wallet_manager.create_wallet(label)?;

    println!("🔐 New key created!");
    println!("   📍 Address: {}", wallet.address());
    println!("   🔑 Public Key: {}", wallet.public_key());
    if let Some(l) = &wallet.label {
        println!("   🏷️  Label: {}", l);
    }
    println!("\n   ⚠️  The private key is stored in the wallets directory.");
    Ok(())
}

/// Import an existing private key into the key store
pub fn cmd_key_import(state: &AppState, private_key: &str, label: Option<&str>) -> CliResult<()> {
    let wallet = state.wallet_manager.import_wallet(private_key, label)?;

    println!("📥 Key imported!");
    println!("   📍 Address: {}", wallet.address());
    println!("   🔑 Public Key: {}", wallet.public_key());
    Ok(())
}

/// List stored keys with their balances
pub async fn cmd_key_list(state: &AppState) -> CliResult<()> {
    let wallets = state.wallet_manager.list_wallets()?;

    if wallets.is_empty() {
        println!("📭 No keys found. Create one with: multisig key new");
        return Ok(());
    }

    println!("📋 Keys:");
    for info in &wallets {
        let balance = state.manager.balance(&info.address).await?;
        let label = info.label.as_deref().unwrap_or("-");
        println!("   {} ({}) - {} units", info.address, label, balance);
        println!("      └─ {}", info.public_key);
    }
    Ok(())
}

/// Fund an address on the local ledger
pub async fn cmd_airdrop(state: &AppState, address: &str, amount: u64) -> CliResult<()> {
    if !is_valid_base58check(address) {
        log::warn!("{} is not a Base58Check address", address);
    }
    state.ledger.airdrop(address, amount).await;
    state.save().await?;
    println!("🪂 Airdropped {} units to {}", amount, address);
    Ok(())
}

/// Transfer from a stored key into a group wallet
pub async fn cmd_deposit(
    state: &AppState,
    from: &str,
    group_id: &str,
    amount: u64,
) -> CliResult<()> {
    let signer = state.signer(from)?;
    let group = state.manager.get_group(group_id).await?;
    let signature = state.manager.deposit(&signer, &group, amount).await?;
    state.save().await?;

    println!("📥 Deposited {} units into {}", amount, group.wallet_address);
    println!("   Signature: {}", signature);
    Ok(())
}

pub async fn cmd_balance(state: &AppState, address: &str) -> CliResult<()> {
    let balance = state.manager.balance(address).await?;
    println!("💰 Balance for {}: {} units", address, balance);
    Ok(())
}

/// Create a group, or reuse an exactly matching one with `reuse`
pub async fn cmd_group_create(
    state: &AppState,
    creator: &str,
    owners: &[String],
    threshold: u8,
    label: Option<String>,
    reuse: bool,
) -> CliResult<()> {
    let signer = state.signer(creator)?;
    let owners = owners
        .iter()
        .map(|o| state.wallet_manager.resolve_identity(o))
        .collect::<Result<Vec<_>, _>>()?;

    let group = if reuse {
        let policy = exact_match(owners.clone(), threshold);
        state
            .manager
            .select_existing_or_create(&signer, owners, threshold, policy)
            .await?
    } else {
        state
            .manager
            .create_group_with_nonce(&signer, owners, threshold, rand::random(), label)
            .await?
    };
    state.save().await?;

    println!("👥 Multisig group ready");
    print_group(&group);
    Ok(())
}

/// List the groups an owner belongs to
pub async fn cmd_group_find(state: &AppState, owner: &str) -> CliResult<()> {
    let identity = state.wallet_manager.resolve_identity(owner)?;

    match state.manager.find_group(&identity).await? {
        GroupLookup::Found(groups) => {
            println!("👥 {} group(s):", groups.len());
            for group in &groups {
                print_group(group);
            }
        }
        GroupLookup::NotFound => println!("📭 No groups found for {}", owner),
        GroupLookup::Unknown(reason) => {
            println!("❓ Cannot tell whether {} owns any group: {}", owner, reason)
        }
    }
    Ok(())
}

/// Open a proposal with transfers out of the group wallet and/or a memo
pub async fn cmd_propose(
    state: &AppState,
    group_id: &str,
    proposer: &str,
    description: &str,
    transfers: &[(String, u64)],
    memo: Option<&str>,
) -> CliResult<()> {
    let signer = state.signer(proposer)?;
    let group = state.manager.get_group(group_id).await?;

    for (to, _) in transfers {
        if !is_valid_base58check(to) {
            log::warn!("Destination {} is not a Base58Check address", to);
        }
    }

    let mut instructions: Vec<Instruction> = transfers
        .iter()
        .map(|(to, amount)| Instruction::transfer(&group.wallet_address, to, *amount))
        .collect();
    if let Some(text) = memo {
        instructions.push(Instruction::memo(text));
    }

    let proposal = state
        .manager
        .create_proposal(&group, &signer, description, instructions)
        .await?;
    state.save().await?;

    println!("📝 Proposal created");
    print_proposal(&proposal, group.threshold);
    Ok(())
}

pub async fn cmd_vote(
    state: &AppState,
    proposal_id: &str,
    voter: &str,
    decision: Decision,
) -> CliResult<()> {
    let signer = state.signer(voter)?;
    let result = state.manager.vote(proposal_id, &signer, decision).await?;
    state.save().await?;

    let icon = match decision {
        Decision::Approve => "✅",
        Decision::Reject => "❌",
    };
    println!("{} {} recorded ({})", icon, decision, result.signature);
    println!("   State: {}", result.proposal.state);
    if result.proposal.state == ProposalState::Executable {
        println!("   Threshold reached; any owner can now execute it.");
    }
    Ok(())
}

pub async fn cmd_execute(state: &AppState, proposal_id: &str, executor: &str) -> CliResult<()> {
    let signer = state.signer(executor)?;
    let outcome = state.manager.execute(proposal_id, &signer).await;
    // A failed execution is recorded on the ledger too
    state.save().await?;
    let result = outcome?;
    let group = state.manager.get_group(&result.proposal.group_id).await?;

    println!("🚀 Proposal executed!");
    println!("   Signature: {}", result.signature);
    print_proposal(&result.proposal, group.threshold);
    Ok(())
}

pub async fn cmd_proposal_show(state: &AppState, proposal_id: &str) -> CliResult<()> {
    let proposal = state.manager.get_proposal(proposal_id).await?;
    let group = state.manager.get_group(&proposal.group_id).await?;
    print_proposal(&proposal, group.threshold);
    Ok(())
}

pub async fn cmd_proposal_list(state: &AppState, group_id: &str) -> CliResult<()> {
    let group = state.manager.get_group(group_id).await?;
    let proposals = state.manager.list_proposals_for_group(group_id).await?;

    if proposals.is_empty() {
        println!("📭 No proposals for group {}", group_id);
        return Ok(());
    }

    println!("📋 Proposals ({}):", proposals.len());
    for p in &proposals {
        println!(
            "   #{} {} | {} | {}/{} approvals | {}",
            p.index,
            p.proposal_id,
            p.state,
            p.approvals(),
            group.threshold,
            p.description
        );
    }
    Ok(())
}

fn print_group(group: &MultisigGroup) {
    println!("   ├─ Group: {}", group.group_id);
    println!("   ├─ Wallet: {}", group.wallet_address);
    if let Some(label) = &group.label {
        println!("   ├─ Label: {}", label);
    }
    println!("   ├─ Policy: {}", group.description());
    for owner in &group.owners {
        println!("   │  └─ {}", owner);
    }
    println!("   └─ Created: {}", group.created_at.format("%Y-%m-%d %H:%M:%S"));
}

fn print_proposal(p: &Proposal, threshold: u8) {
    println!("   ├─ Proposal: {} (#{})", p.proposal_id, p.index);
    println!("   ├─ Group: {}", p.group_id);
    println!("   ├─ Description: {}", p.description);
    println!("   ├─ Proposer: {}", p.proposer);
    let wallet = p
        .instructions
        .iter()
        .find_map(|ix| match ix {
            Instruction::Transfer { from, .. } => Some(from.as_str()),
            _ => None,
        });
    if let Some(wallet) = wallet {
        println!("   ├─ Total out of {}: {}", wallet, p.total_outflow(wallet));
    }
    for ix in &p.instructions {
        match ix {
            Instruction::Transfer { to, amount, .. } => {
                println!("   │  └─ transfer {} → {}", amount, to)
            }
            Instruction::Memo { text } => println!("   │  └─ memo \"{}\"", text),
            other => println!("   │  └─ {}", other.kind()),
        }
    }
    println!(
        "   ├─ Votes: {} approve / {} reject (threshold {})",
        p.approvals(),
        p.rejections(),
        threshold
    );
    for (voter, decision) in &p.votes {
        println!("   │  └─ {}: {}", voter, decision);
    }
    if let Some(sig) = &p.execution_signature {
        println!("   ├─ Executed in: {}", sig);
    }
    if let Some(failure) = &p.failure {
        println!("   ├─ Failure: {}", failure);
    }
    println!("   └─ State: {}", p.state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_parse_transfer() {
        assert_eq!(
            parse_transfer("1Dest:250").unwrap(),
            ("1Dest".to_string(), 250)
        );
        assert!(parse_transfer("1Dest").is_err());
        assert!(parse_transfer(":5").is_err());
        assert!(parse_transfer("1Dest:-5").is_err());
    }

    #[tokio::test]
    async fn test_imported_key_can_sign() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data_dir = temp_dir.path().to_path_buf();
        cmd_init(&data_dir).unwrap();
        let state = AppState::new(data_dir, None).unwrap();

        let key = KeyPair::generate();
        cmd_key_import(&state, &key.private_key_hex(), Some("cold")).unwrap();
        assert!(cmd_key_import(&state, "zz", None).is_err());

        cmd_airdrop(&state, &key.address(), 100_000).await.unwrap();
        cmd_group_create(
            &state,
            &key.address(),
            &[key.public_key_hex()],
            1,
            None,
            false,
        )
        .await
        .unwrap();
        assert!(matches!(
            state.manager.find_group(&key.public_key_hex()).await.unwrap(),
            GroupLookup::Found(_)
        ));
    }

    #[tokio::test]
    async fn test_state_persists_between_runs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data_dir = temp_dir.path().to_path_buf();
        cmd_init(&data_dir).unwrap();

        let state = AppState::new(data_dir.clone(), None).unwrap();
        let alice = state.wallet_manager.create_wallet(Some("alice")).unwrap();
        let bob = state.wallet_manager.create_wallet(Some("bob")).unwrap();
        cmd_airdrop(&state, &alice.address(), 1_000_000).await.unwrap();
        cmd_airdrop(&state, &bob.address(), 1_000_000).await.unwrap();
        cmd_group_create(
            &state,
            &alice.address(),
            &[alice.address(), bob.public_key()],
            2,
            Some("ops".to_string()),
            false,
        )
        .await
        .unwrap();

        // A fresh process sees the group
        let reopened = AppState::new(data_dir, None).unwrap();
        match reopened
            .manager
            .find_group(&bob.public_key())
            .await
            .unwrap()
        {
            GroupLookup::Found(groups) => {
                assert_eq!(groups.len(), 1);
                assert_eq!(groups[0].label.as_deref(), Some("ops"));
                assert!(groups[0].is_owner(&alice.public_key()));
            }
            other => panic!("unexpected lookup {:?}", other),
        }
    }
}
