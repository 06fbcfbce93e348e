//! Multisig vault CLI
//!
//! Drives the multisig workflow against a local ledger kept in the data
//! directory.

use clap::{Parser, Subcommand};
use multisig_vault::cli::{self, AppState};
use multisig_vault::multisig::Decision;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multisig")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "M-of-N multisig approval workflow over a local ledger", long_about = None)]
struct Cli {
    /// Data directory for the ledger and key store
    #[arg(short, long, default_value = ".multisig_data")]
    data_dir: PathBuf,

    /// Client config file (JSON) with retry and confirmation settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an empty ledger
    Init,

    /// Key store operations
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// Mint funds into an address on the local ledger
    Airdrop {
        #[arg(short, long)]
        address: String,

        #[arg(short = 'n', long)]
        amount: u64,
    },

    /// Transfer from a stored key into a group wallet
    Deposit {
        /// Address of the paying key
        #[arg(short, long)]
        from: String,

        #[arg(short, long)]
        group: String,

        #[arg(short = 'n', long)]
        amount: u64,
    },

    /// Show the balance of any address
    Balance {
        #[arg(short, long)]
        address: String,
    },

    /// Multisig group operations
    Group {
        #[command(subcommand)]
        action: GroupCommands,
    },

    /// Propose instructions for a group to approve
    Propose {
        #[arg(short, long)]
        group: String,

        /// Address of the proposing owner's key
        #[arg(short, long)]
        proposer: String,

        #[arg(short, long)]
        description: String,

        /// Transfer out of the group wallet, as DESTINATION:AMOUNT (repeatable)
        #[arg(short, long = "transfer", value_parser = cli::parse_transfer)]
        transfers: Vec<(String, u64)>,

        /// Attach a memo instruction
        #[arg(short, long)]
        memo: Option<String>,
    },

    /// Approve a proposal
    Approve {
        #[arg(short, long)]
        proposal: String,

        /// Address of the voting owner's key
        #[arg(short, long)]
        signer: String,
    },

    /// Reject a proposal (final)
    Reject {
        #[arg(short, long)]
        proposal: String,

        #[arg(short, long)]
        signer: String,
    },

    /// Execute a fully approved proposal
    Execute {
        #[arg(short, long)]
        proposal: String,

        /// Address of the executing owner's key
        #[arg(short, long)]
        signer: String,
    },

    /// Inspect proposals
    Proposal {
        #[command(subcommand)]
        action: ProposalCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a new key
    New {
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Import an existing private key (hex)
    Import {
        #[arg(short = 'k', long)]
        private_key: String,

        #[arg(short, long)]
        label: Option<String>,
    },

    /// List stored keys
    List,
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Create a group
    Create {
        /// Address of the key paying for the creation
        #[arg(short, long)]
        creator: String,

        /// Owner key addresses or public keys (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        owners: Vec<String>,

        /// Approvals required (M)
        #[arg(short, long)]
        threshold: u8,

        #[arg(short, long)]
        label: Option<String>,

        /// Reuse an existing group instead of creating one
        #[arg(long, value_enum)]
        reuse: Option<ReusePolicy>,
    },

    /// List the groups an owner belongs to
    Find {
        /// Owner key address or public key
        #[arg(short, long)]
        owner: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ReusePolicy {
    /// Same owner set and threshold
    Exact,
}

#[derive(Subcommand)]
enum ProposalCommands {
    /// Show a proposal with its votes
    Show {
        #[arg(short, long)]
        proposal: String,
    },

    /// List the proposals of a group
    List {
        #[arg(short, long)]
        group: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Init does not need a loaded ledger
    if let Commands::Init = cli.command {
        return cli::cmd_init(&cli.data_dir);
    }

    let state = AppState::new(cli.data_dir.clone(), cli.config.as_deref())?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match cli.command {
            Commands::Init => unreachable!(),

            Commands::Key { action } => match action {
                KeyCommands::New { label } => cli::cmd_key_new(&state, label.as_deref()),
                KeyCommands::Import { private_key, label } => {
                    cli::cmd_key_import(&state, &private_key, label.as_deref())
                }
                KeyCommands::List => cli::cmd_key_list(&state).await,
            },

            Commands::Airdrop { address, amount } => {
                cli::cmd_airdrop(&state, &address, amount).await
            }

            Commands::Deposit {
                from,
                group,
                amount,
            } => cli::cmd_deposit(&state, &from, &group, amount).await,

            Commands::Balance { address } => cli::cmd_balance(&state, &address).await,

            Commands::Group { action } => match action {
                GroupCommands::Create {
                    creator,
                    owners,
                    threshold,
                    label,
                    reuse,
                } => {
                    cli::cmd_group_create(
                        &state,
                        &creator,
                        &owners,
                        threshold,
                        label,
                        matches!(reuse, Some(ReusePolicy::Exact)),
                    )
                    .await
                }
                GroupCommands::Find { owner } => cli::cmd_group_find(&state, &owner).await,
            },

            Commands::Propose {
                group,
                proposer,
                description,
                transfers,
                memo,
            } => {
                cli::cmd_propose(
                    &state,
                    &group,
                    &proposer,
                    &description,
                    &transfers,
                    memo.as_deref(),
                )
                .await
            }

            Commands::Approve { proposal, signer } => {
                cli::cmd_vote(&state, &proposal, &signer, Decision::Approve).await
            }

            Commands::Reject { proposal, signer } => {
                cli::cmd_vote(&state, &proposal, &signer, Decision::Reject).await
            }

            Commands::Execute { proposal, signer } => {
                cli::cmd_execute(&state, &proposal, &signer).await
            }

            Commands::Proposal { action } => match action {
                ProposalCommands::Show { proposal } => {
                    cli::cmd_proposal_show(&state, &proposal).await
                }
                ProposalCommands::List { group } => cli::cmd_proposal_list(&state, &group).await,
            },
        }
    })
}
