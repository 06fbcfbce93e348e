//! Local key store whose wallets sign for the multisig workflow

pub mod wallet;

pub use wallet::{Wallet, WalletError, WalletInfo, WalletManager};
