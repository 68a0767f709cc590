//! Sim Ledger - in-process ledger for the snake game
//!
//! This crate provides a self-contained ledger behind `snake_core::LedgerClient`:
//! - Account balances and nonces in concurrent maps
//! - Signature-checked submissions queued in a bounded mempool
//! - Fixed-interval block production with receipts and contract events
//! - The snake game contract (sessions, moves, leaderboard)
//! - Fault injection for tests

pub mod account_store;
pub mod block_producer;
pub mod config;
pub mod contract;
pub mod ledger;
pub mod processor;

pub use account_store::{Account, AccountStore};
pub use block_producer::{BlockProducer, BlockUpdate, TransactionSender};
pub use config::SimLedgerConfig;
pub use contract::{ContractError, SnakeContract};
pub use ledger::{snake_contract_address, SimLedger};
pub use processor::{LedgerProcessor, TransactionResult, BASE_TX_GAS};

/// Default block time in milliseconds
pub const BLOCK_TIME_MS: u64 = 250;

/// Maximum transactions per block
pub const MAX_TXS_PER_BLOCK: usize = 64;
