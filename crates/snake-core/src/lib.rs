//! Snake Core - ledger-driven snake game orchestration
//!
//! This crate provides the client-side core of the on-ledger snake game:
//! - Grid simulation with fixed-rate ticks and a one-minute countdown
//! - Single-flight pipeline turning direction changes into signed transactions
//! - Session credential management (generate, persist, fund, sweep)
//! - Contract instruction/event encoding and read-only queries

pub mod config;
pub mod contract;
pub mod error;
pub mod game;
pub mod game_loop;
pub mod ledger;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{CoreConfig, GameConfig, PipelineConfig, SessionConfig};
pub use contract::{
    ContractQuery, ContractReader, GameEvent, GameRecord, LeaderboardEntry, SnakeInstruction,
};
pub use error::{ConfigError, GameError, LedgerError, SessionError, StoreError};
pub use game::{Crash, GameState, Steer, TickOutcome};
pub use game_loop::{DirectionChange, GameLoop, GameSnapshot, SessionIdSource};
pub use ledger::{
    LedgerClient, LocalSigner, Log, Receipt, ReceiptStatus, SharedLedger, SignedTransaction,
    TransactionRequest, TxSigner,
};
pub use pipeline::{FeedUpdate, MoveSubmission, MoveTicket, TransactionPipeline};
pub use session::{SessionCredential, SessionManager};
pub use store::{KeyValueStore, MemoryStore, SledStore};
pub use types::{
    Address, Direction, GamePhase, Position, SessionId, TxHash, TxRecord, TxStatus, FEED_CAPACITY,
    GRID_SIZE,
};
