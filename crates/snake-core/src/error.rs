//! Error types

use crate::types::{Position, TxHash};
use thiserror::Error;

/// Rejected configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("Initial snake is empty")]
    EmptySnake,

    #[error("Initial snake overlaps itself at {0}")]
    SnakeOverlap(Position),

    #[error("{0} at {1} is outside the grid")]
    OutOfBounds(&'static str, Position),

    #[error("Initial food at {0} is on the snake")]
    FoodOnSnake(Position),
}

/// Failures reported by a ledger client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u128, available: u128 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Unknown transaction {0}")]
    UnknownTransaction(TxHash),

    #[error("Timed out waiting for {0}")]
    Timeout(TxHash),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the scoped key/value store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("Stored value for {0} is not valid UTF-8")]
    Encoding(String),
}

/// Failures of the session credential manager
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No session credential")]
    NoCredential,

    #[error("No player wallet connected")]
    NoPlayer,

    #[error("Stored session secret is corrupt: {0}")]
    CorruptSecret(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Failures of game start/end
#[derive(Error, Debug)]
pub enum GameError {
    #[error("A game is already running or starting")]
    AlreadyRunning,

    #[error("Transaction {0} reverted")]
    Reverted(TxHash),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
