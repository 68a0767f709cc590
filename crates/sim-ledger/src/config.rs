//! Simulated ledger configuration

use serde::{Deserialize, Serialize};
use snake_core::ConfigError;

/// Simulated ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimLedgerConfig {
    /// Block time in milliseconds
    pub block_time_ms: u64,
    /// Maximum transactions per block
    pub max_txs_per_block: usize,
    /// Mempool capacity; submissions beyond it are rejected
    pub mempool_capacity: usize,
    /// Price of one gas unit, smallest ledger unit
    pub gas_price: u128,
    /// How long `wait_for_confirmation` waits before giving up
    pub confirmation_timeout_ms: u64,
    /// Blocks a settled receipt stays queryable
    pub receipt_retention_blocks: u64,
}

impl Default for SimLedgerConfig {
    fn default() -> Self {
        Self {
            block_time_ms: crate::BLOCK_TIME_MS,
            max_txs_per_block: crate::MAX_TXS_PER_BLOCK,
            mempool_capacity: 1024,
            gas_price: 1_000_000_000,
            confirmation_timeout_ms: 30_000,
            receipt_retention_blocks: 4_096,
        }
    }
}

impl SimLedgerConfig {
    /// Reject values that would stall block production or the mempool
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_time_ms == 0 {
            return Err(ConfigError::NotPositive("block_time_ms"));
        }
        if self.max_txs_per_block == 0 {
            return Err(ConfigError::NotPositive("max_txs_per_block"));
        }
        if self.mempool_capacity == 0 {
            return Err(ConfigError::NotPositive("mempool_capacity"));
        }
        if self.receipt_retention_blocks == 0 {
            return Err(ConfigError::NotPositive("receipt_retention_blocks"));
        }
        Ok(())
    }
}
