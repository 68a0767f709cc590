//! Configuration

use crate::error::ConfigError;
use crate::types::{Direction, Position, FEED_CAPACITY, GRID_SIZE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Simulation and clock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Side length of the field
    pub grid_size: i32,
    /// Tick driver period in milliseconds
    pub tick_ms: u64,
    /// Game length in seconds
    pub game_duration_secs: u32,
    /// Snake at game start, head first
    pub initial_snake: Vec<Position>,
    pub initial_direction: Direction,
    pub initial_food: Position,
    /// Seed for food placement (random when unset)
    pub seed: Option<u64>,
}

impl GameConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Check the values the simulation relies on: a non-empty snake that
    /// fits the grid without overlapping, food on a free cell and a running
    /// clock
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size <= 0 {
            return Err(ConfigError::NotPositive("grid_size"));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::NotPositive("tick_ms"));
        }
        if self.game_duration_secs == 0 {
            return Err(ConfigError::NotPositive("game_duration_secs"));
        }
        if self.initial_snake.is_empty() {
            return Err(ConfigError::EmptySnake);
        }

        for (i, segment) in self.initial_snake.iter().enumerate() {
            if !segment.in_bounds(self.grid_size) {
                return Err(ConfigError::OutOfBounds("Snake segment", *segment));
            }
            if self.initial_snake[..i].contains(segment) {
                return Err(ConfigError::SnakeOverlap(*segment));
            }
        }

        if !self.initial_food.in_bounds(self.grid_size) {
            return Err(ConfigError::OutOfBounds("Food", self.initial_food));
        }
        if self.initial_snake.contains(&self.initial_food) {
            return Err(ConfigError::FoodOnSnake(self.initial_food));
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            tick_ms: 200,
            game_duration_secs: 60,
            initial_snake: vec![
                Position::new(15, 15),
                Position::new(14, 15),
                Position::new(13, 15),
                Position::new(12, 15),
            ],
            initial_direction: Direction::Right,
            initial_food: Position::new(22, 15),
            seed: None,
        }
    }
}

/// Transaction pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records kept in the feed before the oldest are evicted
    pub feed_capacity: usize,
    /// Fixed gas allowance for direction changes (skips estimation)
    pub move_gas_limit: u64,
    /// Gas allowance for start/end calls
    pub call_gas_limit: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feed_capacity: FEED_CAPACITY,
            move_gas_limit: 100_000,
            call_gas_limit: 300_000,
        }
    }
}

/// Session credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Key of the persisted secret in the scoped store
    pub storage_key: String,
    /// Periodic balance refresh in milliseconds
    pub balance_refresh_ms: u64,
    /// Delay before the refresh that follows a fund/sweep
    pub post_transfer_refresh_ms: u64,
    /// Gas estimate for a plain value transfer
    pub transfer_gas: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_key: "snake-game-session-key".to_string(),
            balance_refresh_ms: 5_000,
            post_transfer_refresh_ms: 2_000,
            transfer_gas: 21_000,
        }
    }
}

/// All core settings, as loaded from a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub game: GameConfig,
    pub pipeline: PipelineConfig,
    pub session: SessionConfig,
}
