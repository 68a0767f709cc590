//! CLI Configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sim_ledger::SimLedgerConfig;
use snake_core::CoreConfig;
use std::path::Path;

/// Everything a run can be configured with from a JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub core: CoreConfig,
    pub ledger: SimLedgerConfig,
}

impl CliConfig {
    /// Load from `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Self =
            serde_json::from_str(&raw).with_context(|| format!("Invalid config {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {:?}", path))?;
        Ok(config)
    }

    /// Check the game and ledger settings before anything is started
    pub fn validate(&self) -> Result<()> {
        self.core.game.validate()?;
        self.ledger.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.core.game.tick_ms, 200);
        assert_eq!(config.core.session.storage_key, "snake-game-session-key");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snake.json");
        std::fs::write(
            &path,
            r#"{ "core": { "game": { "game_duration_secs": 10, "seed": 4 } }, "ledger": { "block_time_ms": 20 } }"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.core.game.game_duration_secs, 10);
        assert_eq!(config.core.game.seed, Some(4));
        assert_eq!(config.core.game.grid_size, 30);
        assert_eq!(config.core.pipeline.move_gas_limit, 100_000);
        assert_eq!(config.ledger.block_time_ms, 20);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(CliConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_rejects_unplayable_values() {
        let dir = tempfile::tempdir().unwrap();
        for raw in [
            r#"{ "core": { "game": { "initial_snake": [] } } }"#,
            r#"{ "core": { "game": { "tick_ms": 0 } } }"#,
            r#"{ "core": { "game": { "initial_food": { "x": 14, "y": 15 } } } }"#,
            r#"{ "ledger": { "block_time_ms": 0 } }"#,
        ] {
            let path = dir.path().join("snake.json");
            std::fs::write(&path, raw).unwrap();
            assert!(CliConfig::load(Some(&path)).is_err(), "accepted {}", raw);
        }
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut config = CliConfig::default();
        config.ledger.block_time_ms = 0;
        assert!(config.validate().is_err());
    }
}
