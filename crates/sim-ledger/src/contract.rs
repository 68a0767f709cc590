//! Snake Game Contract
//!
//! Executes `SnakeInstruction`s against the on-ledger game records and
//! answers read-only `ContractQuery`s. State only changes when an
//! instruction succeeds.

use borsh::BorshSerialize;
use snake_core::{
    Address, ContractQuery, GameEvent, GameRecord, LeaderboardEntry, SnakeInstruction,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Number of leaderboard rows kept
pub const LEADERBOARD_SIZE: usize = 10;

/// Execution gas on top of the base transaction gas
pub const START_GAME_GAS: u64 = 60_000;
pub const CHANGE_DIRECTION_GAS: u64 = 25_000;
pub const END_GAME_GAS: u64 = 90_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Invalid instruction data")]
    InvalidInstructionData,

    #[error("Game {0} not found")]
    GameNotFound(u64),

    #[error("Game {0} is not active")]
    GameNotActive(u64),

    #[error("Caller is not the player of game {0}")]
    NotPlayer(u64),

    #[error("Invalid direction {0}")]
    InvalidDirection(u8),
}

/// Contract state
#[derive(Debug, Clone)]
pub struct SnakeContract {
    games: BTreeMap<u64, GameRecord>,
    next_game_id: u64,
    leaderboard: Vec<LeaderboardEntry>,
}

impl SnakeContract {
    pub fn new() -> Self {
        Self {
            games: BTreeMap::new(),
            next_game_id: 1,
            leaderboard: Vec::new(),
        }
    }

    /// Gas an instruction costs beyond the base transaction gas
    pub fn gas_for(instruction: &SnakeInstruction) -> u64 {
        match instruction {
            SnakeInstruction::StartGame { .. } => START_GAME_GAS,
            SnakeInstruction::ChangeDirection { .. } => CHANGE_DIRECTION_GAS,
            SnakeInstruction::EndGame { .. } => END_GAME_GAS,
        }
    }

    /// Process instruction
    pub fn process(
        &mut self,
        sender: Address,
        instruction_data: &[u8],
        now: u64,
    ) -> Result<Vec<GameEvent>, ContractError> {
        let instruction = SnakeInstruction::from_bytes(instruction_data)
            .map_err(|_| ContractError::InvalidInstructionData)?;

        let event = match instruction {
            SnakeInstruction::StartGame { main_wallet } => {
                self.process_start_game(sender, main_wallet, now)
            }
            SnakeInstruction::ChangeDirection { game_id, direction } => {
                self.process_change_direction(sender, game_id, direction)?
            }
            SnakeInstruction::EndGame { game_id, score } => {
                self.process_end_game(sender, game_id, score, now)?
            }
        };
        Ok(vec![event])
    }

    fn process_start_game(&mut self, sender: Address, main_wallet: Address, now: u64) -> GameEvent {
        let game_id = self.next_game_id;
        self.next_game_id += 1;

        self.games.insert(
            game_id,
            GameRecord {
                player: sender,
                main_wallet,
                start_time: now,
                end_time: 0,
                score: 0,
                move_count: 0,
                is_active: true,
            },
        );

        GameEvent::GameStarted {
            game_id,
            player: sender,
            main_wallet,
            start_time: now,
        }
    }

    fn process_change_direction(
        &mut self,
        sender: Address,
        game_id: u64,
        direction: u8,
    ) -> Result<GameEvent, ContractError> {
        if direction > 3 {
            return Err(ContractError::InvalidDirection(direction));
        }
        let game = self.active_game(sender, game_id)?;
        game.move_count += 1;

        Ok(GameEvent::DirectionChanged {
            game_id,
            player: sender,
            direction,
            move_count: game.move_count,
        })
    }

    fn process_end_game(
        &mut self,
        sender: Address,
        game_id: u64,
        score: u32,
        now: u64,
    ) -> Result<GameEvent, ContractError> {
        let game = self.active_game(sender, game_id)?;
        game.is_active = false;
        game.end_time = now;
        game.score = score;

        let event = GameEvent::GameEnded {
            game_id,
            player: sender,
            main_wallet: game.main_wallet,
            score,
            move_count: game.move_count,
        };
        let entry = LeaderboardEntry {
            player: game.main_wallet,
            score,
            move_count: game.move_count,
            game_id,
        };
        self.record_score(entry);
        Ok(event)
    }

    fn active_game(&mut self, sender: Address, game_id: u64) -> Result<&mut GameRecord, ContractError> {
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or(ContractError::GameNotFound(game_id))?;
        if !game.is_active {
            return Err(ContractError::GameNotActive(game_id));
        }
        if game.player != sender {
            return Err(ContractError::NotPlayer(game_id));
        }
        Ok(game)
    }

    /// Keep the best scores, earlier games first on ties
    fn record_score(&mut self, entry: LeaderboardEntry) {
        let at = self
            .leaderboard
            .iter()
            .position(|e| e.score < entry.score)
            .unwrap_or(self.leaderboard.len());
        if at < LEADERBOARD_SIZE {
            self.leaderboard.insert(at, entry);
            self.leaderboard.truncate(LEADERBOARD_SIZE);
        }
    }

    /// Answer a read-only query with its borsh encoding
    pub fn query(&self, query: &ContractQuery) -> Result<Vec<u8>, ContractError> {
        match query {
            ContractQuery::Leaderboard => Ok(encode(&self.leaderboard)),
            ContractQuery::Game(id) => self
                .games
                .get(id)
                .map(encode)
                .ok_or(ContractError::GameNotFound(*id)),
            ContractQuery::NextGameId => Ok(encode(&self.next_game_id)),
        }
    }

    pub fn game(&self, game_id: u64) -> Option<&GameRecord> {
        self.games.get(&game_id)
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }
}

impl Default for SnakeContract {
    fn default() -> Self {
        Self::new()
    }
}

fn encode<T: BorshSerialize + ?Sized>(value: &T) -> Vec<u8> {
    borsh::to_vec(value).expect("query result serialization should not fail")
}
