//! Snake game contract interface: call payloads, queries, events and typed
//! read helpers

use crate::error::LedgerError;
use crate::ledger::SharedLedger;
use crate::types::{Address, SessionId};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Contract calls
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum SnakeInstruction {
    /// Open a game record for the signer; emits `GameStarted`
    StartGame {
        /// Player wallet credited on the leaderboard
        main_wallet: Address,
    },

    /// Record one direction change for an active game
    ChangeDirection { game_id: u64, direction: u8 },

    /// Close a game with its final score
    EndGame { game_id: u64, score: u32 },
}

impl SnakeInstruction {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("SnakeInstruction serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, LedgerError> {
        borsh::from_slice(data).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

/// Read-only contract queries
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum ContractQuery {
    Leaderboard,
    Game(u64),
    NextGameId,
}

/// Events emitted by the contract
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    GameStarted {
        game_id: u64,
        player: Address,
        main_wallet: Address,
        start_time: u64,
    },
    DirectionChanged {
        game_id: u64,
        player: Address,
        direction: u8,
        move_count: u32,
    },
    GameEnded {
        game_id: u64,
        player: Address,
        main_wallet: Address,
        score: u32,
        move_count: u32,
    },
}

impl GameEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::GameStarted { .. } => "GameStarted",
            GameEvent::DirectionChanged { .. } => "DirectionChanged",
            GameEvent::GameEnded { .. } => "GameEnded",
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("GameEvent serialization should not fail")
    }

    pub fn decode(data: &[u8]) -> Result<Self, LedgerError> {
        borsh::from_slice(data).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

/// One leaderboard row
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub player: Address,
    pub score: u32,
    pub move_count: u32,
    pub game_id: u64,
}

/// On-ledger game session record
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GameRecord {
    /// Session identity that signs moves
    pub player: Address,
    pub main_wallet: Address,
    pub start_time: u64,
    pub end_time: u64,
    pub score: u32,
    pub move_count: u32,
    pub is_active: bool,
}

/// Typed reads against the deployed contract
#[derive(Clone)]
pub struct ContractReader {
    ledger: SharedLedger,
    contract: Address,
}

impl ContractReader {
    pub fn new(ledger: SharedLedger, contract: Address) -> Self {
        Self { ledger, contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    async fn query<T: BorshDeserialize>(&self, query: ContractQuery) -> Result<T, LedgerError> {
        let bytes = self.ledger.read_value(&self.contract, &query).await?;
        borsh::from_slice(&bytes).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    /// Running session counter
    pub async fn next_session_id(&self) -> Result<SessionId, LedgerError> {
        self.query::<u64>(ContractQuery::NextGameId).await.map(SessionId)
    }

    /// Most recently allocated session (the counter already points past it)
    pub async fn latest_session_id(&self) -> Result<SessionId, LedgerError> {
        let next = self.next_session_id().await?;
        next.0
            .checked_sub(1)
            .filter(|id| *id > 0)
            .map(SessionId)
            .ok_or_else(|| LedgerError::Decode(format!("no session allocated (counter {})", next.0)))
    }

    /// Best scores, highest first
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        self.query(ContractQuery::Leaderboard).await
    }

    pub async fn session(&self, id: SessionId) -> Result<GameRecord, LedgerError> {
        self.query(ContractQuery::Game(id.0)).await
    }
}
