//! Core types shared by the simulation, the transaction pipeline and the
//! ledger codec

use borsh::{BorshDeserialize, BorshSerialize};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Side length of the square playing field
pub const GRID_SIZE: i32 = 30;

/// Maximum number of records kept in the transaction feed
pub const FEED_CAPACITY: usize = 50;

/// A cell on the playing field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Neighbouring cell one step in `direction` (may lie outside the field)
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx, self.y + dy)
    }

    /// Check if the cell lies on an N×N zero-indexed field
    pub fn in_bounds(self, grid_size: i32) -> bool {
        (0..grid_size).contains(&self.x) && (0..grid_size).contains(&self.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Movement direction, encoded on the ledger as a `u8`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    /// Unit vector; y grows downwards
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn arrow(self) -> char {
        match self {
            Direction::Up => '↑',
            Direction::Right => '→',
            Direction::Down => '↓',
            Direction::Left => '←',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::Up => "UP",
            Direction::Right => "RIGHT",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
        };
        f.write_str(label)
    }
}

/// Lifecycle of one game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Idle,
    Playing,
    Ended,
}

/// Identifier of a game's authoritative record on the ledger
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ledger identity (20 bytes of the blake3 digest of an ed25519 public key)
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = blake3::hash(public_key);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        Self(bytes)
    }

    /// Shortened form for log lines
    pub fn short(&self) -> String {
        let full = self.to_string();
        if full.len() <= 10 {
            return full;
        }
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec().map_err(|e| e.to_string())?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| "Invalid address length".to_string())?;
        Ok(Self(arr))
    }
}

/// Transaction hash assigned when the ledger accepts a submission
#[derive(
    Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn short(&self) -> String {
        let full = self.to_string();
        if full.len() <= 13 {
            return full;
        }
        format!("{}…{}", &full[..8], &full[full.len() - 5..])
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

/// Settlement state of a move transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// One direction-change transaction as shown in the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    /// Locally unique id (`tx-<unix millis>-<6 base36 chars>`)
    pub id: String,
    pub direction: Direction,
    pub submitted_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Absent until the ledger accepts the submission
    pub hash: Option<TxHash>,
    pub status: TxStatus,
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

impl TxRecord {
    /// Create a pending record stamped with the current time
    pub fn pending(direction: Direction) -> Self {
        let submitted_at = Utc::now();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();

        Self {
            id: format!("tx-{}-{}", submitted_at.timestamp_millis(), suffix),
            direction,
            submitted_at,
            confirmed_at: None,
            hash: None,
            status: TxStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TxStatus::Pending
    }

    /// Time from submission to settlement, or to `now` while still pending
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.confirmed_at.unwrap_or(now) - self.submitted_at
    }
}
