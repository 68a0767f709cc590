//! Snake simulation state
//!
//! Pure, synchronous state machine: no timers, no ledger. The game loop owns
//! one `GameState` behind a lock and drives it from its tick and countdown
//! drivers.

use crate::config::GameConfig;
use crate::types::{Direction, GamePhase, Position, SessionId};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::sync::Arc;

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing, nothing changed
    Skipped,
    Moved,
    /// Food eaten; carries the re-rolled food position
    Ate { food: Position },
    /// The game must end
    Crashed(Crash),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crash {
    Wall,
    Body,
    /// No free cell left for food
    BoardFull,
}

/// Result of a direction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steer {
    Applied,
    NotPlaying,
    Reversal,
    Unchanged,
}

/// Simulation state of one game
#[derive(Debug, Clone)]
pub struct GameState {
    /// Head first; replaced wholesale on every tick
    snake: Arc<[Position]>,
    food: Position,
    direction: Direction,
    score: u32,
    phase: GamePhase,
    time_left: u32,
    session_id: Option<SessionId>,
    grid_size: i32,
    rng: StdRng,
}

impl GameState {
    pub fn new(config: &GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            snake: Arc::from(config.initial_snake.as_slice()),
            food: config.initial_food,
            direction: config.initial_direction,
            score: 0,
            phase: GamePhase::Idle,
            time_left: config.game_duration_secs,
            session_id: None,
            grid_size: config.grid_size,
            rng,
        }
    }

    /// Restore initial simulation values; the phase is left untouched
    pub fn reset(&mut self, config: &GameConfig) {
        self.snake = Arc::from(config.initial_snake.as_slice());
        self.food = config.initial_food;
        self.direction = config.initial_direction;
        self.score = 0;
        self.time_left = config.game_duration_secs;
        self.session_id = None;
        self.grid_size = config.grid_size;
    }

    /// Enter PLAYING for a freshly started session
    pub fn begin(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
        self.phase = GamePhase::Playing;
    }

    /// Leave PLAYING; returns false if the game was not running
    pub fn finish(&mut self) -> bool {
        if self.phase != GamePhase::Playing {
            return false;
        }
        self.phase = GamePhase::Ended;
        true
    }

    /// Advance the snake by one cell
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != GamePhase::Playing {
            return TickOutcome::Skipped;
        }

        let head = self.head().step(self.direction);
        if !head.in_bounds(self.grid_size) {
            return TickOutcome::Crashed(Crash::Wall);
        }

        let grows = head == self.food;
        let body = if grows {
            &self.snake[..]
        } else {
            &self.snake[..self.snake.len() - 1]
        };
        if body.contains(&head) {
            return TickOutcome::Crashed(Crash::Body);
        }

        let mut next = Vec::with_capacity(body.len() + 1);
        next.push(head);
        next.extend_from_slice(body);
        self.snake = Arc::from(next);

        if !grows {
            return TickOutcome::Moved;
        }

        self.score += 1;
        match self.roll_food() {
            Some(food) => {
                self.food = food;
                TickOutcome::Ate { food }
            }
            None => TickOutcome::Crashed(Crash::BoardFull),
        }
    }

    /// Apply a direction change immediately if it is allowed
    pub fn steer(&mut self, requested: Direction) -> Steer {
        if self.phase != GamePhase::Playing {
            return Steer::NotPlaying;
        }
        if requested == self.direction.opposite() {
            return Steer::Reversal;
        }
        if requested == self.direction {
            return Steer::Unchanged;
        }
        self.direction = requested;
        Steer::Applied
    }

    /// One countdown second; returns the remaining time while playing
    pub fn count_down(&mut self) -> Option<u32> {
        if self.phase != GamePhase::Playing {
            return None;
        }
        self.time_left = self.time_left.saturating_sub(1);
        Some(self.time_left)
    }

    /// Pick food uniformly among cells not covered by the snake
    fn roll_food(&mut self) -> Option<Position> {
        let free: Vec<Position> = (0..self.grid_size)
            .flat_map(|y| (0..self.grid_size).map(move |x| Position::new(x, y)))
            .filter(|cell| !self.snake.contains(cell))
            .collect();
        free.choose(&mut self.rng).copied()
    }

    pub fn snake(&self) -> Arc<[Position]> {
        self.snake.clone()
    }

    pub fn head(&self) -> Position {
        self.snake[0]
    }

    pub fn food(&self) -> Position {
        self.food
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    #[cfg(test)]
    pub(crate) fn set_layout(&mut self, snake: &[Position], food: Position, direction: Direction) {
        self.snake = Arc::from(snake);
        self.food = food;
        self.direction = direction;
    }
}
