//! Game Loop - fixed-rate simulation driving the ledger
//!
//! Runs two periodic drivers while a game is PLAYING: the tick driver
//! (snake movement, default 200ms) and the countdown driver (once per
//! second). Neither waits on the transaction pipeline; direction changes
//! are applied to the simulation immediately and their transactions settle
//! on their own.
//!
//! All simulation state lives in one `GameState` behind a lock. Every
//! driver callback and input handler locks it synchronously and never
//! holds it across an await.

use crate::config::{GameConfig, PipelineConfig};
use crate::contract::{ContractReader, GameEvent};
use crate::error::{ConfigError, GameError};
use crate::game::{GameState, Steer, TickOutcome};
use crate::ledger::{Receipt, SharedLedger};
use crate::pipeline::TransactionPipeline;
use crate::session::SessionManager;
use crate::types::{Address, Direction, GamePhase, Position, SessionId, TxRecord};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::watch;

/// Presentation-facing view of the game
#[derive(Debug, Clone, Serialize)]
pub struct GameSnapshot {
    pub snake: Vec<Position>,
    pub food: Position,
    pub direction: Direction,
    pub score: u32,
    pub phase: GamePhase,
    pub session_id: Option<SessionId>,
    pub time_left: u32,
    pub move_count: u32,
    pub tx_pending: bool,
    pub feed: Vec<TxRecord>,
}

/// Where the session id of a started game came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIdSource {
    /// `GameStarted` event in the start receipt
    Event,
    /// Contract session counter read after the fact
    Counter,
}

/// Result of a direction request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectionChange {
    /// Not playing, reversal or same direction; nothing changed
    Ignored,
    /// Direction applied, no transaction sent (move in flight or no session)
    Local,
    /// Direction applied and a move transaction admitted (record id)
    Submitted(String),
}

struct Inner {
    config: GameConfig,
    state: Mutex<GameState>,
    ledger: SharedLedger,
    pipeline: Arc<TransactionPipeline>,
    session: Arc<SessionManager>,
    starting: AtomicBool,
    /// Stop signal for the running drivers
    drivers: Mutex<Option<watch::Sender<bool>>>,
    snapshots: watch::Sender<GameSnapshot>,
}

/// Owns the simulation and orchestrates it with the ledger
#[derive(Clone)]
pub struct GameLoop {
    inner: Arc<Inner>,
}

impl GameLoop {
    /// Create a game loop targeting the contract at `contract`
    ///
    /// Fails if `config` would leave the simulation without a snake, with
    /// food on it or without a running tick.
    pub fn new(
        ledger: SharedLedger,
        session: Arc<SessionManager>,
        contract: Address,
        config: GameConfig,
        pipeline_config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let pipeline = Arc::new(TransactionPipeline::new(
            ledger.clone(),
            contract,
            pipeline_config,
        ));
        let state = GameState::new(&config);
        let (snapshots, _) = watch::channel(snapshot_of(&state, &pipeline));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                ledger,
                pipeline,
                session,
                starting: AtomicBool::new(false),
                drivers: Mutex::new(None),
                snapshots,
            }),
        })
    }

    pub fn pipeline(&self) -> &Arc<TransactionPipeline> {
        &self.inner.pipeline
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.inner.session
    }

    pub fn contract(&self) -> Address {
        self.inner.pipeline.contract()
    }

    pub fn phase(&self) -> GamePhase {
        self.inner.state.lock().phase()
    }

    pub fn snapshot(&self) -> GameSnapshot {
        snapshot_of(&self.inner.state.lock(), &self.inner.pipeline)
    }

    /// Receive a fresh snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<GameSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Start a new game
    ///
    /// Returns `Ok(None)` without doing anything unless a session credential
    /// with a positive balance and a player wallet are available. On any
    /// ledger failure the phase stays what it was before the call.
    pub async fn start_game(&self) -> Result<Option<SessionId>, GameError> {
        let session = &self.inner.session;
        let (Some(credential), Some(player)) = (session.credential(), session.player_address())
        else {
            tracing::debug!("Start ignored: session key or player wallet missing");
            return Ok(None);
        };
        if !session.is_funded() {
            tracing::debug!("Start ignored: session wallet not funded");
            return Ok(None);
        }

        if self.phase() == GamePhase::Playing
            || self.inner.starting.swap(true, Ordering::SeqCst)
        {
            return Err(GameError::AlreadyRunning);
        }
        let _starting = StartingGuard(&self.inner.starting);

        self.inner.state.lock().reset(&self.inner.config);
        self.inner.pipeline.reset();
        self.publish();

        let receipt = self
            .inner
            .pipeline
            .submit_start(credential.signer().as_ref(), player)
            .await
            .map_err(|e| {
                tracing::error!("Failed to start game: {}", e);
                e
            })?;
        if !receipt.is_success() {
            tracing::error!("Start transaction {} reverted", receipt.hash.short());
            return Err(GameError::Reverted(receipt.hash));
        }

        let (session_id, source) = self.resolve_session_id(&receipt).await?;
        self.inner.state.lock().begin(session_id);
        self.arm_drivers();
        self.publish();

        tracing::info!("Game {} started (id from {:?})", session_id, source);
        Ok(Some(session_id))
    }

    /// Session id of a confirmed start: the decoded `GameStarted` event
    /// first, the contract counter otherwise
    async fn resolve_session_id(
        &self,
        receipt: &Receipt,
    ) -> Result<(SessionId, SessionIdSource), GameError> {
        let contract = self.contract();
        let from_event = receipt
            .logs
            .iter()
            .filter(|log| log.address == contract)
            .filter_map(|log| self.inner.ledger.decode_event(log).ok())
            .find_map(|event| match event {
                GameEvent::GameStarted { game_id, .. } => Some(SessionId(game_id)),
                _ => None,
            });
        if let Some(id) = from_event {
            return Ok((id, SessionIdSource::Event));
        }

        // A concurrent start by another player can move the counter first
        tracing::warn!(
            "No GameStarted event in {}, falling back to session counter",
            receipt.hash.short()
        );
        let id = ContractReader::new(self.inner.ledger.clone(), contract)
            .latest_session_id()
            .await
            .map_err(|e| {
                tracing::error!("Session counter read failed: {}", e);
                e
            })?;
        Ok((id, SessionIdSource::Counter))
    }

    /// Advance the simulation by one tick
    ///
    /// A crash ends the game (and awaits the end transaction).
    pub async fn tick(&self) -> TickOutcome {
        let outcome = self.inner.state.lock().tick();

        match outcome {
            TickOutcome::Skipped => {}
            TickOutcome::Crashed(crash) => {
                tracing::info!("Crashed: {:?}", crash);
                let _ = self.end_game().await;
            }
            TickOutcome::Ate { food } => {
                tracing::debug!("Food eaten, next food at {}", food);
                self.publish();
            }
            TickOutcome::Moved => self.publish(),
        }
        outcome
    }

    /// Request a new direction
    ///
    /// Applied to the simulation immediately. A move transaction is
    /// admitted only if none is in flight; otherwise the request is not
    /// queued. Never waits on the ledger.
    pub fn change_direction(&self, requested: Direction) -> DirectionChange {
        let session_id = {
            let mut state = self.inner.state.lock();
            match state.steer(requested) {
                Steer::Applied => state.session_id(),
                rejected => {
                    tracing::trace!("Direction {} ignored: {:?}", requested, rejected);
                    return DirectionChange::Ignored;
                }
            }
        };
        self.publish();

        let (Some(session_id), Some(credential)) = (session_id, self.inner.session.credential())
        else {
            return DirectionChange::Local;
        };

        match self
            .inner
            .pipeline
            .begin_move(requested, session_id, credential.signer())
        {
            Some(ticket) => {
                let id = ticket.record_id().to_string();
                let game = self.clone();
                tokio::spawn(async move {
                    ticket.settle().await;
                    game.publish();
                });
                self.publish();
                DirectionChange::Submitted(id)
            }
            None => DirectionChange::Local,
        }
    }

    /// End the running game
    ///
    /// Idempotent: returns `Ok(false)` if no game was running. The phase
    /// becomes ENDED before the end transaction is sent and stays so even
    /// if that transaction fails.
    pub async fn end_game(&self) -> Result<bool, GameError> {
        let (session_id, score) = {
            let mut state = self.inner.state.lock();
            if !state.finish() {
                return Ok(false);
            }
            (state.session_id(), state.score())
        };
        self.stop_drivers();
        self.publish();

        let (Some(session_id), Some(credential)) = (session_id, self.inner.session.credential())
        else {
            tracing::warn!("Game ended without session id or key, nothing to submit");
            return Ok(true);
        };

        tracing::info!("Game {} ended with score {}", session_id, score);
        match self
            .inner
            .pipeline
            .submit_end(credential.signer().as_ref(), session_id, score)
            .await
        {
            Ok(receipt) if receipt.is_success() => Ok(true),
            Ok(receipt) => {
                tracing::error!("End transaction {} reverted", receipt.hash.short());
                Err(GameError::Reverted(receipt.hash))
            }
            Err(e) => {
                tracing::error!("endGame tx failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// One countdown second; the game ends when it reaches zero
    async fn count_down(&self) {
        let remaining = self.inner.state.lock().count_down();
        match remaining {
            Some(0) => {
                tracing::info!("Time is up");
                let _ = self.end_game().await;
            }
            Some(_) => self.publish(),
            None => {}
        }
    }

    fn arm_drivers(&self) {
        let (stop, stopped) = watch::channel(false);
        if let Some(previous) = self.inner.drivers.lock().replace(stop) {
            let _ = previous.send(true);
        }

        let tick_period = self.inner.config.tick_interval();
        let game = self.clone();
        tokio::spawn(run_driver(tick_period, stopped.clone(), move || {
            let game = game.clone();
            async move {
                game.tick().await;
            }
        }));

        let game = self.clone();
        tokio::spawn(run_driver(Duration::from_secs(1), stopped, move || {
            let game = game.clone();
            async move {
                game.count_down().await;
            }
        }));
    }

    fn stop_drivers(&self) {
        if let Some(stop) = self.inner.drivers.lock().take() {
            let _ = stop.send(true);
        }
    }

    fn publish(&self) {
        self.inner.snapshots.send_replace(self.snapshot());
    }
}

/// Call `step` every `period` until the stop signal fires
///
/// The first call happens one period after arming.
async fn run_driver<F, Fut>(period: Duration, mut stopped: watch::Receiver<bool>, step: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stopped.changed() => break,
            _ = interval.tick() => {
                if *stopped.borrow() {
                    break;
                }
                step().await;
            }
        }
    }
}

/// Clears the `starting` flag when a start attempt finishes
struct StartingGuard<'a>(&'a AtomicBool);

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn snapshot_of(state: &GameState, pipeline: &TransactionPipeline) -> GameSnapshot {
    GameSnapshot {
        snake: state.snake().to_vec(),
        food: state.food(),
        direction: state.direction(),
        score: state.score(),
        phase: state.phase(),
        session_id: state.session_id(),
        time_left: state.time_left(),
        move_count: pipeline.move_count(),
        tx_pending: pipeline.is_pending(),
        feed: pipeline.feed(),
    }
}
