//! Snake Blitz
//!
//! Plays autopilot snake games against the simulated ledger. Every
//! direction change becomes a signed transaction from the session wallet;
//! the session secret is persisted in the data directory and survives
//! restarts.

use anyhow::{Context, Result};
use clap::Parser;
use sim_ledger::{BlockUpdate, SimLedger};
use snake_core::{
    ContractReader, FeedUpdate, GameLoop, GamePhase, LedgerClient, LocalSigner, SessionId,
    SessionManager, SledStore, TxSigner,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod autopilot;
mod config;

use config::CliConfig;

/// Scope of the session secret in the key/value store
const STORE_SCOPE: &str = "snake-blitz";

/// How long to wait for a game to close on the ledger
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Snake Blitz - every move is a transaction
#[derive(Parser, Debug)]
#[command(name = "snake-blitz")]
#[command(about = "Ledger-driven snake with per-move transactions", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for the session key store
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Block time in milliseconds (overrides the config file)
    #[arg(long)]
    block_time_ms: Option<u64>,

    /// Number of games to play
    #[arg(long, default_value = "1")]
    games: u32,

    /// Amount sent from the player wallet to the session wallet
    #[arg(long, default_value = "100000000000000000")]
    fund_amount: u128,

    /// Replace the stored session key with a fresh one
    #[arg(long)]
    regenerate_session: bool,

    /// Seed for food placement
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = CliConfig::load(args.config.as_deref())?;
    if let Some(block_time_ms) = args.block_time_ms {
        config.ledger.block_time_ms = block_time_ms;
    }
    if args.seed.is_some() {
        config.core.game.seed = args.seed;
    }
    config.validate()?;

    tracing::info!("Starting Snake Blitz");
    tracing::info!("  Block time: {}ms", config.ledger.block_time_ms);
    tracing::info!("  Tick: {}ms", config.core.game.tick_ms);
    tracing::info!("  Game length: {}s", config.core.game.game_duration_secs);
    tracing::info!("  Data directory: {:?}", args.data_dir);

    tokio::select! {
        result = run(&args, config) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
    }
}

async fn run(args: &Args, config: CliConfig) -> Result<()> {
    std::fs::create_dir_all(&args.data_dir)?;
    let store = Arc::new(SledStore::open(&args.data_dir, STORE_SCOPE)?);

    let ledger = SimLedger::start(config.ledger.clone())?;
    let block_logger = spawn_block_logger(&ledger);

    // Player wallet, funded out of thin air
    let player = Arc::new(LocalSigner::generate());
    ledger.mint(player.address(), args.fund_amount.saturating_mul(10));
    tracing::info!("Player wallet {}", player.address());

    let session = Arc::new(SessionManager::new(
        ledger.clone(),
        store.clone(),
        config.core.session.clone(),
    ));
    let session_address = if args.regenerate_session {
        session.generate()?
    } else {
        match session.ensure_credential()? {
            Some(address) => address,
            None => session.generate()?,
        }
    };
    tracing::info!("Session wallet {}", session_address);
    session.connect_player(player.clone());
    let refresher = session.spawn_balance_refresher();

    let hash = session.fund(args.fund_amount).await?;
    let receipt = ledger.wait_for_confirmation(hash).await?;
    anyhow::ensure!(receipt.is_success(), "funding transaction {} reverted", hash);
    session.refresh_balance().await?;

    let game = GameLoop::new(
        ledger.clone(),
        session.clone(),
        ledger.contract_address(),
        config.core.game.clone(),
        config.core.pipeline.clone(),
    )?;
    let feed_logger = spawn_feed_logger(&game);
    let reader = ContractReader::new(ledger.clone(), ledger.contract_address());

    for round in 1..=args.games {
        tracing::info!("Game {}/{}", round, args.games);
        let session_id = play(&game, config.core.game.grid_size).await?;
        wait_until_closed(&reader, session_id).await;
    }

    for (rank, entry) in reader.leaderboard().await?.iter().enumerate() {
        tracing::info!(
            "#{} {} score {} ({} moves, game {})",
            rank + 1,
            entry.player.short(),
            entry.score,
            entry.move_count,
            entry.game_id
        );
    }

    if let Some(hash) = session.sweep().await? {
        ledger.wait_for_confirmation(hash).await?;
    }
    tracing::info!(
        "Player balance {}, session balance {}",
        ledger.balance(&player.address()),
        ledger.balance(&session_address)
    );

    store.flush()?;
    feed_logger.abort();
    block_logger.abort();
    refresher.abort();
    ledger.shutdown();

    Ok(())
}

/// Play one game to the end, steering with the autopilot
async fn play(game: &GameLoop, grid_size: i32) -> Result<SessionId> {
    let mut snapshots = game.subscribe();
    let session_id = game
        .start_game()
        .await?
        .context("session wallet not ready to start a game")?;

    loop {
        if snapshots.changed().await.is_err() {
            break;
        }
        let snapshot = snapshots.borrow_and_update().clone();
        if snapshot.phase != GamePhase::Playing {
            // Snapshots published before the start confirmed
            if snapshot.phase == GamePhase::Ended && snapshot.session_id == Some(session_id) {
                break;
            }
            continue;
        }
        if let Some(direction) = autopilot::choose_direction(&snapshot, grid_size) {
            game.change_direction(direction);
        }
    }

    let snapshot = game.snapshot();
    tracing::info!(
        "Game {} over: score {}, {} moves on ledger",
        session_id,
        snapshot.score,
        snapshot.move_count
    );
    Ok(session_id)
}

/// Wait for the end-game write to land so the next game and the sweep
/// see its fees and score
async fn wait_until_closed(reader: &ContractReader, session_id: SessionId) {
    let poll = async {
        loop {
            match reader.session(session_id).await {
                Ok(record) if !record.is_active => return,
                Ok(_) => {}
                Err(e) => tracing::warn!("Reading game {} failed: {}", session_id, e),
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, poll).await.is_err() {
        tracing::warn!("Game {} still open on the ledger", session_id);
    }
}

fn spawn_feed_logger(game: &GameLoop) -> tokio::task::JoinHandle<()> {
    let mut updates = game.pipeline().subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(FeedUpdate::Submitted(record)) => {
                    tracing::debug!("{} {} pending", record.id, record.direction.arrow());
                }
                Ok(FeedUpdate::Updated(record)) if !record.is_pending() => {
                    tracing::info!(
                        "{} {} {:?} {}",
                        record.direction.arrow(),
                        record.hash.map(|h| h.short()).unwrap_or_default(),
                        record.status,
                        record
                            .confirmed_at
                            .map(|at| format!("{}ms", record.elapsed(at).num_milliseconds()))
                            .unwrap_or_default()
                    );
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Feed logger lagged by {} updates", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_block_logger(ledger: &SimLedger) -> tokio::task::JoinHandle<()> {
    let mut updates = ledger.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(BlockUpdate {
                    block,
                    transaction_count,
                    transaction_results,
                    processing_time_us,
                }) if transaction_count > 0 => {
                    let reverted = transaction_results.iter().filter(|r| !r.success()).count();
                    tracing::debug!(
                        "Block {} | {} txs ({} reverted) | {}us",
                        block,
                        transaction_count,
                        reverted,
                        processing_time_us
                    );
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Block logger lagged by {} blocks", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
