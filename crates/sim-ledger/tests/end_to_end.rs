//! Full games played by the game loop against the simulated ledger

use async_trait::async_trait;
use sim_ledger::{SimLedger, SimLedgerConfig};
use snake_core::{
    Address, ContractQuery, ContractReader, Direction, DirectionChange, GameConfig, GameEvent,
    GameLoop, GamePhase, LedgerClient, LedgerError, LocalSigner, Log, MemoryStore, PipelineConfig,
    Receipt, SessionConfig, SessionId, SessionManager, TransactionRequest, TxHash, TxSigner,
    TxStatus,
};
use std::{sync::Arc, time::Duration};

const FUNDING: u128 = 1_000_000_000;

struct Harness {
    ledger: Arc<SimLedger>,
    player: Arc<LocalSigner>,
    session: Arc<SessionManager>,
    game: GameLoop,
}

async fn harness(game_config: GameConfig) -> Harness {
    let ledger = SimLedger::start(SimLedgerConfig {
        block_time_ms: 50,
        gas_price: 1,
        confirmation_timeout_ms: 5_000,
        ..Default::default()
    })
    .unwrap();

    let player = Arc::new(LocalSigner::generate());
    ledger.mint(player.address(), 1_000_000_000_000);

    let session = Arc::new(SessionManager::new(
        ledger.clone(),
        Arc::new(MemoryStore::new()),
        SessionConfig::default(),
    ));
    session.generate().unwrap();
    session.connect_player(player.clone());

    let hash = session.fund(FUNDING).await.unwrap();
    assert!(ledger.wait_for_confirmation(hash).await.unwrap().is_success());
    assert_eq!(session.refresh_balance().await.unwrap(), FUNDING);

    let game = GameLoop::new(
        ledger.clone(),
        session.clone(),
        ledger.contract_address(),
        game_config,
        PipelineConfig::default(),
    )
    .unwrap();

    Harness {
        ledger,
        player,
        session,
        game,
    }
}

fn seeded() -> GameConfig {
    GameConfig {
        seed: Some(11),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_game_is_recorded_on_ledger() {
    let h = harness(seeded()).await;

    let id = h.game.start_game().await.unwrap();
    assert_eq!(id, Some(SessionId(1)));
    let record = h.ledger.game(1).unwrap();
    assert!(record.is_active);
    assert_eq!(record.player, h.session.session_address().unwrap());
    assert_eq!(record.main_wallet, h.player.address());

    let change = h.game.change_direction(Direction::Up);
    assert!(matches!(change, DirectionChange::Submitted(_)));
    tokio::time::sleep(Duration::from_millis(150)).await;

    let snapshot = h.game.snapshot();
    assert_eq!(snapshot.move_count, 1);
    assert!(!snapshot.tx_pending);
    assert_eq!(snapshot.feed[0].status, TxStatus::Confirmed);
    assert!(snapshot.feed[0].hash.is_some());
    assert_eq!(h.ledger.game(1).unwrap().move_count, 1);

    let score = h.game.snapshot().score;
    assert!(h.game.end_game().await.unwrap());
    assert_eq!(h.game.phase(), GamePhase::Ended);

    let record = h.ledger.game(1).unwrap();
    assert!(!record.is_active);
    assert_eq!(record.score, score);

    let reader = ContractReader::new(h.ledger.clone(), h.ledger.contract_address());
    let leaderboard = reader.leaderboard().await.unwrap();
    assert_eq!(leaderboard[0].game_id, 1);
    assert_eq!(leaderboard[0].player, h.player.address());
    assert_eq!(reader.next_session_id().await.unwrap(), SessionId(2));
    assert!(!reader.session(SessionId(1)).await.unwrap().is_active);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_closes_session_on_ledger() {
    let h = harness(GameConfig {
        game_duration_secs: 2,
        ..seeded()
    })
    .await;

    h.game.start_game().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.game.phase(), GamePhase::Ended);
    assert_eq!(h.game.snapshot().time_left, 0);
    assert!(!h.ledger.game(1).unwrap().is_active);
}

#[tokio::test(start_paused = true)]
async fn test_second_game_gets_next_session() {
    let h = harness(seeded()).await;

    assert_eq!(h.game.start_game().await.unwrap(), Some(SessionId(1)));
    h.game.end_game().await.unwrap();
    assert_eq!(h.game.start_game().await.unwrap(), Some(SessionId(2)));

    // Fresh game state, empty feed
    let snapshot = h.game.snapshot();
    assert_eq!(snapshot.phase, GamePhase::Playing);
    assert_eq!(snapshot.score, 0);
    assert!(snapshot.feed.is_empty());
    h.game.end_game().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_move_is_reported_in_feed() {
    let h = harness(seeded()).await;
    h.game.start_game().await.unwrap();

    h.ledger.fail_submissions(true);
    assert!(matches!(
        h.game.change_direction(Direction::Down),
        DirectionChange::Submitted(_)
    ));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let record = &h.game.snapshot().feed[0];
    assert_eq!(record.status, TxStatus::Failed);
    assert!(record.hash.is_none());
    // Simulation is unaffected by the ledger outcome
    assert_eq!(h.game.snapshot().direction, Direction::Down);
    assert!(!h.game.snapshot().tx_pending);

    h.ledger.fail_submissions(false);
    h.game.end_game().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sweep_returns_remainder_to_player() {
    let h = harness(seeded()).await;
    h.game.start_game().await.unwrap();
    h.game.end_game().await.unwrap();

    let session_address = h.session.session_address().unwrap();
    let before = h.ledger.balance(&h.player.address());
    let remaining = h.ledger.balance(&session_address);
    assert!(remaining < FUNDING);

    let hash = h.session.sweep().await.unwrap().unwrap();
    assert!(h.ledger.wait_for_confirmation(hash).await.unwrap().is_success());

    assert_eq!(h.ledger.balance(&session_address), 0);
    assert_eq!(h.ledger.balance(&h.player.address()), before + remaining - 21_000);

    // Nothing left to sweep
    assert_eq!(h.session.sweep().await.unwrap(), None);
}

/// Sim ledger whose events can never be decoded
struct Undecodable(Arc<SimLedger>);

#[async_trait]
impl LedgerClient for Undecodable {
    async fn submit_transaction(
        &self,
        request: TransactionRequest,
        signer: &dyn TxSigner,
    ) -> Result<TxHash, LedgerError> {
        self.0.submit_transaction(request, signer).await
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<Receipt, LedgerError> {
        self.0.wait_for_confirmation(hash).await
    }

    async fn read_balance(&self, address: &Address) -> Result<u128, LedgerError> {
        self.0.read_balance(address).await
    }

    async fn read_gas_price(&self) -> Result<u128, LedgerError> {
        self.0.read_gas_price().await
    }

    async fn read_value(
        &self,
        contract: &Address,
        query: &ContractQuery,
    ) -> Result<Vec<u8>, LedgerError> {
        self.0.read_value(contract, query).await
    }

    fn decode_event(&self, _log: &Log) -> Result<GameEvent, LedgerError> {
        Err(LedgerError::Decode("event format unknown".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_counter_fallback_targets_the_started_game() {
    let h = harness(seeded()).await;

    // Another game first, so the counter is not trivially 1
    assert_eq!(h.game.start_game().await.unwrap(), Some(SessionId(1)));
    h.game.end_game().await.unwrap();

    let game = GameLoop::new(
        Arc::new(Undecodable(h.ledger.clone())),
        h.session.clone(),
        h.ledger.contract_address(),
        seeded(),
        PipelineConfig::default(),
    )
    .unwrap();

    assert_eq!(game.start_game().await.unwrap(), Some(SessionId(2)));
    assert!(h.ledger.game(2).unwrap().is_active);
    assert!(h.ledger.game(3).is_none());

    assert!(matches!(
        game.change_direction(Direction::Up),
        DirectionChange::Submitted(_)
    ));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(game.snapshot().feed[0].status, TxStatus::Confirmed);
    assert_eq!(h.ledger.game(2).unwrap().move_count, 1);

    assert!(game.end_game().await.unwrap());
    assert!(!h.ledger.game(2).unwrap().is_active);
}
