//! Transaction Pipeline - single-flight move submission and the feed
//!
//! Direction changes are submitted one at a time. A move is admitted only
//! while no other move is in flight; the gate is held by a [`MoveTicket`]
//! and released when the ticket is dropped, whatever the outcome.
//! Every admitted move gets a [`TxRecord`] at the front of a bounded feed
//! which is updated in place (by id) as the ledger answers.

use crate::config::PipelineConfig;
use crate::contract::SnakeInstruction;
use crate::error::LedgerError;
use crate::ledger::{Receipt, SharedLedger, TransactionRequest, TxSigner};
use crate::types::{Address, Direction, SessionId, TxRecord, TxStatus};
use chrono::Utc;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
};
use tokio::sync::broadcast;

/// Feed change notification
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    /// A new pending record was pushed to the front
    Submitted(TxRecord),
    /// An existing record changed (hash, status or confirmation time)
    Updated(TxRecord),
    /// The feed was emptied for a new game
    Cleared,
}

/// Result of [`TransactionPipeline::submit_move`]
#[derive(Debug, Clone)]
pub enum MoveSubmission {
    /// Another move was still in flight; nothing was sent
    Rejected,
    /// The move went through the ledger; final record state
    Settled(TxRecord),
}

/// Serializes move transactions and tracks them in the feed
pub struct TransactionPipeline {
    ledger: SharedLedger,
    contract: Address,
    config: PipelineConfig,
    /// Newest first
    feed: Mutex<VecDeque<TxRecord>>,
    in_flight: Arc<AtomicBool>,
    move_count: AtomicU32,
    updates: broadcast::Sender<FeedUpdate>,
}

impl TransactionPipeline {
    pub fn new(ledger: SharedLedger, contract: Address, config: PipelineConfig) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            ledger,
            contract,
            feed: Mutex::new(VecDeque::with_capacity(config.feed_capacity)),
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
            move_count: AtomicU32::new(0),
            updates,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Acquire the gate and record a pending move
    ///
    /// Returns `None` without touching the ledger or the feed if a move is
    /// already in flight.
    pub fn begin_move(
        self: &Arc<Self>,
        direction: Direction,
        session_id: SessionId,
        signer: Arc<dyn TxSigner>,
    ) -> Option<MoveTicket> {
        let gate = GateGuard::acquire(&self.in_flight)?;

        let record = TxRecord::pending(direction);
        self.move_count.fetch_add(1, Ordering::SeqCst);
        self.push(record.clone());

        tracing::debug!("Move {} {} admitted for session {}", record.id, direction, session_id);

        Some(MoveTicket {
            pipeline: self.clone(),
            record,
            session_id,
            signer,
            _gate: gate,
        })
    }

    /// Submit a move and wait for it to settle
    pub async fn submit_move(
        self: &Arc<Self>,
        direction: Direction,
        session_id: SessionId,
        signer: Arc<dyn TxSigner>,
    ) -> MoveSubmission {
        match self.begin_move(direction, session_id, signer) {
            Some(ticket) => MoveSubmission::Settled(ticket.settle().await),
            None => {
                tracing::trace!("Move {} dropped, previous move still pending", direction);
                MoveSubmission::Rejected
            }
        }
    }

    /// Start-game write; not gated, not retried
    pub async fn submit_start(
        &self,
        signer: &dyn TxSigner,
        main_wallet: Address,
    ) -> Result<Receipt, LedgerError> {
        self.submit_call(SnakeInstruction::StartGame { main_wallet }, signer)
            .await
    }

    /// End-game write; not gated, not retried
    pub async fn submit_end(
        &self,
        signer: &dyn TxSigner,
        session_id: SessionId,
        score: u32,
    ) -> Result<Receipt, LedgerError> {
        self.submit_call(
            SnakeInstruction::EndGame {
                game_id: session_id.0,
                score,
            },
            signer,
        )
        .await
    }

    async fn submit_call(
        &self,
        instruction: SnakeInstruction,
        signer: &dyn TxSigner,
    ) -> Result<Receipt, LedgerError> {
        let request = TransactionRequest::call(
            self.contract,
            instruction.to_bytes(),
            self.config.call_gas_limit,
        );
        let hash = self.ledger.submit_transaction(request, signer).await?;
        tracing::debug!("Submitted {:?} as {}", instruction, hash.short());
        self.ledger.wait_for_confirmation(hash).await
    }

    /// Snapshot of the feed, newest first
    pub fn feed(&self) -> Vec<TxRecord> {
        self.feed.lock().iter().cloned().collect()
    }

    /// Check if a move is in flight
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Moves admitted since the last reset
    pub fn move_count(&self) -> u32 {
        self.move_count.load(Ordering::SeqCst)
    }

    /// Clear the feed and the move counter for a new game
    ///
    /// An in-flight move keeps the gate; its late result finds no record
    /// and is dropped.
    pub fn reset(&self) {
        self.feed.lock().clear();
        self.move_count.store(0, Ordering::SeqCst);
        let _ = self.updates.send(FeedUpdate::Cleared);
    }

    /// Subscribe to feed changes
    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.updates.subscribe()
    }

    fn push(&self, record: TxRecord) {
        {
            let mut feed = self.feed.lock();
            feed.push_front(record.clone());
            feed.truncate(self.config.feed_capacity);
        }
        let _ = self.updates.send(FeedUpdate::Submitted(record));
    }

    fn update(&self, record: &TxRecord) {
        let found = {
            let mut feed = self.feed.lock();
            match feed.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => {
                    *slot = record.clone();
                    true
                }
                None => false,
            }
        };

        if found {
            let _ = self.updates.send(FeedUpdate::Updated(record.clone()));
        } else {
            tracing::debug!("Record {} no longer in feed, dropping update", record.id);
        }
    }
}

/// Holds the single-flight gate; releases it on drop
struct GateGuard(Arc<AtomicBool>);

impl GateGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// An admitted move waiting to be sent and confirmed
pub struct MoveTicket {
    pipeline: Arc<TransactionPipeline>,
    record: TxRecord,
    session_id: SessionId,
    signer: Arc<dyn TxSigner>,
    _gate: GateGuard,
}

impl MoveTicket {
    pub fn record_id(&self) -> &str {
        &self.record.id
    }

    /// Send the move, wait for one confirmation and settle the record
    ///
    /// The gate is released when this returns (or the future is dropped).
    pub async fn settle(mut self) -> TxRecord {
        let pipeline = self.pipeline.clone();
        let instruction = SnakeInstruction::ChangeDirection {
            game_id: self.session_id.0,
            direction: self.record.direction.code(),
        };
        let request = TransactionRequest::call(
            pipeline.contract,
            instruction.to_bytes(),
            pipeline.config.move_gas_limit,
        );

        let hash = match pipeline
            .ledger
            .submit_transaction(request, self.signer.as_ref())
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!("Direction tx {} failed before submission: {}", self.record.id, e);
                self.record.status = TxStatus::Failed;
                self.record.confirmed_at = Some(Utc::now());
                pipeline.update(&self.record);
                return self.record;
            }
        };

        self.record.hash = Some(hash);
        pipeline.update(&self.record);

        self.record.status = match pipeline.ledger.wait_for_confirmation(hash).await {
            Ok(receipt) if receipt.is_success() => TxStatus::Confirmed,
            Ok(_) => {
                tracing::warn!("Direction tx {} reverted", hash.short());
                TxStatus::Failed
            }
            Err(e) => {
                tracing::warn!("Direction tx {} not confirmed: {}", hash.short(), e);
                TxStatus::Failed
            }
        };
        self.record.confirmed_at = Some(Utc::now());
        pipeline.update(&self.record);

        tracing::debug!(
            "Direction tx {} {} {:?} in {}ms",
            hash.short(),
            self.record.direction,
            self.record.status,
            self.record.elapsed(Utc::now()).num_milliseconds()
        );

        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LocalSigner;
    use crate::testing::MockLedger;

    fn pipeline(ledger: &Arc<MockLedger>) -> Arc<TransactionPipeline> {
        Arc::new(TransactionPipeline::new(
            ledger.clone(),
            Address([9u8; 20]),
            PipelineConfig::default(),
        ))
    }

    fn signer() -> Arc<dyn TxSigner> {
        Arc::new(LocalSigner::generate())
    }

    /// Give spawned tasks a chance to reach their next await
    async fn let_run() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_confirmed_move() {
        let ledger = Arc::new(MockLedger::new());
        let pipeline = pipeline(&ledger);

        let record = match pipeline.submit_move(Direction::Up, SessionId(3), signer()).await {
            MoveSubmission::Settled(record) => record,
            MoveSubmission::Rejected => panic!("move should be admitted"),
        };

        assert_eq!(record.status, TxStatus::Confirmed);
        assert!(record.hash.is_some());
        assert!(record.confirmed_at.is_some());
        assert_eq!(pipeline.feed(), vec![record]);
        assert!(!pipeline.is_pending());
        assert_eq!(pipeline.move_count(), 1);

        let calls = ledger.instructions();
        assert_eq!(
            calls,
            vec![SnakeInstruction::ChangeDirection { game_id: 3, direction: 0 }]
        );
        assert_eq!(ledger.gas_limits(), vec![100_000]);
    }

    #[tokio::test]
    async fn test_submission_error_marks_failed_without_hash() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_submissions(true);
        let pipeline = pipeline(&ledger);

        let MoveSubmission::Settled(record) =
            pipeline.submit_move(Direction::Left, SessionId(1), signer()).await
        else {
            panic!("move should be admitted");
        };

        assert_eq!(record.status, TxStatus::Failed);
        assert!(record.hash.is_none());
        assert!(record.confirmed_at.is_some());
        // Gate released after the error
        assert!(!pipeline.is_pending());
        ledger.fail_submissions(false);
        assert!(matches!(
            pipeline.submit_move(Direction::Up, SessionId(1), signer()).await,
            MoveSubmission::Settled(_)
        ));
    }

    #[tokio::test]
    async fn test_reverted_move_keeps_hash() {
        let ledger = Arc::new(MockLedger::new());
        ledger.revert_all(true);
        let pipeline = pipeline(&ledger);

        let MoveSubmission::Settled(record) =
            pipeline.submit_move(Direction::Down, SessionId(1), signer()).await
        else {
            panic!("move should be admitted");
        };

        assert_eq!(record.status, TxStatus::Failed);
        assert!(record.hash.is_some());
    }

    #[tokio::test]
    async fn test_second_move_rejected_while_pending() {
        let ledger = Arc::new(MockLedger::new());
        ledger.hold_confirmations(true);
        let pipeline = pipeline(&ledger);

        let first = pipeline
            .begin_move(Direction::Up, SessionId(1), signer())
            .expect("first move admitted");
        let settle = tokio::spawn(first.settle());
        let_run().await;

        assert!(pipeline.is_pending());
        let second = pipeline.submit_move(Direction::Left, SessionId(1), signer()).await;
        assert!(matches!(second, MoveSubmission::Rejected));
        assert_eq!(pipeline.feed().len(), 1);
        assert_eq!(ledger.instructions().len(), 1);
        assert_eq!(
            pipeline.feed().iter().filter(|r| r.is_pending()).count(),
            1
        );

        ledger.hold_confirmations(false);
        let record = settle.await.unwrap();
        assert_eq!(record.status, TxStatus::Confirmed);
        assert!(!pipeline.is_pending());
    }

    #[tokio::test]
    async fn test_feed_is_bounded_newest_first() {
        let ledger = Arc::new(MockLedger::new());
        let pipeline = pipeline(&ledger);
        let signer = signer();

        let mut ids = Vec::new();
        for i in 0..55 {
            let direction = Direction::ALL[i % 4];
            if let MoveSubmission::Settled(record) =
                pipeline.submit_move(direction, SessionId(1), signer.clone()).await
            {
                ids.push(record.id);
            }
        }

        let feed = pipeline.feed();
        assert_eq!(feed.len(), 50);
        assert_eq!(feed[0].id, ids[54]);
        assert_eq!(feed[49].id, ids[5]);
        assert!(feed.windows(2).all(|w| w[0].submitted_at >= w[1].submitted_at));
        assert_eq!(pipeline.move_count(), 55);
    }

    #[tokio::test]
    async fn test_late_result_after_reset_is_dropped() {
        let ledger = Arc::new(MockLedger::new());
        ledger.hold_confirmations(true);
        let pipeline = pipeline(&ledger);
        let mut updates = pipeline.subscribe();

        let ticket = pipeline
            .begin_move(Direction::Up, SessionId(1), signer())
            .unwrap();
        let settle = tokio::spawn(ticket.settle());
        let_run().await;

        pipeline.reset();
        ledger.hold_confirmations(false);
        let record = settle.await.unwrap();

        assert_eq!(record.status, TxStatus::Confirmed);
        assert!(pipeline.feed().is_empty());
        assert_eq!(pipeline.move_count(), 0);
        assert!(matches!(updates.recv().await.unwrap(), FeedUpdate::Submitted(_)));
    }

    #[tokio::test]
    async fn test_start_and_end_calls_are_not_gated() {
        let ledger = Arc::new(MockLedger::new());
        ledger.hold_confirmations(true);
        let pipeline = pipeline(&ledger);
        let signer = signer();

        let ticket = pipeline
            .begin_move(Direction::Up, SessionId(1), signer.clone())
            .unwrap();
        let settle = tokio::spawn(ticket.settle());
        let_run().await;
        ledger.hold_confirmations(false);

        let receipt = pipeline
            .submit_end(signer.as_ref(), SessionId(1), 7)
            .await
            .unwrap();
        assert!(receipt.is_success());
        assert!(ledger
            .instructions()
            .contains(&SnakeInstruction::EndGame { game_id: 1, score: 7 }));

        settle.await.unwrap();
    }
}
