//! Block Producer - fixed-interval block loop
//!
//! Drains the mempool every block, executes the batch and publishes the
//! receipts. Waiters observe the block height through a watch channel.

use crate::{
    config::SimLedgerConfig,
    processor::{LedgerProcessor, TransactionResult},
};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use dashmap::DashMap;
use snake_core::{Receipt, SignedTransaction, TxHash};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, watch};

/// Block update event sent to subscribers
#[derive(Clone, Debug)]
pub struct BlockUpdate {
    pub block: u64,
    pub transaction_count: usize,
    pub transaction_results: Vec<TransactionResult>,
    /// Block production time in microseconds
    pub processing_time_us: u64,
}

/// Handle for submitting transactions to the block producer
#[derive(Clone)]
pub struct TransactionSender {
    sender: Sender<SignedTransaction>,
}

impl TransactionSender {
    /// Submit a transaction for processing
    pub fn send(&self, tx: SignedTransaction) -> Result<(), String> {
        self.sender
            .try_send(tx)
            .map_err(|e| format!("Failed to submit transaction: {}", e))
    }
}

/// Receipts by hash; `None` while the transaction waits in the mempool
pub type ReceiptMap = Arc<DashMap<TxHash, Option<Receipt>>>;

/// Block Producer
pub struct BlockProducer {
    processor: LedgerProcessor,
    tx_receiver: Receiver<SignedTransaction>,
    tx_sender: Sender<SignedTransaction>,
    receipts: ReceiptMap,
    height: watch::Sender<u64>,
    update_sender: broadcast::Sender<BlockUpdate>,
    config: SimLedgerConfig,
    running: Arc<AtomicBool>,
    /// Blocks are skipped while set
    paused: Arc<AtomicBool>,
}

impl BlockProducer {
    pub fn new(processor: LedgerProcessor, receipts: ReceiptMap, config: SimLedgerConfig) -> Self {
        let (tx_sender, tx_receiver) = bounded(config.mempool_capacity);
        let (update_sender, _) = broadcast::channel(64);
        let (height, _) = watch::channel(processor.current_block());

        Self {
            processor,
            tx_receiver,
            tx_sender,
            receipts,
            height,
            update_sender,
            config,
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a sender for submitting transactions
    pub fn transaction_sender(&self) -> TransactionSender {
        TransactionSender {
            sender: self.tx_sender.clone(),
        }
    }

    /// Broadcaster of block updates, for subscribing after `run_async` took
    /// ownership of the producer
    pub fn update_sender(&self) -> broadcast::Sender<BlockUpdate> {
        self.update_sender.clone()
    }

    /// Watch the block height
    pub fn height(&self) -> watch::Receiver<u64> {
        self.height.subscribe()
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn paused_flag(&self) -> Arc<AtomicBool> {
        self.paused.clone()
    }

    /// Run the block producer (tokio)
    pub async fn run_async(mut self) {
        self.running.store(true, Ordering::SeqCst);

        let block_duration = Duration::from_millis(self.config.block_time_ms);
        let mut interval = tokio::time::interval(block_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut pending_txs: Vec<SignedTransaction> =
            Vec::with_capacity(self.config.max_txs_per_block);

        tracing::info!("Block producer started ({}ms blocks)", self.config.block_time_ms);

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            if self.paused.load(Ordering::SeqCst) {
                continue;
            }
            let tick_start = Instant::now();

            // Drain transaction queue
            loop {
                match self.tx_receiver.try_recv() {
                    Ok(tx) => {
                        pending_txs.push(tx);
                        if pending_txs.len() >= self.config.max_txs_per_block {
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::warn!("Transaction channel disconnected");
                        return;
                    }
                }
            }

            let transaction_results = self.processor.process_transactions(&pending_txs);
            let tx_count = pending_txs.len();
            pending_txs.clear();

            for result in &transaction_results {
                if let Some(reason) = &result.error {
                    tracing::debug!("Tx {} reverted: {}", result.receipt.hash.short(), reason);
                }
                self.receipts
                    .insert(result.receipt.hash, Some(result.receipt.clone()));
            }

            self.processor.advance_block();
            self.prune_receipts();
            self.height.send_replace(self.processor.current_block());
            let processing_time = tick_start.elapsed();

            if tx_count > 0 {
                tracing::debug!(
                    "Block {} | {} txs | {:.2}ms",
                    self.processor.current_block(),
                    tx_count,
                    processing_time.as_secs_f64() * 1000.0
                );
            }

            let update = BlockUpdate {
                block: self.processor.current_block(),
                transaction_count: tx_count,
                transaction_results,
                processing_time_us: processing_time.as_micros() as u64,
            };
            let _ = self.update_sender.send(update);

            // Warn if we're falling behind
            if processing_time > block_duration {
                tracing::warn!(
                    "Block {} took {:.2}ms (target: {}ms)",
                    self.processor.current_block(),
                    processing_time.as_secs_f64() * 1000.0,
                    self.config.block_time_ms
                );
            }
        }

        tracing::info!("Block producer stopped at block {}", self.processor.current_block());
    }

    /// Forget settled receipts older than the retention window; mempool
    /// entries are kept
    fn prune_receipts(&self) {
        let current = self.processor.current_block();
        let retention = self.config.receipt_retention_blocks;
        self.receipts.retain(|_, receipt| match receipt {
            Some(receipt) => receipt.block.saturating_add(retention) > current,
            None => true,
        });
    }
}
