//! In-process `LedgerClient`
//!
//! Signs and verifies submissions, queues them for the block producer and
//! serves reads straight from the account store and the contract state.

use crate::{
    account_store::AccountStore,
    block_producer::{BlockProducer, BlockUpdate, ReceiptMap, TransactionSender},
    config::SimLedgerConfig,
    contract::SnakeContract,
    processor::LedgerProcessor,
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use snake_core::{
    Address, ConfigError, ContractQuery, GameRecord, LeaderboardEntry, LedgerClient, LedgerError,
    Receipt, SignedTransaction, TransactionRequest, TxHash, TxSigner,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{broadcast, watch};

/// Address the snake contract is deployed at
pub fn snake_contract_address() -> Address {
    let digest = blake3::hash(b"snake-blitz/snake-game-contract");
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[..20]);
    Address(bytes)
}

/// Simulated ledger with a running block producer
pub struct SimLedger {
    config: SimLedgerConfig,
    contract_address: Address,
    accounts: Arc<AccountStore>,
    contract: Arc<RwLock<SnakeContract>>,
    receipts: ReceiptMap,
    tx_sender: TransactionSender,
    height: watch::Receiver<u64>,
    updates: broadcast::Sender<BlockUpdate>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    fail_submissions: AtomicBool,
    fail_reads: AtomicBool,
}

impl SimLedger {
    /// Create the ledger and spawn its block producer on the current runtime
    pub fn start(config: SimLedgerConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let contract_address = snake_contract_address();
        let accounts = Arc::new(AccountStore::new());
        let contract = Arc::new(RwLock::new(SnakeContract::new()));
        let receipts: ReceiptMap = Arc::new(DashMap::new());

        let processor = LedgerProcessor::new(
            accounts.clone(),
            contract.clone(),
            contract_address,
            config.gas_price,
        );
        let producer = BlockProducer::new(processor, receipts.clone(), config.clone());

        let ledger = Arc::new(Self {
            contract_address,
            accounts,
            contract,
            receipts,
            tx_sender: producer.transaction_sender(),
            height: producer.height(),
            updates: producer.update_sender(),
            running: producer.running_flag(),
            paused: producer.paused_flag(),
            fail_submissions: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            config,
        });

        tracing::info!("Snake contract deployed at {}", contract_address);
        tokio::spawn(producer.run_async());
        Ok(ledger)
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn config(&self) -> &SimLedgerConfig {
        &self.config
    }

    /// Credit `amount` to `address` outside any transaction
    pub fn mint(&self, address: Address, amount: u128) {
        self.accounts.mint(address, amount);
        tracing::debug!("Minted {} to {}", amount, address.short());
    }

    pub fn balance(&self, address: &Address) -> u128 {
        self.accounts.balance(address)
    }

    pub fn block_height(&self) -> u64 {
        *self.height.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockUpdate> {
        self.updates.subscribe()
    }

    pub fn game(&self, game_id: u64) -> Option<GameRecord> {
        self.contract.read().game(game_id).cloned()
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.contract.read().leaderboard().to_vec()
    }

    /// Reject every submission with `Unavailable`
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Reject every read with `Unavailable`
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Stop producing blocks until resumed
    pub fn pause_blocks(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Stop the block producer
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Queue an already signed transaction
    pub fn submit_signed(&self, tx: SignedTransaction) -> Result<TxHash, LedgerError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("submissions disabled".to_string()));
        }
        tx.verify()?;

        let needed = (tx.request.gas_limit as u128)
            .checked_mul(self.config.gas_price)
            .and_then(|max_fee| max_fee.checked_add(tx.request.value))
            .ok_or_else(|| LedgerError::Rejected("transaction cost overflows".to_string()))?;
        let available = self.accounts.balance(&tx.from);
        if available < needed {
            return Err(LedgerError::InsufficientFunds { needed, available });
        }

        let hash = tx.hash();
        if self.receipts.contains_key(&hash) {
            return Err(LedgerError::Rejected(format!("duplicate transaction {}", hash.short())));
        }
        self.receipts.insert(hash, None);
        if let Err(e) = self.tx_sender.send(tx) {
            self.receipts.remove(&hash);
            return Err(LedgerError::Rejected(e));
        }
        Ok(hash)
    }

    fn check_reads(&self) -> Result<(), LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn lookup(&self, hash: &TxHash) -> Result<Option<Receipt>, LedgerError> {
        self.receipts
            .get(hash)
            .map(|r| r.value().clone())
            .ok_or(LedgerError::UnknownTransaction(*hash))
    }
}

#[async_trait]
impl LedgerClient for SimLedger {
    async fn submit_transaction(
        &self,
        request: TransactionRequest,
        signer: &dyn TxSigner,
    ) -> Result<TxHash, LedgerError> {
        let nonce = self.accounts.reserve_nonce(signer.address());
        let tx = SignedTransaction::sign(request, nonce, signer);
        self.submit_signed(tx)
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<Receipt, LedgerError> {
        let mut height = self.height.clone();
        let timeout = Duration::from_millis(self.config.confirmation_timeout_ms);

        let wait = async {
            loop {
                match self.lookup(&hash) {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    Err(e) => return Err(e),
                }
                if height.changed().await.is_err() {
                    return Err(LedgerError::Unavailable("block producer stopped".to_string()));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(hash)),
        }
    }

    async fn read_balance(&self, address: &Address) -> Result<u128, LedgerError> {
        self.check_reads()?;
        Ok(self.accounts.balance(address))
    }

    async fn read_gas_price(&self) -> Result<u128, LedgerError> {
        self.check_reads()?;
        Ok(self.config.gas_price)
    }

    async fn read_value(
        &self,
        contract: &Address,
        query: &ContractQuery,
    ) -> Result<Vec<u8>, LedgerError> {
        self.check_reads()?;
        if *contract != self.contract_address {
            return Err(LedgerError::Rejected(format!("no contract at {}", contract)));
        }
        self.contract
            .read()
            .query(query)
            .map_err(|e| LedgerError::Rejected(e.to_string()))
    }
}
