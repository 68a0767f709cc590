//! Scriptable ledger for unit tests

use crate::contract::{ContractQuery, GameEvent, SnakeInstruction};
use crate::error::LedgerError;
use crate::ledger::{LedgerClient, Log, Receipt, ReceiptStatus, TransactionRequest, TxSigner};
use crate::types::{Address, TxHash};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;

/// Submitted transaction as seen by the mock
#[derive(Debug, Clone)]
pub struct Submitted {
    pub from: Address,
    pub request: TransactionRequest,
}

pub struct MockLedger {
    submissions: Mutex<Vec<Submitted>>,
    receipts: Mutex<HashMap<TxHash, Receipt>>,
    balances: Mutex<HashMap<Address, u128>>,
    gas_price: Mutex<u128>,
    next_hash: AtomicU64,
    next_game_id: AtomicU64,
    fail_submissions: AtomicBool,
    fail_reads: AtomicBool,
    revert_all: AtomicBool,
    emit_start_events: AtomicBool,
    held: watch::Sender<bool>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            gas_price: Mutex::new(10),
            next_hash: AtomicU64::new(1),
            next_game_id: AtomicU64::new(1),
            fail_submissions: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            revert_all: AtomicBool::new(false),
            emit_start_events: AtomicBool::new(true),
            held: watch::channel(false).0,
        }
    }

    pub fn gas_price(&self) -> u128 {
        *self.gas_price.lock()
    }

    pub fn set_gas_price(&self, price: u128) {
        *self.gas_price.lock() = price;
    }

    pub fn set_balance(&self, address: Address, amount: u128) {
        self.balances.lock().insert(address, amount);
    }

    pub fn balance_of(&self, address: &Address) -> u128 {
        self.balances.lock().get(address).copied().unwrap_or(0)
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn revert_all(&self, revert: bool) {
        self.revert_all.store(revert, Ordering::SeqCst);
    }

    /// When off, start receipts carry an undecodable log instead of `GameStarted`
    pub fn emit_start_events(&self, emit: bool) {
        self.emit_start_events.store(emit, Ordering::SeqCst);
    }

    pub fn set_next_game_id(&self, id: u64) {
        self.next_game_id.store(id, Ordering::SeqCst);
    }

    /// Keep confirmation waits pending until released
    pub fn hold_confirmations(&self, hold: bool) {
        self.held.send_replace(hold);
    }

    pub fn submissions(&self) -> Vec<Submitted> {
        self.submissions.lock().clone()
    }

    /// Decoded contract calls, in submission order
    pub fn instructions(&self) -> Vec<SnakeInstruction> {
        self.submissions
            .lock()
            .iter()
            .filter(|s| !s.request.payload.is_empty())
            .filter_map(|s| SnakeInstruction::from_bytes(&s.request.payload).ok())
            .collect()
    }

    pub fn gas_limits(&self) -> Vec<u64> {
        self.submissions
            .lock()
            .iter()
            .map(|s| s.request.gas_limit)
            .collect()
    }

    fn logs_for(&self, request: &TransactionRequest, from: Address) -> Vec<Log> {
        let Ok(SnakeInstruction::StartGame { main_wallet }) =
            SnakeInstruction::from_bytes(&request.payload)
        else {
            return Vec::new();
        };

        let game_id = self.next_game_id.fetch_add(1, Ordering::SeqCst);
        let data = if self.emit_start_events.load(Ordering::SeqCst) {
            GameEvent::GameStarted {
                game_id,
                player: from,
                main_wallet,
                start_time: 0,
            }
            .to_bytes()
        } else {
            vec![0xff, 0x00]
        };

        vec![Log {
            address: request.to,
            data,
        }]
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit_transaction(
        &self,
        request: TransactionRequest,
        signer: &dyn TxSigner,
    ) -> Result<TxHash, LedgerError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("mock submission failure".to_string()));
        }

        let from = signer.address();
        let n = self.next_hash.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        let hash = TxHash(bytes);

        if request.value > 0 {
            let mut balances = self.balances.lock();
            let from_balance = balances.entry(from).or_insert(0);
            *from_balance = from_balance.saturating_sub(request.value);
            *balances.entry(request.to).or_insert(0) += request.value;
        }

        let status = if self.revert_all.load(Ordering::SeqCst) {
            ReceiptStatus::Reverted
        } else {
            ReceiptStatus::Success
        };
        let receipt = Receipt {
            hash,
            status,
            block: n,
            gas_used: 21_000,
            logs: self.logs_for(&request, from),
        };

        self.receipts.lock().insert(hash, receipt);
        self.submissions.lock().push(Submitted { from, request });
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<Receipt, LedgerError> {
        let mut held = self.held.subscribe();
        while *held.borrow_and_update() {
            if held.changed().await.is_err() {
                break;
            }
        }

        self.receipts
            .lock()
            .get(&hash)
            .cloned()
            .ok_or(LedgerError::UnknownTransaction(hash))
    }

    async fn read_balance(&self, address: &Address) -> Result<u128, LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("mock read failure".to_string()));
        }
        Ok(self.balance_of(address))
    }

    async fn read_gas_price(&self) -> Result<u128, LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("mock read failure".to_string()));
        }
        Ok(self.gas_price())
    }

    async fn read_value(
        &self,
        _contract: &Address,
        query: &ContractQuery,
    ) -> Result<Vec<u8>, LedgerError> {
        match query {
            ContractQuery::NextGameId => {
                Ok(borsh::to_vec(&self.next_game_id.load(Ordering::SeqCst)).unwrap())
            }
            other => Err(LedgerError::Unavailable(format!("mock has no {:?}", other))),
        }
    }
}
