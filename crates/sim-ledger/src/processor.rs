//! Transaction Processor
//!
//! Applies signed transactions to the account store and the snake
//! contract. Fees are `gas_used * gas_price`; a reverted transaction still
//! pays for the gas it burned.

use crate::{
    account_store::AccountStore,
    contract::{ContractError, SnakeContract},
};
use parking_lot::RwLock;
use snake_core::{Address, Log, Receipt, ReceiptStatus, SignedTransaction};
use std::sync::Arc;

/// Gas of a plain value transfer, also the base cost of every call
pub const BASE_TX_GAS: u64 = 21_000;

/// Result of processing a single transaction
#[derive(Debug, Clone)]
pub struct TransactionResult {
    pub receipt: Receipt,
    pub error: Option<String>,
}

impl TransactionResult {
    pub fn success(&self) -> bool {
        self.receipt.is_success()
    }
}

/// Executes transactions block by block
pub struct LedgerProcessor {
    accounts: Arc<AccountStore>,
    contract: Arc<RwLock<SnakeContract>>,
    contract_address: Address,
    gas_price: u128,
    /// Block height
    current_block: u64,
}

impl LedgerProcessor {
    pub fn new(
        accounts: Arc<AccountStore>,
        contract: Arc<RwLock<SnakeContract>>,
        contract_address: Address,
        gas_price: u128,
    ) -> Self {
        Self {
            accounts,
            contract,
            contract_address,
            gas_price,
            current_block: 0,
        }
    }

    pub fn current_block(&self) -> u64 {
        self.current_block
    }

    pub fn advance_block(&mut self) {
        self.current_block += 1;
    }

    /// Process a batch into the block being built (`current_block + 1`)
    pub fn process_transactions(&self, txs: &[SignedTransaction]) -> Vec<TransactionResult> {
        let block = self.current_block + 1;
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        txs.iter().map(|tx| self.process(tx, block, now)).collect()
    }

    fn process(&self, tx: &SignedTransaction, block: u64, now: u64) -> TransactionResult {
        let hash = tx.hash();
        let request = &tx.request;

        if !self.accounts.consume_nonce(tx.from, tx.nonce) {
            return self.result(hash, block, 0, Vec::new(), Some("stale nonce".to_string()));
        }

        // Bounds every debit below: value + fee <= value + max_fee <= balance
        let Some(max_cost) = (request.gas_limit as u128)
            .checked_mul(self.gas_price)
            .and_then(|max_fee| max_fee.checked_add(request.value))
        else {
            return self.result(hash, block, 0, Vec::new(), Some("cost overflow".to_string()));
        };
        if self.accounts.balance(&tx.from) < max_cost {
            return self.result(hash, block, 0, Vec::new(), Some("insufficient funds".to_string()));
        }

        let (gas_used, outcome) = if request.to == self.contract_address {
            self.call_contract(tx, now)
        } else {
            (BASE_TX_GAS, Ok(Vec::new()))
        };
        let (gas_used, outcome) = if gas_used > request.gas_limit {
            (request.gas_limit, Err("out of gas".to_string()))
        } else {
            (gas_used, outcome)
        };

        let fee = gas_used as u128 * self.gas_price;
        match outcome {
            Ok(logs) => {
                self.accounts.debit(tx.from, request.value + fee);
                self.accounts.credit(request.to, request.value);
                self.result(hash, block, gas_used, logs, None)
            }
            Err(reason) => {
                self.accounts.debit(tx.from, fee);
                self.result(hash, block, gas_used, Vec::new(), Some(reason))
            }
        }
    }

    /// Gas burned and emitted logs; contract state only changes on success
    fn call_contract(&self, tx: &SignedTransaction, now: u64) -> (u64, Result<Vec<Log>, String>) {
        let gas = match snake_core::SnakeInstruction::from_bytes(&tx.request.payload) {
            Ok(instruction) => BASE_TX_GAS + SnakeContract::gas_for(&instruction),
            Err(_) => return (BASE_TX_GAS, Err(ContractError::InvalidInstructionData.to_string())),
        };
        if gas > tx.request.gas_limit {
            return (gas, Err("out of gas".to_string()));
        }

        let events = self
            .contract
            .write()
            .process(tx.from, &tx.request.payload, now)
            .map_err(|e| e.to_string());
        let logs = events.map(|events| {
            events
                .iter()
                .map(|event| Log {
                    address: self.contract_address,
                    data: event.to_bytes(),
                })
                .collect()
        });
        (gas, logs)
    }

    fn result(
        &self,
        hash: snake_core::TxHash,
        block: u64,
        gas_used: u64,
        logs: Vec<Log>,
        error: Option<String>,
    ) -> TransactionResult {
        let status = if error.is_none() {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Reverted
        };
        TransactionResult {
            receipt: Receipt {
                hash,
                status,
                block,
                gas_used,
                logs,
            },
            error,
        }
    }
}
