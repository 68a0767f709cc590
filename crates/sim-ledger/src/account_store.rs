//! In-memory account balances and nonces using DashMap for concurrent access

use dashmap::DashMap;
use snake_core::Address;
use std::sync::Arc;

/// Balance and replay state of one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: u128,
    /// Lowest nonce the next executed transaction may carry
    pub nonce: u64,
}

/// Thread-safe in-memory account storage
#[derive(Clone)]
pub struct AccountStore {
    /// Executed state
    accounts: Arc<DashMap<Address, Account>>,
    /// Next nonce handed out to submissions, ahead of execution
    submitted_nonces: Arc<DashMap<Address, u64>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            submitted_nonces: Arc::new(DashMap::new()),
        }
    }

    pub fn get_account(&self, address: &Address) -> Account {
        self.accounts.get(address).map(|a| *a).unwrap_or_default()
    }

    /// Balance (0 if the account doesn't exist)
    pub fn balance(&self, address: &Address) -> u128 {
        self.get_account(address).balance
    }

    /// Create value out of thin air; saturates at `u128::MAX`
    pub fn mint(&self, address: Address, amount: u128) {
        let mut account = self.accounts.entry(address).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    /// Hand out the next submission nonce for `address`
    pub fn reserve_nonce(&self, address: Address) -> u64 {
        let mut next = self.submitted_nonces.entry(address).or_insert(0);
        let nonce = *next;
        *next += 1;
        nonce
    }

    /// Accept `nonce` for execution; false if it is stale
    pub fn consume_nonce(&self, address: Address, nonce: u64) -> bool {
        let mut account = self.accounts.entry(address).or_default();
        if nonce < account.nonce || nonce == u64::MAX {
            return false;
        }
        account.nonce = nonce + 1;
        true
    }

    /// Remove `amount`; false (and no change) if the balance is short
    pub fn debit(&self, address: Address, amount: u128) -> bool {
        let mut account = self.accounts.entry(address).or_default();
        if account.balance < amount {
            return false;
        }
        account.balance -= amount;
        true
    }

    /// Add `amount`; saturates at `u128::MAX`
    pub fn credit(&self, address: Address, amount: u128) {
        let mut account = self.accounts.entry(address).or_default();
        account.balance = account.balance.saturating_add(amount);
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}
