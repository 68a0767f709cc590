//! Session Credential Manager
//!
//! Owns the ephemeral signing identity that authorizes game transactions
//! without asking the player for every move. The secret is generated
//! locally, persisted in the scoped store and never rotated automatically.
//! The player's own wallet only funds the session identity and receives
//! the sweep.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::ledger::{LocalSigner, SharedLedger, TransactionRequest, TxSigner};
use crate::store::KeyValueStore;
use crate::types::{Address, TxHash};
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Notify, task::JoinHandle};

/// The session signing identity
#[derive(Clone)]
pub struct SessionCredential {
    signer: Arc<LocalSigner>,
}

impl SessionCredential {
    fn new(signer: LocalSigner) -> Self {
        Self {
            signer: Arc::new(signer),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> Arc<dyn TxSigner> {
        self.signer.clone()
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Creates, persists and funds the session credential
pub struct SessionManager {
    ledger: SharedLedger,
    store: Arc<dyn KeyValueStore>,
    config: SessionConfig,
    credential: RwLock<Option<SessionCredential>>,
    /// Last balance read, smallest ledger unit
    balance: RwLock<u128>,
    /// Connected player wallet
    player: RwLock<Option<Arc<dyn TxSigner>>>,
    credential_changed: Notify,
}

impl SessionManager {
    pub fn new(ledger: SharedLedger, store: Arc<dyn KeyValueStore>, config: SessionConfig) -> Self {
        Self {
            ledger,
            store,
            config,
            credential: RwLock::new(None),
            balance: RwLock::new(0),
            player: RwLock::new(None),
            credential_changed: Notify::new(),
        }
    }

    /// Load the persisted secret, if any
    ///
    /// Without a stored secret the manager stays uncredentialed until
    /// [`generate`](Self::generate) is called.
    pub fn ensure_credential(&self) -> Result<Option<Address>, SessionError> {
        let Some(secret) = self.store.get(&self.config.storage_key)? else {
            tracing::info!("No stored session key");
            return Ok(None);
        };

        let signer = LocalSigner::from_bs58(&secret).map_err(SessionError::CorruptSecret)?;
        let credential = SessionCredential::new(signer);
        let address = credential.address();
        *self.credential.write() = Some(credential);
        self.credential_changed.notify_one();

        tracing::info!("Loaded session key {}", address);
        Ok(Some(address))
    }

    /// Create and persist a new secret
    ///
    /// Overwrites any previous secret: an unswept balance on the old
    /// identity becomes unreachable.
    pub fn generate(&self) -> Result<Address, SessionError> {
        let signer = LocalSigner::generate();
        self.store.set(&self.config.storage_key, &signer.to_bs58())?;

        let credential = SessionCredential::new(signer);
        let address = credential.address();
        let previous = self.credential.write().replace(credential);
        *self.balance.write() = 0;
        self.credential_changed.notify_one();

        match previous {
            Some(old) => tracing::warn!("Replaced session key {} with {}", old.address(), address),
            None => tracing::info!("Generated session key {}", address),
        }
        Ok(address)
    }

    pub fn credential(&self) -> Option<SessionCredential> {
        self.credential.read().clone()
    }

    pub fn session_address(&self) -> Option<Address> {
        self.credential.read().as_ref().map(|c| c.address())
    }

    /// Cached balance
    pub fn balance(&self) -> u128 {
        *self.balance.read()
    }

    pub fn is_funded(&self) -> bool {
        self.balance() > 0
    }

    /// Attach the player's wallet
    pub fn connect_player(&self, player: Arc<dyn TxSigner>) {
        tracing::info!("Player wallet connected: {}", player.address());
        *self.player.write() = Some(player);
    }

    pub fn disconnect_player(&self) {
        *self.player.write() = None;
    }

    pub fn player_address(&self) -> Option<Address> {
        self.player.read().as_ref().map(|p| p.address())
    }

    /// Read the session balance from the ledger
    ///
    /// On failure the cached value is kept.
    pub async fn refresh_balance(&self) -> Result<u128, SessionError> {
        let address = self.session_address().ok_or(SessionError::NoCredential)?;

        match self.ledger.read_balance(&address).await {
            Ok(balance) => {
                // Ignore the result if the credential changed meanwhile
                if self.session_address() == Some(address) {
                    *self.balance.write() = balance;
                }
                Ok(balance)
            }
            Err(e) => {
                tracing::warn!("Balance refresh failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Send `amount` from the player wallet to the session identity
    pub async fn fund(self: &Arc<Self>, amount: u128) -> Result<TxHash, SessionError> {
        let session = self.session_address().ok_or(SessionError::NoCredential)?;
        let player = self.player.read().clone().ok_or(SessionError::NoPlayer)?;

        let request = TransactionRequest::transfer(session, amount, self.config.transfer_gas);
        let hash = self
            .ledger
            .submit_transaction(request, player.as_ref())
            .await
            .map_err(|e| {
                tracing::error!("Funding session wallet failed: {}", e);
                e
            })?;

        tracing::info!("Funding {} with {} ({})", session.short(), amount, hash.short());
        self.schedule_refresh();
        Ok(hash)
    }

    /// Return the session balance minus the transfer fee to the player
    ///
    /// Does nothing when the balance does not cover the fee.
    pub async fn sweep(self: &Arc<Self>) -> Result<Option<TxHash>, SessionError> {
        let credential = self.credential().ok_or(SessionError::NoCredential)?;
        let player = self.player_address().ok_or(SessionError::NoPlayer)?;

        let balance = self.ledger.read_balance(&credential.address()).await?;
        let gas_price = self.ledger.read_gas_price().await?;
        let Some(fee) = gas_price.checked_mul(self.config.transfer_gas as u128) else {
            tracing::warn!("Nothing to sweep: transfer fee overflows at gas price {}", gas_price);
            return Ok(None);
        };
        if balance <= fee {
            tracing::info!("Nothing to sweep: balance {} does not cover fee {}", balance, fee);
            return Ok(None);
        }

        let request =
            TransactionRequest::transfer(player, balance - fee, self.config.transfer_gas);
        let hash = self
            .ledger
            .submit_transaction(request, credential.signer().as_ref())
            .await
            .map_err(|e| {
                tracing::error!("Sweep failed: {}", e);
                e
            })?;

        tracing::info!("Swept {} to {} ({})", balance - fee, player.short(), hash.short());
        self.schedule_refresh();
        Ok(Some(hash))
    }

    /// Refresh the balance every interval, and right away when a credential
    /// becomes available
    pub fn spawn_balance_refresher(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        let period = Duration::from_millis(self.config.balance_refresh_ms);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = manager.credential_changed.notified() => {}
                }
                if manager.session_address().is_some() {
                    let _ = manager.refresh_balance().await;
                }
            }
        })
    }

    /// One refresh after the ledger had time to apply a transfer
    fn schedule_refresh(self: &Arc<Self>) {
        let manager = self.clone();
        let delay = Duration::from_millis(self.config.post_transfer_refresh_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = manager.refresh_balance().await;
        });
    }
}
