//! Ledger client seam
//!
//! The remote ledger is an external collaborator. Everything the game needs
//! from it goes through [`LedgerClient`]: signed writes, confirmation waits,
//! balance/gas reads, contract queries and event decoding.

use crate::contract::{ContractQuery, GameEvent};
use crate::error::LedgerError;
use crate::types::{Address, TxHash};
use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use std::{fmt, sync::Arc};

/// Unsigned transaction body
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransactionRequest {
    /// Recipient (contract or account)
    pub to: Address,
    /// Value transferred in the smallest ledger unit
    pub value: u128,
    /// Borsh-encoded contract instruction (empty for plain transfers)
    pub payload: Vec<u8>,
    /// Gas allowance; no pre-flight estimation is performed
    pub gas_limit: u64,
}

impl TransactionRequest {
    /// Contract call carrying no value
    pub fn call(to: Address, payload: Vec<u8>, gas_limit: u64) -> Self {
        Self {
            to,
            value: 0,
            payload,
            gas_limit,
        }
    }

    /// Plain value transfer
    pub fn transfer(to: Address, value: u128, gas_limit: u64) -> Self {
        Self {
            to,
            value,
            payload: Vec::new(),
            gas_limit,
        }
    }
}

/// A request bound to a sender, nonce and signature
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedTransaction {
    pub from: Address,
    pub public_key: [u8; 32],
    pub nonce: u64,
    pub request: TransactionRequest,
    pub signature: [u8; 64],
}

impl SignedTransaction {
    /// Bytes covered by the signature
    pub fn signing_message(from: &Address, nonce: u64, request: &TransactionRequest) -> Vec<u8> {
        borsh::to_vec(&(from, nonce, request)).expect("request serialization should not fail")
    }

    /// Sign `request` as the signer's identity
    pub fn sign(request: TransactionRequest, nonce: u64, signer: &dyn TxSigner) -> Self {
        let from = signer.address();
        let message = Self::signing_message(&from, nonce, &request);
        Self {
            from,
            public_key: signer.public_key(),
            nonce,
            signature: signer.sign(&message),
            request,
        }
    }

    /// Hash over the full signed encoding
    pub fn hash(&self) -> TxHash {
        let bytes = borsh::to_vec(self).expect("transaction serialization should not fail");
        TxHash(*blake3::hash(&bytes).as_bytes())
    }

    /// Check that the signature is valid and the key matches the sender
    pub fn verify(&self) -> Result<(), LedgerError> {
        if Address::from_public_key(&self.public_key) != self.from {
            return Err(LedgerError::InvalidSignature);
        }
        let key = VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| LedgerError::InvalidSignature)?;
        let signature = Signature::from_bytes(&self.signature);
        let message = Self::signing_message(&self.from, self.nonce, &self.request);
        key.verify(&message, &signature)
            .map_err(|_| LedgerError::InvalidSignature)
    }
}

/// Outcome reported by the ledger for a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Event emitted by a contract
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    pub data: Vec<u8>,
}

/// Confirmation of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub hash: TxHash,
    pub status: ReceiptStatus,
    pub block: u64,
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// Anything able to authorize transactions for an identity
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;
    fn public_key(&self) -> [u8; 32];
    fn sign(&self, message: &[u8]) -> [u8; 64];
}

/// In-process ed25519 signer
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Generate a fresh identity
    pub fn generate() -> Self {
        Self::from_secret(rand::random::<[u8; 32]>())
    }

    pub fn from_secret(secret: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&secret);
        let address = Address::from_public_key(&key.verifying_key().to_bytes());
        Self { key, address }
    }

    /// Parse a bs58-encoded secret
    pub fn from_bs58(encoded: &str) -> Result<Self, String> {
        let bytes = bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|e| e.to_string())?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "Invalid secret length".to_string())?;
        Ok(Self::from_secret(secret))
    }

    pub fn to_bs58(&self) -> String {
        bs58::encode(self.key.to_bytes()).into_string()
    }
}

impl TxSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message).to_bytes()
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Asynchronous ledger surface consumed by the game
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sign and submit; resolves once the ledger accepted the transaction
    async fn submit_transaction(
        &self,
        request: TransactionRequest,
        signer: &dyn TxSigner,
    ) -> Result<TxHash, LedgerError>;

    /// Wait for one confirmation
    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<Receipt, LedgerError>;

    async fn read_balance(&self, address: &Address) -> Result<u128, LedgerError>;

    async fn read_gas_price(&self) -> Result<u128, LedgerError>;

    /// Run a read-only contract query; the result is borsh-encoded
    async fn read_value(
        &self,
        contract: &Address,
        query: &ContractQuery,
    ) -> Result<Vec<u8>, LedgerError>;

    fn decode_event(&self, log: &Log) -> Result<GameEvent, LedgerError> {
        GameEvent::decode(&log.data)
    }
}

/// Shared handle to a ledger client
pub type SharedLedger = Arc<dyn LedgerClient>;
