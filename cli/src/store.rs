//! Deposit records and the store that holds them
//!
//! A record is written once at deposit time and mutated exactly once more,
//! when a withdrawal is confirmed. Records are never deleted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{Field, IdentityKey};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub identity_private_key: IdentityKey,
    pub identity_nullifier: Field,
    pub recipient_address: String,
    pub deposit_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_tx_hash: Option<String>,
}

impl DepositRecord {
    pub fn new(
        identity_private_key: IdentityKey,
        identity_nullifier: Field,
        recipient_address: &str,
        deposit_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            identity_private_key,
            identity_nullifier,
            recipient_address: recipient_address.to_string(),
            deposit_timestamp,
            withdrawal_tx_hash: None,
        }
    }

    /// Short stable identifier derived from the identity nullifier
    pub fn id(&self) -> String {
        record_id(&self.identity_nullifier)
    }

    pub fn is_withdrawn(&self) -> bool {
        self.withdrawal_tx_hash.is_some()
    }
}

/// First 8 bytes of SHA-256 over the nullifier, hex encoded
pub fn record_id(identity_nullifier: &Field) -> String {
    let digest = Sha256::digest(identity_nullifier.0.to_bytes_be());
    hex::encode(&digest[..8])
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no deposit record with id {0}")]
    NotFound(String),

    #[error("deposit {id} was already withdrawn in {tx_hash}")]
    AlreadyWithdrawn { id: String, tx_hash: String },

    #[error("deposit {0} is already stored")]
    Duplicate(String),

    #[error("vault error: {0}")]
    Vault(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait DepositRecordStore: Send + Sync {
    fn records(&self) -> Result<Vec<DepositRecord>, StoreError>;

    fn get(&self, id: &str) -> Result<DepositRecord, StoreError>;

    fn insert(&self, record: DepositRecord) -> Result<(), StoreError>;

    /// Set the withdrawal hash of a record, rejecting a second write
    fn record_withdrawal(&self, id: &str, tx_hash: &str) -> Result<(), StoreError>;
}

pub(crate) fn find_record<'a>(
    records: &'a [DepositRecord],
    id: &str,
) -> Result<&'a DepositRecord, StoreError> {
    records
        .iter()
        .find(|r| r.id() == id)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

pub(crate) fn apply_insert(
    records: &mut Vec<DepositRecord>,
    record: DepositRecord,
) -> Result<(), StoreError> {
    let id = record.id();
    if records.iter().any(|r| r.id() == id) {
        return Err(StoreError::Duplicate(id));
    }
    records.push(record);
    Ok(())
}

pub(crate) fn apply_withdrawal(
    records: &mut [DepositRecord],
    id: &str,
    tx_hash: &str,
) -> Result<(), StoreError> {
    let record = records
        .iter_mut()
        .find(|r| r.id() == id)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

    if let Some(existing) = &record.withdrawal_tx_hash {
        return Err(StoreError::AlreadyWithdrawn {
            id: id.to_string(),
            tx_hash: existing.clone(),
        });
    }

    record.withdrawal_tx_hash = Some(tx_hash.to_string());
    Ok(())
}

/// Non-persistent store
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<DepositRecord>>,
    withdrawal_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(records: Vec<DepositRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            withdrawal_writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful `record_withdrawal` calls
    pub fn withdrawal_writes(&self) -> usize {
        self.withdrawal_writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DepositRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DepositRecordStore for MemoryStore {
    fn records(&self) -> Result<Vec<DepositRecord>, StoreError> {
        Ok(self.lock().clone())
    }

    fn get(&self, id: &str) -> Result<DepositRecord, StoreError> {
        find_record(&self.lock(), id).cloned()
    }

    fn insert(&self, record: DepositRecord) -> Result<(), StoreError> {
        apply_insert(&mut self.lock(), record)
    }

    fn record_withdrawal(&self, id: &str, tx_hash: &str) -> Result<(), StoreError> {
        apply_withdrawal(&mut self.lock(), id, tx_hash)?;
        self.withdrawal_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
