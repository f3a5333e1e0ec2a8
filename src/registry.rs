//! Pending transaction registry
//!
//! Holds unsigned transactions between creation and dispatch, one map per
//! transaction kind. Each map sits behind its own mutex; no operation holds
//! more than one of them and none holds a lock across an await point.
//!
//! Presence of a hash means the transaction is waiting for its signature.
//! Absence covers both "never staged" and "already dispatched".

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::crypto::Sha256Hash;
use crate::error::{ClientError, Result};
use crate::transaction::{TxKind, UnsignedTransaction};

type PendingMap = Mutex<HashMap<Sha256Hash, UnsignedTransaction>>;

#[derive(Debug, Default)]
pub struct PendingRegistry {
    contract: PendingMap,
    config: PendingMap,
    funds: PendingMap,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: TxKind) -> &PendingMap {
        match kind {
            TxKind::Contract => &self.contract,
            TxKind::Config => &self.config,
            TxKind::Funds => &self.funds,
        }
    }

    /// Stage `tx` under its own hash, replacing any previous entry.
    pub fn put(&self, tx: UnsignedTransaction) -> Sha256Hash {
        let hash = tx.hash();
        self.map(tx.kind()).lock().insert(hash, tx);
        hash
    }

    pub fn get(&self, kind: TxKind, hash: &Sha256Hash) -> Result<UnsignedTransaction> {
        self.map(kind)
            .lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| not_found(hash))
    }

    pub fn contains(&self, kind: TxKind, hash: &Sha256Hash) -> bool {
        self.map(kind).lock().contains_key(hash)
    }

    /// Removes the entry if present. Deleting a missing hash is not an error.
    pub fn delete(&self, kind: TxKind, hash: &Sha256Hash) {
        self.map(kind).lock().remove(hash);
    }

    /// Atomic get-and-delete. Of several concurrent callers for the same hash
    /// at most one gets the transaction.
    pub fn take(&self, kind: TxKind, hash: &Sha256Hash) -> Option<UnsignedTransaction> {
        self.map(kind).lock().remove(hash)
    }

    pub fn len(&self, kind: TxKind) -> usize {
        self.map(kind).lock().len()
    }

    pub fn is_empty(&self) -> bool {
        TxKind::ALL.iter().all(|kind| self.len(*kind) == 0)
    }
}

pub(crate) fn not_found(hash: &Sha256Hash) -> ClientError {
    ClientError::NotFound(format!(
        "No transaction with hash {} found to sign",
        hex::encode(hash)
    ))
}
