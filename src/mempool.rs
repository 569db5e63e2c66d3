//! Pool of transactions waiting for a block
//!
//! Each chain node keeps its own copy (`Clone` is the snapshot operation);
//! the chain's process-wide pool wraps one in a lock.

use crate::crypto::Sha256Hash;
use crate::transaction::Transaction;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mempool {
    transactions: HashMap<Sha256Hash, Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `tx` under its hash, replacing an identical entry.
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.insert(tx.hash(), tx);
    }

    pub fn remove_transaction(&mut self, hash: &Sha256Hash) -> Option<Transaction> {
        self.transactions.remove(hash)
    }

    pub fn get_transaction(&self, hash: &Sha256Hash) -> Option<&Transaction> {
        self.transactions.get(hash)
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Transactions ordered by hash so block building is reproducible.
    pub fn get_transactions(&self) -> Vec<Transaction> {
        let mut entries: Vec<(&Sha256Hash, &Transaction)> = self.transactions.iter().collect();
        entries.sort_by_key(|(hash, _)| **hash);
        entries.into_iter().map(|(_, tx)| tx.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
