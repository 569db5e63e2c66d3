use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::transaction::{Amount, Output, Transaction, Utxo};
use std::collections::HashMap;

/// The set of spendable outputs of one branch.
///
/// Cloning produces an independent snapshot; chain nodes never share one.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UtxoPool {
    pub utxo_set: HashMap<Utxo, Output>,
}

impl UtxoPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_utxo(&mut self, utxo: Utxo, output: Output) {
        self.utxo_set.insert(utxo, output);
    }

    pub fn remove_utxo(&mut self, utxo: &Utxo) -> Option<Output> {
        self.utxo_set.remove(utxo)
    }

    pub fn get_output(&self, utxo: &Utxo) -> Option<&Output> {
        self.utxo_set.get(utxo)
    }

    pub fn contains(&self, utxo: &Utxo) -> bool {
        self.utxo_set.contains_key(utxo)
    }

    pub fn len(&self) -> usize {
        self.utxo_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxo_set.is_empty()
    }

    /// All references, sorted so callers see a stable order.
    pub fn all_utxos(&self) -> Vec<Utxo> {
        let mut utxos: Vec<Utxo> = self.utxo_set.keys().copied().collect();
        utxos.sort();
        utxos
    }

    pub fn get_balance(&self, address: &Address) -> Amount {
        self.utxo_set
            .values()
            .filter(|o| &o.owner == address)
            .fold(Amount::ZERO, |acc, o| acc.saturating_add(o.value))
    }

    /// Credits every output of `tx` without looking at its inputs.
    pub fn credit_outputs(&mut self, tx: &Transaction) {
        for (utxo, output) in tx.produced_utxos() {
            self.add_utxo(utxo, output.clone());
        }
    }

    /// Consumes the inputs of `tx` and credits its outputs.
    ///
    /// Callers validate first; a missing input is reported and leaves the pool
    /// unchanged.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<()> {
        if let Some(missing) = tx.inputs.iter().map(|i| i.utxo()).find(|u| !self.contains(u)) {
            return Err(ChainError::UtxoNotFound(format!(
                "Input UTXO {} not found while applying {}",
                missing,
                tx.hash_str()
            )));
        }
        for input in &tx.inputs {
            self.utxo_set.remove(&input.utxo());
        }
        self.credit_outputs(tx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_string;

    #[test]
    fn test_apply_transaction_moves_value() {
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");
        let coinbase = Transaction::coinbase(Amount::from_num(10), alice, 0);

        let mut pool = UtxoPool::new();
        pool.credit_outputs(&coinbase);
        assert_eq!(pool.get_balance(&alice), Amount::from_num(10));

        let mut spend = Transaction::new();
        spend.add_input(coinbase.hash(), 0);
        spend.add_output(Amount::from_num(7), bob);
        spend.add_output(Amount::from_num(3), alice);
        pool.apply_transaction(&spend).unwrap();

        assert!(!pool.contains(&Utxo::new(coinbase.hash(), 0)));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get_balance(&bob), Amount::from_num(7));
        assert_eq!(pool.get_balance(&alice), Amount::from_num(3));
    }

    #[test]
    fn test_apply_missing_input_leaves_pool_untouched() {
        let alice = address_from_string("alice");
        let coinbase = Transaction::coinbase(Amount::from_num(5), alice, 0);
        let mut pool = UtxoPool::new();
        pool.credit_outputs(&coinbase);
        let before = pool.clone();

        let mut spend = Transaction::new();
        spend.add_input(coinbase.hash(), 0);
        spend.add_input([9u8; 32], 0);
        spend.add_output(Amount::from_num(5), alice);

        assert!(matches!(
            pool.apply_transaction(&spend),
            Err(ChainError::UtxoNotFound(_))
        ));
        assert_eq!(pool, before);
    }

    #[test]
    fn test_snapshots_are_independent() {
        let alice = address_from_string("alice");
        let coinbase = Transaction::coinbase(Amount::from_num(5), alice, 0);
        let mut parent = UtxoPool::new();
        parent.credit_outputs(&coinbase);

        let mut child = parent.clone();
        child.remove_utxo(&Utxo::new(coinbase.hash(), 0));

        assert_eq!(parent.len(), 1);
        assert!(child.is_empty());
    }

    #[test]
    fn test_all_utxos_sorted() {
        let alice = address_from_string("alice");
        let mut pool = UtxoPool::new();
        pool.add_utxo(Utxo::new([2u8; 32], 0), Output::new(Amount::from_num(1), alice));
        pool.add_utxo(Utxo::new([1u8; 32], 3), Output::new(Amount::from_num(1), alice));
        pool.add_utxo(Utxo::new([1u8; 32], 1), Output::new(Amount::from_num(1), alice));

        assert_eq!(
            pool.all_utxos(),
            vec![
                Utxo::new([1u8; 32], 1),
                Utxo::new([1u8; 32], 3),
                Utxo::new([2u8; 32], 0),
            ]
        );
        assert_eq!(pool.get_balance(&alice), Amount::from_num(3));
    }
}
