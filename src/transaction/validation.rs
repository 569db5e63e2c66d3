/// Validation logic for transactions separated from type definitions
use crate::blockchain::UtxoPool;
use crate::crypto::{address_from_public_key, Secp256k1Verifier, SignatureVerifier};
use crate::error::{ChainError, Result};
use crate::transaction::types::{Amount, Transaction};
use std::collections::HashSet;

/// Checks transactions against a UTXO pool.
///
/// Validation never mutates the pool it is given; [`TxValidator::apply_valid`]
/// works on a copy.
#[derive(Debug, Clone, Default)]
pub struct TxValidator<V = Secp256k1Verifier> {
    verifier: V,
}

impl TxValidator<Secp256k1Verifier> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: SignatureVerifier> TxValidator<V> {
    pub fn with_verifier(verifier: V) -> Self {
        TxValidator { verifier }
    }

    pub fn is_valid(&self, tx: &Transaction, pool: &UtxoPool) -> bool {
        self.check(tx, pool).is_ok()
    }

    /// Full check of `tx` against `pool`. Returns the implicit fee on success.
    pub fn check(&self, tx: &Transaction, pool: &UtxoPool) -> Result<Amount> {
        self.check_proofs(tx, pool)?;
        self.check_amounts(tx, pool)
    }

    /// Rules 1 and 2: every input exists and carries a valid proof by its owner.
    ///
    /// Outputs are immutable, so once this passes for an input set it keeps
    /// passing for as long as those UTXOs exist.
    fn check_proofs(&self, tx: &Transaction, pool: &UtxoPool) -> Result<()> {
        for (i, input) in tx.inputs.iter().enumerate() {
            let utxo = input.utxo();
            let output = pool.get_output(&utxo).ok_or_else(|| {
                ChainError::UtxoNotFound(format!("Input {} references unknown UTXO {}", i, utxo))
            })?;

            let (signature, public_key) = match (&input.signature, &input.public_key) {
                (Some(sig), Some(pk)) => (sig, pk),
                _ => {
                    return Err(ChainError::InvalidTransaction(format!(
                        "Input {} not signed",
                        i
                    )))
                }
            };
            if address_from_public_key(public_key) != output.owner {
                return Err(ChainError::InvalidTransaction(format!(
                    "Input {} public key does not control {}",
                    i, utxo
                )));
            }
            let message = tx.signable_message(i).unwrap_or_default();
            if !self.verifier.verify(public_key, &message, signature) {
                return Err(ChainError::CryptoError(format!(
                    "Signature verification failed for input {}",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Rules 1 and 3 to 5, without touching signatures. Returns the fee.
    fn check_amounts(&self, tx: &Transaction, pool: &UtxoPool) -> Result<Amount> {
        let mut claimed = HashSet::with_capacity(tx.inputs.len());
        let mut input_total = Amount::ZERO;

        for (i, input) in tx.inputs.iter().enumerate() {
            let utxo = input.utxo();
            let output = pool.get_output(&utxo).ok_or_else(|| {
                ChainError::UtxoNotFound(format!("Input {} references unknown UTXO {}", i, utxo))
            })?;

            if !claimed.insert(utxo) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "UTXO {} claimed twice in {}",
                    utxo,
                    tx.hash_str()
                )));
            }

            input_total = input_total.checked_add(output.value).ok_or_else(|| {
                ChainError::InvalidTransaction("Input total overflows".to_string())
            })?;
        }

        if let Some(i) = tx.outputs.iter().position(|o| o.value < Amount::ZERO) {
            return Err(ChainError::InvalidTransaction(format!(
                "Output {} has negative value {}",
                i, tx.outputs[i].value
            )));
        }

        let output_total = tx.output_total().ok_or_else(|| {
            ChainError::InvalidTransaction("Output total overflows".to_string())
        })?;
        if output_total > input_total {
            return Err(ChainError::InvalidTransaction(format!(
                "Outputs ({}) exceed inputs ({})",
                output_total, input_total
            )));
        }

        Ok(input_total - output_total)
    }

    /// [`Self::check`] that verifies signatures only while `proven` is
    /// `Pending`. A failed signature marks the transaction `Forged`.
    fn check_cached(&self, tx: &Transaction, pool: &UtxoPool, proven: &mut Proof) -> Result<Amount> {
        if *proven == Proof::Pending {
            match self.check_proofs(tx, pool) {
                Ok(()) => *proven = Proof::Valid,
                Err(e @ ChainError::CryptoError(_)) => {
                    *proven = Proof::Forged;
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        self.check_amounts(tx, pool)
    }

    /// First-fit selection of mutually compatible transactions.
    ///
    /// Passes over the pending list repeat until one applies nothing, so a
    /// transaction that spends an output created later in `txs` still gets in.
    /// Returns the accepted transactions in application order and the
    /// resulting pool; `pool` itself is left untouched.
    pub fn apply_valid(&self, txs: &[Transaction], pool: &UtxoPool) -> (Vec<Transaction>, UtxoPool) {
        let mut state = pool.clone();
        let mut applied = Vec::new();
        let mut pending: Vec<(&Transaction, Proof)> = txs.iter().map(|tx| (tx, Proof::Pending)).collect();

        loop {
            let before = applied.len();
            pending.retain_mut(|(tx, proven)| {
                if self.check_cached(tx, &state, proven).is_ok() && state.apply_transaction(tx).is_ok() {
                    applied.push((*tx).clone());
                    false
                } else {
                    *proven != Proof::Forged
                }
            });
            if applied.len() == before || pending.is_empty() {
                break;
            }
        }

        (applied, state)
    }

    /// Greedy selection by fee: repeatedly applies the valid transaction
    /// paying the highest fee until none is left. Each transaction's
    /// signatures are verified at most once.
    pub fn apply_valid_max_fee(
        &self,
        txs: &[Transaction],
        pool: &UtxoPool,
    ) -> (Vec<Transaction>, UtxoPool) {
        let mut state = pool.clone();
        let mut applied = Vec::new();
        let mut pending: Vec<(&Transaction, Proof)> = txs.iter().map(|tx| (tx, Proof::Pending)).collect();

        loop {
            let mut best: Option<(usize, Amount)> = None;
            for (i, (tx, proven)) in pending.iter_mut().enumerate() {
                if let Ok(fee) = self.check_cached(tx, &state, proven) {
                    if best.map_or(true, |(_, top)| fee > top) {
                        best = Some((i, fee));
                    }
                }
            }
            let Some((index, _)) = best else { break };
            let (tx, _) = pending.remove(index);
            pending.retain(|(_, proven)| *proven != Proof::Forged);
            if state.apply_transaction(tx).is_ok() {
                applied.push(tx.clone());
            }
        }

        (applied, state)
    }
}

/// Signature status of a transaction during batch selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Proof {
    Pending,
    Valid,
    Forged,
}
