use crate::blockchain::core::chain::Block;
use crate::error::ChainError;
use std::collections::HashMap;

/// Rejects a block in which two transactions consume the same UTXO.
///
/// Cheap pre-check run before any ledger copy is made.
pub fn validate_no_double_spend(block: &Block) -> Result<(), ChainError> {
    let mut seen_inputs = HashMap::new();
    for tx in &block.transactions {
        let tx_hash = tx.hash();
        for input in &tx.inputs {
            let utxo = input.utxo();
            if let Some(conflicting_tx_hash) = seen_inputs.get(&utxo) {
                if *conflicting_tx_hash != tx_hash {
                    return Err(ChainError::DoubleSpendDetected(format!(
                        "UTXO {} is spent by both {} and {}",
                        utxo,
                        hex::encode(conflicting_tx_hash),
                        hex::encode(tx_hash)
                    )));
                }
            }
            seen_inputs.insert(utxo, tx_hash);
        }
    }
    Ok(())
}
