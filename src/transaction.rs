//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::TxValidator;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::UtxoPool;
    use crate::crypto::{Address, KeyPair, SignatureVerifier};
    use crate::error::ChainError;

    fn amount(v: i32) -> Amount {
        Amount::from_num(v)
    }

    /// A pool holding one coinbase output of `value` owned by `keypair`.
    fn funded_pool(keypair: &KeyPair, value: i32) -> (UtxoPool, Transaction) {
        let coinbase = Transaction::coinbase(amount(value), keypair.address(), 0);
        let mut pool = UtxoPool::new();
        pool.credit_outputs(&coinbase);
        (pool, coinbase)
    }

    fn spend(
        keypair: &KeyPair,
        inputs: &[(crate::crypto::Sha256Hash, u32)],
        outputs: &[(i32, Address)],
    ) -> Transaction {
        let mut tx = Transaction::new();
        for (hash, index) in inputs {
            tx.add_input(*hash, *index);
        }
        for (value, owner) in outputs {
            tx.add_output(amount(*value), *owner);
        }
        for i in 0..tx.inputs.len() {
            tx.sign_input_with(i, keypair).unwrap();
        }
        tx
    }

    #[test]
    fn test_tx_validation_success() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let tx = spend(&alice, &[(coinbase.hash(), 0)], &[(6, bob.address()), (3, alice.address())]);
        let validator = TxValidator::new();
        assert!(validator.is_valid(&tx, &pool));
        assert_eq!(validator.check(&tx, &pool).unwrap(), amount(1));
    }

    #[test]
    fn test_missing_utxo_fails() {
        let alice = KeyPair::generate().unwrap();
        let (pool, _) = funded_pool(&alice, 10);

        let tx = spend(&alice, &[([7u8; 32], 0)], &[(1, alice.address())]);
        assert!(matches!(
            TxValidator::new().check(&tx, &pool),
            Err(ChainError::UtxoNotFound(_))
        ));
    }

    #[test]
    fn test_unsigned_transaction_fails() {
        let alice = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let mut tx = Transaction::new();
        tx.add_input(coinbase.hash(), 0);
        tx.add_output(amount(10), alice.address());
        assert!(!TxValidator::new().is_valid(&tx, &pool));
    }

    #[test]
    fn test_signature_by_non_owner_fails() {
        let alice = KeyPair::generate().unwrap();
        let mallory = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let tx = spend(&mallory, &[(coinbase.hash(), 0)], &[(10, mallory.address())]);
        assert!(!TxValidator::new().is_valid(&tx, &pool));
    }

    #[test]
    fn test_owner_key_with_forged_signature_fails() {
        let alice = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let mut tx = Transaction::new();
        tx.add_input(coinbase.hash(), 0);
        tx.add_output(amount(10), alice.address());
        tx.sign_input(0, vec![0u8; 64], alice.public_key_bytes().to_vec())
            .unwrap();

        assert!(matches!(
            TxValidator::new().check(&tx, &pool),
            Err(ChainError::CryptoError(_))
        ));
    }

    #[test]
    fn test_outputs_changed_after_signing_fails() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let mut tx = spend(&alice, &[(coinbase.hash(), 0)], &[(10, alice.address())]);
        tx.outputs[0].owner = bob.address();
        assert!(!TxValidator::new().is_valid(&tx, &pool));
    }

    #[test]
    fn test_internal_double_spend_fails() {
        let alice = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let tx = spend(
            &alice,
            &[(coinbase.hash(), 0), (coinbase.hash(), 0)],
            &[(15, alice.address())],
        );
        assert!(matches!(
            TxValidator::new().check(&tx, &pool),
            Err(ChainError::DoubleSpendDetected(_))
        ));

        // Even a conserving output total does not rescue a repeated input.
        let tx = spend(
            &alice,
            &[(coinbase.hash(), 0), (coinbase.hash(), 0)],
            &[(5, alice.address())],
        );
        assert!(!TxValidator::new().is_valid(&tx, &pool));
    }

    #[test]
    fn test_negative_output_fails() {
        let alice = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let tx = spend(
            &alice,
            &[(coinbase.hash(), 0)],
            &[(12, alice.address()), (-3, alice.address())],
        );
        let result = TxValidator::new().check(&tx, &pool);
        assert!(matches!(result, Err(ChainError::InvalidTransaction(msg)) if msg.contains("negative")));
    }

    #[test]
    fn test_value_creation_fails() {
        let alice = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let tx = spend(&alice, &[(coinbase.hash(), 0)], &[(11, alice.address())]);
        let result = TxValidator::new().check(&tx, &pool);
        assert!(matches!(result, Err(ChainError::InvalidTransaction(msg)) if msg.contains("exceed")));
    }

    #[test]
    fn test_coinbase_exempt_from_input_rules() {
        let pool = UtxoPool::new();
        let validator = TxValidator::new();

        let empty = Transaction::new();
        assert!(validator.is_valid(&empty, &pool));

        let zero_reward = Transaction::coinbase(Amount::ZERO, [1u8; 32], 3);
        assert!(validator.is_valid(&zero_reward, &pool));

        // A minting transaction fails conservation, never an input rule.
        let minting = Transaction::coinbase(amount(25), [1u8; 32], 0);
        let result = validator.check(&minting, &pool);
        assert!(matches!(result, Err(ChainError::InvalidTransaction(msg)) if msg.contains("exceed")));
    }

    #[test]
    fn test_validation_uses_injected_verifier() {
        struct AcceptAll;
        impl SignatureVerifier for AcceptAll {
            fn verify(&self, _: &[u8], _: &[u8], _: &[u8]) -> bool {
                true
            }
        }

        let alice = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);
        let mut tx = Transaction::new();
        tx.add_input(coinbase.hash(), 0);
        tx.add_output(amount(10), alice.address());
        tx.sign_input(0, vec![1, 2, 3], alice.public_key_bytes().to_vec())
            .unwrap();

        assert!(TxValidator::with_verifier(AcceptAll).is_valid(&tx, &pool));
        assert!(!TxValidator::new().is_valid(&tx, &pool));
    }

    #[test]
    fn test_apply_valid_rejects_conflicts_and_leaves_input_untouched() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let carol = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let to_bob = spend(&alice, &[(coinbase.hash(), 0)], &[(10, bob.address())]);
        let to_carol = spend(&alice, &[(coinbase.hash(), 0)], &[(10, carol.address())]);

        let (applied, state) =
            TxValidator::new().apply_valid(&[to_bob.clone(), to_carol], &pool);

        assert_eq!(applied, vec![to_bob]);
        assert_eq!(state.get_balance(&bob.address()), amount(10));
        assert_eq!(state.get_balance(&carol.address()), Amount::ZERO);
        assert_eq!(pool.get_balance(&alice.address()), amount(10));
    }

    #[test]
    fn test_apply_valid_accepts_dependent_out_of_order() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let to_bob = spend(&alice, &[(coinbase.hash(), 0)], &[(10, bob.address())]);
        let bob_back = spend(&bob, &[(to_bob.hash(), 0)], &[(9, alice.address())]);

        let (applied, state) =
            TxValidator::new().apply_valid(&[bob_back.clone(), to_bob.clone()], &pool);

        assert_eq!(applied, vec![to_bob, bob_back]);
        assert_eq!(state.get_balance(&alice.address()), amount(9));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_apply_valid_max_fee_prefers_higher_fee() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let (pool, coinbase) = funded_pool(&alice, 10);

        let cheap = spend(&alice, &[(coinbase.hash(), 0)], &[(9, bob.address())]);
        let generous = spend(&alice, &[(coinbase.hash(), 0)], &[(6, bob.address())]);

        let (applied, state) =
            TxValidator::new().apply_valid_max_fee(&[cheap, generous.clone()], &pool);

        assert_eq!(applied, vec![generous]);
        assert_eq!(state.get_balance(&bob.address()), amount(6));
    }

    #[test]
    fn test_batch_selection_verifies_each_signature_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct Counting {
            calls: Rc<Cell<usize>>,
            accept: bool,
        }
        impl SignatureVerifier for Counting {
            fn verify(&self, _: &[u8], _: &[u8], _: &[u8]) -> bool {
                self.calls.set(self.calls.get() + 1);
                self.accept
            }
        }

        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let mut pool = UtxoPool::new();
        let txs: Vec<Transaction> = (0..6)
            .map(|i| {
                let coinbase = Transaction::coinbase(amount(10), alice.address(), i);
                pool.credit_outputs(&coinbase);
                spend(&alice, &[(coinbase.hash(), 0)], &[(i as i32, bob.address())])
            })
            .collect();

        for accept in [true, false] {
            let calls = Rc::new(Cell::new(0));
            let validator = TxValidator::with_verifier(Counting {
                calls: calls.clone(),
                accept,
            });

            let (by_fee, _) = validator.apply_valid_max_fee(&txs, &pool);
            assert_eq!(by_fee.len(), if accept { 6 } else { 0 });
            assert_eq!(calls.get(), 6);

            calls.set(0);
            let (first_fit, _) = validator.apply_valid(&txs, &pool);
            assert_eq!(first_fit.len(), by_fee.len());
            assert_eq!(calls.get(), 6);
        }

        // Highest fee (smallest output) first.
        let (by_fee, _) = TxValidator::new().apply_valid_max_fee(&txs, &pool);
        assert_eq!(by_fee.first(), txs.first());
        assert_eq!(by_fee.last(), txs.last());
    }

    #[test]
    fn test_hash_covers_signatures_and_nonce() {
        let alice = KeyPair::generate().unwrap();
        let (_, coinbase) = funded_pool(&alice, 10);

        let mut unsigned = Transaction::new();
        unsigned.add_input(coinbase.hash(), 0);
        unsigned.add_output(amount(10), alice.address());
        let mut signed = unsigned.clone();
        signed.sign_input_with(0, &alice).unwrap();

        assert_ne!(unsigned.hash(), signed.hash());
        assert_ne!(unsigned.hash(), unsigned.clone().with_nonce(1).hash());
        assert!(signed.validate_size().is_ok());
        assert!(unsigned.sign_input(4, vec![], vec![]).is_err());
    }
}
