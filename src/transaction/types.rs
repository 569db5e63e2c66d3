/// Transaction types for forkchain
use crate::crypto::{Address, KeyPair, Sha256Hash};
use crate::error::ChainError;
use fixed::types::I32F32;
use sha2::{Digest, Sha256};

/// Output value. Fixed-point so that hashing and sums are deterministic.
pub type Amount = I32F32;

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Reference to a spendable output: producing transaction plus output index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Utxo {
    pub tx_hash: Sha256Hash,
    pub index: u32,
}

impl Utxo {
    pub fn new(tx_hash: Sha256Hash, index: u32) -> Self {
        Utxo { tx_hash, index }
    }
}

impl std::fmt::Display for Utxo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.tx_hash), self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Output {
    pub value: Amount,
    pub owner: Address,
}

impl Output {
    pub fn new(value: Amount, owner: Address) -> Self {
        Output { value, owner }
    }
}

/// Spends one output. The proof fields stay `None` until the input is signed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Input {
    pub prev_tx_hash: Sha256Hash,
    pub output_index: u32,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl Input {
    pub fn new(prev_tx_hash: Sha256Hash, output_index: u32) -> Self {
        Input {
            prev_tx_hash,
            output_index,
            signature: None,
            public_key: None,
        }
    }

    pub fn utxo(&self) -> Utxo {
        Utxo::new(self.prev_tx_hash, self.output_index)
    }
}

/// A transaction: ordered inputs and outputs. Zero inputs means coinbase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub nonce: u64,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reward transaction paying `value` to `beneficiary`.
    pub fn coinbase(value: Amount, beneficiary: Address, nonce: u64) -> Self {
        Transaction {
            inputs: Vec::new(),
            outputs: vec![Output::new(value, beneficiary)],
            nonce,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn add_input(&mut self, prev_tx_hash: Sha256Hash, output_index: u32) {
        self.inputs.push(Input::new(prev_tx_hash, output_index));
    }

    pub fn add_output(&mut self, value: Amount, owner: Address) {
        self.outputs.push(Output::new(value, owner));
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn output(&self, index: u32) -> Option<&Output> {
        self.outputs.get(index as usize)
    }

    /// UTXOs created by this transaction, paired with their outputs.
    pub fn produced_utxos(&self) -> impl Iterator<Item = (Utxo, &Output)> + '_ {
        let hash = self.hash();
        self.outputs
            .iter()
            .enumerate()
            .map(move |(i, output)| (Utxo::new(hash, i as u32), output))
    }

    /// Bytes an input's owner signs: the spent reference, every output and the nonce.
    pub fn signable_message(&self, input_index: usize) -> Option<Vec<u8>> {
        let input = self.inputs.get(input_index)?;
        let mut message = Vec::new();
        message.extend_from_slice("SPEND:".as_bytes());
        message.extend_from_slice(&input.prev_tx_hash);
        message.extend_from_slice(&input.output_index.to_le_bytes());
        for output in &self.outputs {
            message.extend_from_slice(&output.value.to_le_bytes());
            message.extend_from_slice(&output.owner);
        }
        message.extend_from_slice(&self.nonce.to_le_bytes());
        Some(message)
    }

    pub fn sign_input(
        &mut self,
        input_index: usize,
        signature: Vec<u8>,
        public_key: Vec<u8>,
    ) -> Result<(), ChainError> {
        let input = self.inputs.get_mut(input_index).ok_or_else(|| {
            ChainError::InvalidTransaction(format!("No input at index {}", input_index))
        })?;
        input.signature = Some(signature);
        input.public_key = Some(public_key);
        Ok(())
    }

    /// Signs input `input_index` with `keypair`.
    pub fn sign_input_with(&mut self, input_index: usize, keypair: &KeyPair) -> Result<(), ChainError> {
        let message = self.signable_message(input_index).ok_or_else(|| {
            ChainError::InvalidTransaction(format!("No input at index {}", input_index))
        })?;
        let signature = keypair.sign(&message)?;
        self.sign_input(
            input_index,
            signature.to_vec(),
            keypair.public_key_bytes().to_vec(),
        )
    }

    /// Sum of output values, `None` on overflow.
    pub fn output_total(&self) -> Option<Amount> {
        self.outputs
            .iter()
            .try_fold(Amount::ZERO, |acc, o| acc.checked_add(o.value))
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<(), ChainError> {
        let serialized = bincode::serialize(self)?;

        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }

    /// Calculate the hash of this transaction
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.prev_tx_hash);
            hasher.update(input.output_index.to_le_bytes());
            if let Some(sig) = &input.signature {
                hasher.update(sig);
            }
            if let Some(pk) = &input.public_key {
                hasher.update(pk);
            }
        }
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            hasher.update(output.value.to_le_bytes());
            hasher.update(output.owner);
        }
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }
}
