use crate::blockchain::core::state::UtxoPool;
use crate::blockchain::core::validation::validate_no_double_spend;
use crate::config::ChainConfig;
use crate::crypto::{Address, Secp256k1Verifier, Sha256Hash, SignatureVerifier};
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::transaction::{Amount, Transaction, TxValidator};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How far behind the best height a branch may still be extended.
pub const CUT_OFF_AGE: u64 = 10;

/// Reward paid by blocks built with [`Blockchain::create_block`] unless configured.
pub const COINBASE_REWARD: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    /// `None` only for genesis.
    pub prev_hash: Option<Sha256Hash>,
    pub coinbase: Transaction,
    pub transactions: Vec<Transaction>,
    pub timestamp: u64,
}

impl Block {
    /// Empty block on `prev_hash` whose coinbase pays `reward` to `miner`.
    ///
    /// The coinbase nonce is taken from the parent hash, so sibling chains
    /// never mint the same coinbase identity twice along one branch.
    pub fn new(prev_hash: Option<Sha256Hash>, miner: Address, reward: Amount) -> Self {
        let nonce = prev_hash.map_or(0, |h| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&h[..8]);
            u64::from_le_bytes(bytes)
        });

        Block {
            prev_hash,
            coinbase: Transaction::coinbase(reward, miner, nonce),
            transactions: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        }
    }

    pub fn genesis(miner: Address, reward: Amount) -> Self {
        Self::new(None, miner, reward)
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        match self.prev_hash {
            Some(prev) => {
                hasher.update([1u8]);
                hasher.update(prev);
            }
            None => hasher.update([0u8]),
        }
        hasher.update(self.coinbase.hash());
        for tx in &self.transactions {
            hasher.update(tx.hash());
        }
        hasher.update(self.timestamp.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }
}

/// A block together with the branch state it produces.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub block: Block,
    pub hash: Sha256Hash,
    pub height: u64,
    /// UTXOs spendable on top of this block.
    pub utxo_pool: UtxoPool,
    /// Known transactions not yet included on this branch.
    pub tx_pool: Mempool,
    /// Wall-clock creation time in milliseconds; informational only.
    pub created_at: i64,
    /// Arrival order; the tie-break between equal heights.
    pub arrival: u64,
}

/// Shared handle for callers that submit blocks from several threads.
pub type SharedBlockchain = Arc<RwLock<Blockchain>>;

/// Fork-aware block tree with a bounded reorganization window.
///
/// Every node owns its own ledger and pool snapshot. Nodes that fall more than
/// `cut_off_age` below the best height are evicted.
pub struct Blockchain<V = Secp256k1Verifier> {
    nodes: HashMap<Sha256Hash, BlockNode>,
    heights: BTreeMap<u64, Vec<Sha256Hash>>,
    max_height_hash: Sha256Hash,
    tx_pool: RwLock<Mempool>,
    validator: TxValidator<V>,
    config: ChainConfig,
    next_arrival: u64,
}

impl Blockchain<Secp256k1Verifier> {
    /// Create a chain holding only `genesis`, with default settings.
    pub fn new(genesis: Block) -> Self {
        Self::with_config(genesis, ChainConfig::default())
    }

    pub fn with_config(genesis: Block, config: ChainConfig) -> Self {
        Self::with_validator(genesis, config, TxValidator::new())
    }
}

impl<V: SignatureVerifier> Blockchain<V> {
    /// Create a chain holding only `genesis`. The genesis block is trusted:
    /// its coinbase and the outputs of its transactions are credited as is.
    pub fn with_validator(genesis: Block, config: ChainConfig, validator: TxValidator<V>) -> Self {
        let mut utxo_pool = UtxoPool::new();
        utxo_pool.credit_outputs(&genesis.coinbase);
        for tx in &genesis.transactions {
            utxo_pool.credit_outputs(tx);
        }

        let hash = genesis.hash();
        info!(
            "Initializing chain with genesis block {} ({} UTXOs)",
            hex::encode(hash),
            utxo_pool.len()
        );

        let node = BlockNode {
            block: genesis,
            hash,
            height: 1,
            utxo_pool,
            tx_pool: Mempool::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
            arrival: 0,
        };

        let mut nodes = HashMap::new();
        nodes.insert(hash, node);
        let mut heights = BTreeMap::new();
        heights.insert(1, vec![hash]);

        Blockchain {
            nodes,
            heights,
            max_height_hash: hash,
            tx_pool: RwLock::new(Mempool::new()),
            validator,
            config,
            next_arrival: 1,
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// The best node. It always sits at the maximum height, so it is never evicted.
    pub fn max_height_node(&self) -> &BlockNode {
        &self.nodes[&self.max_height_hash]
    }

    pub fn max_height(&self) -> u64 {
        self.max_height_node().height
    }

    pub fn max_height_block(&self) -> &Block {
        &self.max_height_node().block
    }

    /// UTXO pool for building a block on top of the best block.
    pub fn max_height_utxo_pool(&self) -> &UtxoPool {
        &self.max_height_node().utxo_pool
    }

    /// Transactions still pending relative to the best branch.
    pub fn max_height_tx_pool(&self) -> &Mempool {
        &self.max_height_node().tx_pool
    }

    pub fn get_block_node(&self, hash: &Sha256Hash) -> Option<&BlockNode> {
        self.nodes.get(hash)
    }

    pub fn contains_block(&self, hash: &Sha256Hash) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Number of retained block nodes across all branches.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Blocks at or below this height are rejected. Nodes below it are evicted,
    /// so a block whose parent fell out of the window reports `OrphanBlock`.
    pub fn cut_off_height(&self) -> u64 {
        self.max_height().saturating_sub(self.config.cut_off_age)
    }

    /// Add a transaction to the process-wide pool.
    pub fn add_transaction(&self, tx: Transaction) {
        self.tx_pool.write().add_transaction(tx);
    }

    /// Snapshot of the process-wide pool.
    pub fn transaction_pool(&self) -> Mempool {
        self.tx_pool.read().clone()
    }

    /// Adds `block` if it is valid; logs the reason and returns `false` otherwise.
    pub fn add_block(&mut self, block: Block) -> bool {
        let hash = block.hash_str();
        match self.try_add_block(block) {
            Ok(_) => true,
            Err(e) => {
                warn!("Rejected block {}: {}", hash, e);
                false
            }
        }
    }

    /// Validates `block` against its parent's branch and registers it.
    ///
    /// Returns the new node's height. On error nothing is mutated. Every
    /// retained parent sits at or above [`Self::cut_off_height`], so a block
    /// too old to accept always fails with `OrphanBlock`.
    pub fn try_add_block(&mut self, block: Block) -> Result<u64> {
        let parent_hash = block.prev_hash.ok_or_else(|| {
            ChainError::InvalidBlock(
                "Block declares no parent; genesis is only accepted at initialization".to_string(),
            )
        })?;

        let hash = block.hash();
        if self.nodes.contains_key(&hash) {
            return Err(ChainError::BlockAlreadyExists);
        }

        let parent = self
            .nodes
            .get(&parent_hash)
            .ok_or_else(|| ChainError::OrphanBlock(hex::encode(parent_hash)))?;

        let height = parent.height + 1;

        validate_no_double_spend(&block)?;
        block.coinbase.validate_size()?;

        let mut utxo_pool = parent.utxo_pool.clone();
        for (i, tx) in block.transactions.iter().enumerate() {
            tx.validate_size()?;
            self.validator.check(tx, &utxo_pool).map_err(|e| {
                ChainError::InvalidBlock(format!(
                    "Transaction {} ({}) rejected: {}",
                    i,
                    tx.hash_str(),
                    e
                ))
            })?;
            utxo_pool.apply_transaction(tx)?;
        }
        utxo_pool.credit_outputs(&block.coinbase);

        let mut tx_pool = parent.tx_pool.clone();
        for tx in self.tx_pool.read().get_transactions() {
            tx_pool.add_transaction(tx);
        }
        for tx in &block.transactions {
            tx_pool.remove_transaction(&tx.hash());
        }

        let arrival = self.next_arrival;
        self.next_arrival += 1;

        info!(
            "Accepted block {} at height {} ({} transactions)",
            hex::encode(hash),
            height,
            block.transactions.len()
        );

        self.nodes.insert(
            hash,
            BlockNode {
                block,
                hash,
                height,
                utxo_pool,
                tx_pool,
                created_at: chrono::Utc::now().timestamp_millis(),
                arrival,
            },
        );
        self.heights.entry(height).or_default().push(hash);

        self.update_max_height_node();
        if self.max_height_hash == hash {
            self.prune_included_transactions(hash);
        }
        self.evict_stale_nodes();

        Ok(height)
    }

    /// Builds a block on the best node from the pending transactions that pay
    /// the most fees, pays the coinbase to `miner` and adds it.
    pub fn create_block(&mut self, miner: Address) -> Option<Block> {
        let best = self.max_height_node();
        let mut candidates = best.tx_pool.clone();
        for tx in self.tx_pool.read().get_transactions() {
            candidates.add_transaction(tx);
        }

        let (selected, _) = self
            .validator
            .apply_valid_max_fee(&candidates.get_transactions(), &best.utxo_pool);

        let mut block = Block::new(Some(best.hash), miner, self.config.coinbase_amount());
        block.transactions = selected;

        if self.add_block(block.clone()) {
            Some(block)
        } else {
            None
        }
    }

    /// Greatest height wins; among equal heights the first to arrive.
    fn update_max_height_node(&mut self) {
        let best = self
            .heights
            .iter()
            .next_back()
            .and_then(|(_, hashes)| {
                hashes
                    .iter()
                    .filter_map(|h| self.nodes.get(h))
                    .min_by_key(|node| node.arrival)
            })
            .map(|node| node.hash);

        if let Some(hash) = best {
            if hash != self.max_height_hash {
                debug!("Best block is now {}", hex::encode(hash));
            }
            self.max_height_hash = hash;
        }
    }

    /// Removes from the shared pool every transaction included on the retained
    /// branch ending at `tip`. Side forks leave the pool alone so the best
    /// branch can still include their transactions.
    fn prune_included_transactions(&self, tip: Sha256Hash) {
        let mut global = self.tx_pool.write();
        let mut cursor = Some(tip);
        while let Some(node) = cursor.and_then(|h| self.nodes.get(&h)) {
            for tx in &node.block.transactions {
                global.remove_transaction(&tx.hash());
            }
            cursor = node.block.prev_hash;
        }
    }

    /// Drops nodes that can no longer parent an acceptable block.
    fn evict_stale_nodes(&mut self) {
        let min_retained = self.cut_off_height();
        let retained = self.heights.split_off(&min_retained);
        let stale = std::mem::replace(&mut self.heights, retained);

        let mut evicted = 0;
        for hash in stale.into_values().flatten() {
            if self.nodes.remove(&hash).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(
                "Evicted {} block nodes below height {}",
                evicted, min_retained
            );
        }
    }
}
