//! Round driver for the consensus protocol
//!
//! Builds a random follow graph, seeds nodes with transactions, mixes in
//! adversarial participants and runs synchronous rounds: every node's
//! proposals are gathered before any node absorbs.

use crate::config::SimulationConfig;
use crate::consensus::{Candidate, CompliantNode, NetworkParams, Node, NodeId};
use crate::error::{ChainError, Result};
use crate::transaction::Transaction;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tracing::{debug, info};

/// Never proposes anything.
#[derive(Debug, Default)]
pub struct SilentNode;

impl Node for SilentNode {
    fn set_followees(&mut self, _followees: Vec<bool>) {}

    fn set_pending_transactions(&mut self, _pending: HashSet<Transaction>) {}

    fn send_to_followers(&mut self) -> HashSet<Transaction> {
        HashSet::new()
    }

    fn receive_from_followees(&mut self, _candidates: &[Candidate]) {}
}

/// Proposes a fresh batch of fabricated transactions every round.
#[derive(Debug)]
pub struct FloodingNode {
    rng: StdRng,
    batch: usize,
}

impl FloodingNode {
    pub fn new(seed: u64, batch: usize) -> Self {
        FloodingNode {
            rng: StdRng::seed_from_u64(seed),
            batch,
        }
    }
}

impl Node for FloodingNode {
    fn set_followees(&mut self, _followees: Vec<bool>) {}

    fn set_pending_transactions(&mut self, _pending: HashSet<Transaction>) {}

    fn send_to_followers(&mut self) -> HashSet<Transaction> {
        (0..self.batch)
            .map(|_| Transaction::new().with_nonce(self.rng.gen()))
            .collect()
    }

    fn receive_from_followees(&mut self, _candidates: &[Candidate]) {}
}

/// Tells even-numbered followers the truth and odd-numbered ones something else.
#[derive(Debug, Default)]
pub struct InconsistentNode {
    pending: HashSet<Transaction>,
    forged: HashSet<Transaction>,
}

impl InconsistentNode {
    pub fn new(forged: HashSet<Transaction>) -> Self {
        InconsistentNode {
            pending: HashSet::new(),
            forged,
        }
    }
}

impl Node for InconsistentNode {
    fn set_followees(&mut self, _followees: Vec<bool>) {}

    fn set_pending_transactions(&mut self, pending: HashSet<Transaction>) {
        self.pending = pending;
    }

    fn send_to_followers(&mut self) -> HashSet<Transaction> {
        self.pending.clone()
    }

    fn send_to(&mut self, follower: NodeId, broadcast: &HashSet<Transaction>) -> HashSet<Transaction> {
        if follower % 2 == 0 {
            broadcast.clone()
        } else {
            self.forged.clone()
        }
    }

    fn receive_from_followees(&mut self, _candidates: &[Candidate]) {}
}

/// Outcome of a finished simulation.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Decided set of each compliant node.
    pub decisions: Vec<(NodeId, HashSet<Transaction>)>,
    /// Transactions every compliant node decided on.
    pub agreed: HashSet<Transaction>,
    pub malicious: Vec<NodeId>,
}

impl SimulationReport {
    /// True when every compliant node decided on the same set.
    pub fn unanimous(&self) -> bool {
        self.decisions
            .windows(2)
            .all(|pair| pair[0].1 == pair[1].1)
    }
}

pub struct Simulation {
    nodes: Vec<Box<dyn Node>>,
    malicious: Vec<bool>,
    /// `followees[i][j]`: node `i` follows node `j`.
    followees: Vec<Vec<bool>>,
    num_rounds: u32,
    rounds_run: u32,
}

impl Simulation {
    /// Random network described by `config`, reproducible from `config.seed`.
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        if config.num_nodes == 0 || config.num_rounds == 0 {
            return Err(ChainError::ConfigError(
                "simulation needs at least one node and one round".to_string(),
            ));
        }
        for p in [config.p_graph, config.p_malicious, config.p_tx_distribution] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ChainError::ConfigError(format!(
                    "probability {} outside [0, 1]",
                    p
                )));
            }
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let n = config.num_nodes;
        let params = NetworkParams::from(config);

        let mut nodes: Vec<Box<dyn Node>> = Vec::with_capacity(n);
        let mut malicious = Vec::with_capacity(n);
        for _ in 0..n {
            if rng.gen_bool(config.p_malicious) {
                let node: Box<dyn Node> = match rng.gen_range(0..3) {
                    0 => Box::new(SilentNode),
                    1 => Box::new(FloodingNode::new(rng.gen(), 8)),
                    _ => Box::new(InconsistentNode::new(
                        (0..8).map(|_| Transaction::new().with_nonce(rng.gen())).collect(),
                    )),
                };
                nodes.push(node);
                malicious.push(true);
            } else {
                nodes.push(Box::new(CompliantNode::new(params)));
                malicious.push(false);
            }
        }

        let followees: Vec<Vec<bool>> = (0..n)
            .map(|i| (0..n).map(|j| i != j && rng.gen_bool(config.p_graph)).collect())
            .collect();

        let valid_txs: Vec<Transaction> = (0..config.num_txs)
            .map(|_| Transaction::new().with_nonce(rng.gen()))
            .collect();
        let initial: Vec<HashSet<Transaction>> = (0..n)
            .map(|_| {
                valid_txs
                    .iter()
                    .filter(|_| rng.gen_bool(config.p_tx_distribution))
                    .cloned()
                    .collect()
            })
            .collect();

        info!(
            "Simulating {} nodes ({} malicious), {} transactions, {} rounds",
            n,
            malicious.iter().filter(|m| **m).count(),
            valid_txs.len(),
            config.num_rounds
        );

        Self::from_parts(nodes, malicious, followees, initial, config.num_rounds)
    }

    /// Network with an explicit graph and initial proposals.
    ///
    /// `malicious`, `initial` and every row of the square `followees` matrix
    /// must have one entry per node.
    pub fn from_parts(
        mut nodes: Vec<Box<dyn Node>>,
        malicious: Vec<bool>,
        followees: Vec<Vec<bool>>,
        initial: Vec<HashSet<Transaction>>,
        num_rounds: u32,
    ) -> Result<Self> {
        let n = nodes.len();
        if malicious.len() != n || followees.len() != n || initial.len() != n {
            return Err(ChainError::ConfigError(format!(
                "{} nodes but {} malicious flags, {} followee rows and {} initial sets",
                n,
                malicious.len(),
                followees.len(),
                initial.len()
            )));
        }
        if let Some(i) = followees.iter().position(|row| row.len() != n) {
            return Err(ChainError::ConfigError(format!(
                "followee row {} has {} entries, expected {}",
                i,
                followees[i].len(),
                n
            )));
        }

        for ((node, row), pending) in nodes.iter_mut().zip(&followees).zip(initial) {
            node.set_followees(row.clone());
            node.set_pending_transactions(pending);
        }
        Ok(Simulation {
            nodes,
            malicious,
            followees,
            num_rounds,
            rounds_run: 0,
        })
    }

    pub fn rounds_run(&self) -> u32 {
        self.rounds_run
    }

    /// One synchronous round: gather all proposals, then deliver them.
    pub fn run_round(&mut self) {
        let n = self.nodes.len();
        let mut inbox: Vec<Vec<Candidate>> = vec![Vec::new(); n];

        for (sender, node) in self.nodes.iter_mut().enumerate() {
            let broadcast = node.send_to_followers();
            for (follower, row) in self.followees.iter().enumerate() {
                if row.get(sender).copied().unwrap_or(false) {
                    for tx in node.send_to(follower, &broadcast) {
                        inbox[follower].push(Candidate::new(sender, tx));
                    }
                }
            }
        }

        for (node, candidates) in self.nodes.iter_mut().zip(&inbox) {
            node.receive_from_followees(candidates);
        }

        self.rounds_run += 1;
        debug!(
            "Round {} delivered {} candidates",
            self.rounds_run,
            inbox.iter().map(Vec::len).sum::<usize>()
        );
    }

    /// Runs the remaining rounds and collects each compliant node's decision.
    pub fn run(mut self) -> SimulationReport {
        while self.rounds_run < self.num_rounds {
            self.run_round();
        }

        let mut decisions = Vec::new();
        let mut malicious = Vec::new();
        for (id, node) in self.nodes.iter_mut().enumerate() {
            if self.malicious.get(id).copied().unwrap_or(false) {
                malicious.push(id);
            } else {
                decisions.push((id, node.send_to_followers()));
            }
        }

        let agreed = decisions
            .iter()
            .map(|(_, set)| set.clone())
            .reduce(|acc, set| acc.intersection(&set).cloned().collect())
            .unwrap_or_default();

        info!(
            "Simulation finished: {} compliant nodes agree on {} transactions",
            decisions.len(),
            agreed.len()
        );

        SimulationReport {
            decisions,
            agreed,
            malicious,
        }
    }
}
