//! Follower-graph consensus over transaction sets
//!
//! Nodes exchange candidate transactions round by round. A node only listens
//! to the peers it follows; after the last round its proposal becomes its
//! decided set. Rounds are driven from outside (see [`crate::simulation`]),
//! which must collect every proposal of a round before delivering any.

use crate::config::SimulationConfig;
use crate::transaction::Transaction;
use std::collections::HashSet;
use tracing::debug;

/// Index of a node in the simulated network.
pub type NodeId = usize;

/// A transaction as received from a specific peer during a round.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub sender: NodeId,
    pub tx: Transaction,
}

impl Candidate {
    pub fn new(sender: NodeId, tx: Transaction) -> Self {
        Candidate { sender, tx }
    }
}

/// Parameters describing the network a node is placed in.
///
/// A compliant node only relies on `num_rounds`; the rest describe the
/// environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkParams {
    pub p_graph: f64,
    pub p_malicious: f64,
    pub p_tx_distribution: f64,
    pub num_rounds: u32,
}

impl From<&SimulationConfig> for NetworkParams {
    fn from(config: &SimulationConfig) -> Self {
        NetworkParams {
            p_graph: config.p_graph,
            p_malicious: config.p_malicious,
            p_tx_distribution: config.p_tx_distribution,
            num_rounds: config.num_rounds,
        }
    }
}

/// Capabilities of a consensus participant.
pub trait Node {
    /// `followees[i]` is true when this node follows (and trusts) node `i`.
    fn set_followees(&mut self, followees: Vec<bool>);

    /// Initial proposal.
    fn set_pending_transactions(&mut self, pending: HashSet<Transaction>);

    /// Transactions proposed to every follower this round. After the final
    /// round, the transactions this node has decided on.
    fn send_to_followers(&mut self) -> HashSet<Transaction>;

    /// What `follower` actually receives. Honest nodes send everyone the same
    /// `broadcast`.
    fn send_to(&mut self, _follower: NodeId, broadcast: &HashSet<Transaction>) -> HashSet<Transaction> {
        broadcast.clone()
    }

    /// Candidates gossiped by followees during one round.
    fn receive_from_followees(&mut self, candidates: &[Candidate]);
}

/// Where a node is in its round-driven lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Init,
    Round(u32),
    Finalized,
}

/// A node that follows the protocol.
#[derive(Debug, Clone)]
pub struct CompliantNode {
    params: NetworkParams,
    followees: Vec<bool>,
    pending: HashSet<Transaction>,
    rounds_completed: u32,
}

impl CompliantNode {
    pub fn new(params: NetworkParams) -> Self {
        CompliantNode {
            params,
            followees: Vec::new(),
            pending: HashSet::new(),
            rounds_completed: 0,
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn followees(&self) -> &[bool] {
        &self.followees
    }

    pub fn pending_transactions(&self) -> &HashSet<Transaction> {
        &self.pending
    }

    pub fn phase(&self) -> NodePhase {
        if self.is_finalized() {
            NodePhase::Finalized
        } else if self.rounds_completed == 0 {
            NodePhase::Init
        } else {
            NodePhase::Round(self.rounds_completed)
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.rounds_completed >= self.params.num_rounds
    }

    pub fn trusts(&self, sender: NodeId) -> bool {
        self.followees.get(sender).copied().unwrap_or(false)
    }
}

impl Node for CompliantNode {
    fn set_followees(&mut self, followees: Vec<bool>) {
        self.followees = followees;
    }

    fn set_pending_transactions(&mut self, pending: HashSet<Transaction>) {
        self.pending = pending;
    }

    fn send_to_followers(&mut self) -> HashSet<Transaction> {
        // Once finalized the belief set is frozen and doubles as the decision.
        self.pending.clone()
    }

    fn receive_from_followees(&mut self, candidates: &[Candidate]) {
        if self.is_finalized() {
            debug!("Ignoring {} candidates after final round", candidates.len());
            return;
        }

        let before = self.pending.len();
        for candidate in candidates {
            if self.trusts(candidate.sender) {
                self.pending.insert(candidate.tx.clone());
            }
        }
        self.rounds_completed += 1;

        debug!(
            "Round {}: {} candidates, {} new transactions, {} believed",
            self.rounds_completed,
            candidates.len(),
            self.pending.len() - before,
            self.pending.len()
        );
    }
}
