//! Configuration management for forkchain
//!
//! Every field has a default, so an absent or partial `forkchain.toml` is fine.

use crate::blockchain::{COINBASE_REWARD, CUT_OFF_AGE};
use crate::error::{ChainError, Result};
use crate::transaction::Amount;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "forkchain.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChainConfig {
    #[serde(default = "default_cut_off_age")]
    pub cut_off_age: u64,
    /// Whole coins paid by blocks the chain builds itself.
    #[serde(default = "default_coinbase_reward")]
    pub coinbase_reward: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cut_off_age: default_cut_off_age(),
            coinbase_reward: default_coinbase_reward(),
        }
    }
}

impl ChainConfig {
    pub fn coinbase_amount(&self) -> Amount {
        Amount::saturating_from_num(self.coinbase_reward)
    }
}

/// Environment of a consensus simulation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_num_nodes")]
    pub num_nodes: usize,
    /// Probability that a node follows any given other node.
    #[serde(default = "default_p_graph")]
    pub p_graph: f64,
    #[serde(default = "default_p_malicious")]
    pub p_malicious: f64,
    /// Probability that a node initially holds any given transaction.
    #[serde(default = "default_p_tx_distribution")]
    pub p_tx_distribution: f64,
    #[serde(default = "default_num_rounds")]
    pub num_rounds: u32,
    #[serde(default = "default_num_txs")]
    pub num_txs: usize,
    #[serde(default)]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_nodes: default_num_nodes(),
            p_graph: default_p_graph(),
            p_malicious: default_p_malicious(),
            p_tx_distribution: default_p_tx_distribution(),
            num_rounds: default_num_rounds(),
            num_txs: default_num_txs(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chain.cut_off_age == 0 {
            return Err(ChainError::ConfigError(
                "chain.cut_off_age must be at least 1".to_string(),
            ));
        }
        if Amount::checked_from_num(self.chain.coinbase_reward).is_none() {
            return Err(ChainError::ConfigError(format!(
                "chain.coinbase_reward {} does not fit an amount",
                self.chain.coinbase_reward
            )));
        }

        let sim = &self.simulation;
        for (name, p) in [
            ("p_graph", sim.p_graph),
            ("p_malicious", sim.p_malicious),
            ("p_tx_distribution", sim.p_tx_distribution),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ChainError::ConfigError(format!(
                    "simulation.{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        if sim.num_nodes == 0 {
            return Err(ChainError::ConfigError(
                "simulation.num_nodes must be at least 1".to_string(),
            ));
        }
        if sim.num_rounds == 0 {
            return Err(ChainError::ConfigError(
                "simulation.num_rounds must be at least 1".to_string(),
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ChainError::ConfigError(format!(
                "logging.level '{}' is not a tracing level",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Loads and validates the config at `path`, falling back to defaults when the
/// file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config: Config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

fn default_cut_off_age() -> u64 {
    CUT_OFF_AGE
}

fn default_coinbase_reward() -> u32 {
    COINBASE_REWARD
}

fn default_num_nodes() -> usize {
    100
}

fn default_p_graph() -> f64 {
    0.1
}

fn default_p_malicious() -> f64 {
    0.15
}

fn default_p_tx_distribution() -> f64 {
    0.05
}

fn default_num_rounds() -> u32 {
    10
}

fn default_num_txs() -> usize {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}
