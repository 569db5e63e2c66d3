//! Error types for forkchain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("UTXO not found: {0}")]
    UtxoNotFound(String),
    #[error("Double spend detected: {0}")]
    DoubleSpendDetected(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Orphan block: parent {0} is unknown or below the cut-off")]
    OrphanBlock(String),
    #[error("Block already exists")]
    BlockAlreadyExists,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Bincode error: {0}")]
    BincodeError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::BincodeError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
