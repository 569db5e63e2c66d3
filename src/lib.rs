//! forkchain - fork-aware UTXO validation and follower-graph consensus
//!
//! # Architecture
//!
//! ## Core Blockchain
//! - [`blockchain`] - Block tree with per-branch ledger snapshots
//! - [`transaction`] - Transaction types and validation
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus
//! - [`consensus`] - Round-based node protocol
//! - [`simulation`] - Synchronous round driver and adversarial nodes
//!
//! ## Cryptography
//! - [`crypto`] - Signatures and verification (secp256k1)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus
// ============================================================================
pub mod consensus;
pub mod simulation;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
