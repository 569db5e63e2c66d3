// Thin re-export module: implementation lives in `blockchain/core.rs`, split
// into chain management, ledger state and block-level validation.

pub mod core;
pub use core::*;
