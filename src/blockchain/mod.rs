// Ledger module
//
// This module contains the core ledger implementation including:
// - Asset and transaction structures
// - Block structure
// - Canonical hashing
// - Proof of work puzzle
// - Chain validation and the ledger itself
// - Snapshot persistence

pub mod asset;
pub mod block;
pub mod chain;
pub mod hash;
pub mod pow;
pub mod snapshot;
pub mod transaction;

// Re-export main components for easier access
pub use asset::Asset;
pub use block::Block;
pub use chain::{Ledger, LedgerError};
pub use pow::ProofOfWork;
pub use snapshot::SnapshotStore;
pub use transaction::{AccountId, Transaction};
