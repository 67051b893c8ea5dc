use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::hash;
use super::transaction::Transaction;

/// Index of the genesis block. Chain indices start at 1, not 0.
pub const GENESIS_INDEX: u64 = 1;
/// Proof recorded in the genesis block.
pub const GENESIS_PROOF: u64 = 1;
/// Sentinel previous-hash of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A sealed group of transactions in the chain.
///
/// A block does not store its own hash. Its digest is recomputed from the
/// canonical encoding whenever a successor's `previous_hash` needs checking,
/// so a digest can never disagree with the fields it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position in the chain, starting at 1 for the genesis block.
    pub index: u64,

    /// Timestamp when the block was sealed.
    #[schema(value_type = String, example = "2024-04-13T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions confirmed by this block. The mining reward is last.
    pub transactions: Vec<Transaction>,

    /// Solution to the proof-of-work puzzle for this block.
    pub proof: u64,

    /// Digest of the preceding block, `"0"` for the genesis block.
    pub previous_hash: String,
}

impl Block {
    /// Creates a new block timestamped now
    ///
    /// # Arguments
    ///
    /// * `index` - The position of the block in the chain
    /// * `transactions` - The transactions sealed by the block
    /// * `proof` - The solution to the proof-of-work puzzle
    /// * `previous_hash` - The digest of the preceding block
    ///
    /// # Returns
    ///
    /// A new Block instance
    pub fn new(index: u64, transactions: Vec<Transaction>, proof: u64, previous_hash: String) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            transactions,
            proof,
            previous_hash,
        }
    }

    /// The first block of a fresh chain. Each node forges its own genesis;
    /// nodes converge later through longest-chain replacement.
    pub fn genesis() -> Self {
        Block::new(GENESIS_INDEX, Vec::new(), GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Calculates the digest of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block's canonical encoding as a hexadecimal
    /// string
    pub fn digest(&self) -> String {
        hash::digest(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transaction::Transaction;

    #[test]
    fn test_genesis_shape() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, 1);
        assert_eq!(genesis.previous_hash, "0");
        assert!(genesis.transactions.is_empty());
    }

    #[test]
    fn test_digest_is_64_hex_chars() {
        let block = Block::new(2, vec![Transaction::reward("miner".into())], 100, "abc".into());
        let digest = block.digest();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_covers_transactions() {
        let block = Block::new(2, vec![Transaction::reward("miner".into())], 100, "abc".into());
        let mut tampered = block.clone();
        tampered.transactions[0].price = 1_000_000;
        assert_ne!(block.digest(), tampered.digest());
    }

    #[test]
    fn test_digest_survives_serialization_round_trip() {
        let block = Block::new(2, vec![Transaction::reward("miner".into())], 100, "abc".into());
        let json = serde_json::to_string(&block).unwrap();
        let parsed: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block.digest(), parsed.digest());
    }
}
