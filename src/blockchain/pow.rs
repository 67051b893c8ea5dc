use std::sync::atomic::{AtomicBool, Ordering};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of leading zero hex digits a block digest must carry by default.
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Raised when a search is interrupted through its cancellation flag before
/// a proof was found.
#[derive(Debug, Error)]
#[error("mining was interrupted before a proof was found")]
pub struct MiningInterrupted;

/// The proof-of-work puzzle.
///
/// A candidate proof is checked by hashing the decimal string of
/// `candidate^2 - previous_proof^2 + index` and testing the digest for
/// `difficulty` leading `'0'` characters. The difficulty is fixed at
/// construction, so tests can run with a cheap puzzle while nodes run the
/// default.
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        ProofOfWork::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    /// Creates a puzzle engine with the given difficulty
    ///
    /// # Arguments
    ///
    /// * `difficulty` - The number of leading zero hex characters a digest must carry
    ///
    /// # Returns
    ///
    /// A new ProofOfWork instance
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Renders the puzzle input `candidate^2 - previous_proof^2 + index` as
    /// a decimal string
    ///
    /// # Returns
    ///
    /// The decimal value, with a leading `-` when negative
    fn puzzle_value(previous_proof: u64, candidate: u64, index: u64) -> String {
        // Squares of u64 proofs overflow i128, so compare the two u128
        // magnitudes and write the sign by hand.
        let plus = (candidate as u128) * (candidate as u128) + index as u128;
        let minus = (previous_proof as u128) * (previous_proof as u128);

        if plus >= minus {
            (plus - minus).to_string()
        } else {
            format!("-{}", minus - plus)
        }
    }

    /// Digest of the puzzle input for one candidate
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the puzzle value as a hexadecimal string
    fn puzzle_digest(previous_proof: u64, candidate: u64, index: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::puzzle_value(previous_proof, candidate, index).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Checks a candidate proof against the puzzle
    ///
    /// # Arguments
    ///
    /// * `previous_proof` - The proof of the preceding block
    /// * `proof` - The candidate proof to check
    /// * `index` - The index of the block the proof is for
    ///
    /// # Returns
    ///
    /// true if the digest carries the required zeros, false otherwise
    pub fn verify(&self, previous_proof: u64, proof: u64, index: u64) -> bool {
        let target = "0".repeat(self.difficulty);
        Self::puzzle_digest(previous_proof, proof, index).starts_with(&target)
    }

    /// Searches candidates 1, 2, 3, ... until one solves the puzzle
    ///
    /// # Arguments
    ///
    /// * `previous_proof` - The proof of the preceding block
    /// * `index` - The index of the block being mined
    /// * `cancel` - Polled between candidates; a raised flag aborts the search
    ///
    /// # Returns
    ///
    /// Result with the winning proof (the same inputs always yield the same proof)
    pub fn solve(
        &self,
        previous_proof: u64,
        index: u64,
        cancel: &AtomicBool,
    ) -> Result<u64, MiningInterrupted> {
        let target = "0".repeat(self.difficulty);
        let mut candidate: u64 = 1;

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(MiningInterrupted);
            }

            if Self::puzzle_digest(previous_proof, candidate, index).starts_with(&target) {
                return Ok(candidate);
            }

            candidate += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solution_verifies() {
        let pow = ProofOfWork::new(2);
        let cancel = AtomicBool::new(false);

        let proof = pow.solve(1, 2, &cancel).unwrap();
        assert!(pow.verify(1, proof, 2));
    }

    #[test]
    fn test_search_is_deterministic() {
        let pow = ProofOfWork::new(2);
        let cancel = AtomicBool::new(false);

        let first = pow.solve(293, 7, &cancel).unwrap();
        let second = pow.solve(293, 7, &cancel).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_difficulty_zero_accepts_first_candidate() {
        let pow = ProofOfWork::new(0);
        let cancel = AtomicBool::new(false);

        assert_eq!(pow.solve(1, 2, &cancel).unwrap(), 1);
        assert!(pow.verify(1, 1, 2));
    }

    #[test]
    fn test_unreachable_difficulty_never_verifies() {
        // A 64-zero prefix would require the all-zero digest.
        let pow = ProofOfWork::new(64);
        assert!(!pow.verify(1, 12345, 2));
    }

    #[test]
    fn test_cancelled_search_stops() {
        let pow = ProofOfWork::new(64);
        let cancel = AtomicBool::new(true);

        assert!(pow.solve(1, 2, &cancel).is_err());
    }

    #[test]
    fn test_puzzle_depends_on_position() {
        // The same candidate hashes differently at different indices and
        // after different predecessors.
        let at_two = ProofOfWork::puzzle_digest(1, 42, 2);
        let at_three = ProofOfWork::puzzle_digest(1, 42, 3);
        let after_other = ProofOfWork::puzzle_digest(2, 42, 2);

        assert_ne!(at_two, at_three);
        assert_ne!(at_two, after_other);
    }

    #[test]
    fn test_puzzle_value_arithmetic() {
        assert_eq!(ProofOfWork::puzzle_value(1, 3, 2), "10");
        assert_eq!(ProofOfWork::puzzle_value(5, 2, 1), "-20");
        assert_eq!(ProofOfWork::puzzle_value(3, 0, 9), "0");
    }

    #[test]
    fn test_puzzle_value_covers_full_proof_range() {
        // Proofs arrive from peers and can sit anywhere in the u64 range.
        let positive = ProofOfWork::puzzle_value(0, u64::MAX, 2);
        assert!(!positive.starts_with('-'));
        assert_eq!(positive.len(), 39);

        let negative = ProofOfWork::puzzle_value(u64::MAX, 0, 0);
        assert!(negative.starts_with('-'));

        let pow = ProofOfWork::new(DEFAULT_DIFFICULTY);
        let _ = pow.verify(0, u64::MAX, 2);
        let _ = pow.verify(u64::MAX, u64::MAX, u64::MAX);
    }
}
