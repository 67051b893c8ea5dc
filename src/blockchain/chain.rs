use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::asset::Asset;
use super::block::{Block, GENESIS_INDEX};
use super::pow::{MiningInterrupted, ProofOfWork};
use super::snapshot::{SnapshotError, SnapshotStore};
use super::transaction::{AccountId, Transaction, TxId};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no pending transactions to mine")]
    EmptyPool,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid chain: {0}")]
    InvalidChain(#[from] InvalidChainError),

    #[error("replacement chain of {candidate} blocks is not longer than the local chain of {current}")]
    ChainTooShort { candidate: usize, current: usize },

    #[error(transparent)]
    MiningInterrupted(#[from] MiningInterrupted),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Why a chain failed validation, with the offending block's index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidChainError {
    #[error("block {index}: expected index {expected}")]
    IndexGap { index: u64, expected: u64 },

    #[error("block {index}: previous_hash does not match the preceding block")]
    HashMismatch { index: u64 },

    #[error("block {index}: proof fails the puzzle check")]
    BadProof { index: u64 },
}

/// Validates every link of a chain
///
/// # Arguments
///
/// * `chain` - The blocks to check, in order
/// * `pow` - The puzzle engine the proofs must satisfy
///
/// # Returns
///
/// Result with () when indices are contiguous from 1, every `previous_hash`
/// matches the recomputed digest of its predecessor and every proof solves
/// the puzzle for its position
pub fn validate_chain(chain: &[Block], pow: &ProofOfWork) -> Result<(), InvalidChainError> {
    // The empty chain is valid, and genesis content is never compared
    // against local state, so nodes with different genesis blocks can
    // adopt each other's chains.
    let first = match chain.first() {
        Some(first) => first,
        None => return Ok(()),
    };

    if first.index != GENESIS_INDEX {
        return Err(InvalidChainError::IndexGap {
            index: first.index,
            expected: GENESIS_INDEX,
        });
    }

    for i in 1..chain.len() {
        let current = &chain[i];
        let previous = &chain[i - 1];

        if current.index != previous.index + 1 {
            return Err(InvalidChainError::IndexGap {
                index: current.index,
                expected: previous.index + 1,
            });
        }

        if current.previous_hash != previous.digest() {
            return Err(InvalidChainError::HashMismatch { index: current.index });
        }

        if !pow.verify(previous.proof, current.proof, current.index) {
            return Err(InvalidChainError::BadProof { index: current.index });
        }
    }

    Ok(())
}

/// An asset as listed by the catalogue: metadata plus its current owner and
/// the price of the most recent transaction that carried it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AssetSummary {
    pub asset: Asset,
    pub owner: AccountId,
    pub price: u64,
}

/// A single asset's full record, including where it last changed hands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AssetDetail {
    pub asset: Asset,
    pub owner: AccountId,
    pub price: u64,
    /// Index of the block holding the asset's most recent transaction.
    pub block_index: u64,
}

/// Chain and pending pool, guarded together.
#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pool: Vec<Transaction>,
}

/// The ownership ledger: a validated chain of blocks plus the pool of
/// transactions waiting to be mined.
///
/// All mutation goes through a single `RwLock`, so a mined or appended block
/// and the pool update it implies become visible atomically. Reads clone out
/// of the guard and never block each other.
#[derive(Debug)]
pub struct Ledger {
    state: RwLock<LedgerState>,
    snapshot: Option<SnapshotStore>,
    pow: ProofOfWork,
    cancel: AtomicBool,
}

impl Ledger {
    /// Creates an in-memory ledger starting at genesis (nothing is persisted)
    ///
    /// # Returns
    ///
    /// A new Ledger instance
    pub fn new(pow: ProofOfWork) -> Self {
        Ledger {
            state: RwLock::new(LedgerState {
                chain: vec![Block::genesis()],
                pool: Vec::new(),
            }),
            snapshot: None,
            pow,
            cancel: AtomicBool::new(false),
        }
    }

    /// Opens a ledger backed by a snapshot store
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The store to restore from and persist to
    /// * `pow` - The puzzle engine for mining and validation
    ///
    /// # Returns
    ///
    /// Result with the restored ledger, or one starting at genesis when no
    /// readable snapshot exists
    pub fn open(snapshot: SnapshotStore, pow: ProofOfWork) -> Result<Self, LedgerError> {
        let (chain, pool) = match snapshot.load() {
            Some((chain, pool)) => {
                info!(
                    "restored {} blocks and {} pending transactions from {}",
                    chain.len(),
                    pool.len(),
                    snapshot.path().display()
                );
                (chain, pool)
            }
            None => {
                let chain = vec![Block::genesis()];
                let pool = Vec::new();
                snapshot.save(&chain, &pool)?;
                info!("created a new chain at genesis");
                (chain, pool)
            }
        };

        Ok(Ledger {
            state: RwLock::new(LedgerState { chain, pool }),
            snapshot: Some(snapshot),
            pow,
            cancel: AtomicBool::new(false),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().expect("ledger lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().expect("ledger lock poisoned")
    }

    fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        if let Some(store) = &self.snapshot {
            store.save(&state.chain, &state.pool)?;
        }
        Ok(())
    }

    /// Current owner of `dna` within `chain`: the receiver of the most
    /// recent confirmed transaction carrying the asset.
    fn owner_in(chain: &[Block], dna: &str) -> Option<AccountId> {
        let mut owner = None;
        for block in chain {
            for tx in &block.transactions {
                if let Some(asset) = &tx.asset {
                    if asset.dna == dna {
                        owner = Some(tx.receiver.clone());
                    }
                }
            }
        }
        owner
    }

    /// Queues a transaction for the next block
    ///
    /// # Arguments
    ///
    /// * `tx` - The transaction to queue, taken as given (ownership rules are
    ///   enforced at the API boundary)
    ///
    /// # Returns
    ///
    /// Result with the index of the block that will include this transaction
    pub fn submit(&self, tx: Transaction) -> Result<u64, LedgerError> {
        let mut state = self.write();
        let next_index = state.chain.len() as u64 + 1;
        state.pool.push(tx);
        self.persist(&state)?;
        Ok(next_index)
    }

    /// Mines the pending pool into a new block
    ///
    /// # Arguments
    ///
    /// * `miner` - The account credited with the mining reward
    ///
    /// # Returns
    ///
    /// Result with the newly mined block, holding the pooled transactions
    /// plus a trailing reward
    pub fn mine(&self, miner: &AccountId) -> Result<Block, LedgerError> {
        // The write lock is held through the whole search so no submission
        // can slip into a block already being sealed.
        let mut state = self.write();

        if state.pool.is_empty() {
            return Err(LedgerError::EmptyPool);
        }

        let previous = state.chain.last().expect("chain always holds the genesis block");
        let index = previous.index + 1;
        let previous_proof = previous.proof;
        let previous_hash = previous.digest();

        let proof = self.pow.solve(previous_proof, index, &self.cancel)?;

        let mut transactions = state.pool.clone();
        transactions.push(Transaction::reward(miner.clone()));
        let block = Block::new(index, transactions, proof, previous_hash);

        state.chain.push(block.clone());
        state.pool.clear();
        self.persist(&state)?;

        info!(
            "mined block {} with {} transactions (proof {})",
            block.index,
            block.transactions.len(),
            block.proof
        );
        Ok(block)
    }

    /// Appends a block mined by a peer
    ///
    /// # Arguments
    ///
    /// * `block` - The block to append (it must continue the local head by
    ///   index and `previous_hash`)
    ///
    /// # Returns
    ///
    /// Result with () if the extended chain validates; on success every
    /// pending transaction whose identifier appears in the block is dropped
    /// from the pool
    pub fn append_external(&self, block: Block) -> Result<(), LedgerError> {
        let mut state = self.write();
        let head = state.chain.last().expect("chain always holds the genesis block");

        if block.index != head.index + 1 {
            return Err(LedgerError::InvalidBlock(format!(
                "expected index {}, got {}",
                head.index + 1,
                block.index
            )));
        }

        if block.previous_hash != head.digest() {
            return Err(LedgerError::InvalidBlock(
                "previous_hash does not match the chain head".to_string(),
            ));
        }

        let appended_index = block.index;
        let confirmed: HashSet<TxId> = block.transactions.iter().map(|tx| tx.id()).collect();

        let mut extended = state.chain.clone();
        extended.push(block);
        validate_chain(&extended, &self.pow)?;

        state.chain = extended;
        state.pool.retain(|tx| !confirmed.contains(&tx.id()));
        self.persist(&state)?;

        info!(
            "appended block {} from a peer, {} transactions still pending",
            appended_index,
            state.pool.len()
        );
        Ok(())
    }

    /// Replaces the local chain with a strictly longer validated one
    ///
    /// # Arguments
    ///
    /// * `chain` - The replacement chain from a peer
    ///
    /// # Returns
    ///
    /// Result with () if the candidate validates and still beats the local
    /// length at the moment of the swap (the pending pool is left untouched)
    pub fn replace(&self, chain: Vec<Block>) -> Result<(), LedgerError> {
        validate_chain(&chain, &self.pow)?;

        let mut state = self.write();
        let current = state.chain.len();

        // The length is re-checked under the write lock; the local chain may
        // have grown while the candidate was being fetched.
        if chain.len() <= current {
            return Err(LedgerError::ChainTooShort {
                candidate: chain.len(),
                current,
            });
        }

        state.chain = chain;
        self.persist(&state)?;

        info!("replaced chain of length {} with length {}", current, state.chain.len());
        Ok(())
    }

    /// Interrupts an in-progress proof-of-work search. The ledger stops
    /// mining permanently; used on node shutdown.
    pub fn shutdown(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Gets the entire chain
    ///
    /// # Returns
    ///
    /// A vector of all blocks in the chain
    pub fn chain(&self) -> Vec<Block> {
        self.read().chain.clone()
    }

    /// Gets the number of blocks in the chain
    ///
    /// # Returns
    ///
    /// The chain length, counting the genesis block
    pub fn block_count(&self) -> usize {
        self.read().chain.len()
    }

    /// Gets the last block in the chain
    ///
    /// # Returns
    ///
    /// The last block in the chain
    pub fn last_block(&self) -> Block {
        self.read()
            .chain
            .last()
            .expect("chain always holds the genesis block")
            .clone()
    }

    /// Gets all pending transactions
    ///
    /// # Returns
    ///
    /// A vector of all transactions waiting to be mined
    pub fn pending(&self) -> Vec<Transaction> {
        self.read().pool.clone()
    }

    /// Looks up a block by index
    ///
    /// # Arguments
    ///
    /// * `index` - The chain position to find
    ///
    /// # Returns
    ///
    /// The matching block, or None
    pub fn block_by_index(&self, index: u64) -> Option<Block> {
        self.read().chain.iter().find(|b| b.index == index).cloned()
    }

    /// Looks up a block by its digest
    ///
    /// # Arguments
    ///
    /// * `digest` - The SHA-256 hex digest to match (digests are recomputed
    ///   per block, blocks store none)
    ///
    /// # Returns
    ///
    /// The matching block, or None
    pub fn block_by_hash(&self, digest: &str) -> Option<Block> {
        self.read().chain.iter().find(|b| b.digest() == digest).cloned()
    }

    /// Gets every confirmed transaction, in chain order
    ///
    /// # Returns
    ///
    /// A vector of all transactions sealed in blocks
    pub fn confirmed_transactions(&self) -> Vec<Transaction> {
        self.read()
            .chain
            .iter()
            .flat_map(|b| b.transactions.iter().cloned())
            .collect()
    }

    /// Gets the current owner of an asset
    ///
    /// # Arguments
    ///
    /// * `dna` - The asset identity to look up
    ///
    /// # Returns
    ///
    /// The receiver of the most recent confirmed transaction carrying the
    /// asset, or None when no confirmed transaction mentions it
    pub fn owner_of(&self, dna: &str) -> Option<AccountId> {
        Self::owner_in(&self.read().chain, dna)
    }

    /// Gets the catalogue of every minted asset
    ///
    /// # Returns
    ///
    /// One entry per dna in order of first appearance, each reflecting the
    /// asset's latest confirmed transaction
    pub fn assets(&self) -> Vec<AssetSummary> {
        let state = self.read();
        let mut order: Vec<String> = Vec::new();
        let mut by_dna: HashMap<String, AssetSummary> = HashMap::new();

        for block in &state.chain {
            for tx in &block.transactions {
                if let Some(asset) = &tx.asset {
                    if !by_dna.contains_key(&asset.dna) {
                        order.push(asset.dna.clone());
                    }
                    by_dna.insert(
                        asset.dna.clone(),
                        AssetSummary {
                            asset: asset.clone(),
                            owner: tx.receiver.clone(),
                            price: tx.price,
                        },
                    );
                }
            }
        }

        order.into_iter().filter_map(|dna| by_dna.remove(&dna)).collect()
    }

    /// Gets the full record of one asset
    ///
    /// # Arguments
    ///
    /// * `dna` - The asset identity to look up
    ///
    /// # Returns
    ///
    /// The asset with its owner, latest price and the index of the block it
    /// last changed hands in, or None when unknown
    pub fn asset_detail(&self, dna: &str) -> Option<AssetDetail> {
        let state = self.read();
        let mut found = None;

        for block in &state.chain {
            for tx in &block.transactions {
                if let Some(asset) = &tx.asset {
                    if asset.dna == dna {
                        found = Some(AssetDetail {
                            asset: asset.clone(),
                            owner: tx.receiver.clone(),
                            price: tx.price,
                            block_index: block.index,
                        });
                    }
                }
            }
        }

        found
    }

    /// Validates the local chain
    ///
    /// # Returns
    ///
    /// true if every link holds, false otherwise (the diagnostic is logged)
    pub fn is_valid(&self) -> bool {
        match validate_chain(&self.read().chain, &self.pow) {
            Ok(()) => true,
            Err(e) => {
                warn!("chain failed validation: {}", e);
                false
            }
        }
    }
}
