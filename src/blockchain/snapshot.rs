use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::block::Block;
use super::transaction::Transaction;

/// Errors raised while writing a snapshot. Read problems are not errors:
/// a snapshot that cannot be read is treated as absent.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to encode ledger state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write snapshot: {0}")]
    Write(#[from] io::Error),
}

/// On-disk layout of a snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

/// Persists the full ledger state (chain and pending pool) as a single JSON
/// document, rewritten after every state change. Writes go to a sibling
/// temp file first and are moved into place, so a crash mid-write leaves
/// the previous snapshot intact.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current state, replacing any previous snapshot.
    pub fn save(&self, chain: &[Block], pool: &[Transaction]) -> Result<(), SnapshotError> {
        let record = serde_json::json!({
            "chain": chain,
            "pending_transactions": pool,
        });
        let bytes = serde_json::to_vec_pretty(&record)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Reads the last saved state. Returns `None` when the snapshot is
    /// missing, unreadable or corrupt; the caller starts from genesis then.
    pub fn load(&self) -> Option<(Vec<Block>, Vec<Transaction>)> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no snapshot at {}, starting fresh", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("failed to read snapshot {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<SnapshotRecord>(&bytes) {
            Ok(record) => Some((record.chain, record.pending_transactions)),
            Err(e) => {
                warn!(
                    "snapshot {} is corrupt, starting fresh: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transaction::Transaction;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("ledger.json"));

        let chain = vec![Block::genesis()];
        let pool = vec![Transaction::new("SYSTEM".into(), "alice".into(), None, 0)];
        store.save(&chain, &pool).unwrap();

        let (loaded_chain, loaded_pool) = store.load().unwrap();
        assert_eq!(loaded_chain, chain);
        assert_eq!(loaded_pool, pool);
    }

    #[test]
    fn test_missing_snapshot_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = SnapshotStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("ledger.json"));

        store.save(&[Block::genesis()], &[]).unwrap();
        let longer = vec![Block::genesis(), Block::new(2, vec![], 77, "h".into())];
        store.save(&longer, &[]).unwrap();

        let (chain, pool) = store.load().unwrap();
        assert_eq!(chain.len(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("ledger.json"));
        store.save(&[Block::genesis()], &[]).unwrap();

        assert!(!dir.path().join("ledger.tmp").exists());
        assert!(dir.path().join("ledger.json").exists());
    }
}
