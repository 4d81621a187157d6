//! Storage seams used by the engine, with the SQLite and JSON implementations

use crate::Result;
use neuron_core::{Cell, CellBatch, CellStatus, Checkpoint, LockHash, TrackedAddress};
use neuron_storage_sqlite::{CellStore, Database, JsonAddressStore, SyncStateStorage};
use std::collections::HashSet;
use std::sync::Arc;

/// Cell-state store: keyed by outpoint, queried by lock hash and status
pub trait CellStateStore: Send + Sync {
    /// Apply one block's (or pending transaction's) writes atomically
    fn apply_batch(&self, batch: &CellBatch) -> Result<HashSet<LockHash>>;

    /// Cells under any of `lock_hashes`
    fn cells_by_lock_hashes(
        &self,
        lock_hashes: &[LockHash],
        status: Option<CellStatus>,
    ) -> Result<Vec<Cell>>;

    /// Distinct transactions touching any of `lock_hashes`
    fn transaction_count(&self, lock_hashes: &[LockHash]) -> Result<u64>;

    /// Undo writes from blocks above `height`
    fn revert_above(&self, height: u64) -> Result<HashSet<LockHash>>;
}

/// Persisted cursor and checkpoint window
pub trait SyncStateStore: Send + Sync {
    /// Last processed height
    fn load_cursor(&self) -> Result<Option<u64>>;

    /// Record a checkpoint and move the cursor to it atomically
    fn advance(&self, checkpoint: &Checkpoint, keep: usize) -> Result<()>;

    /// Move the cursor back and drop newer checkpoints
    fn rollback_to(&self, height: u64) -> Result<()>;

    /// Most recent checkpoints, ascending
    fn recent_checkpoints(&self, limit: usize) -> Result<Vec<Checkpoint>>;
}

/// Whole-collection address store keyed by `(wallet_id, address)`
pub trait AddressStore: Send + Sync {
    /// Snapshot of every address
    fn get_all(&self) -> Result<Vec<TrackedAddress>>;

    /// Replace the collection atomically
    fn update_all(&self, addresses: Vec<TrackedAddress>) -> Result<()>;
}

/// The three stores a listener is wired to
#[derive(Clone)]
pub struct SyncStores {
    /// Cell state
    pub cells: Arc<dyn CellStateStore>,
    /// Cursor and checkpoints
    pub sync_state: Arc<dyn SyncStateStore>,
    /// Tracked addresses
    pub addresses: Arc<dyn AddressStore>,
}

impl SyncStores {
    /// Cell and sync state in `db`, addresses in `addresses`
    pub fn sqlite(db: Arc<Database>, addresses: Arc<JsonAddressStore>) -> Self {
        Self {
            cells: Arc::new(CellStore::new(db.clone())),
            sync_state: Arc::new(SyncStateStorage::new(db)),
            addresses,
        }
    }
}

impl CellStateStore for CellStore {
    fn apply_batch(&self, batch: &CellBatch) -> Result<HashSet<LockHash>> {
        Ok(CellStore::apply_batch(self, batch)?)
    }

    fn cells_by_lock_hashes(
        &self,
        lock_hashes: &[LockHash],
        status: Option<CellStatus>,
    ) -> Result<Vec<Cell>> {
        Ok(CellStore::cells_by_lock_hashes(self, lock_hashes, status)?)
    }

    fn transaction_count(&self, lock_hashes: &[LockHash]) -> Result<u64> {
        Ok(CellStore::transaction_count(self, lock_hashes)?)
    }

    fn revert_above(&self, height: u64) -> Result<HashSet<LockHash>> {
        Ok(CellStore::revert_above(self, height)?)
    }
}

impl SyncStateStore for SyncStateStorage {
    fn load_cursor(&self) -> Result<Option<u64>> {
        Ok(SyncStateStorage::load_cursor(self)?)
    }

    fn advance(&self, checkpoint: &Checkpoint, keep: usize) -> Result<()> {
        Ok(SyncStateStorage::advance(self, checkpoint, keep)?)
    }

    fn rollback_to(&self, height: u64) -> Result<()> {
        Ok(SyncStateStorage::rollback_to(self, height)?)
    }

    fn recent_checkpoints(&self, limit: usize) -> Result<Vec<Checkpoint>> {
        Ok(SyncStateStorage::recent_checkpoints(self, limit)?)
    }
}

impl AddressStore for JsonAddressStore {
    fn get_all(&self) -> Result<Vec<TrackedAddress>> {
        Ok(JsonAddressStore::get_all(self)?)
    }

    fn update_all(&self, addresses: Vec<TrackedAddress>) -> Result<()> {
        Ok(JsonAddressStore::update_all(self, addresses)?)
    }
}
