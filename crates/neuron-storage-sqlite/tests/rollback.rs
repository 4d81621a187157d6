//! Cell state and cursor survive reopen and roll back together

use neuron_core::{Capacity, Cell, CellBatch, CellChange, CellStatus, Checkpoint, OutPoint, H256};
use neuron_storage_sqlite::{CellStore, Database, SyncStateStorage};
use std::sync::Arc;
use tempfile::TempDir;

fn block_hash(height: u64) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_be_bytes());
    H256(bytes)
}

#[test]
fn test_rollback_discards_orphaned_writes_after_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("sync.db");
    let lock_hash = H256([0xaa; 32]);

    {
        let db = Arc::new(Database::open(&db_path).unwrap());
        let cells = CellStore::new(db.clone());
        let state = SyncStateStorage::new(db);

        for height in 100..=110u64 {
            let out_point = OutPoint::new(block_hash(height), 0);
            cells
                .apply_batch(&CellBatch {
                    changes: vec![CellChange::Committed(Cell::live(
                        out_point,
                        lock_hash,
                        Capacity::from(height),
                        height,
                    ))],
                    involvements: vec![],
                })
                .unwrap();
            state
                .advance(
                    &Checkpoint {
                        height,
                        block_hash: block_hash(height),
                    },
                    12,
                )
                .unwrap();
        }
    }

    let db = Arc::new(Database::open(&db_path).unwrap());
    let cells = CellStore::new(db.clone());
    let state = SyncStateStorage::new(db);
    assert_eq!(state.load_cursor().unwrap(), Some(110));

    cells.revert_above(104).unwrap();
    state.rollback_to(104).unwrap();

    let live = cells
        .cells_by_lock_hashes(&[lock_hash], Some(CellStatus::Live))
        .unwrap();
    assert_eq!(live.len(), 5);
    assert!(live.iter().all(|c| c.block_number.unwrap() <= 104));
    assert_eq!(state.load_cursor().unwrap(), Some(104));
    assert_eq!(
        state.recent_checkpoints(12).unwrap().last().map(|c| c.height),
        Some(104)
    );
}
