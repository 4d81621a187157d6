//! Cell-state store
//!
//! Cells are keyed by outpoint and carry the block that created them and the
//! block that spent them, so everything written by orphaned blocks can be
//! reverted by height.

use crate::{Database, Result};
use neuron_core::{
    Capacity, Cell, CellBatch, CellChange, CellStatus, LockHash, OutPoint, TxInvolvement, H256,
};
use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

const CELL_COLUMNS: &str =
    "tx_hash, output_index, lock_hash, capacity, status, block_number, spent_block_number";

/// Raw cell row before domain decoding
struct CellRow {
    tx_hash: String,
    output_index: u32,
    lock_hash: String,
    capacity: String,
    status: String,
    block_number: Option<u64>,
    spent_block_number: Option<u64>,
}

impl CellRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tx_hash: row.get(0)?,
            output_index: row.get(1)?,
            lock_hash: row.get(2)?,
            capacity: row.get(3)?,
            status: row.get(4)?,
            block_number: row.get(5)?,
            spent_block_number: row.get(6)?,
        })
    }

    fn into_cell(self) -> Result<Cell> {
        Ok(Cell {
            out_point: OutPoint::new(H256::from_str(&self.tx_hash)?, self.output_index),
            lock_hash: H256::from_str(&self.lock_hash)?,
            capacity: Capacity::from_str(&self.capacity)?,
            status: CellStatus::from_str(&self.status)?,
            block_number: self.block_number,
            spent_block_number: self.spent_block_number,
        })
    }
}

/// SQLite-backed cell-state store
#[derive(Clone)]
pub struct CellStore {
    db: Arc<Database>,
}

impl CellStore {
    /// Create over a shared database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Apply a batch atomically; returns every lock hash whose cells changed
    pub fn apply_batch(&self, batch: &CellBatch) -> Result<HashSet<LockHash>> {
        self.db.with_transaction(|tx| {
            let mut touched = HashSet::new();
            for change in &batch.changes {
                if let Some(lock_hash) = apply_change(tx, change)? {
                    touched.insert(lock_hash);
                }
            }
            for involvement in &batch.involvements {
                record_involvement(tx, involvement)?;
                touched.insert(involvement.lock_hash);
            }
            Ok(touched)
        })
    }

    /// Look up a cell by outpoint
    pub fn get(&self, out_point: &OutPoint) -> Result<Option<Cell>> {
        let row = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM cells WHERE tx_hash = ?1 AND output_index = ?2",
                        CELL_COLUMNS
                    ),
                    params![out_point.tx_hash.to_string(), out_point.index],
                    CellRow::from_row,
                )
                .optional()?)
        })?;
        row.map(CellRow::into_cell).transpose()
    }

    /// Cells under any of `lock_hashes`, optionally filtered by status
    pub fn cells_by_lock_hashes(
        &self,
        lock_hashes: &[LockHash],
        status: Option<CellStatus>,
    ) -> Result<Vec<Cell>> {
        if lock_hashes.is_empty() {
            return Ok(Vec::new());
        }

        let mut values: Vec<String> = lock_hashes.iter().map(|h| h.to_string()).collect();
        let mut sql = format!(
            "SELECT {} FROM cells WHERE lock_hash IN ({})",
            CELL_COLUMNS,
            placeholders(lock_hashes.len())
        );
        if let Some(status) = status {
            sql.push_str(&format!(" AND status = ?{}", values.len() + 1));
            values.push(status.as_str().to_string());
        }
        sql.push_str(" ORDER BY block_number, tx_hash, output_index");

        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), CellRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(CellRow::into_cell).collect()
    }

    /// Number of distinct transactions touching any of `lock_hashes`
    pub fn transaction_count(&self, lock_hashes: &[LockHash]) -> Result<u64> {
        if lock_hashes.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "SELECT COUNT(DISTINCT tx_hash) FROM cell_transactions WHERE lock_hash IN ({})",
            placeholders(lock_hashes.len())
        );
        let values: Vec<String> = lock_hashes.iter().map(|h| h.to_string()).collect();

        let count: i64 = self.db.with_conn(|conn| {
            Ok(conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?)
        })?;
        Ok(count as u64)
    }

    /// Discard writes from blocks above `height`
    ///
    /// Cells created above `height` are deleted, cells spent above it become
    /// live again, and transaction involvements above it are dropped. Pending
    /// cells are untouched. Returns the lock hashes affected.
    pub fn revert_above(&self, height: u64) -> Result<HashSet<LockHash>> {
        let affected = self.db.with_transaction(|tx| {
            let mut stmt = tx.prepare(
                r#"
                SELECT lock_hash FROM cells
                WHERE block_number > ?1 OR spent_block_number > ?1
                UNION
                SELECT lock_hash FROM cell_transactions WHERE block_number > ?1
                "#,
            )?;
            let affected = stmt
                .query_map([height], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            drop(stmt);

            tx.execute("DELETE FROM cells WHERE block_number > ?1", [height])?;
            tx.execute(
                r#"
                UPDATE cells SET status = 'live', spent_block_number = NULL
                WHERE spent_block_number > ?1
                "#,
                [height],
            )?;
            tx.execute(
                "DELETE FROM cell_transactions WHERE block_number > ?1",
                [height],
            )?;
            Ok(affected)
        })?;

        tracing::debug!(height, lock_hashes = affected.len(), "Reverted cell state");

        affected
            .iter()
            .map(|h| H256::from_str(h).map_err(Into::into))
            .collect()
    }

    /// Drop everything (full rescan)
    pub fn clear(&self) -> Result<()> {
        self.db.with_transaction(|tx| {
            tx.execute("DELETE FROM cells", [])?;
            tx.execute("DELETE FROM cell_transactions", [])?;
            Ok(())
        })
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn lock_hash_of(tx: &Transaction<'_>, out_point: &OutPoint) -> Result<Option<LockHash>> {
    let lock_hash: Option<String> = tx
        .query_row(
            "SELECT lock_hash FROM cells WHERE tx_hash = ?1 AND output_index = ?2",
            params![out_point.tx_hash.to_string(), out_point.index],
            |row| row.get(0),
        )
        .optional()?;
    Ok(lock_hash.map(|h| H256::from_str(&h)).transpose()?)
}

fn apply_change(tx: &Transaction<'_>, change: &CellChange) -> Result<Option<LockHash>> {
    match change {
        CellChange::Committed(cell) => {
            // Re-applying a block must not resurrect a cell already spent.
            tx.execute(
                r#"
                INSERT INTO cells (tx_hash, output_index, lock_hash, capacity, status, block_number)
                VALUES (?1, ?2, ?3, ?4, 'live', ?5)
                ON CONFLICT (tx_hash, output_index) DO UPDATE SET
                    block_number = excluded.block_number,
                    status = CASE WHEN cells.status IN ('dead', 'sent') THEN cells.status ELSE 'live' END
                "#,
                params![
                    cell.out_point.tx_hash.to_string(),
                    cell.out_point.index,
                    cell.lock_hash.to_string(),
                    cell.capacity.to_string(),
                    cell.block_number,
                ],
            )?;
            Ok(Some(cell.lock_hash))
        }
        CellChange::Spent {
            out_point,
            tx_hash,
            block_number,
        } => {
            let lock_hash = lock_hash_of(tx, out_point)?;
            if let Some(lock_hash) = lock_hash {
                tx.execute(
                    r#"
                    UPDATE cells SET status = 'dead', spent_block_number = ?3
                    WHERE tx_hash = ?1 AND output_index = ?2
                    "#,
                    params![out_point.tx_hash.to_string(), out_point.index, block_number],
                )?;
                record_involvement(
                    tx,
                    &TxInvolvement {
                        tx_hash: *tx_hash,
                        lock_hash,
                        block_number: Some(*block_number),
                    },
                )?;
            }
            Ok(lock_hash)
        }
        CellChange::PendingOutput(cell) => {
            tx.execute(
                r#"
                INSERT INTO cells (tx_hash, output_index, lock_hash, capacity, status, block_number)
                VALUES (?1, ?2, ?3, ?4, 'pending', NULL)
                ON CONFLICT (tx_hash, output_index) DO NOTHING
                "#,
                params![
                    cell.out_point.tx_hash.to_string(),
                    cell.out_point.index,
                    cell.lock_hash.to_string(),
                    cell.capacity.to_string(),
                ],
            )?;
            Ok(Some(cell.lock_hash))
        }
        CellChange::PendingSpend { out_point, tx_hash } => {
            let lock_hash = lock_hash_of(tx, out_point)?;
            if let Some(lock_hash) = lock_hash {
                tx.execute(
                    r#"
                    UPDATE cells SET status = 'sent'
                    WHERE tx_hash = ?1 AND output_index = ?2 AND status = 'live'
                    "#,
                    params![out_point.tx_hash.to_string(), out_point.index],
                )?;
                record_involvement(
                    tx,
                    &TxInvolvement {
                        tx_hash: *tx_hash,
                        lock_hash,
                        block_number: None,
                    },
                )?;
            }
            Ok(lock_hash)
        }
    }
}

fn record_involvement(tx: &Transaction<'_>, involvement: &TxInvolvement) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO cell_transactions (tx_hash, lock_hash, block_number)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (tx_hash, lock_hash) DO UPDATE SET
            block_number = COALESCE(excluded.block_number, cell_transactions.block_number)
        "#,
        params![
            involvement.tx_hash.to_string(),
            involvement.lock_hash.to_string(),
            involvement.block_number,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CellStore {
        CellStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn lock(n: u8) -> LockHash {
        H256([n; 32])
    }

    fn out_point(n: u8, index: u32) -> OutPoint {
        OutPoint::new(H256([n; 32]), index)
    }

    fn committed(n: u8, lock_hash: LockHash, capacity: u64, block: u64) -> CellChange {
        CellChange::Committed(Cell::live(out_point(n, 0), lock_hash, Capacity::from(capacity), block))
    }

    fn batch(changes: Vec<CellChange>) -> CellBatch {
        CellBatch {
            changes,
            involvements: Vec::new(),
        }
    }

    #[test]
    fn test_commit_then_spend() {
        let store = store();
        store.apply_batch(&batch(vec![committed(1, lock(9), 500, 10)])).unwrap();

        let cell = store.get(&out_point(1, 0)).unwrap().unwrap();
        assert_eq!(cell.status, CellStatus::Live);
        assert_eq!(cell.block_number, Some(10));

        let touched = store
            .apply_batch(&batch(vec![CellChange::Spent {
                out_point: out_point(1, 0),
                tx_hash: H256([0x51; 32]),
                block_number: 11,
            }]))
            .unwrap();
        assert!(touched.contains(&lock(9)));

        let cell = store.get(&out_point(1, 0)).unwrap().unwrap();
        assert_eq!(cell.status, CellStatus::Dead);
        assert_eq!(cell.spent_block_number, Some(11));
    }

    #[test]
    fn test_untracked_spend_ignored() {
        let store = store();
        let touched = store
            .apply_batch(&batch(vec![CellChange::Spent {
                out_point: out_point(7, 0),
                tx_hash: H256([0x51; 32]),
                block_number: 3,
            }]))
            .unwrap();
        assert!(touched.is_empty());
        assert!(store.get(&out_point(7, 0)).unwrap().is_none());
    }

    #[test]
    fn test_recommit_keeps_spent_status() {
        let store = store();
        store.apply_batch(&batch(vec![committed(1, lock(9), 500, 10)])).unwrap();
        store
            .apply_batch(&batch(vec![CellChange::Spent {
                out_point: out_point(1, 0),
                tx_hash: H256([0x51; 32]),
                block_number: 12,
            }]))
            .unwrap();
        store.apply_batch(&batch(vec![committed(1, lock(9), 500, 10)])).unwrap();

        let cell = store.get(&out_point(1, 0)).unwrap().unwrap();
        assert_eq!(cell.status, CellStatus::Dead);
    }

    #[test]
    fn test_pending_lifecycle() {
        let store = store();
        store.apply_batch(&batch(vec![committed(1, lock(9), 500, 10)])).unwrap();

        store
            .apply_batch(&batch(vec![
                CellChange::PendingSpend {
                    out_point: out_point(1, 0),
                    tx_hash: H256([2; 32]),
                },
                CellChange::PendingOutput(Cell {
                    out_point: out_point(2, 0),
                    lock_hash: lock(9),
                    capacity: Capacity::from(100),
                    status: CellStatus::Pending,
                    block_number: None,
                    spent_block_number: None,
                }),
            ]))
            .unwrap();

        assert_eq!(store.get(&out_point(1, 0)).unwrap().unwrap().status, CellStatus::Sent);
        assert_eq!(store.get(&out_point(2, 0)).unwrap().unwrap().status, CellStatus::Pending);

        store
            .apply_batch(&batch(vec![
                CellChange::Spent {
                    out_point: out_point(1, 0),
                    tx_hash: H256([2; 32]),
                    block_number: 11,
                },
                committed(2, lock(9), 100, 11),
            ]))
            .unwrap();
        assert_eq!(store.get(&out_point(1, 0)).unwrap().unwrap().status, CellStatus::Dead);
        let confirmed = store.get(&out_point(2, 0)).unwrap().unwrap();
        assert_eq!(confirmed.status, CellStatus::Live);
        assert_eq!(confirmed.block_number, Some(11));
    }

    #[test]
    fn test_lookup_by_lock_and_status() {
        let store = store();
        store
            .apply_batch(&batch(vec![
                committed(1, lock(9), 500, 10),
                committed(2, lock(9), 200, 10),
                committed(3, lock(8), 300, 10),
            ]))
            .unwrap();
        store
            .apply_batch(&batch(vec![CellChange::Spent {
                out_point: out_point(2, 0),
                tx_hash: H256([0x51; 32]),
                block_number: 11,
            }]))
            .unwrap();

        assert_eq!(store.cells_by_lock_hashes(&[lock(9)], None).unwrap().len(), 2);
        assert_eq!(
            store
                .cells_by_lock_hashes(&[lock(9), lock(8)], Some(CellStatus::Live))
                .unwrap()
                .len(),
            2
        );
        assert!(store.cells_by_lock_hashes(&[], None).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_count_distinct() {
        let store = store();
        let involvement = |tx: u8, lock_hash: LockHash, block: Option<u64>| TxInvolvement {
            tx_hash: H256([tx; 32]),
            lock_hash,
            block_number: block,
        };
        store
            .apply_batch(&CellBatch {
                changes: vec![],
                involvements: vec![
                    involvement(1, lock(9), Some(10)),
                    involvement(1, lock(8), Some(10)),
                    involvement(2, lock(9), None),
                    involvement(2, lock(9), Some(11)),
                ],
            })
            .unwrap();

        assert_eq!(store.transaction_count(&[lock(9), lock(8)]).unwrap(), 2);
        assert_eq!(store.transaction_count(&[lock(8)]).unwrap(), 1);
        assert_eq!(store.transaction_count(&[]).unwrap(), 0);
    }

    #[test]
    fn test_revert_above() {
        let store = store();
        store.apply_batch(&batch(vec![committed(1, lock(9), 500, 100)])).unwrap();
        store.apply_batch(&batch(vec![committed(2, lock(8), 300, 106)])).unwrap();
        store
            .apply_batch(&batch(vec![CellChange::Spent {
                out_point: out_point(1, 0),
                tx_hash: H256([0x51; 32]),
                block_number: 107,
            }]))
            .unwrap();

        let affected = store.revert_above(104).unwrap();
        assert_eq!(affected, HashSet::from([lock(9), lock(8)]));

        assert!(store.get(&out_point(2, 0)).unwrap().is_none());
        let restored = store.get(&out_point(1, 0)).unwrap().unwrap();
        assert_eq!(restored.status, CellStatus::Live);
        assert_eq!(restored.spent_block_number, None);
    }
}
