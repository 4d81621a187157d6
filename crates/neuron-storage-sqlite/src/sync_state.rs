//! Sync cursor storage
//!
//! The cursor is the last fully-processed height. It moves forward together
//! with the checkpoint for that height, in one transaction, and moves back
//! only through [`SyncStateStorage::rollback_to`].

use crate::{CheckpointManager, Database, Result};
use neuron_core::Checkpoint;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

/// Sync state record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStateRow {
    /// Last processed height, `None` before the first block
    pub cursor: Option<u64>,
    /// Last update timestamp (ISO 8601)
    pub updated_at: String,
}

/// Sync state storage operations
#[derive(Clone)]
pub struct SyncStateStorage {
    db: Arc<Database>,
}

impl SyncStateStorage {
    /// Create new sync state storage
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load the sync state row
    pub fn load_sync_state(&self) -> Result<SyncStateRow> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT cursor, updated_at FROM sync_state WHERE id = 1",
                    [],
                    |row| {
                        Ok(SyncStateRow {
                            cursor: row.get(0)?,
                            updated_at: row.get(1)?,
                        })
                    },
                )
                .optional()?;

            Ok(row.unwrap_or(SyncStateRow {
                cursor: None,
                updated_at: chrono::Utc::now().to_rfc3339(),
            }))
        })
    }

    /// Current cursor
    pub fn load_cursor(&self) -> Result<Option<u64>> {
        Ok(self.load_sync_state()?.cursor)
    }

    /// Record `checkpoint` and move the cursor to its height atomically,
    /// pruning the window to `keep` entries
    pub fn advance(&self, checkpoint: &Checkpoint, keep: usize) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.db.with_transaction(|tx| {
            let checkpoints = CheckpointManager::new(tx);
            checkpoints.record(checkpoint)?;
            tx.execute(
                "UPDATE sync_state SET cursor = ?1, updated_at = ?2 WHERE id = 1",
                params![checkpoint.height, updated_at],
            )?;
            checkpoints.prune(keep)?;
            Ok(())
        })
    }

    /// Move the cursor back to `height` and drop checkpoints above it
    pub fn rollback_to(&self, height: u64) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        let removed = self.db.with_transaction(|tx| {
            tx.execute(
                "UPDATE sync_state SET cursor = ?1, updated_at = ?2 WHERE id = 1",
                params![height, updated_at],
            )?;
            CheckpointManager::new(tx).delete_above(height)
        })?;

        tracing::info!(height, removed, "Rolled back sync cursor");
        Ok(())
    }

    /// Clear the cursor and every checkpoint (full rescan)
    pub fn reset(&self) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.db.with_transaction(|tx| {
            tx.execute(
                "UPDATE sync_state SET cursor = NULL, updated_at = ?1 WHERE id = 1",
                [&updated_at],
            )?;
            tx.execute("DELETE FROM checkpoints", [])?;
            Ok(())
        })
    }

    /// The `limit` most recent checkpoints, ascending by height
    pub fn recent_checkpoints(&self, limit: usize) -> Result<Vec<Checkpoint>> {
        self.db
            .with_conn(|conn| CheckpointManager::new(conn).recent(limit))
    }
}
