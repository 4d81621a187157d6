//! Reorg checkpoint window
//!
//! One row per processed height holding the block identity seen at that
//! height. Rows are written in the same transaction that advances the cursor.

use crate::Result;
use neuron_core::{Checkpoint, H256};
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

/// Checkpoint manager over a connection or open transaction
pub struct CheckpointManager<'a> {
    conn: &'a Connection,
}

impl<'a> CheckpointManager<'a> {
    /// Create new checkpoint manager
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record (or replace) the identity at `height`
    pub fn record(&self, checkpoint: &Checkpoint) -> Result<()> {
        let created_at = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (height, block_hash, created_at) VALUES (?1, ?2, ?3)",
            params![checkpoint.height, checkpoint.block_hash.to_string(), created_at],
        )?;
        Ok(())
    }

    /// Get latest checkpoint
    pub fn get_latest(&self) -> Result<Option<Checkpoint>> {
        let row: Option<(u64, String)> = self
            .conn
            .query_row(
                "SELECT height, block_hash FROM checkpoints ORDER BY height DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(to_checkpoint).transpose()
    }

    /// Checkpoint at exactly `height`
    pub fn get_at_height(&self, height: u64) -> Result<Option<Checkpoint>> {
        let row: Option<(u64, String)> = self
            .conn
            .query_row(
                "SELECT height, block_hash FROM checkpoints WHERE height = ?1",
                [height],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(to_checkpoint).transpose()
    }

    /// The `limit` most recent checkpoints, ascending by height
    pub fn recent(&self, limit: usize) -> Result<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT height, block_hash FROM checkpoints ORDER BY height DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<(u64, String)>, _>>()?;

        let mut checkpoints = rows
            .into_iter()
            .map(to_checkpoint)
            .collect::<Result<Vec<_>>>()?;
        checkpoints.reverse();
        Ok(checkpoints)
    }

    /// Delete checkpoints above `height`
    pub fn delete_above(&self, height: u64) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM checkpoints WHERE height > ?1", [height])?)
    }

    /// Prune old checkpoints (keep only last N)
    pub fn prune(&self, keep_count: usize) -> Result<usize> {
        let deleted = self.conn.execute(
            r#"
            DELETE FROM checkpoints
            WHERE height NOT IN (
                SELECT height FROM checkpoints
                ORDER BY height DESC
                LIMIT ?1
            )
            "#,
            [keep_count as i64],
        )?;

        Ok(deleted)
    }

    /// Count checkpoints
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn to_checkpoint((height, hash): (u64, String)) -> Result<Checkpoint> {
    Ok(Checkpoint {
        height,
        block_hash: H256::from_str(&hash)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn
    }

    fn cp(height: u64) -> Checkpoint {
        Checkpoint {
            height,
            block_hash: H256([height as u8; 32]),
        }
    }

    #[test]
    fn test_recent_ascending() {
        let conn = conn();
        let manager = CheckpointManager::new(&conn);
        for h in 100..=110 {
            manager.record(&cp(h)).unwrap();
        }
        let recent = manager.recent(3).unwrap();
        assert_eq!(
            recent.iter().map(|c| c.height).collect::<Vec<_>>(),
            vec![108, 109, 110]
        );
        assert_eq!(manager.get_latest().unwrap(), Some(cp(110)));
        assert_eq!(manager.get_at_height(105).unwrap(), Some(cp(105)));
    }

    #[test]
    fn test_delete_above_and_prune() {
        let conn = conn();
        let manager = CheckpointManager::new(&conn);
        for h in 100..=110 {
            manager.record(&cp(h)).unwrap();
        }
        assert_eq!(manager.delete_above(104).unwrap(), 6);
        assert_eq!(manager.get_latest().unwrap(), Some(cp(104)));
        assert_eq!(manager.prune(2).unwrap(), 3);
        assert_eq!(manager.count().unwrap(), 2);
    }
}
