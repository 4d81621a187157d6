//! Persisted sync cursor

use crate::store::SyncStateStore;
use crate::{Error, Result};
use neuron_core::Checkpoint;
use std::sync::Arc;

/// Last fully-processed height, persisted on every change
///
/// Moves forward through [`SyncCursor::advance_to`], which also records the
/// checkpoint for the new height in the same write, and backwards only
/// through [`SyncCursor::rollback_to`].
pub struct SyncCursor {
    store: Arc<dyn SyncStateStore>,
    current: Option<u64>,
    window: usize,
}

impl SyncCursor {
    /// Load the persisted cursor
    pub fn load(store: Arc<dyn SyncStateStore>, window: usize) -> Result<Self> {
        let current = store.load_cursor()?;
        Ok(Self {
            store,
            current,
            window,
        })
    }

    /// Last processed height, `None` before the first block
    pub fn get_current(&self) -> Option<u64> {
        self.current
    }

    /// Height the next tick starts from
    pub fn next_height(&self) -> u64 {
        self.current.map(|h| h + 1).unwrap_or(0)
    }

    /// Move to `checkpoint.height`, recording the checkpoint
    pub fn advance_to(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if let Some(current) = self.current {
            if checkpoint.height < current {
                return Err(Error::InvalidCursorAdvance {
                    current: self.current,
                    requested: checkpoint.height,
                });
            }
        }
        self.store.advance(&checkpoint, self.window)?;
        self.current = Some(checkpoint.height);
        Ok(())
    }

    /// Move back to `height` after a confirmed reorg
    pub fn rollback_to(&mut self, height: u64) -> Result<()> {
        self.store.rollback_to(height)?;
        self.current = Some(height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_core::H256;
    use neuron_storage_sqlite::{Database, SyncStateStorage};

    fn store() -> Arc<dyn SyncStateStore> {
        Arc::new(SyncStateStorage::new(Arc::new(
            Database::open_in_memory().unwrap(),
        )))
    }

    fn cp(height: u64) -> Checkpoint {
        Checkpoint {
            height,
            block_hash: H256([height as u8; 32]),
        }
    }

    #[test]
    fn test_advance_and_reload() {
        let store = store();
        let mut cursor = SyncCursor::load(store.clone(), 12).unwrap();
        assert_eq!(cursor.get_current(), None);
        assert_eq!(cursor.next_height(), 0);

        cursor.advance_to(cp(9)).unwrap();
        assert_eq!(cursor.next_height(), 10);

        let reloaded = SyncCursor::load(store, 12).unwrap();
        assert_eq!(reloaded.get_current(), Some(9));
    }

    #[test]
    fn test_advance_backwards_rejected() {
        let mut cursor = SyncCursor::load(store(), 12).unwrap();
        cursor.advance_to(cp(10)).unwrap();
        let err = cursor.advance_to(cp(9)).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCursorAdvance {
                current: Some(10),
                requested: 9
            }
        ));
        assert_eq!(cursor.get_current(), Some(10));
    }

    #[test]
    fn test_rollback() {
        let store = store();
        let mut cursor = SyncCursor::load(store.clone(), 12).unwrap();
        for h in 100..=110 {
            cursor.advance_to(cp(h)).unwrap();
        }
        cursor.rollback_to(104).unwrap();
        assert_eq!(cursor.get_current(), Some(104));
        assert_eq!(store.load_cursor().unwrap(), Some(104));
    }
}
