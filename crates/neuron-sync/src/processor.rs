//! Block processing: fetch, validate, write cell state, advance

use crate::aggregator::BalanceAggregator;
use crate::cursor::SyncCursor;
use crate::node::NodeClient;
use crate::reorg::{ReorgCheck, ReorgChecker};
use crate::store::{CellStateStore, SyncStateStore};
use crate::{Error, Result, SyncConfig};
use neuron_core::{
    Block, Cell, CellBatch, CellChange, CellStatus, Checkpoint, LockHash, Transaction,
    TxInvolvement,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Lock hashes being synced; swapped in place by `set_lock_hashes`
pub type SharedLockHashes = Arc<RwLock<HashSet<LockHash>>>;

struct ChainState {
    cursor: SyncCursor,
    checker: ReorgChecker,
}

/// Applies blocks to cell state in cursor order
pub struct BlockProcessor {
    node: Arc<dyn NodeClient>,
    cells: Arc<dyn CellStateStore>,
    aggregator: Arc<BalanceAggregator>,
    chain: Mutex<ChainState>,
    lock_hashes: SharedLockHashes,
}

impl BlockProcessor {
    /// Load the cursor and checkpoint window and build a processor
    pub fn new(
        node: Arc<dyn NodeClient>,
        cells: Arc<dyn CellStateStore>,
        sync_state: Arc<dyn SyncStateStore>,
        aggregator: Arc<BalanceAggregator>,
        config: &SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let window = config.reorg_window;
        let checkpoints = sync_state.recent_checkpoints(window)?;
        let cursor = SyncCursor::load(sync_state, window)?;
        let checker = ReorgChecker::from_checkpoints(checkpoints, window);

        debug!(
            cursor = ?cursor.get_current(),
            checkpoints = checker.len(),
            "Loaded sync state"
        );

        Ok(Self {
            node,
            cells,
            aggregator,
            chain: Mutex::new(ChainState { cursor, checker }),
            lock_hashes: Arc::new(RwLock::new(HashSet::new())),
        })
    }

    /// Node client
    pub fn node(&self) -> &Arc<dyn NodeClient> {
        &self.node
    }

    /// Balance aggregator
    pub fn aggregator(&self) -> &Arc<BalanceAggregator> {
        &self.aggregator
    }

    /// Tracked lock-hash set
    pub fn lock_hashes(&self) -> &SharedLockHashes {
        &self.lock_hashes
    }

    /// Replace the tracked lock-hash set
    pub fn set_lock_hashes(&self, lock_hashes: HashSet<LockHash>) {
        *self.lock_hashes.write() = lock_hashes;
    }

    /// Last processed height
    pub fn cursor(&self) -> Option<u64> {
        self.chain.lock().cursor.get_current()
    }

    /// First height not yet processed
    pub fn next_height(&self) -> u64 {
        self.chain.lock().cursor.next_height()
    }

    /// Retained checkpoints, ascending
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.chain.lock().checker.checkpoints().copied().collect()
    }

    /// Fetch one block; a block the node does not have yet is a fetch error
    pub async fn fetch_block(&self, height: u64) -> Result<Block> {
        let block = self
            .node
            .get_block_by_number(height)
            .await?
            .ok_or_else(|| Error::Fetch(format!("block {} not available", height)))?;
        if block.number() != height {
            return Err(Error::Decode(format!(
                "requested block {}, node returned {}",
                height,
                block.number()
            )));
        }
        Ok(block)
    }

    /// Cell transitions of `block` for the tracked lock hashes
    ///
    /// Every non-cellbase input becomes a spend; the store ignores spends of
    /// cells it does not hold.
    pub fn extract(block: &Block, tracked: &HashSet<LockHash>) -> CellBatch {
        let number = block.number();
        let mut batch = CellBatch::default();

        for tx in &block.transactions {
            if !tx.is_cellbase() {
                for input in &tx.inputs {
                    batch.changes.push(CellChange::Spent {
                        out_point: input.previous_output,
                        tx_hash: tx.hash,
                        block_number: number,
                    });
                }
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                let lock_hash = output.lock.hash();
                if !tracked.contains(&lock_hash) {
                    continue;
                }
                batch.changes.push(CellChange::Committed(Cell::live(
                    tx.out_point(index as u32),
                    lock_hash,
                    output.capacity.clone(),
                    number,
                )));
                batch.involvements.push(TxInvolvement {
                    tx_hash: tx.hash,
                    lock_hash,
                    block_number: Some(number),
                });
            }
        }

        batch
    }

    /// Validate and apply the block at the cursor's next height
    ///
    /// Cell writes commit before the cursor and checkpoint advance, so a
    /// failure in between leaves the block to be reprocessed, which is
    /// idempotent.
    pub fn apply_block(&self, block: &Block) -> Result<HashSet<LockHash>> {
        let number = block.number();
        let mut chain = self.chain.lock();

        let expected = chain.cursor.next_height();
        if number != expected {
            return Err(Error::InvalidCursorAdvance {
                current: chain.cursor.get_current(),
                requested: number,
            });
        }

        if let ReorgCheck::Mismatch { height } = chain.checker.validate(&block.header) {
            info!(block = number, mismatch = height, "Chain reorganization detected");
            return Err(Error::ReorgDetected { height });
        }

        let batch = {
            let tracked = self.lock_hashes.read();
            Self::extract(block, &tracked)
        };
        let touched = if batch.is_empty() {
            HashSet::new()
        } else {
            self.cells.apply_batch(&batch)?
        };

        let checkpoint = Checkpoint {
            height: number,
            block_hash: block.hash(),
        };
        chain.cursor.advance_to(checkpoint)?;
        chain.checker.record(checkpoint);
        drop(chain);

        debug!(height = number, touched = touched.len(), "Applied block");
        self.aggregator.refresh(&touched)?;
        Ok(touched)
    }

    /// Fetch and apply one block
    pub async fn process(&self, height: u64) -> Result<HashSet<LockHash>> {
        let block = self.fetch_block(height).await?;
        self.apply_block(&block)
    }

    /// Record a locally-originated transaction before it is committed
    ///
    /// Outputs to tracked lock hashes become pending and tracked live inputs
    /// become sent. Once the transaction is committed the block path turns
    /// them live and dead.
    pub fn apply_pending_transaction(&self, tx: &Transaction) -> Result<HashSet<LockHash>> {
        let mut batch = CellBatch::default();
        for input in &tx.inputs {
            batch.changes.push(CellChange::PendingSpend {
                out_point: input.previous_output,
                tx_hash: tx.hash,
            });
        }
        {
            let tracked = self.lock_hashes.read();
            for (index, output) in tx.outputs.iter().enumerate() {
                let lock_hash = output.lock.hash();
                if !tracked.contains(&lock_hash) {
                    continue;
                }
                batch.changes.push(CellChange::PendingOutput(Cell {
                    out_point: tx.out_point(index as u32),
                    lock_hash,
                    capacity: output.capacity.clone(),
                    status: CellStatus::Pending,
                    block_number: None,
                    spent_block_number: None,
                }));
                batch.involvements.push(TxInvolvement {
                    tx_hash: tx.hash,
                    lock_hash,
                    block_number: None,
                });
            }
        }

        let touched = self.cells.apply_batch(&batch)?;
        debug!(tx = %tx.hash, touched = touched.len(), "Applied pending transaction");
        self.aggregator.refresh(&touched)?;
        Ok(touched)
    }

    /// Roll back after a mismatch at `mismatch`; returns the new cursor
    pub async fn roll_back(&self, mismatch: u64) -> Result<u64> {
        let fork = self.find_fork_point(mismatch).await?;
        self.rollback_to(fork)?;
        Ok(fork)
    }

    /// Highest retained checkpoint below `mismatch` that the node still agrees with
    ///
    /// Reads only; nothing is written until [`BlockProcessor::rollback_to`].
    pub async fn find_fork_point(&self, mismatch: u64) -> Result<u64> {
        let checker = self.chain.lock().checker.clone();
        checker.find_fork_point(self.node.as_ref(), mismatch).await
    }

    /// Discard everything above `height` and recompute every address
    ///
    /// A height at or above the cursor is a no-op.
    pub fn rollback_to(&self, height: u64) -> Result<()> {
        let mut chain = self.chain.lock();
        match chain.cursor.get_current() {
            Some(current) if height < current => {}
            _ => return Ok(()),
        }

        let affected = self.cells.revert_above(height)?;
        chain.cursor.rollback_to(height)?;
        chain.checker.truncate_above(height);
        drop(chain);

        info!(height, affected = affected.len(), "Rolled back to height");
        self.aggregator.refresh_all()?;
        Ok(())
    }
}
