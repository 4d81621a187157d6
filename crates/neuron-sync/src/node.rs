//! Node client seam

use crate::Result;
use async_trait::async_trait;
use neuron_core::{Block, Cell, CellStatus, Header, LockHash};

/// Read-only view of a chain node
///
/// Any transport failure surfaces as [`crate::Error::Fetch`]; a payload that
/// cannot be decoded as [`crate::Error::Decode`].
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Header of the node's best block
    async fn get_tip_header(&self) -> Result<Header>;

    /// Header at `number`, `None` above the node's tip
    async fn get_header_by_number(&self, number: u64) -> Result<Option<Header>>;

    /// Block at `number`, `None` above the node's tip
    async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>>;

    /// Cells the node indexes under `lock_hash` with `status`
    async fn get_cells_by_lock_hash(
        &self,
        lock_hash: &LockHash,
        status: CellStatus,
    ) -> Result<Vec<Cell>>;
}
