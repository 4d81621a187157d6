//! Cell records tracked by the wallet

use crate::hash::{H256, LockHash};
use crate::{Capacity, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to a transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Creating transaction
    pub tx_hash: H256,
    /// Output index
    pub index: u32,
}

impl OutPoint {
    /// Create an outpoint
    pub fn new(tx_hash: H256, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

/// Lifecycle of a tracked cell
///
/// `Pending` cells come from locally-originated transactions that are not yet
/// committed. `Sent` cells are committed but spent by an uncommitted
/// transaction. `Dead` cells are spent on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    /// Committed and unspent
    Live,
    /// Committed, spend pending
    Sent,
    /// Output of an uncommitted transaction
    Pending,
    /// Spent on chain
    Dead,
}

impl CellStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Sent => "sent",
            Self::Pending => "pending",
            Self::Dead => "dead",
        }
    }
}

impl FromStr for CellStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "live" => Ok(Self::Live),
            "sent" => Ok(Self::Sent),
            "pending" => Ok(Self::Pending),
            "dead" => Ok(Self::Dead),
            other => Err(Error::InvalidCellStatus(other.to_string())),
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cell owned by a tracked lock hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Outpoint (primary key)
    pub out_point: OutPoint,
    /// Owning lock hash
    pub lock_hash: LockHash,
    /// Amount
    pub capacity: Capacity,
    /// Current status
    pub status: CellStatus,
    /// Block that created the cell; `None` while pending
    pub block_number: Option<u64>,
    /// Block that spent the cell
    pub spent_block_number: Option<u64>,
}

impl Cell {
    /// New live cell created at `block_number`
    pub fn live(out_point: OutPoint, lock_hash: LockHash, capacity: Capacity, block_number: u64) -> Self {
        Self {
            out_point,
            lock_hash,
            capacity,
            status: CellStatus::Live,
            block_number: Some(block_number),
            spent_block_number: None,
        }
    }
}

/// A status transition produced by block or pending-transaction processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellChange {
    /// Output committed on chain; becomes `Live` unless already spent
    Committed(Cell),
    /// Committed spend of a tracked cell
    Spent {
        /// Consumed cell
        out_point: OutPoint,
        /// Spending transaction
        tx_hash: H256,
        /// Spending block
        block_number: u64,
    },
    /// Output of an uncommitted local transaction
    PendingOutput(Cell),
    /// Input of an uncommitted local transaction
    PendingSpend {
        /// Consumed cell
        out_point: OutPoint,
        /// Spending transaction
        tx_hash: H256,
    },
}

/// A tracked lock hash's involvement in a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInvolvement {
    /// Transaction hash
    pub tx_hash: H256,
    /// Involved lock hash
    pub lock_hash: LockHash,
    /// Committing block; `None` while pending
    pub block_number: Option<u64>,
}

/// All cell writes for one block or one pending transaction
///
/// A batch is applied in a single storage transaction, in order. Spends only
/// touch cells the store already tracks; the store records the spender's
/// involvement itself once it knows the consumed cell's lock hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellBatch {
    /// Status transitions in transaction order
    pub changes: Vec<CellChange>,
    /// Transaction involvements for tx counting
    pub involvements: Vec<TxInvolvement>,
}

impl CellBatch {
    /// Whether the batch writes nothing
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.involvements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [CellStatus::Live, CellStatus::Sent, CellStatus::Pending, CellStatus::Dead] {
            assert_eq!(status.as_str().parse::<CellStatus>().unwrap(), status);
        }
        assert!("spent".parse::<CellStatus>().is_err());
    }

    #[test]
    fn test_out_point_display() {
        let op = OutPoint::new(H256([0x11; 32]), 2);
        assert!(op.to_string().ends_with(":2"));
        assert!(op.to_string().starts_with("0x1111"));
    }
}
