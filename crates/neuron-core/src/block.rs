//! Blocks and transactions as seen by the sync engine
//!
//! Only the fields the engine needs are modelled: identities, parent links and
//! the input/output structure of each transaction.

use crate::hash::H256;
use crate::{Capacity, OutPoint, Script};
use serde::{Deserialize, Serialize};

/// Block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Height
    pub number: u64,
    /// Block identity
    pub hash: H256,
    /// Parent identity
    pub parent_hash: H256,
    /// Milliseconds since epoch
    pub timestamp: u64,
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInput {
    /// Consumed outpoint
    pub previous_output: OutPoint,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    /// Amount
    pub capacity: Capacity,
    /// Lock script
    pub lock: Script,
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash
    pub hash: H256,
    /// Inputs
    pub inputs: Vec<CellInput>,
    /// Outputs
    pub outputs: Vec<CellOutput>,
}

impl Transaction {
    /// Outpoint of output `index`
    pub fn out_point(&self, index: u32) -> OutPoint {
        OutPoint::new(self.hash, index)
    }

    /// Whether this is a cellbase (its single input has a null outpoint)
    pub fn is_cellbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.tx_hash == H256::zero()
    }
}

/// Block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Header
    pub header: Header,
    /// Transactions in block order
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Height
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Block identity
    pub fn hash(&self) -> H256 {
        self.header.hash
    }
}

/// Processed `(height, identity)` pair retained for reorg lookback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Height
    pub height: u64,
    /// Block identity at that height
    pub block_hash: H256,
}
