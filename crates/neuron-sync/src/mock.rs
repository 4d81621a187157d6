//! In-memory node for tests (`test-helpers` feature)
//!
//! Holds a linear chain that tests extend, fork and break on demand.

use crate::node::NodeClient;
use crate::{Error, Result};
use async_trait::async_trait;
use neuron_core::{
    blake2b_256, Block, Cell, CellStatus, Header, LockHash, OutPoint, Transaction, H256,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Default)]
struct MockChain {
    blocks: Vec<Block>,
    failing: HashSet<u64>,
    fetch_delay: Option<Duration>,
    fetches: Vec<u64>,
}

/// Scriptable in-memory node
pub struct MockNode {
    chain: RwLock<MockChain>,
}

/// Deterministic block identity for `(number, fork)`
pub fn mock_block_hash(number: u64, fork: u64) -> H256 {
    let mut seed = [0u8; 16];
    seed[..8].copy_from_slice(&number.to_le_bytes());
    seed[8..].copy_from_slice(&fork.to_le_bytes());
    H256(blake2b_256(&seed))
}

impl MockNode {
    /// Chain holding only an empty genesis block
    pub fn new() -> Self {
        let node = Self {
            chain: RwLock::new(MockChain::default()),
        };
        node.push_block_on_fork(Vec::new(), 0);
        node
    }

    /// Chain of empty blocks `0..=tip`
    pub fn with_height(tip: u64) -> Self {
        let node = Self::new();
        for _ in 0..tip {
            node.push_block(Vec::new());
        }
        node
    }

    /// Append a block with `transactions` on top of the tip
    pub fn push_block(&self, transactions: Vec<Transaction>) -> Header {
        self.push_block_on_fork(transactions, 0)
    }

    fn push_block_on_fork(&self, transactions: Vec<Transaction>, fork: u64) -> Header {
        let mut chain = self.chain.write();
        let (number, parent_hash) = match chain.blocks.last() {
            Some(tip) => (tip.header.number + 1, tip.header.hash),
            None => (0, H256::zero()),
        };
        let header = Header {
            number,
            hash: mock_block_hash(number, fork),
            parent_hash,
            timestamp: 1_600_000_000_000 + number * 8_000,
        };
        chain.blocks.push(Block {
            header: header.clone(),
            transactions,
        });
        header
    }

    /// Replace every block from `height` up with empty blocks on `fork`,
    /// keeping the tip height unchanged
    pub fn reorg_from(&self, height: u64, fork: u64) {
        let old_tip = self.tip_number();
        self.chain.write().blocks.truncate(height as usize);
        for _ in height..=old_tip {
            self.push_block_on_fork(Vec::new(), fork);
        }
    }

    /// Replace block `height` and above with `blocks` built on `fork`
    pub fn reorg_with(&self, height: u64, fork: u64, blocks: Vec<Vec<Transaction>>) {
        self.chain.write().blocks.truncate(height as usize);
        for transactions in blocks {
            self.push_block_on_fork(transactions, fork);
        }
    }

    /// Current tip height
    pub fn tip_number(&self) -> u64 {
        self.chain
            .read()
            .blocks
            .last()
            .map(|b| b.header.number)
            .unwrap_or(0)
    }

    /// Header at `number`
    pub fn header(&self, number: u64) -> Option<Header> {
        self.chain
            .read()
            .blocks
            .get(number as usize)
            .map(|b| b.header.clone())
    }

    /// Make block fetches at `height` fail with a fetch error
    pub fn set_failing(&self, height: u64, failing: bool) {
        let mut chain = self.chain.write();
        if failing {
            chain.failing.insert(height);
        } else {
            chain.failing.remove(&height);
        }
    }

    /// Delay every block fetch
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.chain.write().fetch_delay = delay;
    }

    /// Heights requested through `get_block_by_number`, in order
    pub fn fetch_log(&self) -> Vec<u64> {
        self.chain.read().fetches.clone()
    }

    fn live_cells(&self, lock_hash: &LockHash) -> Vec<Cell> {
        let chain = self.chain.read();
        let mut created: HashMap<OutPoint, Cell> = HashMap::new();
        let mut spent: HashSet<OutPoint> = HashSet::new();

        for block in &chain.blocks {
            for tx in &block.transactions {
                for input in &tx.inputs {
                    spent.insert(input.previous_output);
                }
                for (index, output) in tx.outputs.iter().enumerate() {
                    if output.lock.hash() == *lock_hash {
                        let out_point = tx.out_point(index as u32);
                        created.insert(
                            out_point,
                            Cell::live(
                                out_point,
                                *lock_hash,
                                output.capacity.clone(),
                                block.header.number,
                            ),
                        );
                    }
                }
            }
        }

        let mut cells: Vec<Cell> = created
            .into_iter()
            .filter(|(out_point, _)| !spent.contains(out_point))
            .map(|(_, cell)| cell)
            .collect();
        cells.sort_by_key(|c| c.out_point);
        cells
    }
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn get_tip_header(&self) -> Result<Header> {
        self.chain
            .read()
            .blocks
            .last()
            .map(|b| b.header.clone())
            .ok_or_else(|| Error::Fetch("empty chain".into()))
    }

    async fn get_header_by_number(&self, number: u64) -> Result<Option<Header>> {
        Ok(self.header(number))
    }

    async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        let (delay, failing, block) = {
            let mut chain = self.chain.write();
            chain.fetches.push(number);
            (
                chain.fetch_delay,
                chain.failing.contains(&number),
                chain.blocks.get(number as usize).cloned(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(Error::Fetch(format!("mock fetch failure at {}", number)));
        }
        Ok(block)
    }

    async fn get_cells_by_lock_hash(
        &self,
        lock_hash: &LockHash,
        status: CellStatus,
    ) -> Result<Vec<Cell>> {
        match status {
            CellStatus::Live => Ok(self.live_cells(lock_hash)),
            _ => Ok(Vec::new()),
        }
    }
}
