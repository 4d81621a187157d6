//! Compare local live cells with the node's view

use crate::node::NodeClient;
use crate::store::CellStateStore;
use crate::Result;
use neuron_core::{CellStatus, LockHash, OutPoint};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Outcome of [`verify_live_cells`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveCellReport {
    /// Live on the node, absent or not live locally
    pub missing: Vec<OutPoint>,
    /// Live locally, not live on the node
    pub extra: Vec<OutPoint>,
}

impl LiveCellReport {
    /// Whether both sides agree
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Diff the live cells under `lock_hash`
pub async fn verify_live_cells(
    node: &dyn NodeClient,
    cells: &dyn CellStateStore,
    lock_hash: &LockHash,
) -> Result<LiveCellReport> {
    let remote: BTreeSet<OutPoint> = node
        .get_cells_by_lock_hash(lock_hash, CellStatus::Live)
        .await?
        .into_iter()
        .map(|c| c.out_point)
        .collect();
    let local: BTreeSet<OutPoint> = cells
        .cells_by_lock_hashes(std::slice::from_ref(lock_hash), Some(CellStatus::Live))?
        .into_iter()
        .map(|c| c.out_point)
        .collect();

    let report = LiveCellReport {
        missing: remote.difference(&local).copied().collect(),
        extra: local.difference(&remote).copied().collect(),
    };

    if report.is_consistent() {
        info!(%lock_hash, cells = local.len(), "Live cells match node");
    } else {
        warn!(
            %lock_hash,
            missing = report.missing.len(),
            extra = report.extra.len(),
            "Live cells differ from node"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockNode;
    use neuron_core::{
        Capacity, Cell, CellBatch, CellChange, CellInput, CellOutput, SystemScript, Transaction, H256,
    };
    use neuron_storage_sqlite::{CellStore, Database};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reports_missing_and_extra() {
        let script = SystemScript::secp256k1_blake160().script_for(&[9; 20]);
        let lock_hash = script.hash();
        let node = MockNode::new();
        let tx = Transaction {
            hash: H256([0xaa; 32]),
            inputs: vec![CellInput {
                previous_output: OutPoint::new(H256::zero(), u32::MAX),
            }],
            outputs: vec![CellOutput {
                capacity: Capacity::from(100),
                lock: script,
            }],
        };
        node.push_block(vec![tx]);

        let store = CellStore::new(Arc::new(Database::open_in_memory().unwrap()));
        let stray = OutPoint::new(H256([0xbb; 32]), 0);
        let mut batch = CellBatch::default();
        batch.changes.push(CellChange::Committed(Cell::live(
            stray,
            lock_hash,
            Capacity::from(5),
            1,
        )));
        store.apply_batch(&batch).unwrap();

        let report = verify_live_cells(&node, &store, &lock_hash).await.unwrap();
        assert_eq!(report.missing, vec![OutPoint::new(H256([0xaa; 32]), 0)]);
        assert_eq!(report.extra, vec![stray]);
        assert!(!report.is_consistent());
    }
}
