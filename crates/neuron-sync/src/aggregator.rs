//! Per-address balance aggregation from cell state

use crate::notifier::ChangeNotifier;
use crate::store::{AddressStore, CellStateStore};
use crate::{Error, Result};
use neuron_core::{AddressBalance, Capacity, Cell, CellStatus, LockHash, LockUtils, TrackedAddress};
use num_bigint::BigInt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};

/// Recomputes tx counts and balances and writes them back to the address store
pub struct BalanceAggregator {
    cells: Arc<dyn CellStateStore>,
    addresses: Arc<dyn AddressStore>,
    lock_utils: LockUtils,
    notifier: ChangeNotifier,
}

impl BalanceAggregator {
    /// Create an aggregator
    pub fn new(
        cells: Arc<dyn CellStateStore>,
        addresses: Arc<dyn AddressStore>,
        lock_utils: LockUtils,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            cells,
            addresses,
            lock_utils,
            notifier,
        }
    }

    /// Lock-hash derivation in use
    pub fn lock_utils(&self) -> &LockUtils {
        &self.lock_utils
    }

    /// Every lock hash of every stored address
    pub fn tracked_lock_hashes(&self) -> Result<HashSet<LockHash>> {
        let mut hashes = HashSet::new();
        for address in self.addresses.get_all()? {
            hashes.extend(self.lock_utils.address_to_all_lock_hashes(&address)?);
        }
        Ok(hashes)
    }

    /// Aggregate counters for one address from current cell state
    ///
    /// Every component is a sum of unsigned capacities and `balance` only
    /// adds `live` and `sent`, so a `NegativeBalance` here means the cell
    /// store returned a corrupt capacity rather than a bookkeeping error.
    pub fn recompute(&self, address: &TrackedAddress) -> Result<AddressBalance> {
        let lock_hashes = self.lock_utils.address_to_all_lock_hashes(address)?;
        let cells = self.cells.cells_by_lock_hashes(&lock_hashes, None)?;
        let tx_count = self.cells.transaction_count(&lock_hashes)?;

        let live = sum_status(&cells, CellStatus::Live);
        let sent = sum_status(&cells, CellStatus::Sent);
        let pending = sum_status(&cells, CellStatus::Pending);
        let balance = &live + &sent;

        let live = to_capacity(live, address, "live balance")?;
        let sent = to_capacity(sent, address, "sent balance")?;
        let pending = to_capacity(pending, address, "pending balance")?;
        let balance = to_capacity(balance, address, "balance")?;

        Ok(AddressBalance {
            tx_count,
            live_balance: live,
            sent_balance: sent,
            pending_balance: pending,
            balance,
        })
    }

    /// Recompute addresses owning any of `touched` and persist the collection
    ///
    /// Returns how many addresses changed.
    pub fn refresh(&self, touched: &HashSet<LockHash>) -> Result<usize> {
        if touched.is_empty() {
            return Ok(0);
        }
        self.refresh_where(|lock_hashes| lock_hashes.iter().any(|h| touched.contains(h)))
    }

    /// Recompute every address (after a rollback)
    pub fn refresh_all(&self) -> Result<usize> {
        self.refresh_where(|_| true)
    }

    fn refresh_where<F>(&self, mut selected: F) -> Result<usize>
    where
        F: FnMut(&[LockHash]) -> bool,
    {
        let mut addresses = self.addresses.get_all()?;
        let mut changed = 0;
        let mut first_error = None;

        for address in addresses.iter_mut() {
            let lock_hashes = self.lock_utils.address_to_all_lock_hashes(address)?;
            if !selected(&lock_hashes) {
                continue;
            }
            match self.recompute(address) {
                Ok(balance) => {
                    if balance != address.balances() {
                        address.apply_balance(balance);
                        changed += 1;
                    }
                }
                Err(e @ Error::NegativeBalance { .. }) => {
                    error!("{}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        if changed > 0 {
            self.addresses.update_all(addresses)?;
            self.notifier.notify();
            debug!(changed, "Updated address balances");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }
}

fn sum_status(cells: &[Cell], status: CellStatus) -> BigInt {
    cells
        .iter()
        .filter(|c| c.status == status)
        .map(|c| BigInt::from(c.capacity.as_biguint().clone()))
        .sum()
}

/// Convert a signed intermediate into a capacity, refusing negatives
///
/// Shared guard for every derived amount; nothing derived in this crate
/// subtracts today.
pub fn to_capacity(value: BigInt, address: &TrackedAddress, component: &str) -> Result<Capacity> {
    value
        .to_biguint()
        .map(Capacity::from_biguint)
        .ok_or_else(|| Error::NegativeBalance {
            address: address.address.clone(),
            detail: format!("{} = {}", component, value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_core::{AddressType, AddressVersion, Cell, CellBatch, CellChange, OutPoint, H256};
    use neuron_storage_sqlite::{CellStore, Database, JsonAddressStore};

    const BLAKE160: &str = "0x36c329ed630d6ce750712a477543672adab57f4c";

    struct Fixture {
        cells: Arc<CellStore>,
        addresses: Arc<JsonAddressStore>,
        notifier: ChangeNotifier,
        aggregator: BalanceAggregator,
        lock_hash: LockHash,
    }

    fn fixture() -> Fixture {
        let cells = Arc::new(CellStore::new(Arc::new(Database::open_in_memory().unwrap())));
        let addresses = Arc::new(JsonAddressStore::in_memory());
        addresses
            .update_all(vec![TrackedAddress::new(
                "w1",
                "ckt1qyqrdsefa43s6m882pcj53m4gdnj4k440axqswmu83",
                "m/44'/309'/0'/0/0",
                AddressType::Receiving,
                0,
                BLAKE160,
                AddressVersion::Testnet,
            )])
            .unwrap();
        let notifier = ChangeNotifier::new();
        let lock_utils = LockUtils::default();
        let lock_hash = lock_utils.address_to_all_lock_hashes(&addresses.get_all().unwrap()[0]).unwrap()[0];
        let aggregator = BalanceAggregator::new(
            cells.clone(),
            addresses.clone(),
            lock_utils,
            notifier.clone(),
        );
        Fixture {
            cells,
            addresses,
            notifier,
            aggregator,
            lock_hash,
        }
    }

    fn cell(n: u8, lock_hash: LockHash, capacity: u64, status: CellStatus) -> Cell {
        Cell {
            out_point: OutPoint::new(H256([n; 32]), 0),
            lock_hash,
            capacity: Capacity::from(capacity),
            status,
            block_number: Some(1),
            spent_block_number: None,
        }
    }

    #[test]
    fn test_live_sent_pending_balance() {
        let f = fixture();
        f.cells
            .apply_batch(&CellBatch {
                changes: vec![
                    CellChange::Committed(cell(1, f.lock_hash, 500, CellStatus::Live)),
                    CellChange::Committed(cell(2, f.lock_hash, 200, CellStatus::Live)),
                ],
                involvements: vec![],
            })
            .unwrap();
        f.cells
            .apply_batch(&CellBatch {
                changes: vec![
                    CellChange::PendingSpend {
                        out_point: OutPoint::new(H256([2; 32]), 0),
                        tx_hash: H256([9; 32]),
                    },
                    CellChange::PendingOutput(Cell {
                        block_number: None,
                        ..cell(3, f.lock_hash, 100, CellStatus::Pending)
                    }),
                ],
                involvements: vec![],
            })
            .unwrap();

        let address = &f.addresses.get_all().unwrap()[0];
        let balance = f.aggregator.recompute(address).unwrap();
        assert_eq!(balance.live_balance, Capacity::from(500));
        assert_eq!(balance.sent_balance, Capacity::from(200));
        assert_eq!(balance.pending_balance, Capacity::from(100));
        assert_eq!(balance.balance, Capacity::from(700));
        assert_eq!(balance.tx_count, 1);
    }

    #[tokio::test]
    async fn test_refresh_persists_and_notifies() {
        let f = fixture();
        let mut rx = f.notifier.subscribe();
        let touched = f
            .cells
            .apply_batch(&CellBatch {
                changes: vec![CellChange::Committed(cell(1, f.lock_hash, 500, CellStatus::Live))],
                involvements: vec![],
            })
            .unwrap();

        assert_eq!(f.aggregator.refresh(&touched).unwrap(), 1);
        assert!(rx.recv().await.is_ok());
        assert_eq!(f.addresses.get_all().unwrap()[0].balance, Capacity::from(500));

        // Nothing changed the second time, so no update and no signal.
        assert_eq!(f.aggregator.refresh(&touched).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_refresh_ignores_unrelated_lock_hashes() {
        let f = fixture();
        let other = H256([0xee; 32]);
        let touched = f
            .cells
            .apply_batch(&CellBatch {
                changes: vec![CellChange::Committed(cell(1, other, 500, CellStatus::Live))],
                involvements: vec![],
            })
            .unwrap();
        assert_eq!(f.aggregator.refresh(&touched).unwrap(), 0);
    }

    #[test]
    fn test_negative_intermediate_reported() {
        let f = fixture();
        let address = &f.addresses.get_all().unwrap()[0];
        let err = to_capacity(BigInt::from(-1), address, "balance").unwrap_err();
        assert!(matches!(err, Error::NegativeBalance { .. }));
        assert!(to_capacity(BigInt::from(0), address, "balance").unwrap().is_zero());
    }

    #[test]
    fn test_recompute_exceeds_u64_without_overflow() {
        let f = fixture();
        f.cells
            .apply_batch(&CellBatch {
                changes: vec![
                    CellChange::Committed(cell(1, f.lock_hash, u64::MAX, CellStatus::Live)),
                    CellChange::Committed(cell(2, f.lock_hash, u64::MAX, CellStatus::Live)),
                    CellChange::Committed(cell(3, f.lock_hash, u64::MAX, CellStatus::Live)),
                ],
                involvements: vec![],
            })
            .unwrap();
        f.cells
            .apply_batch(&CellBatch {
                changes: vec![CellChange::PendingSpend {
                    out_point: OutPoint::new(H256([3; 32]), 0),
                    tx_hash: H256([9; 32]),
                }],
                involvements: vec![],
            })
            .unwrap();

        let address = &f.addresses.get_all().unwrap()[0];
        let balance = f.aggregator.recompute(address).unwrap();
        let max = BigInt::from(u64::MAX);
        let expect = |n: u32| to_capacity(&max * n, address, "expected").unwrap();
        assert_eq!(balance.live_balance, expect(2));
        assert_eq!(balance.sent_balance, expect(1));
        assert_eq!(balance.balance, expect(3));
        assert!(balance.pending_balance.is_zero());
    }

    #[test]
    fn test_tracked_lock_hashes() {
        let f = fixture();
        let hashes = f.aggregator.tracked_lock_hashes().unwrap();
        assert_eq!(hashes, HashSet::from([f.lock_hash]));
    }
}
