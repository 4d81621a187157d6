//! Property tests for balance aggregation

use neuron_core::{
    AddressType, AddressVersion, Capacity, Cell, CellBatch, CellChange, CellStatus, OutPoint,
    SystemScript, TrackedAddress, H256,
};
use neuron_storage_sqlite::{CellStore, Database, JsonAddressStore};
use neuron_sync::{BalanceAggregator, ChangeNotifier};
use proptest::prelude::*;
use std::sync::Arc;

fn status_strategy() -> impl Strategy<Value = CellStatus> {
    prop_oneof![
        Just(CellStatus::Live),
        Just(CellStatus::Sent),
        Just(CellStatus::Pending),
        Just(CellStatus::Dead),
    ]
}

fn cell_batch(cells: &[(u64, CellStatus)]) -> CellBatch {
    let lock_hash = SystemScript::secp256k1_blake160().script_for(&[7; 20]).hash();
    let mut batch = CellBatch::default();

    for (i, (capacity, status)) in cells.iter().enumerate() {
        let out_point = OutPoint::new(H256([1; 32]), i as u32);
        let spender = H256([2; 32]);
        let committed = Cell::live(out_point, lock_hash, Capacity::from(*capacity), 1);
        match status {
            CellStatus::Live => batch.changes.push(CellChange::Committed(committed)),
            CellStatus::Sent => {
                batch.changes.push(CellChange::Committed(committed));
                batch.changes.push(CellChange::PendingSpend {
                    out_point,
                    tx_hash: spender,
                });
            }
            CellStatus::Pending => batch.changes.push(CellChange::PendingOutput(Cell {
                status: CellStatus::Pending,
                block_number: None,
                ..committed
            })),
            CellStatus::Dead => {
                batch.changes.push(CellChange::Committed(committed));
                batch.changes.push(CellChange::Spent {
                    out_point,
                    tx_hash: spender,
                    block_number: 2,
                });
            }
        }
    }
    batch
}

fn sum(cells: &[(u64, CellStatus)], status: CellStatus) -> Capacity {
    cells
        .iter()
        .filter(|(_, s)| *s == status)
        .map(|(c, _)| Capacity::from(*c))
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_balance_is_live_plus_sent(
        cells in prop::collection::vec((0u64..=u64::MAX, status_strategy()), 0..20)
    ) {
        let cell_store = Arc::new(CellStore::new(Arc::new(Database::open_in_memory().unwrap())));
        cell_store.apply_batch(&cell_batch(&cells)).unwrap();

        let aggregator = BalanceAggregator::new(
            cell_store,
            Arc::new(JsonAddressStore::in_memory()),
            Default::default(),
            ChangeNotifier::new(),
        );
        let address = TrackedAddress::new(
            "w",
            "ckt1-7",
            "m/44'/309'/0'/0/7",
            AddressType::Receiving,
            7,
            format!("0x{}", "07".repeat(20)),
            AddressVersion::Testnet,
        );

        let balance = aggregator.recompute(&address).unwrap();
        let live = sum(&cells, CellStatus::Live);
        let sent = sum(&cells, CellStatus::Sent);

        prop_assert_eq!(&balance.live_balance, &live);
        prop_assert_eq!(&balance.sent_balance, &sent);
        prop_assert_eq!(&balance.pending_balance, &sum(&cells, CellStatus::Pending));
        prop_assert_eq!(balance.balance, live + sent);
    }
}
