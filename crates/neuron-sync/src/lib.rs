//! Block synchronization engine for Neuron wallet balances
//!
//! Keeps tracked addresses' balances and transaction counts in step with a
//! remote node:
//!
//! - [`ChainTipTracker`] observes the node's best height
//! - [`SyncCursor`] persists the last fully-processed height
//! - [`ReorgChecker`] keeps a window of recent `(height, hash)` checkpoints
//!   and detects when the node's chain diverges from them
//! - [`SyncQueue`] drains a contiguous block range in order with a bounded
//!   fetch lookahead
//! - [`BlockProcessor`] turns blocks into cell status transitions
//! - [`BalanceAggregator`] recomputes per-address balances from cell state
//! - [`BlockListener`] ties them together in a polling loop
//!
//! Storage and the node transport sit behind the [`CellStateStore`],
//! [`SyncStateStore`], [`AddressStore`] and [`NodeClient`] traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address_book;
pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod cursor;
pub mod error;
pub mod listener;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
pub mod node;
pub mod notifier;
pub mod processor;
pub mod progress;
pub mod queue;
pub mod reorg;
pub mod rpc;
pub mod store;
pub mod tip;
pub mod verify;

pub use address_book::AddressBook;
pub use aggregator::BalanceAggregator;
pub use cancel::CancelToken;
pub use config::{Config, NodeConfig, SyncConfig};
pub use cursor::SyncCursor;
pub use error::{Error, Result};
pub use listener::{BlockListener, DrainCallback, ListenerState};
#[cfg(any(test, feature = "test-helpers"))]
pub use mock::{mock_block_hash, MockNode};
pub use node::NodeClient;
pub use notifier::ChangeNotifier;
pub use processor::{BlockProcessor, SharedLockHashes};
pub use progress::{SyncProgress, SyncStage};
pub use queue::{QueueState, SyncQueue};
pub use reorg::{ReorgCheck, ReorgChecker};
pub use rpc::HttpNodeClient;
pub use store::{AddressStore, CellStateStore, SyncStateStore, SyncStores};
pub use tip::{ChainTipTracker, TipPoller};
pub use verify::{verify_live_cells, LiveCellReport};
