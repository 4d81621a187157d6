//! SQLite storage for the Neuron sync engine
//!
//! Holds the chain-derived wallet state:
//!
//! - **Cells**: tracked cells keyed by outpoint, with status and the block
//!   that created/spent them so orphaned writes can be reverted by height
//! - **Cell transactions**: which transactions touched which lock hash
//! - **Sync state**: the persisted cursor and the reorg checkpoint window
//!
//! Tracked addresses live in a separate JSON document ([`JsonAddressStore`])
//! that is replaced as a whole on every update.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address_store;
pub mod cells;
pub mod checkpoints;
pub mod database;
pub mod error;
pub mod migrations;
pub mod sync_state;

pub use address_store::JsonAddressStore;
pub use cells::CellStore;
pub use checkpoints::CheckpointManager;
pub use database::Database;
pub use error::{Error, Result};
pub use sync_state::{SyncStateRow, SyncStateStorage};
