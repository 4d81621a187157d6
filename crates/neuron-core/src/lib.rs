//! Neuron wallet core types
//!
//! Chain primitives (hashes, scripts, cells, blocks), arbitrary-precision
//! capacities, tracked addresses and lock-hash derivation shared by the
//! storage and sync crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod block;
pub mod capacity;
pub mod cell;
pub mod error;
pub mod hash;
pub mod script;

pub use address::{AddressBalance, AddressType, AddressVersion, TrackedAddress};
pub use block::{Block, CellInput, CellOutput, Checkpoint, Header, Transaction};
pub use capacity::Capacity;
pub use cell::{Cell, CellBatch, CellChange, CellStatus, OutPoint, TxInvolvement};
pub use error::{Error, ErrorCategory, Result};
pub use hash::{blake2b_256, decode_hex_bytes, H256, LockHash};
pub use script::{HashType, LockUtils, Script, SystemScript};
