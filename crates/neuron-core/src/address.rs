//! Tracked wallet addresses and their aggregate balances

use crate::Capacity;
use serde::{Deserialize, Serialize};

/// Derivation chain of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressType {
    /// External chain
    Receiving,
    /// Internal chain
    Change,
}

/// Network an address encodes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressVersion {
    /// Mainnet
    Mainnet,
    /// Testnet
    Testnet,
}

/// Aggregate counters for one address
///
/// `balance` is always `live_balance + sent_balance`. Pending capacity is
/// tracked separately and is not part of `balance`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBalance {
    /// Distinct transactions touching the address
    pub tx_count: u64,
    /// Sum of live cells
    pub live_balance: Capacity,
    /// Sum of sent cells
    pub sent_balance: Capacity,
    /// Sum of pending cells
    pub pending_balance: Capacity,
    /// `live_balance + sent_balance`
    pub balance: Capacity,
}

impl AddressBalance {
    /// Build from components, deriving `balance`
    pub fn new(tx_count: u64, live: Capacity, sent: Capacity, pending: Capacity) -> Self {
        let balance = &live + &sent;
        Self {
            tx_count,
            live_balance: live,
            sent_balance: sent,
            pending_balance: pending,
            balance,
        }
    }
}

/// Address derived by a wallet and watched by the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedAddress {
    /// Owning wallet
    pub wallet_id: String,
    /// Encoded address
    pub address: String,
    /// Derivation path
    pub path: String,
    /// Receiving or change
    pub address_type: AddressType,
    /// Index on its chain
    pub address_index: u32,
    /// Distinct transaction count
    pub tx_count: u64,
    /// Live capacity
    pub live_balance: Capacity,
    /// Sent capacity
    pub sent_balance: Capacity,
    /// Pending capacity
    pub pending_balance: Capacity,
    /// `live_balance + sent_balance`
    pub balance: Capacity,
    /// `0x`-prefixed hex of the 20-byte public key hash
    pub blake160: String,
    /// Network
    pub version: AddressVersion,
    /// User label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set while a wallet import is deriving addresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_importing: Option<bool>,
}

impl TrackedAddress {
    /// New address with zeroed counters
    pub fn new(
        wallet_id: impl Into<String>,
        address: impl Into<String>,
        path: impl Into<String>,
        address_type: AddressType,
        address_index: u32,
        blake160: impl Into<String>,
        version: AddressVersion,
    ) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            address: address.into(),
            path: path.into(),
            address_type,
            address_index,
            tx_count: 0,
            live_balance: Capacity::zero(),
            sent_balance: Capacity::zero(),
            pending_balance: Capacity::zero(),
            balance: Capacity::zero(),
            blake160: blake160.into(),
            version,
            description: None,
            is_importing: None,
        }
    }

    /// Current aggregate counters
    pub fn balances(&self) -> AddressBalance {
        AddressBalance {
            tx_count: self.tx_count,
            live_balance: self.live_balance.clone(),
            sent_balance: self.sent_balance.clone(),
            pending_balance: self.pending_balance.clone(),
            balance: self.balance.clone(),
        }
    }

    /// Overwrite aggregate counters as one unit
    pub fn apply_balance(&mut self, balance: AddressBalance) {
        self.tx_count = balance.tx_count;
        self.live_balance = balance.live_balance;
        self.sent_balance = balance.sent_balance;
        self.pending_balance = balance.pending_balance;
        self.balance = balance.balance;
    }

    /// Reset counters to zero, recomputing `balance`
    pub fn reset_balances(&mut self) {
        self.apply_balance(AddressBalance::default());
    }

    /// Whether the address has ever been involved in a transaction
    pub fn is_used(&self) -> bool {
        self.tx_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> TrackedAddress {
        TrackedAddress::new(
            "w1",
            "ckt1qyq",
            "m/44'/309'/0'/0/0",
            AddressType::Receiving,
            0,
            "0x36c329ed630d6ce750712a477543672adab57f4c",
            AddressVersion::Testnet,
        )
    }

    #[test]
    fn test_balance_excludes_pending() {
        let b = AddressBalance::new(3, Capacity::from(500), Capacity::from(200), Capacity::from(100));
        assert_eq!(b.balance, Capacity::from(700));
        assert_eq!(b.pending_balance, Capacity::from(100));
    }

    #[test]
    fn test_apply_balance() {
        let mut addr = address();
        assert!(!addr.is_used());
        addr.apply_balance(AddressBalance::new(1, Capacity::from(10), Capacity::zero(), Capacity::zero()));
        assert!(addr.is_used());
        assert_eq!(addr.balance, Capacity::from(10));
        addr.reset_balances();
        assert_eq!(addr.balances(), AddressBalance::default());
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(address()).unwrap();
        assert_eq!(json["walletId"], "w1");
        assert_eq!(json["addressType"], "Receiving");
        assert_eq!(json["liveBalance"], "0");
        assert_eq!(json["version"], "testnet");
        assert!(json.get("description").is_none());
    }
}
