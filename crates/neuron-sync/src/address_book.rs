//! Address book queries over the address store
//!
//! Every mutation replaces the whole collection and then emits a change
//! notification.

use crate::notifier::ChangeNotifier;
use crate::store::AddressStore;
use crate::Result;
use neuron_core::{AddressType, AddressVersion, TrackedAddress};
use std::sync::Arc;
use tracing::debug;

/// Wallet-facing view of the tracked addresses
#[derive(Clone)]
pub struct AddressBook {
    store: Arc<dyn AddressStore>,
    notifier: ChangeNotifier,
}

impl AddressBook {
    /// Create over `store`, notifying through `notifier`
    pub fn new(store: Arc<dyn AddressStore>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    /// Add addresses; `balance` is recomputed from the live and sent components
    pub fn create(&self, addresses: Vec<TrackedAddress>) -> Result<Vec<TrackedAddress>> {
        let created: Vec<TrackedAddress> = addresses
            .into_iter()
            .map(|mut address| {
                let balance = &address.live_balance + &address.sent_balance;
                address.balance = balance;
                address
            })
            .collect();

        let mut all = self.store.get_all()?;
        all.extend(created.iter().cloned());
        self.replace(all)?;
        debug!(count = created.len(), "Created addresses");
        Ok(created)
    }

    /// Every address
    pub fn get_all(&self) -> Result<Vec<TrackedAddress>> {
        self.store.get_all()
    }

    /// Lowest-index receiving address with no transactions
    pub fn next_unused_address(
        &self,
        wallet_id: &str,
        version: AddressVersion,
    ) -> Result<Option<TrackedAddress>> {
        self.next_unused(wallet_id, version, AddressType::Receiving)
    }

    /// Lowest-index change address with no transactions
    pub fn next_unused_change_address(
        &self,
        wallet_id: &str,
        version: AddressVersion,
    ) -> Result<Option<TrackedAddress>> {
        self.next_unused(wallet_id, version, AddressType::Change)
    }

    fn next_unused(
        &self,
        wallet_id: &str,
        version: AddressVersion,
        address_type: AddressType,
    ) -> Result<Option<TrackedAddress>> {
        Ok(self
            .store
            .get_all()?
            .into_iter()
            .filter(|a| {
                a.wallet_id == wallet_id
                    && a.version == version
                    && a.address_type == address_type
                    && !a.is_used()
            })
            .min_by_key(|a| a.address_index))
    }

    /// Unused `(receiving, change)` address counts
    pub fn unused_addresses_count(
        &self,
        wallet_id: &str,
        version: AddressVersion,
    ) -> Result<(usize, usize)> {
        let mut receiving = 0;
        let mut change = 0;
        for address in self.store.get_all()? {
            if address.wallet_id != wallet_id || address.version != version || address.is_used() {
                continue;
            }
            match address.address_type {
                AddressType::Receiving => receiving += 1,
                AddressType::Change => change += 1,
            }
        }
        Ok((receiving, change))
    }

    /// Every address on `version`
    pub fn all_addresses(&self, version: AddressVersion) -> Result<Vec<TrackedAddress>> {
        Ok(self
            .store
            .get_all()?
            .into_iter()
            .filter(|a| a.version == version)
            .collect())
    }

    /// A wallet's addresses, receiving before change, then by index
    pub fn all_addresses_by_wallet_id(
        &self,
        wallet_id: &str,
        version: AddressVersion,
    ) -> Result<Vec<TrackedAddress>> {
        let mut addresses: Vec<TrackedAddress> = self
            .store
            .get_all()?
            .into_iter()
            .filter(|a| a.wallet_id == wallet_id && a.version == version)
            .collect();
        addresses.sort_by_key(|a| (a.address_type, a.address_index));
        Ok(addresses)
    }

    /// A wallet's addresses with at least one transaction
    pub fn used_addresses_by_wallet_id(
        &self,
        wallet_id: &str,
        version: AddressVersion,
    ) -> Result<Vec<TrackedAddress>> {
        Ok(self
            .store
            .get_all()?
            .into_iter()
            .filter(|a| a.wallet_id == wallet_id && a.version == version && a.is_used())
            .collect())
    }

    /// Look up by `(address, wallet_id)`
    pub fn find_by_address(&self, address: &str, wallet_id: &str) -> Result<Option<TrackedAddress>> {
        Ok(self
            .store
            .get_all()?
            .into_iter()
            .find(|a| a.address == address && a.wallet_id == wallet_id))
    }

    /// Every entry whose address is in `addresses`, across wallets
    pub fn find_by_addresses(&self, addresses: &[String]) -> Result<Vec<TrackedAddress>> {
        Ok(self
            .store
            .get_all()?
            .into_iter()
            .filter(|a| addresses.contains(&a.address))
            .collect())
    }

    /// Highest-index address of one type
    pub fn max_address_index(
        &self,
        wallet_id: &str,
        address_type: AddressType,
        version: AddressVersion,
    ) -> Result<Option<TrackedAddress>> {
        Ok(self
            .store
            .get_all()?
            .into_iter()
            .filter(|a| {
                a.wallet_id == wallet_id && a.address_type == address_type && a.version == version
            })
            .max_by_key(|a| a.address_index))
    }

    /// Set the label of one address; `None` if it does not exist
    pub fn update_description(
        &self,
        wallet_id: &str,
        address: &str,
        description: &str,
    ) -> Result<Option<TrackedAddress>> {
        let mut all = self.store.get_all()?;
        let updated = match all
            .iter_mut()
            .find(|a| a.address == address && a.wallet_id == wallet_id)
        {
            Some(entry) => {
                entry.description = Some(description.to_string());
                entry.clone()
            }
            None => return Ok(None),
        };
        self.replace(all)?;
        Ok(Some(updated))
    }

    /// Remove a wallet's addresses, returning them
    pub fn delete_by_wallet_id(&self, wallet_id: &str) -> Result<Vec<TrackedAddress>> {
        let (deleted, kept): (Vec<_>, Vec<_>) = self
            .store
            .get_all()?
            .into_iter()
            .partition(|a| a.wallet_id == wallet_id);
        self.replace(kept)?;
        debug!(wallet_id, count = deleted.len(), "Deleted wallet addresses");
        Ok(deleted)
    }

    /// Remove every address
    pub fn delete_all(&self) -> Result<()> {
        self.replace(Vec::new())
    }

    /// Replace the collection
    pub fn update_all(&self, addresses: Vec<TrackedAddress>) -> Result<()> {
        self.replace(addresses)
    }

    fn replace(&self, addresses: Vec<TrackedAddress>) -> Result<()> {
        self.store.update_all(addresses)?;
        self.notifier.notify();
        Ok(())
    }
}
