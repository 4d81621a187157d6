//! JSON document address store
//!
//! The whole address collection is one document, `addresses/index.json`,
//! replaced on every update by writing a temp file and renaming it over the
//! old one. An in-memory copy serves reads, so readers see either the old or
//! the new collection and never a partial one.

use crate::{Error, Result};
use neuron_core::TrackedAddress;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the data dir holding the document
pub const ADDRESS_DIR: &str = "addresses";

/// Document file name
pub const ADDRESS_FILE: &str = "index.json";

/// On-disk layout: `{ "addresses": [...] }`
#[derive(Debug, Default, Serialize, Deserialize)]
struct AddressDocument {
    #[serde(default)]
    addresses: Vec<TrackedAddress>,
}

/// Whole-collection address store
pub struct JsonAddressStore {
    path: Option<PathBuf>,
    addresses: RwLock<Vec<TrackedAddress>>,
}

impl JsonAddressStore {
    /// Open the document under `data_dir`, starting empty if it does not exist
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let path = data_dir.as_ref().join(ADDRESS_DIR).join(ADDRESS_FILE);

        let addresses = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice::<AddressDocument>(&bytes)?.addresses
        } else {
            Vec::new()
        };

        tracing::debug!(path = %path.display(), count = addresses.len(), "Loaded address store");

        Ok(Self {
            path: Some(path),
            addresses: RwLock::new(addresses),
        })
    }

    /// Store that is never persisted
    pub fn in_memory() -> Self {
        Self {
            path: None,
            addresses: RwLock::new(Vec::new()),
        }
    }

    /// Document path, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of every address
    pub fn get_all(&self) -> Result<Vec<TrackedAddress>> {
        Ok(self.addresses.read().clone())
    }

    /// Replace the whole collection
    ///
    /// Fails without writing if two entries share `(wallet_id, address)`.
    pub fn update_all(&self, addresses: Vec<TrackedAddress>) -> Result<()> {
        {
            let mut keys = HashSet::with_capacity(addresses.len());
            for address in &addresses {
                if !keys.insert((address.wallet_id.as_str(), address.address.as_str())) {
                    return Err(Error::Validation(format!(
                        "duplicate address {} in wallet {}",
                        address.address, address.wallet_id
                    )));
                }
            }
        }

        let mut guard = self.addresses.write();
        if let Some(path) = &self.path {
            let document = AddressDocument { addresses };
            write_atomically(path, &serde_json::to_vec_pretty(&document)?)?;
            *guard = document.addresses;
        } else {
            *guard = addresses;
        }
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_core::{AddressType, AddressVersion, Capacity};
    use tempfile::TempDir;

    fn address(wallet: &str, index: u32) -> TrackedAddress {
        TrackedAddress::new(
            wallet,
            format!("ckt1q{}{}", wallet, index),
            format!("m/44'/309'/0'/0/{}", index),
            AddressType::Receiving,
            index,
            format!("0x{}", "11".repeat(20)),
            AddressVersion::Testnet,
        )
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let store = JsonAddressStore::open(dir.path()).unwrap();
        assert!(store.get_all().unwrap().is_empty());

        let mut a = address("w1", 0);
        a.live_balance = Capacity::from(500);
        store.update_all(vec![a.clone(), address("w1", 1)]).unwrap();

        let reopened = JsonAddressStore::open(dir.path()).unwrap();
        let all = reopened.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], a);
        assert!(dir.path().join(ADDRESS_DIR).join(ADDRESS_FILE).exists());
        assert!(!dir.path().join(ADDRESS_DIR).join("index.json.tmp").exists());
    }

    #[test]
    fn test_document_root_key() {
        let dir = TempDir::new().unwrap();
        let store = JsonAddressStore::open(dir.path()).unwrap();
        store.update_all(vec![address("w1", 0)]).unwrap();

        let raw = std::fs::read(dir.path().join(ADDRESS_DIR).join(ADDRESS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["addresses"][0]["walletId"], "w1");
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let store = JsonAddressStore::in_memory();
        store.update_all(vec![address("w1", 0)]).unwrap();

        let result = store.update_all(vec![address("w1", 0), address("w1", 0)]);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_same_address_different_wallets() {
        let store = JsonAddressStore::in_memory();
        let mut other = address("w1", 0);
        other.wallet_id = "w2".into();
        store.update_all(vec![address("w1", 0), other]).unwrap();
        assert_eq!(store.get_all().unwrap().len(), 2);
    }
}
