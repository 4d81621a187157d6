//! Lock scripts and lock-hash derivation

use crate::address::TrackedAddress;
use crate::hash::{blake2b_256, decode_hex_bytes, H256, LockHash};
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Code hash of the default secp256k1/blake160 sighash-all lock.
pub const SECP256K1_BLAKE160_CODE_HASH: &str =
    "0x9bd7e06f3ecf4be0f2fcd2188b23f1b9fcc88e5d4b65a8637b17723bbda3cce8";

/// How a script's `code_hash` is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    /// Match against data hash
    Data,
    /// Match against type script hash
    Type,
    /// Data hash, VM version 1
    Data1,
}

impl HashType {
    /// Serialized byte value
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Data => 0,
            Self::Type => 1,
            Self::Data1 => 2,
        }
    }
}

impl FromStr for HashType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "data" => Ok(Self::Data),
            "type" => Ok(Self::Type),
            "data1" => Ok(Self::Data1),
            other => Err(Error::InvalidHashType(other.to_string())),
        }
    }
}

/// Locking (or type) script
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script {
    /// Code hash
    pub code_hash: H256,
    /// Hash type
    pub hash_type: HashType,
    /// Script arguments
    #[serde(serialize_with = "serialize_args", deserialize_with = "deserialize_args")]
    pub args: Vec<u8>,
}

impl Script {
    /// Table-encoded bytes: `total | offsets[3] | code_hash | hash_type | args(len-prefixed)`.
    pub fn serialize(&self) -> Vec<u8> {
        const HEADER: usize = 4 + 4 * 3;
        let code_hash_offset = HEADER;
        let hash_type_offset = code_hash_offset + 32;
        let args_offset = hash_type_offset + 1;
        let total = args_offset + 4 + self.args.len();

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.extend_from_slice(&(code_hash_offset as u32).to_le_bytes());
        buf.extend_from_slice(&(hash_type_offset as u32).to_le_bytes());
        buf.extend_from_slice(&(args_offset as u32).to_le_bytes());
        buf.extend_from_slice(self.code_hash.as_bytes());
        buf.push(self.hash_type.as_byte());
        buf.extend_from_slice(&(self.args.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.args);
        buf
    }

    /// Hash of the serialized script
    pub fn hash(&self) -> LockHash {
        H256(blake2b_256(&self.serialize()))
    }
}

fn serialize_args<S: Serializer>(args: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(args)))
}

fn deserialize_args<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    decode_hex_bytes(&s).map_err(serde::de::Error::custom)
}

/// A system lock whose `args` is an address's blake160
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemScript {
    /// Code hash
    pub code_hash: H256,
    /// Hash type
    pub hash_type: HashType,
}

impl SystemScript {
    /// Default secp256k1/blake160 lock
    pub fn secp256k1_blake160() -> Self {
        Self {
            // Constant is valid hex of the right length.
            code_hash: H256::from_str(SECP256K1_BLAKE160_CODE_HASH).unwrap_or_default(),
            hash_type: HashType::Type,
        }
    }

    /// Lock script for a blake160
    pub fn script_for(&self, blake160: &[u8]) -> Script {
        Script {
            code_hash: self.code_hash,
            hash_type: self.hash_type,
            args: blake160.to_vec(),
        }
    }
}

/// Maps addresses to every lock hash they may own cells under
#[derive(Debug, Clone)]
pub struct LockUtils {
    scripts: Vec<SystemScript>,
}

impl LockUtils {
    /// Create with the given system scripts
    pub fn new(scripts: Vec<SystemScript>) -> Self {
        Self { scripts }
    }

    /// Configured system scripts
    pub fn scripts(&self) -> &[SystemScript] {
        &self.scripts
    }

    /// One lock hash per system script for a blake160
    pub fn blake160_to_lock_hashes(&self, blake160: &[u8]) -> Vec<LockHash> {
        self.scripts
            .iter()
            .map(|script| script.script_for(blake160).hash())
            .collect()
    }

    /// All lock hashes of a tracked address
    pub fn address_to_all_lock_hashes(&self, address: &TrackedAddress) -> Result<Vec<LockHash>> {
        let blake160 = decode_hex_bytes(&address.blake160)?;
        if blake160.len() != 20 {
            return Err(Error::InvalidAddress(format!(
                "{}: blake160 must be 20 bytes, got {}",
                address.address,
                blake160.len()
            )));
        }
        Ok(self.blake160_to_lock_hashes(&blake160))
    }
}

impl Default for LockUtils {
    fn default() -> Self {
        Self::new(vec![SystemScript::secp256k1_blake160()])
    }
}
