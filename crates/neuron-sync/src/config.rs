//! Engine configuration

use crate::{Error, Result};
use neuron_core::{LockUtils, SystemScript};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay between polling ticks (milliseconds)
    pub poll_interval_ms: u64,
    /// Reorg checkpoint window size (K)
    pub reorg_window: usize,
    /// Blocks fetched ahead of the one being processed
    pub fetch_lookahead: usize,
    /// Fetch attempts per block within one tick
    pub max_fetch_attempts: u32,
    /// Initial backoff between fetch attempts (milliseconds), doubled per attempt
    pub retry_backoff_ms: u64,
    /// Tip polling interval (milliseconds)
    pub tip_poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            reorg_window: 12,
            fetch_lookahead: 4,
            max_fetch_attempts: 3,
            retry_backoff_ms: 100,
            tip_poll_interval_ms: 5_000,
        }
    }
}

impl SyncConfig {
    /// Polling interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Tip polling interval
    pub fn tip_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tip_poll_interval_ms)
    }

    /// Initial fetch retry backoff
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reorg_window == 0 {
            return Err(Error::Config("reorg_window must be at least 1".into()));
        }
        if self.max_fetch_attempts == 0 {
            return Err(Error::Config("max_fetch_attempts must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 || self.tip_poll_interval_ms == 0 {
            return Err(Error::Config("polling intervals must be non-zero".into()));
        }
        Ok(())
    }
}

/// Node connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// JSON-RPC endpoint
    pub url: String,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8114".to_string(),
            timeout_secs: 30,
        }
    }
}

impl NodeConfig {
    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Full engine configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node connection
    pub node: NodeConfig,
    /// Sync tuning
    pub sync: SyncConfig,
    /// System lock scripts used to derive lock hashes from a blake160
    pub lock_scripts: Vec<SystemScript>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            sync: SyncConfig::default(),
            lock_scripts: vec![SystemScript::secp256k1_blake160()],
        }
    }
}

impl Config {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        if self.lock_scripts.is_empty() {
            return Err(Error::Config("at least one lock script is required".into()));
        }
        if self.node.url.is_empty() {
            return Err(Error::Config("node url is empty".into()));
        }
        Ok(())
    }

    /// Lock-hash derivation for the configured scripts
    pub fn lock_utils(&self) -> LockUtils {
        LockUtils::new(self.lock_scripts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.sync.reorg_window, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sync": {{"reorg_window": 20}}, "node": {{"url": "http://node:8114"}}}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.sync.reorg_window, 20);
        assert_eq!(config.sync.fetch_lookahead, 4);
        assert_eq!(config.node.url, "http://node:8114");
        assert_eq!(config.node.timeout_secs, 30);
        assert_eq!(config.lock_scripts.len(), 1);
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = SyncConfig {
            reorg_window: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
