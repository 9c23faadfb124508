use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Runtime configuration. All fields have working defaults; a JSON file can
/// override any subset of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes per chunk when splitting file data.
    pub chunk_size: usize,
    /// Path of the persisted ledger file.
    pub ledger_path: PathBuf,
    /// Required count of leading hex zeros in a sealed block hash.
    pub difficulty: usize,
    /// Proof-of-work iteration ceiling; the search never runs past this.
    pub max_nonce: u64,
    /// Attempts per content-store call before giving up.
    pub store_retries: u32,
    /// Delay between retry attempts, in milliseconds.
    pub store_retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            ledger_path: PathBuf::from("ledger.json"),
            difficulty: 3,
            max_nonce: 1_000_000,
            store_retries: 3,
            store_retry_delay_ms: 100,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}
