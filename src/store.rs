use crate::block::chunk_digest;
use crate::error::{LedgerError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Opaque, address-keyed blob store for raw chunk bytes.
///
/// The ledger only ever sees the address string a store hands back; the wire
/// format and transport behind an implementation are not its concern.
pub trait ContentStore {
    /// Store a blob, returning its address.
    fn put(&self, data: &[u8]) -> Result<String>;

    /// Fetch a blob by address.
    fn get(&self, address: &str) -> Result<Vec<u8>>;

    /// Connectivity probe.
    fn is_available(&self) -> bool;
}

/// In-memory content store. Addresses are content hashes, so duplicate
/// uploads dedup naturally. Used for tests and as the explicit stand-in when
/// no real store is reachable.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    /// Overwrite the bytes behind an address, leaving the address unchanged.
    /// Test hook for simulating a corrupted backing store.
    pub fn corrupt(&self, address: &str, data: Vec<u8>) {
        self.blobs.lock().insert(address.into(), data);
    }
}

impl ContentStore for MemoryStore {
    fn put(&self, data: &[u8]) -> Result<String> {
        let address = chunk_digest(data);
        self.blobs
            .lock()
            .entry(address.clone())
            .or_insert_with(|| data.to_vec());
        Ok(address)
    }

    fn get(&self, address: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| LedgerError::FetchFailure {
                address: address.into(),
                detail: "no blob at address".into(),
            })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Content-addressed directory store: one file per blob, keyed by content
/// hash, under a 2-char prefix directory (like git objects).
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open or create a store rooted at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir.join("blobs"))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Count stored blobs.
    pub fn blob_count(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(self.dir.join("blobs"))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                count += fs::read_dir(entry.path())?.filter_map(|e| e.ok()).count();
            }
        }
        Ok(count)
    }

    fn blob_path(&self, address: &str) -> PathBuf {
        let prefix = &address[..2.min(address.len())];
        self.dir.join("blobs").join(prefix).join(address)
    }
}

impl ContentStore for DiskStore {
    fn put(&self, data: &[u8]) -> Result<String> {
        let address = chunk_digest(data);
        let path = self.blob_path(&address);
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, data)?;
            debug!(address = %address, bytes = data.len(), "blob stored");
        }
        Ok(address)
    }

    fn get(&self, address: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(address);
        if !path.exists() {
            return Err(LedgerError::FetchFailure {
                address: address.into(),
                detail: "no blob at address".into(),
            });
        }
        Ok(fs::read(&path)?)
    }

    fn is_available(&self) -> bool {
        self.dir.join("blobs").is_dir()
    }
}

/// Bounded-retry wrapper for a content store.
///
/// `put`/`get` are attempted up to `attempts` times with a fixed delay
/// between tries. The availability probe is passed through untouched.
pub struct Retry<S> {
    inner: S,
    attempts: u32,
    delay: Duration,
}

impl<S: ContentStore> Retry<S> {
    pub fn new(inner: S, attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            // Always at least one attempt.
            attempts: attempts.max(1),
            delay,
        }
    }

    fn with_retries<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        for attempt in 1..self.attempts {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!(%what, attempt, total = self.attempts, error = %e, "store call failed, retrying");
                    std::thread::sleep(self.delay);
                }
            }
        }
        // Last attempt; its error is the caller's error.
        op()
    }
}

impl<S: ContentStore> ContentStore for Retry<S> {
    fn put(&self, data: &[u8]) -> Result<String> {
        self.with_retries("put", || self.inner.put(data))
    }

    fn get(&self, address: &str) -> Result<Vec<u8>> {
        self.with_retries("get", || self.inner.get(address))
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}
