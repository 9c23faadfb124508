use crate::block::{chunk_digest, GENESIS_FILENAME};
use crate::chain::{CancelFlag, ChainInfo, HashChain, Validation};
use crate::chunk;
use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::store::ContentStore;
use parking_lot::RwLock;
use tracing::{info, warn};

/// Summary of one completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub filename: String,
    pub bytes: usize,
    pub chunks: usize,
}

/// Per-file attributes derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    /// Sum of chunk sizes across every block recorded for the name.
    pub size: u64,
    pub chunks: usize,
}

/// Result of a full per-file verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub filename: String,
    pub total_chunks: usize,
    pub verified_chunks: usize,
    pub tampered: Vec<u64>,
}

impl FileReport {
    pub fn is_ok(&self) -> bool {
        self.tampered.is_empty() && self.verified_chunks == self.total_chunks
    }
}

/// Orchestrates the chunk codec, content store, and hash chain.
///
/// Writes are monotonically appending, reads are idempotent; update and
/// delete do not exist. All chain mutation (append, mining, persistence)
/// happens under one write guard; reads share read guards against the last
/// fully-appended state.
pub struct IntegrityService<S> {
    config: Config,
    chain: RwLock<HashChain>,
    store: S,
}

impl<S: ContentStore> IntegrityService<S> {
    /// Construct the service: open (or initialize) the ledger and probe the
    /// store. An unreachable store is reported, not fatal — reads and writes
    /// against it will fail individually.
    pub fn new(config: Config, store: S) -> Result<Self> {
        let chain = HashChain::open(&config)?;
        if !store.is_available() {
            warn!("content store is not reachable");
        }
        Ok(Self {
            config,
            chain: RwLock::new(chain),
            store,
        })
    }

    /// Write a whole file: split into chunks, then per chunk hash, upload,
    /// and append one block.
    ///
    /// No rollback: if an upload fails partway, blocks already appended for
    /// earlier chunks of this call stay in the chain, and the error reports
    /// how many. Rewriting an existing name appends after its prior blocks
    /// rather than replacing them.
    pub fn write_file(&self, filename: &str, data: &[u8]) -> Result<WriteReceipt> {
        if filename == GENESIS_FILENAME {
            return Err(LedgerError::NotSupported(format!(
                "filename '{}' is reserved",
                GENESIS_FILENAME
            )));
        }

        let chunks = chunk::split(data, self.config.chunk_size)?;
        let mut chain = self.chain.write();

        let mut appended = 0usize;
        for piece in &chunks {
            let digest = chunk_digest(piece);
            let address = self
                .store
                .put(piece)
                .map_err(|e| LedgerError::StoreFailure {
                    detail: e.to_string(),
                    blocks_appended: appended,
                })?;
            chain.append(filename, piece.len() as u64, &digest, &address)?;
            appended += 1;
        }

        info!(file = %filename, bytes = data.len(), chunks = chunks.len(), "file written");
        Ok(WriteReceipt {
            filename: filename.into(),
            bytes: data.len(),
            chunks: chunks.len(),
        })
    }

    /// Adapter-facing write entry point. Only whole-file writes at offset 0
    /// are supported.
    pub fn write_at(&self, filename: &str, offset: u64, data: &[u8]) -> Result<WriteReceipt> {
        if offset != 0 {
            return Err(LedgerError::NotSupported(
                "partial writes are not supported (offset must be 0)".into(),
            ));
        }
        self.write_file(filename, data)
    }

    /// Read `[offset, offset + size)` of a file reassembled from its chunks.
    ///
    /// The whole read aborts on the first problem — missing file, tampered
    /// ledger entry, unfetchable chunk, or chunk-hash mismatch. No partial
    /// reconstruction is ever returned. The slice clamps at end of data, so
    /// the result may be shorter than `size`.
    pub fn read_file(&self, filename: &str, offset: u64, size: usize) -> Result<Vec<u8>> {
        let chain = self.chain.read();

        let blocks = chain.blocks_for_file(filename);
        if blocks.is_empty() {
            return Err(LedgerError::NotFound(filename.into()));
        }

        let tampered = chain.detect_tampering(filename);
        if !tampered.is_empty() {
            return Err(LedgerError::IntegrityViolation {
                filename: filename.into(),
                indices: tampered,
            });
        }

        let mut chunks = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let data = self.store.get(&block.content_address).map_err(|e| match e {
                fetch @ LedgerError::FetchFailure { .. } => fetch,
                other => LedgerError::FetchFailure {
                    address: block.content_address.clone(),
                    detail: other.to_string(),
                },
            })?;
            if chunk_digest(&data) != block.chunk_hash {
                return Err(LedgerError::HashMismatch {
                    index: block.index,
                    address: block.content_address.clone(),
                });
            }
            chunks.push(data);
        }

        let assembled = chunk::join(&chunks);
        info!(file = %filename, bytes = assembled.len(), chunks = chunks.len(), "file read");

        let start = (offset as usize).min(assembled.len());
        let end = start.saturating_add(size).min(assembled.len());
        Ok(assembled[start..end].to_vec())
    }

    /// Validate the whole chain.
    pub fn verify_chain(&self) -> Validation {
        self.chain.read().validate()
    }

    /// Full verification of one file: ledger tamper check plus a fetch and
    /// hash comparison for every chunk. Unlike `read_file` this does not
    /// abort early; it reports how many chunks checked out.
    pub fn verify_file(&self, filename: &str) -> Result<FileReport> {
        let chain = self.chain.read();

        let blocks = chain.blocks_for_file(filename);
        if blocks.is_empty() {
            return Err(LedgerError::NotFound(filename.into()));
        }

        let tampered = chain.detect_tampering(filename);
        let mut verified = 0usize;
        for block in &blocks {
            match self.store.get(&block.content_address) {
                Ok(data) if chunk_digest(&data) == block.chunk_hash => verified += 1,
                Ok(_) => warn!(file = %filename, index = block.index, "chunk hash mismatch"),
                Err(e) => warn!(file = %filename, index = block.index, error = %e, "chunk fetch failed"),
            }
        }

        Ok(FileReport {
            filename: filename.into(),
            total_chunks: blocks.len(),
            verified_chunks: verified,
            tampered,
        })
    }

    /// Whether any blocks are recorded for the name.
    pub fn exists(&self, filename: &str) -> bool {
        !self.chain.read().blocks_for_file(filename).is_empty()
    }

    /// Attributes for one file, or `None` if it has no blocks.
    pub fn stat(&self, filename: &str) -> Option<FileStat> {
        let chain = self.chain.read();
        let blocks = chain.blocks_for_file(filename);
        if blocks.is_empty() {
            return None;
        }
        Some(FileStat {
            name: filename.into(),
            size: blocks.iter().map(|b| b.chunk_size).sum(),
            chunks: blocks.len(),
        })
    }

    /// Every recorded file with its size and chunk count, sorted by name.
    pub fn list_files(&self) -> Vec<FileStat> {
        let chain = self.chain.read();
        chain
            .distinct_files()
            .into_iter()
            .map(|name| {
                let blocks = chain.blocks_for_file(&name);
                FileStat {
                    size: blocks.iter().map(|b| b.chunk_size).sum(),
                    chunks: blocks.len(),
                    name,
                }
            })
            .collect()
    }

    /// History is never rewritten: truncation is refused.
    pub fn truncate(&self, filename: &str) -> Result<()> {
        warn!(file = %filename, "truncate refused (immutable ledger)");
        Err(LedgerError::PermissionDenied(format!(
            "cannot truncate '{}': ledger entries are immutable",
            filename
        )))
    }

    /// History is never removed: deletion is refused.
    pub fn remove(&self, filename: &str) -> Result<()> {
        warn!(file = %filename, "unlink refused (immutable ledger)");
        Err(LedgerError::PermissionDenied(format!(
            "cannot remove '{}': ledger entries are immutable",
            filename
        )))
    }

    /// Chain summary for the verification surface.
    pub fn chain_info(&self) -> ChainInfo {
        self.chain.read().info()
    }

    /// Snapshot of every block, genesis included.
    pub fn blocks(&self) -> Vec<crate::block::Block> {
        self.chain.read().blocks().to_vec()
    }

    /// Handle for cancelling an in-flight proof-of-work search.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.chain.read().cancel_flag()
    }

    /// Connectivity probe of the backing store.
    pub fn store_available(&self) -> bool {
        self.store.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config(dir: &Path, chunk_size: usize) -> Config {
        Config {
            chunk_size,
            ledger_path: dir.join("ledger.json"),
            difficulty: 1,
            max_nonce: 100_000,
            ..Config::default()
        }
    }

    fn test_service(dir: &Path, chunk_size: usize) -> IntegrityService<MemoryStore> {
        IntegrityService::new(test_config(dir, chunk_size), MemoryStore::new()).unwrap()
    }

    #[test]
    fn read_after_write_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);

        let data = b"the quick brown fox jumps over the lazy dog";
        svc.write_file("fox.txt", data).unwrap();
        assert_eq!(svc.read_file("fox.txt", 0, data.len()).unwrap(), data);
        assert!(svc.verify_chain().is_valid());
    }

    #[test]
    fn hello_world_splits_into_three_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);

        let receipt = svc.write_file("f", b"hello world").unwrap();
        assert_eq!(receipt.chunks, 3);

        let blocks = svc.blocks();
        assert_eq!(blocks.len(), 4); // genesis + 3
        assert_eq!(blocks[1].chunk_size, 4);
        assert_eq!(blocks[2].chunk_size, 4);
        assert_eq!(blocks[3].chunk_size, 3);
        assert_eq!(
            blocks.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(svc.verify_chain().is_valid());
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);
        assert!(matches!(
            svc.read_file("missing", 0, 10),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            svc.verify_file("missing"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn corrupted_store_bytes_fail_hash_check() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path(), 8);
        let store = MemoryStore::new();
        let svc = IntegrityService::new(config, store).unwrap();

        svc.write_file("f", b"original content").unwrap();
        let address = svc.blocks()[1].content_address.clone();
        svc.store.corrupt(&address, b"evil txt".to_vec());

        // The corrupted bytes must never be returned.
        assert!(matches!(
            svc.read_file("f", 0, 16),
            Err(LedgerError::HashMismatch { index: 1, .. })
        ));

        let report = svc.verify_file("f").unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.verified_chunks, report.total_chunks - 1);
    }

    #[test]
    fn tampered_ledger_aborts_read() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path(), 4);
        let store = MemoryStore::new();
        {
            let svc = IntegrityService::new(config.clone(), MemoryStore::new()).unwrap();
            svc.write_file("f", b"hello world").unwrap();
            // Keep the chunks for the second service instance.
            for block in &svc.blocks()[1..] {
                let data = svc.store.get(&block.content_address).unwrap();
                store.put(&data).unwrap();
            }
        }

        // Doctor one block's recorded size behind the ledger's back.
        let raw = std::fs::read(&config.ledger_path).unwrap();
        let mut ledger: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        ledger["chain"][2]["chunk_size"] = serde_json::json!(9999);
        std::fs::write(&config.ledger_path, serde_json::to_vec(&ledger).unwrap()).unwrap();

        let svc = IntegrityService::new(config, store).unwrap();
        match svc.read_file("f", 0, 11) {
            Err(LedgerError::IntegrityViolation { indices, .. }) => {
                assert_eq!(indices, vec![2]);
            }
            other => panic!("expected IntegrityViolation, got {:?}", other),
        }
        assert!(!svc.verify_chain().is_valid());
    }

    /// Store whose puts start failing after a budget of successes.
    struct FailingAfter {
        inner: MemoryStore,
        allowed_puts: u32,
        puts: AtomicU32,
    }

    impl ContentStore for FailingAfter {
        fn put(&self, data: &[u8]) -> Result<String> {
            if self.puts.fetch_add(1, Ordering::SeqCst) >= self.allowed_puts {
                return Err(LedgerError::FetchFailure {
                    address: String::new(),
                    detail: "store went away".into(),
                });
            }
            self.inner.put(data)
        }

        fn get(&self, address: &str) -> Result<Vec<u8>> {
            self.inner.get(address)
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn partial_write_reports_appended_blocks_without_rollback() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FailingAfter {
            inner: MemoryStore::new(),
            allowed_puts: 1,
            puts: AtomicU32::new(0),
        };
        let svc = IntegrityService::new(test_config(tmp.path(), 4), store).unwrap();

        match svc.write_file("f", b"hello world") {
            Err(LedgerError::StoreFailure { blocks_appended, .. }) => {
                assert_eq!(blocks_appended, 1);
            }
            other => panic!("expected StoreFailure, got {:?}", other),
        }
        // The first chunk's block stays; the chain itself is still valid.
        assert_eq!(svc.blocks().len(), 2);
        assert!(svc.verify_chain().is_valid());
    }

    #[test]
    fn nonzero_offset_write_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);
        assert!(matches!(
            svc.write_at("f", 1, b"data"),
            Err(LedgerError::NotSupported(_))
        ));
        // Offset 0 goes through.
        svc.write_at("f", 0, b"data").unwrap();
    }

    #[test]
    fn truncate_and_remove_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);
        svc.write_file("f", b"data").unwrap();

        assert!(matches!(
            svc.truncate("f"),
            Err(LedgerError::PermissionDenied(_))
        ));
        assert!(matches!(
            svc.remove("f"),
            Err(LedgerError::PermissionDenied(_))
        ));
        // Nothing was lost.
        assert_eq!(svc.read_file("f", 0, 4).unwrap(), b"data");
    }

    #[test]
    fn genesis_filename_is_reserved() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);
        assert!(matches!(
            svc.write_file("GENESIS", b"x"),
            Err(LedgerError::NotSupported(_))
        ));
    }

    #[test]
    fn read_slice_clamps_at_end_of_data() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);
        svc.write_file("f", b"0123456789").unwrap();

        assert_eq!(svc.read_file("f", 2, 4).unwrap(), b"2345");
        assert_eq!(svc.read_file("f", 8, 100).unwrap(), b"89");
        assert!(svc.read_file("f", 50, 10).unwrap().is_empty());
    }

    #[test]
    fn rewrite_appends_after_prior_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);
        svc.write_file("f", b"AAAA").unwrap();
        svc.write_file("f", b"BB").unwrap();

        // Reconstruction concatenates every block for the name in ascending
        // index order, earlier writes included.
        assert_eq!(svc.read_file("f", 0, 10).unwrap(), b"AAAABB");
        let stat = svc.stat("f").unwrap();
        assert_eq!(stat.size, 6);
        assert_eq!(stat.chunks, 2);
    }

    #[test]
    fn stat_and_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);
        svc.write_file("b.txt", b"hello world").unwrap();
        svc.write_file("a.txt", b"hi").unwrap();

        assert!(svc.exists("a.txt"));
        assert!(!svc.exists("c.txt"));
        assert!(svc.stat("c.txt").is_none());

        let files = svc.list_files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], FileStat { name: "a.txt".into(), size: 2, chunks: 1 });
        assert_eq!(files[1], FileStat { name: "b.txt".into(), size: 11, chunks: 3 });
    }

    #[test]
    fn empty_write_records_no_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 4);
        let receipt = svc.write_file("empty", b"").unwrap();
        assert_eq!(receipt.chunks, 0);
        assert!(!svc.exists("empty"));
    }
}
