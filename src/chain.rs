use crate::block::{compute_hash, Block, GENESIS_FILENAME};
use crate::config::Config;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared cancellation handle for an in-flight proof-of-work search.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The mining loop observes this between iterations.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Re-arm the flag for the next unit of work.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Result of the bounded nonce search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MineOutcome {
    /// A nonce producing the required hash prefix was found.
    Sealed { nonce: u64 },
    /// The search hit its ceiling (or was cancelled) without a hit; the
    /// block carries nonce 0 and a weak seal.
    Exhausted,
}

/// Outcome of full-chain validation. Stops at the first failing block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid { index: u64, fault: ValidationFault },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFault {
    /// Stored hash does not match a recomputation from the block's fields.
    HashMismatch,
    /// `previous_hash` does not match the prior block's hash.
    BrokenLinkage,
    /// Hash lacks the required leading-zero prefix.
    WeakProofOfWork,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }
}

impl std::fmt::Display for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Validation::Valid => write!(f, "chain valid"),
            Validation::Invalid { index, fault } => {
                write!(f, "chain invalid at block {}: {}", index, fault)
            }
        }
    }
}

impl std::fmt::Display for ValidationFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationFault::HashMismatch => write!(f, "stored hash does not match recomputation"),
            ValidationFault::BrokenLinkage => write!(f, "previous-hash linkage broken"),
            ValidationFault::WeakProofOfWork => write!(f, "missing proof-of-work prefix"),
        }
    }
}

/// Chain summary for the verification surface.
#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub total_blocks: usize,
    pub latest_hash: Option<String>,
    pub valid: bool,
    pub files: Vec<String>,
}

impl std::fmt::Display for ChainInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Blocks: {}", self.total_blocks)?;
        writeln!(f, "Valid:  {}", self.valid)?;
        writeln!(f, "Files:  {}", self.files.len())?;
        if let Some(hash) = &self.latest_hash {
            writeln!(f, "Latest: {}", hash)?;
        }
        Ok(())
    }
}

/// Persisted ledger document. `length` is informational; only the block list
/// is trusted on load.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    chain: Vec<Block>,
    length: usize,
}

/// Append-only, hash-chained ledger of chunk metadata.
///
/// Single-writer: callers must serialize all mutating access (the service
/// holds this behind a write lock). Every append mines a proof-of-work nonce
/// and rewrites the full persisted state.
pub struct HashChain {
    path: PathBuf,
    chain: Vec<Block>,
    difficulty: usize,
    max_nonce: u64,
    cancel: CancelFlag,
}

impl HashChain {
    /// Load the ledger from disk, or start a fresh chain with a genesis block.
    ///
    /// A ledger file that fails to load resets the chain to empty — prior
    /// history is discarded at the next genesis creation. Reported, not
    /// corrected.
    pub fn open(config: &Config) -> Result<Self> {
        let mut hc = Self {
            path: config.ledger_path.clone(),
            chain: Self::load(&config.ledger_path),
            difficulty: config.difficulty,
            max_nonce: config.max_nonce,
            cancel: CancelFlag::new(),
        };
        if hc.chain.is_empty() {
            let genesis = Block::genesis();
            info!(hash = %genesis.hash, "genesis block created");
            hc.chain.push(genesis);
            hc.save();
        }
        Ok(hc)
    }

    fn load(path: &Path) -> Vec<Block> {
        if !path.exists() {
            return Vec::new();
        }
        match fs::read(path).map_err(crate::error::LedgerError::from).and_then(|data| {
            let ledger: LedgerFile = serde_json::from_slice(&data)?;
            Ok(ledger.chain)
        }) {
            Ok(chain) => {
                info!(blocks = chain.len(), "ledger loaded");
                chain
            }
            Err(e) => {
                warn!(error = %e, "ledger load failed, starting empty");
                Vec::new()
            }
        }
    }

    /// Persist the full chain. Failures are logged and non-fatal; the
    /// in-memory chain stays authoritative.
    fn save(&self) {
        let ledger = LedgerFile {
            length: self.chain.len(),
            chain: self.chain.clone(),
        };
        let result = serde_json::to_vec_pretty(&ledger)
            .map_err(crate::error::LedgerError::from)
            .and_then(|data| Ok(fs::write(&self.path, data)?));
        if let Err(e) = result {
            warn!(error = %e, path = %self.path.display(), "ledger save failed");
        }
    }

    /// Bounded proof-of-work search: iterate `nonce` from 0, first hash with
    /// `difficulty` leading hex zeros wins. Deterministic for identical block
    /// fields. On exhaustion or cancellation the nonce is reset to 0 and the
    /// block is left weakly sealed.
    pub fn mine(&self, block: &mut Block) -> MineOutcome {
        let target = "0".repeat(self.difficulty);
        for nonce in 0..self.max_nonce {
            if nonce % 1024 == 0 && self.cancel.is_cancelled() {
                break;
            }
            block.nonce = nonce;
            let hash = compute_hash(block);
            if hash.starts_with(&target) {
                debug!(nonce, %hash, "proof-of-work nonce found");
                return MineOutcome::Sealed { nonce };
            }
        }
        block.nonce = 0;
        MineOutcome::Exhausted
    }

    /// Append a new block for one chunk: build, mine, hash, push, persist.
    ///
    /// An exhausted nonce search is logged and the block appended with a weak
    /// seal (nonce 0); `validate` will report it. Returns the appended block.
    pub fn append(
        &mut self,
        filename: &str,
        chunk_size: u64,
        chunk_hash: &str,
        content_address: &str,
    ) -> Result<Block> {
        let previous = self
            .chain
            .last()
            .expect("chain always holds at least the genesis block");

        let mut block = Block {
            index: self.chain.len() as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
            filename: filename.into(),
            chunk_size,
            chunk_hash: chunk_hash.into(),
            content_address: content_address.into(),
            previous_hash: previous.hash.clone(),
            nonce: 0,
            hash: String::new(),
        };

        if self.mine(&mut block) == MineOutcome::Exhausted {
            warn!(index = block.index, file = %filename, "nonce search exhausted, appending weak seal");
        }
        block.hash = compute_hash(&block);

        info!(index = block.index, file = %filename, bytes = chunk_size, "block appended");
        self.chain.push(block.clone());
        self.save();
        Ok(block)
    }

    /// Validate the whole chain: per-block hash recomputation, previous-hash
    /// linkage, and proof-of-work prefix. Genesis is the trust anchor and is
    /// only covered by the linkage check of block 1.
    pub fn validate(&self) -> Validation {
        let target = "0".repeat(self.difficulty);
        for i in 1..self.chain.len() {
            let current = &self.chain[i];
            let previous = &self.chain[i - 1];

            if current.hash != compute_hash(current) {
                warn!(index = current.index, "validation failed: hash mismatch");
                return Validation::Invalid {
                    index: current.index,
                    fault: ValidationFault::HashMismatch,
                };
            }
            if current.previous_hash != previous.hash {
                warn!(index = current.index, "validation failed: broken linkage");
                return Validation::Invalid {
                    index: current.index,
                    fault: ValidationFault::BrokenLinkage,
                };
            }
            if !current.hash.starts_with(&target) {
                warn!(index = current.index, "validation failed: weak proof-of-work");
                return Validation::Invalid {
                    index: current.index,
                    fault: ValidationFault::WeakProofOfWork,
                };
            }
        }
        Validation::Valid
    }

    /// All blocks recorded for a filename, ascending by index, genesis
    /// excluded. Includes blocks from earlier writes of the same name.
    pub fn blocks_for_file(&self, filename: &str) -> Vec<&Block> {
        self.chain
            .iter()
            .filter(|b| b.filename == filename && !b.is_genesis())
            .collect()
    }

    /// Indices of blocks for a file whose stored hash no longer matches its
    /// recomputation. Intra-block check only, independent of chain linkage.
    pub fn detect_tampering(&self, filename: &str) -> Vec<u64> {
        let mut tampered = Vec::new();
        for block in self.blocks_for_file(filename) {
            if !block.verify() {
                warn!(file = %filename, index = block.index, "tampered block detected");
                tampered.push(block.index);
            }
        }
        tampered
    }

    /// Sorted distinct non-genesis filenames.
    pub fn distinct_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .chain
            .iter()
            .filter(|b| b.filename != GENESIS_FILENAME)
            .map(|b| b.filename.clone())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Chain summary: block count, latest hash, validity, file list.
    pub fn info(&self) -> ChainInfo {
        ChainInfo {
            total_blocks: self.chain.len(),
            latest_hash: self.chain.last().map(|b| b.hash.clone()),
            valid: self.validate().is_valid(),
            files: self.distinct_files(),
        }
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Handle for cancelling an in-flight nonce search from another thread.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}
