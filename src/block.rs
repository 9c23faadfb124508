use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Reserved filename of the genesis block.
pub const GENESIS_FILENAME: &str = "GENESIS";

/// `previous_hash` of the genesis block: 64 hex zeros.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One ledger entry: metadata for a single chunk of a single file, plus the
/// chain-linkage and proof-of-work fields that make the ledger tamper-evident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Position in the chain, starting at 0 (genesis), no gaps.
    pub index: u64,
    /// RFC3339 creation time, captured once and hashed — never rewritten.
    pub timestamp: String,
    /// File this chunk belongs to; `"GENESIS"` is reserved for block 0.
    pub filename: String,
    /// Byte length of this chunk (not of the whole file).
    pub chunk_size: u64,
    /// Hex SHA-256 of the chunk bytes.
    pub chunk_hash: String,
    /// Opaque address issued by the content store.
    pub content_address: String,
    /// Hash of the prior block; all zeros for genesis.
    pub previous_hash: String,
    /// Proof-of-work search counter.
    pub nonce: u64,
    /// Hex SHA-256 over all other fields (including `nonce`).
    pub hash: String,
}

impl Block {
    /// The genesis block. Created once, when a chain is initialized empty.
    /// Not mined; its hash is computed directly.
    pub fn genesis() -> Self {
        let mut block = Self {
            index: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            filename: GENESIS_FILENAME.into(),
            chunk_size: 0,
            chunk_hash: ZERO_HASH.into(),
            content_address: String::new(),
            previous_hash: ZERO_HASH.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = compute_hash(&block);
        block
    }

    /// Whether this is the reserved genesis entry.
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.filename == GENESIS_FILENAME
    }

    /// Intra-block consistency: does the stored hash match a recomputation
    /// from the other stored fields?
    pub fn verify(&self) -> bool {
        compute_hash(self) == self.hash
    }
}

/// Deterministic SHA-256 over the canonical preimage of a block.
///
/// The preimage is the UTF-8 concatenation, with no separators, of:
/// `index` (decimal), `timestamp`, `filename`, `chunk_size` (decimal),
/// `chunk_hash`, `content_address`, `previous_hash`, `nonce` (decimal).
/// This encoding is fixed; persisted ledgers depend on it bit-for-bit.
pub fn compute_hash(block: &Block) -> String {
    let mut hasher = Sha256::new();
    hasher.update(block.index.to_string());
    hasher.update(&block.timestamp);
    hasher.update(&block.filename);
    hasher.update(block.chunk_size.to_string());
    hasher.update(&block.chunk_hash);
    hasher.update(&block.content_address);
    hasher.update(&block.previous_hash);
    hasher.update(block.nonce.to_string());
    format!("{:x}", hasher.finalize())
}

/// Hex SHA-256 of raw chunk bytes.
pub fn chunk_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
