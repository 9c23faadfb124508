use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Content store upload failed after {blocks_appended} block(s) appended: {detail}")]
    StoreFailure { detail: String, blocks_appended: usize },

    #[error("Failed to fetch chunk {address}: {detail}")]
    FetchFailure { address: String, detail: String },

    #[error("Chunk hash mismatch at block {index} (address {address})")]
    HashMismatch { index: u64, address: String },

    #[error("Tampering detected in '{filename}' at block(s) {indices:?}")]
    IntegrityViolation { filename: String, indices: Vec<u64> },

    #[error("Chain linkage broken at block {index}: {reason}")]
    ChainLinkage { index: u64, reason: String },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Proof-of-work search exhausted for block {index}")]
    MiningExhausted { index: u64 },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
