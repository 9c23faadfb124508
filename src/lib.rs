//! Tamper-evident file integrity ledger.
//!
//! File bytes are split into fixed-size chunks held in a content-addressable
//! store; a hash-chained, proof-of-work-sealed ledger records one block of
//! metadata per chunk. Reads reconstruct files from the store and verify
//! every chunk against the ledger, so corruption or tampering on either side
//! is detected instead of silently returned.

pub mod block;
pub mod chain;
pub mod chunk;
pub mod config;
pub mod error;
pub mod service;
pub mod store;

pub use block::Block;
pub use chain::{ChainInfo, HashChain, Validation};
pub use config::Config;
pub use error::{LedgerError, Result};
pub use service::IntegrityService;
pub use store::{ContentStore, DiskStore, MemoryStore};
