use crate::error::{LedgerError, Result};

/// Split a byte buffer into ordered fixed-size chunks. Every chunk is
/// `chunk_size` bytes except possibly the last. No compression, no padding.
pub fn split(data: &[u8], chunk_size: usize) -> Result<Vec<Vec<u8>>> {
    if chunk_size == 0 {
        return Err(LedgerError::NotSupported("chunk size must be positive".into()));
    }
    Ok(data.chunks(chunk_size).map(|c| c.to_vec()).collect())
}

/// Reassemble chunks by exact concatenation, in the order given.
pub fn join(chunks: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}
