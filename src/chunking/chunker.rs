// Chunking algorithm: splits an in-memory blob into fixed-size chunks
// and reassembles them back. `spec.md` §4.2.

use crate::common::error::{Error, Result};

/// A file reconstructed from an ordered sequence of chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Total number of chunks a blob of `len` bytes splits into at `size`.
pub fn total_chunks(len: usize, size: usize) -> u32 {
    if len == 0 {
        return 0;
    }
    ((len + size - 1) / size) as u32
}

/// Split `blob` into fixed-size chunks. Every chunk but the last is
/// exactly `size` bytes; the last holds the remainder. An empty blob
/// yields zero chunks.
pub fn chunk(blob: &[u8], size: usize) -> Vec<Vec<u8>> {
    if blob.is_empty() || size == 0 {
        return Vec::new();
    }
    blob.chunks(size).map(|c| c.to_vec()).collect()
}

/// Reassemble chunks produced by `chunk` back into a file, in order.
/// Rejects a short chunk that isn't the last one, per `spec.md` §4.4's
/// integrity check.
pub fn assemble(chunks: Vec<Vec<u8>>, name: String, mime: String) -> Result<AssembledFile> {
    let last = chunks.len().saturating_sub(1);
    for (i, c) in chunks.iter().enumerate() {
        if i != last && c.is_empty() {
            return Err(Error::InvalidChunk(format!(
                "chunk {} is empty but is not the last chunk",
                i
            )));
        }
    }

    let mut bytes = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
    for c in chunks {
        bytes.extend(c);
    }

    Ok(AssembledFile { name, mime, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_yields_zero_chunks() {
        assert_eq!(chunk(&[], 64), Vec::<Vec<u8>>::new());
        assert_eq!(total_chunks(0, 64), 0);
    }

    #[test]
    fn blob_smaller_than_chunk_size_yields_one_short_chunk() {
        let blob = vec![1, 2, 3];
        let chunks = chunk(&blob, 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], blob);
        assert_eq!(total_chunks(3, 64), 1);
    }

    #[test]
    fn chunk_count_is_ceil_division() {
        let blob = vec![0u8; 130];
        let chunks = chunk(&blob, 64);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 64);
        assert_eq!(chunks[1].len(), 64);
        assert_eq!(chunks[2].len(), 2);
        assert_eq!(total_chunks(130, 64), 3);
    }

    #[test]
    fn exact_multiple_has_no_short_last_chunk() {
        let blob = vec![7u8; 128];
        let chunks = chunk(&blob, 64);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 64);
        assert_eq!(chunks[1].len(), 64);
    }

    #[test]
    fn assemble_is_inverse_of_chunk() {
        let blob: Vec<u8> = (0..=255u8).collect();
        let chunks = chunk(&blob, 17);
        let assembled =
            assemble(chunks, "f.bin".to_string(), "application/octet-stream".to_string()).unwrap();
        assert_eq!(assembled.bytes, blob);
        assert_eq!(assembled.name, "f.bin");
        assert_eq!(assembled.mime, "application/octet-stream");
    }

    #[test]
    fn assemble_empty_chunk_list_yields_empty_file() {
        let assembled = assemble(Vec::new(), "empty".to_string(), "text/plain".to_string()).unwrap();
        assert!(assembled.bytes.is_empty());
    }

    #[test]
    fn assemble_rejects_premature_empty_chunk() {
        let chunks = vec![vec![1, 2, 3], vec![], vec![4, 5]];
        let result = assemble(chunks, "f".to_string(), "m".to_string());
        assert!(result.is_err());
    }
}
