// Chunking: splitting a blob into wire-sized pieces and reassembling it.

pub mod chunker;

pub use chunker::{assemble, chunk, total_chunks, AssembledFile};
