// Persistence: resumable chunk data and per-role progress snapshots.

pub mod chunk_store;
pub mod session_store;

pub use chunk_store::{verify_integrity, ChunkStore, ChunkStoreStats, StoredChunks};
pub use session_store::{ProgressSnapshot, SessionStore};
