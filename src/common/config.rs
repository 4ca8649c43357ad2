// Configuration types and parsing

use crate::common::error::{Error, Result};
use crate::common::types::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_AGE_MS, DEFAULT_MAX_ENTRIES, DEFAULT_SESSION_ID_LENGTH,
};
use std::path::PathBuf;

pub const MIN_CHUNK_SIZE: usize = 1;
pub const MAX_CHUNK_SIZE: usize = 4096;
pub const MIN_SESSION_ID_LENGTH: usize = 1;
pub const MAX_SESSION_ID_LENGTH: usize = 64;

/// Eviction policy for the `ChunkStore` (`spec.md` §4.4).
#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    pub max_age_ms: Option<u64>,
    pub max_entries: Option<usize>,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            max_age_ms: Some(DEFAULT_MAX_AGE_MS),
            max_entries: Some(DEFAULT_MAX_ENTRIES),
        }
    }
}

/// Tunables shared by a `Sender`/`Receiver` pair.
#[derive(Debug, Clone)]
pub struct BeamConfig {
    pub chunk_size: usize,
    pub session_id_length: usize,
    pub store_dir: PathBuf,
    pub session_store_dir: PathBuf,
    pub eviction: EvictionPolicy,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            session_id_length: DEFAULT_SESSION_ID_LENGTH,
            store_dir: PathBuf::from(".beam/chunks"),
            session_store_dir: PathBuf::from(".beam/sessions"),
            eviction: EvictionPolicy::default(),
        }
    }
}

impl BeamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, size: usize) -> Result<Self> {
        if size < MIN_CHUNK_SIZE || size > MAX_CHUNK_SIZE {
            return Err(Error::ConfigError(format!(
                "chunk size must be between {} and {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        self.chunk_size = size;
        Ok(self)
    }

    pub fn with_session_id_length(mut self, length: usize) -> Result<Self> {
        if length < MIN_SESSION_ID_LENGTH || length > MAX_SESSION_ID_LENGTH {
            return Err(Error::ConfigError(format!(
                "session id length must be between {} and {}",
                MIN_SESSION_ID_LENGTH, MAX_SESSION_ID_LENGTH
            )));
        }
        self.session_id_length = length;
        Ok(self)
    }

    pub fn with_store_dir(mut self, dir: PathBuf) -> Self {
        self.store_dir = dir;
        self
    }

    pub fn with_session_store_dir(mut self, dir: PathBuf) -> Self {
        self.session_store_dir = dir;
        self
    }

    pub fn with_eviction(mut self, policy: EvictionPolicy) -> Self {
        self.eviction = policy;
        self
    }
}
