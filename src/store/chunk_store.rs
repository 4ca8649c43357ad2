// Durable file_name -> StoredChunks map, with age/count eviction.
// `spec.md` §4.4.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::common::config::EvictionPolicy;
use crate::common::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunks {
    pub file_name: String,
    pub file_size: u64,
    pub mime: String,
    pub total_chunks: u32,
    pub chunk_size: usize,
    pub chunks: Vec<Vec<u8>>,
    pub created_at: u64,
    pub last_accessed_at: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkStoreStats {
    pub count: usize,
    pub total_bytes: u64,
    pub oldest_created: Option<u64>,
    pub newest_created: Option<u64>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Checks the integrity rule used by the Sender Engine before resume:
/// total payload size is within one chunk_size of the declared file
/// size, and every non-last chunk is exactly `chunk_size` long.
pub fn verify_integrity(stored: &StoredChunks) -> Result<()> {
    let total: u64 = stored.chunks.iter().map(|c| c.len() as u64).sum();
    let diff = total.abs_diff(stored.file_size);
    if diff > stored.chunk_size as u64 {
        return Err(Error::SessionExpired(format!(
            "stored size {} does not match declared size {} within one chunk",
            total, stored.file_size
        )));
    }

    let last = stored.chunks.len().saturating_sub(1);
    for (i, c) in stored.chunks.iter().enumerate() {
        if i != last && c.len() != stored.chunk_size {
            return Err(Error::SessionExpired(format!(
                "chunk {} has length {}, expected {}",
                i,
                c.len(),
                stored.chunk_size
            )));
        }
    }
    Ok(())
}

/// JSON-file-per-key chunk store, one file per file_name under `dir`.
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn available(&self) -> bool {
        fs::create_dir_all(&self.dir).is_ok()
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(name)))
    }

    pub fn store(
        &self,
        name: &str,
        file_size: u64,
        mime: &str,
        chunks: Vec<Vec<u8>>,
        chunk_size: usize,
    ) -> Result<()> {
        // Reserve a slot for the incoming entry: evict against a budget
        // one smaller than configured, so the entry this call is about
        // to write never pushes the post-store count over max_entries.
        let default_policy = EvictionPolicy::default();
        let reserved_policy = EvictionPolicy {
            max_age_ms: default_policy.max_age_ms,
            max_entries: default_policy.max_entries.map(|m| m.saturating_sub(1)),
        };
        self.evict(reserved_policy)?;
        fs::create_dir_all(&self.dir)?;
        let now = now_ms();
        let total_chunks = chunks.len() as u32;
        let record = StoredChunks {
            file_name: name.to_string(),
            file_size,
            mime: mime.to_string(),
            total_chunks,
            chunk_size,
            chunks,
            created_at: now,
            last_accessed_at: now,
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        fs::write(self.path_for(name), json)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<StoredChunks>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let mut record: StoredChunks = serde_json::from_str(&contents)
            .map_err(|e| Error::DeserializationError(e.to_string()))?;
        record.last_accessed_at = now_ms();
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        fs::write(&path, json)?;
        Ok(Some(record))
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Ok(contents) = fs::read_to_string(&path) {
                    if let Ok(record) = serde_json::from_str::<StoredChunks>(&contents) {
                        names.push(record.file_name);
                    }
                }
            }
        }
        Ok(names)
    }

    fn all_records(&self) -> Result<Vec<(PathBuf, StoredChunks)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Ok(contents) = fs::read_to_string(&path) {
                    if let Ok(record) = serde_json::from_str::<StoredChunks>(&contents) {
                        out.push((path, record));
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn stats(&self) -> Result<ChunkStoreStats> {
        let records = self.all_records()?;
        let mut stats = ChunkStoreStats {
            count: records.len(),
            ..Default::default()
        };
        for (_, r) in &records {
            stats.total_bytes += r.chunks.iter().map(|c| c.len() as u64).sum::<u64>();
            stats.oldest_created = Some(stats.oldest_created.map_or(r.created_at, |v| v.min(r.created_at)));
            stats.newest_created = Some(stats.newest_created.map_or(r.created_at, |v| v.max(r.created_at)));
        }
        Ok(stats)
    }

    pub fn evict(&self, policy: EvictionPolicy) -> Result<()> {
        let mut records = self.all_records()?;
        if let Some(max_age_ms) = policy.max_age_ms {
            let cutoff = now_ms().saturating_sub(max_age_ms);
            let mut kept = Vec::new();
            for (path, record) in records {
                if record.last_accessed_at < cutoff {
                    fs::remove_file(&path)?;
                } else {
                    kept.push((path, record));
                }
            }
            records = kept;
        }

        if let Some(max_entries) = policy.max_entries {
            if records.len() > max_entries {
                records.sort_by_key(|(_, r)| r.last_accessed_at);
                let overflow = records.len() - max_entries;
                for (path, _) in records.into_iter().take(overflow) {
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        store
            .store("a.txt", 10, "text/plain", vec![vec![1; 5], vec![2; 5]], 5)
            .unwrap();
        let got = store.get("a.txt").unwrap().unwrap();
        assert_eq!(got.file_name, "a.txt");
        assert_eq!(got.chunks.len(), 2);
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        store.delete("nope").unwrap();
        store.store("a.txt", 5, "m", vec![vec![1; 5]], 5).unwrap();
        store.delete("a.txt").unwrap();
        store.delete("a.txt").unwrap();
        assert!(store.get("a.txt").unwrap().is_none());
    }

    #[test]
    fn max_entries_evicts_oldest_first() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        store.store("first.txt", 5, "m", vec![vec![1; 5]], 5).unwrap();
        store.store("second.txt", 5, "m", vec![vec![1; 5]], 5).unwrap();
        let names = store.list().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0], "second.txt");
    }

    #[test]
    fn verify_integrity_accepts_well_formed_chunks() {
        let stored = StoredChunks {
            file_name: "f".into(),
            file_size: 130,
            mime: "m".into(),
            total_chunks: 3,
            chunk_size: 64,
            chunks: vec![vec![0; 64], vec![0; 64], vec![0; 2]],
            created_at: 0,
            last_accessed_at: 0,
        };
        assert!(verify_integrity(&stored).is_ok());
    }

    #[test]
    fn verify_integrity_rejects_short_non_last_chunk() {
        let stored = StoredChunks {
            file_name: "f".into(),
            file_size: 130,
            mime: "m".into(),
            total_chunks: 3,
            chunk_size: 64,
            chunks: vec![vec![0; 32], vec![0; 64], vec![0; 2]],
            created_at: 0,
            last_accessed_at: 0,
        };
        assert!(verify_integrity(&stored).is_err());
    }
}
