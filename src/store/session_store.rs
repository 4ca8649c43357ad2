// Per-role last-write-wins ProgressSnapshot cache, for UI resume
// metadata (not chunk data). `spec.md` §3 ProgressSnapshot, §6.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::error::{Error, Result};
use crate::common::types::Party;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub current_chunk: i32,
    pub total_chunks: u32,
    pub percent_complete: f64,
    pub transfer_speed: f64,
    pub estimated_time_remaining: u64,
    pub updated_time: u64,
    pub started_time: u64,
    pub bytes_transferred: u64,
}

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, role: Party) -> PathBuf {
        let name = match role {
            Party::Sender => "sender.json",
            Party::Receiver => "receiver.json",
        };
        self.dir.join(name)
    }

    pub fn save(&self, role: Party, snapshot: &ProgressSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        fs::write(self.path_for(role), json)?;
        Ok(())
    }

    pub fn get_last(&self, role: Party) -> Result<Option<ProgressSnapshot>> {
        let path = self.path_for(role);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let snapshot = serde_json::from_str(&contents)
            .map_err(|e| Error::DeserializationError(e.to_string()))?;
        Ok(Some(snapshot))
    }

    pub fn clear(&self, role: Option<Party>) -> Result<()> {
        match role {
            Some(role) => {
                let path = self.path_for(role);
                if path.exists() {
                    fs::remove_file(path)?;
                }
            }
            None => {
                for role in [Party::Sender, Party::Receiver] {
                    let path = self.path_for(role);
                    if path.exists() {
                        fs::remove_file(path)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_snapshot() -> ProgressSnapshot {
        ProgressSnapshot {
            session_id: "ABCDE".into(),
            file_name: "f.bin".into(),
            file_size: 100,
            current_chunk: 2,
            total_chunks: 5,
            percent_complete: 40.0,
            transfer_speed: 1000.0,
            estimated_time_remaining: 60,
            updated_time: 10,
            started_time: 0,
            bytes_transferred: 40,
        }
    }

    #[test]
    fn save_then_get_last_round_trips() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let snapshot = sample_snapshot();
        store.save(Party::Sender, &snapshot).unwrap();
        let got = store.get_last(Party::Sender).unwrap().unwrap();
        assert_eq!(got, snapshot);
    }

    #[test]
    fn last_write_wins_per_role() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut first = sample_snapshot();
        store.save(Party::Sender, &first).unwrap();
        first.current_chunk = 4;
        first.percent_complete = 80.0;
        store.save(Party::Sender, &first).unwrap();
        let got = store.get_last(Party::Sender).unwrap().unwrap();
        assert_eq!(got.current_chunk, 4);
    }

    #[test]
    fn roles_are_independent() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(Party::Sender, &sample_snapshot()).unwrap();
        assert!(store.get_last(Party::Receiver).unwrap().is_none());
    }

    #[test]
    fn clear_single_role() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(Party::Sender, &sample_snapshot()).unwrap();
        store.save(Party::Receiver, &sample_snapshot()).unwrap();
        store.clear(Some(Party::Sender)).unwrap();
        assert!(store.get_last(Party::Sender).unwrap().is_none());
        assert!(store.get_last(Party::Receiver).unwrap().is_some());
    }

    #[test]
    fn clear_all_roles() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(Party::Sender, &sample_snapshot()).unwrap();
        store.save(Party::Receiver, &sample_snapshot()).unwrap();
        store.clear(None).unwrap();
        assert!(store.get_last(Party::Sender).unwrap().is_none());
        assert!(store.get_last(Party::Receiver).unwrap().is_none());
    }
}
