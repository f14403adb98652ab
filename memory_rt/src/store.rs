use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::document::MemoryDocument;

const DEFAULT_HISTORY_CAP: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("serialized memory document for {agent:?} is {actual} bytes, exceeding the {limit}-byte limit")]
    SizeExceeded {
        agent: String,
        actual: u64,
        limit: u64,
    },
    #[error("memory document for {agent:?} is already {actual} bytes on disk, exceeding the {limit}-byte limit")]
    OverBudget {
        agent: String,
        actual: u64,
        limit: u64,
    },
    #[error("key {key:?} for agent {agent:?} looks like it holds a secret; memory keys may not use a secret-suggesting name")]
    SecretLikeKey { agent: String, key: String },
}

/// Substrings that mark a key as secret-suggesting (§3's "no key is named
/// with a secret-suggesting prefix" invariant), grounded on
/// `agents/tests/memory/test_memory_consistency.py`'s `SECRET_PATTERNS`.
const SECRET_KEY_PATTERNS: &[&str] = &[
    "password",
    "api_key",
    "secret",
    "token",
    "private_key",
    "credential",
    "auth_",
];

/// Whether `key` contains a substring that suggests it holds a secret,
/// matched case-insensitively against [`SECRET_KEY_PATTERNS`].
pub fn key_looks_like_secret(key: &str) -> bool {
    let lower = key.to_lowercase();
    SECRET_KEY_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Memory statistics (`stats(agent)` in §4.3).
#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data_keys: Vec<String>,
    pub history_count: usize,
    pub file_size_bytes: u64,
}

/// Thread-safe, file-based memory storage for a single agent.
///
/// Every public operation takes the in-process `guard` mutex for its whole
/// duration and additionally holds an advisory lock on a sidecar `.lock`
/// file for the same duration, matching §4.3's "in-process mutex *and* the
/// file lock" requirement without tying the lock's lifetime to the content
/// file's inode (which a temp-write-then-rename would otherwise break).
pub struct AgentMemory {
    agent_name: String,
    doc_path: PathBuf,
    lock_path: PathBuf,
    limit_bytes: u64,
    guard: Mutex<()>,
}

impl AgentMemory {
    pub fn open(agent_name: &str, memory_dir: impl AsRef<Path>, limit_bytes: u64) -> Result<Self, MemoryError> {
        let memory_dir = memory_dir.as_ref();
        fs::create_dir_all(memory_dir)?;
        let doc_path = memory_dir.join(format!("{agent_name}.json"));
        let lock_path = memory_dir.join(format!("{agent_name}.lock"));

        let memory = AgentMemory {
            agent_name: agent_name.to_string(),
            doc_path,
            lock_path,
            limit_bytes,
            guard: Mutex::new(()),
        };

        if !memory.doc_path.exists() {
            memory.init_document()?;
        }
        Ok(memory)
    }

    fn lock_file(&self) -> Result<File, MemoryError> {
        Ok(File::create(&self.lock_path)?)
    }

    fn init_document(&self) -> Result<(), MemoryError> {
        let doc = MemoryDocument::new(&self.agent_name);
        self.write_document_unlocked(&doc)
    }

    /// Read the document, reinitializing it if the file is missing or
    /// corrupt (mirrors the recover-by-reinit behavior of the source this
    /// was distilled from).
    fn read_document(&self) -> Result<MemoryDocument, MemoryError> {
        let lock = self.lock_file()?;
        lock.lock_shared()?;
        let result = (|| -> Result<MemoryDocument, MemoryError> {
            let raw = fs::read_to_string(&self.doc_path)?;
            Ok(serde_json::from_str(&raw)?)
        })();
        let _ = lock.unlock();

        match result {
            Ok(doc) => Ok(doc),
            Err(_) => {
                warn!(agent = %self.agent_name, "memory document missing or corrupt, reinitializing");
                self.init_document()?;
                let raw = fs::read_to_string(&self.doc_path)?;
                Ok(serde_json::from_str(&raw)?)
            }
        }
    }

    fn write_document_unlocked(&self, doc: &MemoryDocument) -> Result<(), MemoryError> {
        let serialized = serde_json::to_vec_pretty(doc)?;
        let actual = serialized.len() as u64;
        if actual > self.limit_bytes {
            return Err(MemoryError::SizeExceeded {
                agent: self.agent_name.clone(),
                actual,
                limit: self.limit_bytes,
            });
        }

        let parent = self.doc_path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&serialized)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.doc_path).map_err(|err| err.error)?;
        Ok(())
    }

    fn write_document(&self, doc: &MemoryDocument) -> Result<(), MemoryError> {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;
        let result = self.write_document_unlocked(doc);
        let _ = lock.unlock();
        result
    }

    /// The file size already on disk, checked at task start per §4.3 so
    /// out-of-band corruption that grew the file is caught before a task
    /// begins rather than only at the next save.
    pub fn check_budget(&self) -> Result<(), MemoryError> {
        let actual = fs::metadata(&self.doc_path)?.len();
        if actual > self.limit_bytes {
            return Err(MemoryError::OverBudget {
                agent: self.agent_name.clone(),
                actual,
                limit: self.limit_bytes,
            });
        }
        Ok(())
    }

    pub fn load(&self) -> Result<serde_json::Map<String, Value>, MemoryError> {
        let _held = self.guard.lock();
        Ok(self.read_document()?.data)
    }

    pub fn save(&self, data: serde_json::Map<String, Value>) -> Result<(), MemoryError> {
        if let Some(key) = data.keys().find(|key| key_looks_like_secret(key)) {
            return Err(MemoryError::SecretLikeKey {
                agent: self.agent_name.clone(),
                key: key.clone(),
            });
        }
        let _held = self.guard.lock();
        let mut doc = self.read_document()?;
        doc.data = data;
        doc.touch();
        self.write_document(&doc)
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, MemoryError> {
        Ok(self.load()?.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        if key_looks_like_secret(key) {
            return Err(MemoryError::SecretLikeKey {
                agent: self.agent_name.clone(),
                key: key.to_string(),
            });
        }
        let _held = self.guard.lock();
        let mut doc = self.read_document()?;
        doc.data.insert(key.to_string(), value);
        doc.touch();
        self.write_document(&doc)
    }

    pub fn append_history(&self, mut entry: Value) -> Result<(), MemoryError> {
        let _held = self.guard.lock();
        let mut doc = self.read_document()?;
        if let Value::Object(ref mut map) = entry {
            map.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        doc.history.push(entry);
        if doc.history.len() > DEFAULT_HISTORY_CAP {
            let drop = doc.history.len() - DEFAULT_HISTORY_CAP;
            doc.history.drain(0..drop);
        }
        doc.touch();
        self.write_document(&doc)
    }

    pub fn get_history(&self, limit: usize) -> Result<Vec<Value>, MemoryError> {
        let _held = self.guard.lock();
        let doc = self.read_document()?;
        if limit == 0 || limit >= doc.history.len() {
            return Ok(doc.history);
        }
        let start = doc.history.len() - limit;
        Ok(doc.history[start..].to_vec())
    }

    pub fn clear_history(&self) -> Result<(), MemoryError> {
        let _held = self.guard.lock();
        let mut doc = self.read_document()?;
        doc.history.clear();
        doc.touch();
        self.write_document(&doc)
    }

    pub fn clear_all(&self) -> Result<(), MemoryError> {
        let _held = self.guard.lock();
        self.init_document()
    }

    pub fn stats(&self) -> Result<MemoryStats, MemoryError> {
        let _held = self.guard.lock();
        let doc = self.read_document()?;
        let file_size_bytes = fs::metadata(&self.doc_path).map(|meta| meta.len()).unwrap_or(0);
        Ok(MemoryStats {
            agent_name: doc.agent_name,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            data_keys: doc.data.keys().cloned().collect(),
            history_count: doc.history.len(),
            file_size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_then_load_round_trips_data() {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::open("scout", dir.path(), 1_048_576).unwrap();
        let mut data = serde_json::Map::new();
        data.insert("goal".to_string(), json!("index the repo"));
        memory.save(data).unwrap();

        let loaded = memory.load().unwrap();
        assert_eq!(loaded.get("goal"), Some(&json!("index the repo")));
    }

    #[test]
    fn get_and_set_operate_on_individual_keys() {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::open("scout", dir.path(), 1_048_576).unwrap();
        memory.set("count", json!(1)).unwrap();
        assert_eq!(memory.get("count").unwrap(), Some(json!(1)));
        assert_eq!(memory.get("missing").unwrap(), None);
    }

    #[test]
    fn append_history_stamps_timestamp_and_bounds_length() {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::open("scout", dir.path(), 8 * 1024 * 1024).unwrap();
        for i in 0..1005 {
            memory.append_history(json!({"task": i})).unwrap();
        }
        let history = memory.get_history(0).unwrap();
        assert_eq!(history.len(), 1000);
        assert_eq!(history.first().unwrap()["task"], json!(5));
        assert!(history.last().unwrap().get("timestamp").is_some());
    }

    #[test]
    fn save_beyond_limit_fails_with_size_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::open("scout", dir.path(), 32).unwrap();
        let mut data = serde_json::Map::new();
        data.insert("blob".to_string(), json!("x".repeat(1000)));
        let err = memory.save(data).unwrap_err();
        assert!(matches!(err, MemoryError::SizeExceeded { .. }));
    }

    #[test]
    fn check_budget_flags_preexisting_oversized_document() {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::open("scout", dir.path(), 1_048_576).unwrap();
        memory.set("key", json!("small")).unwrap();

        let tight = AgentMemory {
            agent_name: "scout".to_string(),
            doc_path: dir.path().join("scout.json"),
            lock_path: dir.path().join("scout.lock"),
            limit_bytes: 4,
            guard: Mutex::new(()),
        };
        assert!(matches!(tight.check_budget(), Err(MemoryError::OverBudget { .. })));
    }

    #[test]
    fn set_rejects_secret_suggesting_key() {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::open("scout", dir.path(), 1_048_576).unwrap();
        let err = memory.set("api_key_openai", json!("sk-...")).unwrap_err();
        assert!(matches!(err, MemoryError::SecretLikeKey { .. }));
        assert!(memory.get("api_key_openai").unwrap().is_none());
    }

    #[test]
    fn save_rejects_secret_suggesting_key_in_batch() {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::open("scout", dir.path(), 1_048_576).unwrap();
        let mut data = serde_json::Map::new();
        data.insert("last_run".to_string(), json!("2026-01-01"));
        data.insert("auth_header".to_string(), json!("Bearer xyz"));
        let err = memory.save(data).unwrap_err();
        assert!(matches!(err, MemoryError::SecretLikeKey { .. }));
    }

    #[test]
    fn clear_all_resets_document_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::open("scout", dir.path(), 1_048_576).unwrap();
        memory.set("key", json!("value")).unwrap();
        memory.append_history(json!({"a": 1})).unwrap();
        memory.clear_all().unwrap();

        assert!(memory.load().unwrap().is_empty());
        assert!(memory.get_history(0).unwrap().is_empty());
    }
}
