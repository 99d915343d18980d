//! # Session Store Module
//!
//! The external collaborator that loads raw sessions and persists label
//! updates. The engine only talks to it through `SessionStore`.
//!
//! ## Implementations
//! - `FileStore`: One `<id>.json` per session in a directory, with an LRU
//!   cache of parsed payloads
//! - `MemoryStore`: In-process map with injectable failures and delays
//!
//! ## Save Semantics
//! Updates are matched to samples by raw timestamp. Every update is
//! validated before anything is written, so a rejected save changes nothing.
//! Samples sharing a timestamp all receive the update.

use crate::annotation::AnomalyUpdate;
use crate::error::StoreError;
use crate::sample::{canonical_key, RawSession, ANOMALY_FIELD, TIMESTAMP_FIELD};
use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<RawSession, StoreError>;

    async fn save(&self, session_id: &str, updates: &[AnomalyUpdate]) -> Result<(), StoreError>;

    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

fn record_key<'a>(record: &'a serde_json::Map<String, Value>, canonical: &str) -> Option<&'a String> {
    record.keys().find(|key| canonical_key(key) == canonical)
}

/// Apply label updates to a raw payload, all or nothing
pub fn apply_updates(raw: &mut RawSession, updates: &[AnomalyUpdate]) -> Result<usize, StoreError> {
    let known: HashSet<String> = raw
        .samples
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|record| record_key(record, TIMESTAMP_FIELD).and_then(|k| record.get(k)))
        .map(Value::to_string)
        .collect();

    let mut wanted: HashMap<String, u8> = HashMap::with_capacity(updates.len());
    for update in updates {
        if update.anomaly > 1 {
            return Err(StoreError::Validation(format!(
                "anomaly must be 0 or 1, got {}",
                update.anomaly
            )));
        }
        let key = update.timestamp.to_string();
        if !known.contains(&key) {
            return Err(StoreError::Validation(format!(
                "no sample with timestamp {}",
                key
            )));
        }
        match wanted.insert(key, update.anomaly) {
            Some(previous) if previous != update.anomaly => {
                return Err(StoreError::Validation(format!(
                    "conflicting labels for timestamp {}",
                    update.timestamp
                )));
            }
            _ => {}
        }
    }

    let mut applied = 0;
    for record in raw.samples.iter_mut().filter_map(Value::as_object_mut) {
        let Some(ts_key) = record_key(record, TIMESTAMP_FIELD) else {
            continue;
        };
        let Some(&anomaly) = record.get(ts_key).and_then(|ts| wanted.get(&ts.to_string())) else {
            continue;
        };
        let label_key = record_key(record, ANOMALY_FIELD)
            .cloned()
            .unwrap_or_else(|| ANOMALY_FIELD.to_string());
        record.insert(label_key, Value::from(anomaly));
        applied += 1;
    }

    Ok(applied)
}

/// Sessions stored as JSON files in one directory
pub struct FileStore {
    dir: PathBuf,
    cache: Mutex<LruCache<String, RawSession>>,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            dir: dir.as_ref().to_path_buf(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Validation(format!(
                "invalid session id '{}'",
                session_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", session_id)))
    }

    /// Write a whole session payload, replacing any stored copy
    pub async fn put(&self, raw: &RawSession) -> Result<(), StoreError> {
        let path = self.path_for(&raw.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(raw)?).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        self.cache.lock().unwrap().put(raw.id.clone(), raw.clone());
        Ok(())
    }

    async fn read(&self, session_id: &str) -> Result<RawSession, StoreError> {
        let path = self.path_for(session_id)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    session_id: session_id.to_string(),
                })
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut raw: RawSession = serde_json::from_str(&contents)?;
        if raw.id.is_empty() {
            raw.id = session_id.to_string();
        }
        Ok(raw)
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn load(&self, session_id: &str) -> Result<RawSession, StoreError> {
        let cached = self.cache.lock().unwrap().get(session_id).cloned();
        if let Some(raw) = cached {
            log::debug!("Session {} served from cache", session_id);
            return Ok(raw);
        }

        let raw = self.read(session_id).await?;
        self.cache
            .lock()
            .unwrap()
            .put(session_id.to_string(), raw.clone());
        Ok(raw)
    }

    async fn save(&self, session_id: &str, updates: &[AnomalyUpdate]) -> Result<(), StoreError> {
        // Always start from disk so a stale cache entry can't overwrite newer data
        let mut raw = self.read(session_id).await?;
        let applied = apply_updates(&mut raw, updates)?;
        self.put(&raw).await?;
        log::debug!("Session {}: wrote {} label updates", session_id, applied);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let path = self.path_for(session_id)?;
        self.cache.lock().unwrap().pop(session_id);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                session_id: session_id.to_string(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(StoreError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

/// In-process store used by tests and demos
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, RawSession>>,
    failing_saves: AtomicUsize,
    load_delay: Mutex<Option<Duration>>,
    save_calls: Mutex<Vec<(String, Vec<AnomalyUpdate>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, raw: RawSession) {
        self.sessions.lock().unwrap().insert(raw.id.clone(), raw);
    }

    pub fn get(&self, session_id: &str) -> Option<RawSession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    /// Make the next `count` saves fail with a transport error
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Delay every load, to exercise abandoned loads
    pub fn set_load_delay(&self, delay: Option<Duration>) {
        *self.load_delay.lock().unwrap() = delay;
    }

    /// Every save request received, including failed ones
    pub fn save_calls(&self) -> Vec<(String, Vec<AnomalyUpdate>)> {
        self.save_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, session_id: &str) -> Result<RawSession, StoreError> {
        let delay = *self.load_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.get(session_id).ok_or_else(|| StoreError::NotFound {
            session_id: session_id.to_string(),
        })
    }

    async fn save(&self, session_id: &str, updates: &[AnomalyUpdate]) -> Result<(), StoreError> {
        self.save_calls
            .lock()
            .unwrap()
            .push((session_id.to_string(), updates.to_vec()));

        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Transport("simulated outage".into()));
        }

        let mut sessions = self.sessions.lock().unwrap();
        let raw = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound {
                session_id: session_id.to_string(),
            })?;
        apply_updates(raw, updates)?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap()
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.sessions.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
