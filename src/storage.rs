//! Expiring on-disk storage for converted documents.

use crate::error::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const EXTENSION: &str = "docx";
/// Stems this short are not treated as stored documents when rescanning.
const MIN_ADOPTED_STEM_LEN: usize = 9;

/// Persisted-file service used by the publish/fetch commands.
pub trait Storage: Send + Sync {
    fn save(&self, bytes: &[u8]) -> Result<String, StorageError>;
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn delete(&self, id: &str) -> Result<bool, StorageError>;
    /// Removes every expired file and returns how many were removed.
    fn cleanup_expired(&self) -> Result<usize, StorageError>;
    fn list_ids(&self) -> Vec<String>;
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn validate_id(id: &str) -> Result<(), StorageError> {
    let ok = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidId(id.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    expires_at: u64,
}

/// Stores `<id>.docx` files under `root`, each kept for `retention`.
pub struct LocalStorage {
    root: PathBuf,
    retention: Duration,
    index: Mutex<HashMap<String, Entry>>,
}

impl LocalStorage {
    /// Opens (creating if needed) the storage directory and adopts documents
    /// already present in it.
    pub fn open(root: impl Into<PathBuf>, retention: Duration) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let storage = Self {
            root,
            retention,
            index: Mutex::new(HashMap::new()),
        };
        let adopted = storage.rescan();
        info!(root = %storage.root.display(), adopted, "storage opened");
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{EXTENSION}"))
    }

    /// Adds unindexed `*.docx` files to the index, expiring `retention` after
    /// their modification time.
    fn rescan(&self) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "storage directory scan failed");
                return 0;
            }
        };
        let mut index = self.index.lock();
        let mut adopted = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.len() < MIN_ADOPTED_STEM_LEN || validate_id(stem).is_err() || index.contains_key(stem) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or_else(now_secs);
            index.insert(
                stem.to_string(),
                Entry {
                    expires_at: modified + self.retention.as_secs(),
                },
            );
            adopted += 1;
        }
        adopted
    }
}

impl Storage for LocalStorage {
    fn save(&self, bytes: &[u8]) -> Result<String, StorageError> {
        let id = nanoid::nanoid!();
        let path = self.path_for(&id);
        std::fs::write(&path, bytes)?;
        let expires_at = now_secs() + self.retention.as_secs();
        self.index.lock().insert(id.clone(), Entry { expires_at });
        info!(id = %id, bytes = bytes.len(), "file saved");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_id(id)?;
        let entry = self.index.lock().get(id).copied();
        match entry {
            Some(e) if e.expires_at > now_secs() => {}
            Some(_) => {
                debug!(id, "file expired");
                return Ok(None);
            }
            None => return Ok(None),
        }
        match std::fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: &str) -> Result<bool, StorageError> {
        validate_id(id)?;
        let known = self.index.lock().remove(id).is_some();
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(known),
            Err(e) => Err(e.into()),
        }
    }

    fn cleanup_expired(&self) -> Result<usize, StorageError> {
        let now = now_secs();
        let expired: Vec<String> = {
            let mut index = self.index.lock();
            let ids: Vec<String> = index
                .iter()
                .filter(|(_, e)| e.expires_at <= now)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                index.remove(id);
            }
            ids
        };
        let mut removed = 0;
        for id in &expired {
            match std::fs::remove_file(self.path_for(id)) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(id = %id, error = %e, "failed to remove expired file"),
            }
        }
        if removed > 0 {
            info!(removed, "expired files cleaned up");
        }
        Ok(removed)
    }

    fn list_ids(&self) -> Vec<String> {
        if self.index.lock().is_empty() {
            self.rescan();
        }
        let mut ids: Vec<String> = self.index.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Background thread running [`Storage::cleanup_expired`] every `interval`.
/// Stops when [`Sweeper::stop`] is called or the handle is dropped.
pub struct Sweeper {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn spawn(storage: Arc<dyn Storage>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let join = thread::spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = storage.cleanup_expired() {
                        warn!(error = %e, "sweep failed");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        info!(interval_secs = interval.as_secs(), "sweeper started");
        Self {
            stop: Some(tx),
            join: Some(join),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
            debug!("sweeper stopped");
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEEP: Duration = Duration::from_secs(600);

    #[test]
    fn save_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let s = LocalStorage::open(dir.path(), KEEP).unwrap();
        let id = s.save(b"docx bytes").unwrap();
        assert!(id.len() > 8);
        assert_eq!(s.get(&id).unwrap().as_deref(), Some(&b"docx bytes"[..]));
        assert_eq!(s.list_ids(), vec![id.clone()]);
        assert!(s.delete(&id).unwrap());
        assert!(!s.delete(&id).unwrap());
        assert_eq!(s.get(&id).unwrap(), None);
    }

    #[test]
    fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let s = LocalStorage::open(dir.path(), KEEP).unwrap();
        assert!(matches!(s.get("../secret"), Err(StorageError::InvalidId(_))));
        assert!(matches!(s.delete("a/b"), Err(StorageError::InvalidId(_))));
        assert!(matches!(s.get(""), Err(StorageError::InvalidId(_))));
    }

    #[test]
    fn cleanup_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = LocalStorage::open(dir.path(), Duration::ZERO).unwrap();
        let id = s.save(b"x").unwrap();
        assert_eq!(s.get(&id).unwrap(), None);
        assert_eq!(s.cleanup_expired().unwrap(), 1);
        assert!(!s.path_for(&id).exists());
        assert_eq!(s.cleanup_expired().unwrap(), 0);
    }

    #[test]
    fn reopening_adopts_existing_documents() {
        let dir = tempfile::tempdir().unwrap();
        let id = LocalStorage::open(dir.path(), KEEP).unwrap().save(b"kept").unwrap();
        std::fs::write(dir.path().join("short.docx"), b"ignored").unwrap();
        std::fs::write(dir.path().join("notes-file-name.txt"), b"ignored").unwrap();

        let reopened = LocalStorage::open(dir.path(), KEEP).unwrap();
        assert_eq!(reopened.list_ids(), vec![id.clone()]);
        assert_eq!(reopened.get(&id).unwrap().as_deref(), Some(&b"kept"[..]));
    }

    #[test]
    fn sweeper_runs_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::open(dir.path(), Duration::ZERO).unwrap());
        let id = storage.save(b"x").unwrap();
        let sweeper = Sweeper::spawn(storage.clone(), Duration::from_millis(10));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while storage.path_for(&id).exists() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        sweeper.stop();
        assert!(!storage.path_for(&id).exists());
    }
}
