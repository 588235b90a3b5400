//! Generic atomic-write, debounced-flush JSON key/value store (§6, §5).
//!
//! Every logical store (signals, channel reputation, coin cross-channel,
//! bootstrap progress) is a `HashMap<K, V>` serialized to its own file. A
//! store is read once at startup; mutations mark it dirty and a background
//! flush task writes it atomically (temp file + rename) no more than once
//! per debounce window, in the idiom of the teacher's `runtime_config.rs`
//! atomic tmp+rename save.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

/// A debounced, crash-safe JSON-backed map.
pub struct JsonStore<K, V> {
    path: PathBuf,
    data: RwLock<HashMap<K, V>>,
    dirty: AtomicBool,
}

impl<K, V> JsonStore<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Load `path` if present. A corrupt file is backed up to `.quarantine`
    /// and the store is re-initialized empty (§6, §4.4 safety clamps);
    /// a missing file is simply an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<K, V>>(&content) {
                Ok(map) => {
                    info!(path = %path.display(), entries = map.len(), "store loaded");
                    map
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "store corrupt, quarantining");
                    Self::quarantine(&path);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
        }
    }

    fn quarantine(path: &Path) {
        let quarantine_path = path.with_extension("quarantine");
        if let Err(e) = std::fs::copy(path, &quarantine_path) {
            warn!(path = %path.display(), error = %e, "failed to quarantine corrupt store");
        } else {
            warn!(path = %path.display(), quarantine = %quarantine_path.display(), "corrupt store quarantined");
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn all(&self) -> Vec<V> {
        self.data.read().values().cloned().collect()
    }

    pub fn all_keyed(&self) -> HashMap<K, V> {
        self.data.read().clone()
    }

    /// Insert/overwrite an entry and mark the store dirty. The actual flush
    /// is debounced (see [`JsonStore::spawn_flusher`]).
    pub fn put(&self, key: K, value: V) {
        self.data.write().insert(key, value);
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Mutate an existing entry in place (or insert `default` if absent),
    /// marking the store dirty.
    pub fn update_with<F>(&self, key: K, default: V, f: F)
    where
        F: FnOnce(&mut V),
    {
        let mut data = self.data.write();
        let entry = data.entry(key).or_insert(default);
        f(entry);
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Synchronously write the full map to disk, atomically (temp file +
    /// rename). Never drops a terminal event (§7): callers on the terminal
    /// path should call this directly rather than rely on the debounced
    /// background flush if they need a durability guarantee before
    /// acknowledging the event.
    pub fn flush(&self) -> std::io::Result<()> {
        let snapshot = self.data.read().clone();
        let content = serde_json::to_string_pretty(&snapshot)?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, &self.path)?;

        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn flush_if_dirty(&self) {
        if self.dirty.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.flush() {
                error!(path = %self.path.display(), error = %e, "failed to flush store");
                self.dirty.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Spawn a background task that flushes `store` at most once per
/// `debounce` interval, as long as it has unflushed mutations (§6: "written
/// atomically on mutation batches, debounced ≤ 5s").
pub fn spawn_flusher<K, V>(store: Arc<JsonStore<K, V>>, debounce: Duration) -> tokio::task::JoinHandle<()>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(debounce);
        loop {
            interval.tick().await;
            store.flush_if_dirty();
        }
    })
}
