//! Key-value persistence for todo-sync
//!
//! Every partition of the merge engine is one string value under a fixed key.
//! Values are JSON text; the store treats them as opaque. Atomicity is per key
//! only: there are no cross-key transactions.
//!
//! # On-disk layout ([`FileStore`])
//!
//! ```text
//! <data dir>/
//!   api_todos_cache.json        # Remote Cache
//!   local_todos.json            # Local-Only Set
//!   modified_todos.json         # Modification Map
//!   deleted_todos.json          # Tombstone Set
//!   dueDate_<task id>.json      # Due-date index, one file per task
//!   <key>.json.lock             # Sidecar write locks
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};

/// Well-known storage keys.
pub mod keys {
    use crate::task::TaskId;

    /// Last successfully fetched remote tasks
    pub const REMOTE_CACHE: &str = "api_todos_cache";
    /// Tasks created on this device
    pub const LOCAL_TODOS: &str = "local_todos";
    /// Field patches for remote tasks, keyed by remote id
    pub const MODIFICATIONS: &str = "modified_todos";
    /// Remote ids considered deleted
    pub const TOMBSTONES: &str = "deleted_todos";
    /// Prefix of per-task due-date entries
    pub const DUE_DATE_PREFIX: &str = "dueDate_";

    /// The four partition keys, in reset order.
    pub const PARTITIONS: [&str; 4] = [LOCAL_TODOS, REMOTE_CACHE, MODIFICATIONS, TOMBSTONES];

    pub fn due_date(id: &TaskId) -> String {
        format!("{DUE_DATE_PREFIX}{id}")
    }

    pub fn is_due_date(key: &str) -> bool {
        key.starts_with(DUE_DATE_PREFIX)
    }
}

/// Durable string-keyed storage.
///
/// Writes (`set`, `remove`, `remove_many`) must bound their own waiting and
/// only return `Err` when nothing was written for the failing key. Callers
/// await them to completion and never cancel them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` if the key was never set or has been removed.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key` atomically.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove a key. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys. Stops at the first failure.
    async fn remove_many(&self, keys: &[String]) -> Result<()>;

    /// All keys currently present, sorted.
    async fn list_keys(&self) -> Result<Vec<String>>;
}

/// Reject keys that cannot be used as a plain file name.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("storage key cannot be empty".to_string()));
    }
    if key.starts_with('.') {
        return Err(Error::InvalidArgument(format!(
            "storage key cannot start with '.': {key}"
        )));
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
    {
        return Err(Error::InvalidArgument(format!(
            "storage key has unsupported characters: {key}"
        )));
    }
    Ok(())
}

// =========================================================================
// File-backed store
// =========================================================================

const VALUE_EXTENSION: &str = "json";

/// One JSON file per key in a data directory.
///
/// Writes go through temp file + rename under an `fs2` lock, so a key is
/// either fully written or untouched. Blocking I/O runs off the async
/// executor.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    lock_timeout_ms: u64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    /// Create the data directory if needed
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`
    pub fn key_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.{VALUE_EXTENSION}")))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::Io(err)),
    }
}

fn scan_keys(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let pattern = format!(
        "{}/*.{VALUE_EXTENSION}",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let entries = glob::glob(&pattern)
        .map_err(|err| Error::Storage(format!("invalid key scan pattern: {err}")))?;

    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| Error::Storage(format!("key scan failed: {err}")))?;
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if validate_key(stem).is_ok() {
            found.push(stem.to_string());
        }
    }
    found.sort();
    Ok(found)
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        tokio::task::spawn_blocking(move || read_optional(&path)).await?
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.key_path(key)?;
        let timeout_ms = self.lock_timeout_ms;
        tokio::task::spawn_blocking(move || {
            lock::write_atomic_locked(&path, value.as_bytes(), timeout_ms)
        })
        .await?
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        let timeout_ms = self.lock_timeout_ms;
        tokio::task::spawn_blocking(move || lock::remove_locked(&path, timeout_ms)).await?
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        let paths = keys
            .iter()
            .map(|key| self.key_path(key))
            .collect::<Result<Vec<_>>>()?;
        let timeout_ms = self.lock_timeout_ms;
        tokio::task::spawn_blocking(move || {
            for path in &paths {
                lock::remove_locked(path, timeout_ms)?;
            }
            Ok(())
        })
        .await?
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || scan_keys(&dir)).await?
    }
}

// =========================================================================
// In-memory store
// =========================================================================

/// Process-local store with switchable fault injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_list_keys: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `get` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every `set`, `remove`, and `remove_many` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `list_keys` fail.
    pub fn fail_list_keys(&self, fail: bool) {
        self.fail_list_keys.store(fail, Ordering::SeqCst);
    }

    /// Delay every operation, widening read-modify-write windows.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.entries()?.clone())
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("memory store poisoned".to_string()))
    }

    async fn pause(&self) {
        let millis = self.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn check(&self, flag: &AtomicBool, op: &str, key: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("injected {op} failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.pause().await;
        self.check(&self.fail_reads, "read", key)?;
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.pause().await;
        self.check(&self.fail_writes, "write", key)?;
        self.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.pause().await;
        self.check(&self.fail_writes, "remove", key)?;
        self.entries()?.remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        self.pause().await;
        for key in keys {
            self.check(&self.fail_writes, "remove", key)?;
        }
        let mut entries = self.entries()?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.pause().await;
        self.check(&self.fail_list_keys, "list", "*")?;
        Ok(self.entries()?.keys().cloned().collect())
    }
}
