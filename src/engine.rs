//! Todo merge engine.
//!
//! Reconciles a read-only remote task list with on-device state kept in four
//! partitions:
//!
//! - remote cache: last successful fetch, used when the remote is down
//! - local-only set: tasks created here
//! - modification map: field patches for remote tasks
//! - tombstone set: remote ids the user deleted
//!
//! plus a due-date index derived from the tasks' own `due_date` fields.
//!
//! Reads are lenient: a failed or corrupt partition read on the list path
//! falls back to the empty default so the merged view is always available.
//! Writes are strict: any storage failure propagates and the mutation is
//! reported as not applied.
//!
//! Every read-modify-write holds the in-process lock of each partition it
//! touches, taken in the fixed order remote, local, modifications,
//! tombstones, due dates.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::merge::{self, ModificationMap, Partitions, Tombstones};
use crate::remote::RemoteSource;
use crate::storage::{keys, KeyValueStore};
use crate::task::{
    normalize_title, LocalIdMinter, Origin, Task, TaskDraft, TaskId, TaskPatch, DEFAULT_OWNER_TAG,
};

/// Engine tuning, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_owner_tag: i64,
    pub fetch_timeout: Duration,
    /// Upper bound for storage reads and key scans. Writes are bounded by
    /// the store itself.
    pub op_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_owner_tag: DEFAULT_OWNER_TAG,
            fetch_timeout: Duration::from_secs(10),
            op_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            default_owner_tag: config.tasks.default_owner_tag,
            fetch_timeout: Duration::from_millis(config.remote.timeout_ms),
            op_timeout: Duration::from_millis(config.storage.op_timeout_ms),
        }
    }
}

#[derive(Debug, Default)]
struct PartitionLocks {
    remote: Mutex<()>,
    local: Mutex<()>,
    modifications: Mutex<()>,
    tombstones: Mutex<()>,
    due_dates: Mutex<()>,
}

/// The merge engine. Cheap to share behind an `Arc`.
pub struct TodoEngine {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteSource>,
    config: EngineConfig,
    minter: LocalIdMinter,
    locks: PartitionLocks,
}

impl TodoEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            remote,
            config,
            minter: LocalIdMinter::new(),
            locks: PartitionLocks::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The merged view: remote tasks (minus tombstones, plus patches) followed
    /// by local tasks. Never fails.
    pub async fn list_all(&self) -> Vec<Task> {
        let remote = self.refresh_remote_cache().await;
        let partitions = Partitions {
            remote,
            local: self.read_lenient(keys::LOCAL_TODOS).await,
            modifications: self.read_lenient(keys::MODIFICATIONS).await,
            tombstones: self.read_lenient(keys::TOMBSTONES).await,
        };
        merge::merge_view(&partitions)
    }

    /// Find a task in the merged view.
    pub async fn resolve_by_id(&self, id: TaskId) -> Option<Task> {
        self.list_all().await.into_iter().find(|task| task.id == id)
    }

    /// Raw partition contents, without touching the remote.
    pub async fn partitions(&self) -> Partitions {
        Partitions {
            remote: self.read_lenient(keys::REMOTE_CACHE).await,
            local: self.read_lenient(keys::LOCAL_TODOS).await,
            modifications: self.read_lenient(keys::MODIFICATIONS).await,
            tombstones: self.read_lenient(keys::TOMBSTONES).await,
        }
    }

    async fn refresh_remote_cache(&self) -> Vec<Task> {
        let fetch = tokio::time::timeout(self.config.fetch_timeout, self.remote.fetch_todos());
        let fetched = match fetch.await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout("remote fetch".to_string())),
        };

        match fetched {
            Ok(todos) => {
                let tasks: Vec<Task> = todos.into_iter().map(Task::from).collect();
                let _remote = self.locks.remote.lock().await;
                if let Err(err) = self.write_partition(keys::REMOTE_CACHE, &tasks).await {
                    tracing::warn!(error = %err, "failed to persist remote cache");
                }
                tasks
            }
            Err(err) => {
                tracing::info!(error = %err, "remote fetch failed; using cached todos");
                self.read_lenient(keys::REMOTE_CACHE).await
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a local task and append it to the local-only set.
    ///
    /// A storage read failure on the local set is returned as an error
    /// rather than treated as empty.
    pub async fn create(&self, draft: TaskDraft) -> Result<Task> {
        let title = normalize_title(&draft.title)?;
        let task = Task {
            id: self.minter.mint()?,
            title,
            completed: draft.completed.unwrap_or(false),
            owner_tag: Some(draft.owner_tag.unwrap_or(self.config.default_owner_tag)),
            due_date: draft.due_date,
            origin: Origin::Local,
        };

        {
            let _local = self.locks.local.lock().await;
            let mut local: Vec<Task> = self.read_for_update(keys::LOCAL_TODOS).await?;
            local.push(task.clone());
            self.write_partition(keys::LOCAL_TODOS, &local).await?;
        }
        tracing::debug!(id = %task.id, "created local task");

        if task.due_date.is_some() {
            self.index_due_date(&task).await;
        }
        Ok(task)
    }

    /// Apply a field patch.
    ///
    /// Local tasks are edited in place. Remote tasks get the patch folded
    /// into their modification entry, even when the id is not cached; the
    /// returned task then has synthesized defaults under the patch.
    ///
    /// Unlike [`list_all`](Self::list_all), a storage read failure on a
    /// partition this touches is returned as an error, so an unreadable
    /// partition is never overwritten.
    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let patch = normalize_patch(patch)?;
        let task = match id {
            TaskId::Local(_) => self.update_local(id, &patch).await?,
            TaskId::Remote(remote_id) => self.update_remote(remote_id, &patch).await?,
        };

        if patch.due_date.is_some() {
            self.index_due_date(&task).await;
        }
        Ok(task)
    }

    async fn update_local(&self, id: TaskId, patch: &TaskPatch) -> Result<Task> {
        let _local = self.locks.local.lock().await;
        let mut local: Vec<Task> = self.read_for_update(keys::LOCAL_TODOS).await?;
        let entry = local
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(Error::TaskNotFound(id))?;
        entry.apply(patch);
        let updated = entry.clone().with_origin(Origin::Local);

        self.write_partition(keys::LOCAL_TODOS, &local).await?;
        tracing::debug!(%id, "updated local task");
        Ok(updated)
    }

    async fn update_remote(&self, remote_id: u64, patch: &TaskPatch) -> Result<Task> {
        let id = TaskId::Remote(remote_id);
        let _modifications = self.locks.modifications.lock().await;
        let _tombstones = self.locks.tombstones.lock().await;

        let tombstones: Tombstones = self.read_for_update(keys::TOMBSTONES).await?;
        if tombstones.contains(remote_id) {
            return Err(Error::Tombstoned(id));
        }

        let mut modifications: ModificationMap = self.read_for_update(keys::MODIFICATIONS).await?;
        let merged = match modifications.get(&remote_id) {
            Some(existing) => existing.merge(patch),
            None => patch.clone(),
        };
        modifications.insert(remote_id, merged.clone());
        self.write_partition(keys::MODIFICATIONS, &modifications).await?;
        tracing::debug!(%id, "recorded modification for remote task");

        let cache: Vec<Task> = self.read_lenient(keys::REMOTE_CACHE).await;
        let cached = cache.iter().find(|task| task.id == id);
        Ok(merge::layer_remote(
            remote_id,
            cached,
            &merged,
            self.config.default_owner_tag,
        ))
    }

    /// Delete a task. Local tasks are dropped outright; remote ids are
    /// tombstoned and lose any pending patch. Repeating a delete is a no-op.
    ///
    /// Storage read failures propagate here too; the tombstone set is not
    /// rewritten from an empty default.
    pub async fn remove(&self, id: TaskId) -> Result<()> {
        match id {
            TaskId::Local(_) => self.remove_local(id).await?,
            TaskId::Remote(remote_id) => self.remove_remote(remote_id).await?,
        }
        self.unindex_due_date(&id).await;
        Ok(())
    }

    async fn remove_local(&self, id: TaskId) -> Result<()> {
        let _local = self.locks.local.lock().await;
        let mut local: Vec<Task> = self.read_for_update(keys::LOCAL_TODOS).await?;
        let before = local.len();
        local.retain(|task| task.id != id);
        if local.len() == before {
            tracing::debug!(%id, "local task already absent");
            return Ok(());
        }
        self.write_partition(keys::LOCAL_TODOS, &local).await?;
        tracing::debug!(%id, "removed local task");
        Ok(())
    }

    async fn remove_remote(&self, remote_id: u64) -> Result<()> {
        let _modifications = self.locks.modifications.lock().await;
        let _tombstones = self.locks.tombstones.lock().await;

        let mut tombstones: Tombstones = self.read_for_update(keys::TOMBSTONES).await?;
        if tombstones.insert(remote_id) {
            self.write_partition(keys::TOMBSTONES, &tombstones).await?;
        }

        let mut modifications: ModificationMap = self.read_for_update(keys::MODIFICATIONS).await?;
        if modifications.remove(&remote_id).is_some() {
            self.write_partition(keys::MODIFICATIONS, &modifications).await?;
        }
        tracing::debug!(id = remote_id, "tombstoned remote task");
        Ok(())
    }

    // =========================================================================
    // Reset and sync-back
    // =========================================================================

    /// Wipe every partition, then every due-date entry.
    ///
    /// Steps are not rolled back: if the due-date sweep fails, the
    /// partitions stay cleared and the error propagates.
    pub async fn reset_all(&self) -> Result<()> {
        let _remote = self.locks.remote.lock().await;
        let _local = self.locks.local.lock().await;
        let _modifications = self.locks.modifications.lock().await;
        let _tombstones = self.locks.tombstones.lock().await;
        let _due_dates = self.locks.due_dates.lock().await;

        let partition_keys: Vec<String> =
            keys::PARTITIONS.iter().map(|key| key.to_string()).collect();
        self.store.remove_many(&partition_keys).await?;

        let removed = self.clear_due_date_entries().await?;
        tracing::info!(due_dates = removed, "reset todo storage");
        Ok(())
    }

    /// Placeholder for pushing local tasks to a writable backend.
    ///
    /// No such backend exists, so the local-only set is cleared as if the
    /// push had succeeded. Returns how many tasks were discarded.
    pub async fn push_local_to_remote(&self) -> Result<usize> {
        let pushed = {
            let _local = self.locks.local.lock().await;
            let local: Vec<Task> = self.read_for_update(keys::LOCAL_TODOS).await?;
            if local.is_empty() {
                return Ok(0);
            }
            tracing::warn!(
                count = local.len(),
                "no writable backend; treating local tasks as pushed"
            );
            let cleared: Vec<Task> = Vec::new();
            self.write_partition(keys::LOCAL_TODOS, &cleared).await?;
            local
        };

        for task in &pushed {
            self.unindex_due_date(&task.id).await;
        }
        Ok(pushed.len())
    }

    // =========================================================================
    // Due-date index
    // =========================================================================

    /// Indexed due date for a task. Missing or unreadable entries are `None`.
    pub async fn due_date(&self, id: TaskId) -> Option<NaiveDate> {
        let key = keys::due_date(&id);
        self.read_lenient::<Option<NaiveDate>>(&key).await
    }

    /// Every indexed due date, keyed by task id.
    pub async fn due_date_index(&self) -> Result<BTreeMap<TaskId, NaiveDate>> {
        let all_keys = self.bounded("list keys", self.store.list_keys()).await?;
        let mut index = BTreeMap::new();
        for key in all_keys {
            let Some(raw_id) = key.strip_prefix(keys::DUE_DATE_PREFIX) else {
                continue;
            };
            let Ok(id) = raw_id.parse::<TaskId>() else {
                tracing::warn!(%key, "skipping due-date entry with unparseable id");
                continue;
            };
            if let Some(date) = self.due_date(id).await {
                index.insert(id, date);
            }
        }
        Ok(index)
    }

    /// Rebuild the due-date index from the merged view. Returns the number
    /// of entries written.
    pub async fn rebuild_due_dates(&self) -> Result<usize> {
        let view = self.list_all().await;

        let _due_dates = self.locks.due_dates.lock().await;
        self.clear_due_date_entries().await?;
        let mut written = 0;
        for task in &view {
            if let Some(date) = task.due_date {
                let key = keys::due_date(&task.id);
                self.write_partition(&key, &date).await?;
                written += 1;
            }
        }
        tracing::info!(entries = written, "rebuilt due-date index");
        Ok(written)
    }

    async fn clear_due_date_entries(&self) -> Result<usize> {
        let all_keys = self.bounded("list keys", self.store.list_keys()).await?;
        let due_keys: Vec<String> = all_keys
            .into_iter()
            .filter(|key| keys::is_due_date(key))
            .collect();
        if !due_keys.is_empty() {
            self.store.remove_many(&due_keys).await?;
        }
        Ok(due_keys.len())
    }

    // The index is derived from task fields, so failures here are logged and
    // repaired by `rebuild_due_dates`.
    async fn index_due_date(&self, task: &Task) {
        let _due_dates = self.locks.due_dates.lock().await;
        let key = keys::due_date(&task.id);
        let result = match task.due_date {
            Some(date) => self.write_partition(&key, &date).await,
            None => self.store.remove(&key).await,
        };
        if let Err(err) = result {
            tracing::warn!(id = %task.id, error = %err, "failed to update due-date index");
        }
    }

    async fn unindex_due_date(&self, id: &TaskId) {
        let _due_dates = self.locks.due_dates.lock().await;
        let key = keys::due_date(id);
        if let Err(err) = self.store.remove(&key).await {
            tracing::warn!(%id, error = %err, "failed to remove due-date entry");
        }
    }

    // =========================================================================
    // Storage helpers
    // =========================================================================

    // Reads only. Cancelling a write future does not cancel the I/O behind
    // it, so writes rely on the store's own lock timeout instead.
    async fn bounded<T, F>(&self, what: &str, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("storage {what}"))),
        }
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        self.bounded(key, self.store.get(key)).await
    }

    /// Read a partition for display. Never fails.
    async fn read_lenient<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.read_raw(key).await {
            Ok(Some(raw)) => decode_or_default(key, &raw),
            Ok(None) => T::default(),
            Err(err) => {
                tracing::warn!(%key, error = %err, "storage read failed; using default");
                T::default()
            }
        }
    }

    /// Read a partition that is about to be rewritten. I/O failures
    /// propagate so a write never clobbers data that could not be read.
    async fn read_for_update<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(match self.read_raw(key).await? {
            Some(raw) => decode_or_default(key, &raw),
            None => T::default(),
        })
    }

    async fn write_partition<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, json).await
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(key: &str, raw: &str) -> T {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(%key, error = %err, "corrupt partition; using default");
            T::default()
        }
    }
}

fn normalize_patch(mut patch: TaskPatch) -> Result<TaskPatch> {
    if let Some(title) = patch.title.take() {
        patch.title = Some(normalize_title(&title)?);
    }
    Ok(patch)
}
