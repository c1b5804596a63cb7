#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use todo_sync::engine::{EngineConfig, TodoEngine};
use todo_sync::lock::DEFAULT_LOCK_TIMEOUT_MS;
use todo_sync::remote::StaticRemote;
use todo_sync::storage::{FileStore, MemoryStore};
use todo_sync::task::RemoteTask;

/// Engine over an in-memory store with a scripted remote.
pub struct MemoryFixture {
    pub store: Arc<MemoryStore>,
    pub remote: Arc<StaticRemote>,
    pub engine: Arc<TodoEngine>,
}

impl MemoryFixture {
    pub fn new(todos: Vec<RemoteTask>) -> Self {
        Self::with_remote(StaticRemote::new(todos))
    }

    pub fn offline() -> Self {
        Self::with_remote(StaticRemote::unreachable())
    }

    pub fn with_remote(remote: StaticRemote) -> Self {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(remote);
        let engine = Arc::new(TodoEngine::new(
            store.clone(),
            remote.clone(),
            test_config(),
        ));
        Self {
            store,
            remote,
            engine,
        }
    }
}

/// Engine over a file store in a temp dir.
pub struct FileFixture {
    pub dir: TempDir,
    pub remote: Arc<StaticRemote>,
    pub engine: TodoEngine,
}

impl FileFixture {
    pub fn new(todos: Vec<RemoteTask>) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let remote = Arc::new(StaticRemote::new(todos));
        let engine = file_engine(dir.path(), remote.clone());
        Self {
            dir,
            remote,
            engine,
        }
    }

    /// Fresh engine over the same directory, as after a restart.
    pub fn reopen(&self) -> TodoEngine {
        file_engine(self.dir.path(), self.remote.clone())
    }
}

pub fn file_engine(dir: &Path, remote: Arc<StaticRemote>) -> TodoEngine {
    file_engine_with(dir, remote, test_config(), DEFAULT_LOCK_TIMEOUT_MS)
}

pub fn file_engine_with(
    dir: &Path,
    remote: Arc<StaticRemote>,
    config: EngineConfig,
    lock_timeout_ms: u64,
) -> TodoEngine {
    let store = FileStore::new(dir).with_lock_timeout(lock_timeout_ms);
    store.init().expect("init store");
    TodoEngine::new(Arc::new(store), remote, config)
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        default_owner_tag: 1,
        fetch_timeout: Duration::from_secs(2),
        op_timeout: Duration::from_secs(5),
    }
}

pub fn remote_task(id: u64, title: &str, completed: bool) -> RemoteTask {
    RemoteTask {
        id,
        title: title.to_string(),
        completed,
        owner_tag: Some(100 + id as i64),
    }
}

pub fn sample_remote() -> Vec<RemoteTask> {
    vec![
        remote_task(1, "A", false),
        remote_task(2, "B", true),
        remote_task(3, "C", false),
    ]
}
