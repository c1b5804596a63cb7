//! Cached merged view for UI consumers.
//!
//! Holds the last merged view for a freshness window and drops it on any
//! successful mutation so the next read recomputes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::engine::TodoEngine;
use crate::error::Result;
use crate::task::{Task, TaskDraft, TaskId, TaskPatch};

/// Default freshness window for the cached view.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedView {
    tasks: Vec<Task>,
    fetched_at: Instant,
    updated_at: DateTime<Utc>,
}

/// Snapshot of the cache for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryState {
    pub cached_len: Option<usize>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_stale: bool,
}

pub struct TodoQuery {
    engine: Arc<TodoEngine>,
    stale_after: Duration,
    cached: Mutex<Option<CachedView>>,
}

impl TodoQuery {
    pub fn new(engine: Arc<TodoEngine>) -> Self {
        Self::with_stale_after(engine, DEFAULT_STALE_AFTER)
    }

    pub fn with_stale_after(engine: Arc<TodoEngine>, stale_after: Duration) -> Self {
        Self {
            engine,
            stale_after,
            cached: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<TodoEngine> {
        &self.engine
    }

    /// Cached view if still fresh, otherwise a recomputed one.
    pub async fn fetch_all(&self) -> Vec<Task> {
        let mut cached = self.cached.lock().await;
        if let Some(view) = cached.as_ref() {
            if view.fetched_at.elapsed() < self.stale_after {
                return view.tasks.clone();
            }
        }
        let tasks = self.engine.list_all().await;
        *cached = Some(fresh(tasks.clone()));
        tasks
    }

    /// Recompute regardless of age.
    ///
    /// The cache stays locked while the view is computed, so an
    /// invalidation from a mutation that overlaps it lands afterwards.
    pub async fn refetch(&self) -> Vec<Task> {
        let mut cached = self.cached.lock().await;
        let tasks = self.engine.list_all().await;
        *cached = Some(fresh(tasks.clone()));
        tasks
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    pub async fn create(&self, draft: TaskDraft) -> Result<Task> {
        let task = self.engine.create(draft).await?;
        self.invalidate().await;
        Ok(task)
    }

    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let task = self.engine.update(id, patch).await?;
        self.invalidate().await;
        Ok(task)
    }

    pub async fn delete(&self, id: TaskId) -> Result<()> {
        self.engine.remove(id).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn state(&self) -> QueryState {
        let cached = self.cached.lock().await;
        match cached.as_ref() {
            Some(view) => QueryState {
                cached_len: Some(view.tasks.len()),
                last_updated: Some(view.updated_at),
                is_stale: view.fetched_at.elapsed() >= self.stale_after,
            },
            None => QueryState {
                cached_len: None,
                last_updated: None,
                is_stale: true,
            },
        }
    }
}

fn fresh(tasks: Vec<Task>) -> CachedView {
    CachedView {
        tasks,
        fetched_at: Instant::now(),
        updated_at: Utc::now(),
    }
}
