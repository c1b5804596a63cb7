//! Remote task source
//!
//! The remote list API is read-only: the engine only ever fetches from it.
//! Every failure (transport, timeout, non-2xx, undecodable body) surfaces as
//! [`Error::Remote`] and is treated the same way by callers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::task::RemoteTask;

/// Source of the canonical remote task list.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_todos(&self) -> Result<Vec<RemoteTask>>;
}

/// Page returned by the list endpoint. Only `todos` is used.
#[derive(Debug, Clone, Deserialize)]
pub struct TodosPage {
    #[serde(default)]
    pub todos: Vec<RemoteTask>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub limit: u64,
}

/// Decode a list endpoint response body.
pub fn parse_todos_page(body: &str) -> Result<Vec<RemoteTask>> {
    let page: TodosPage = serde_json::from_str(body)
        .map_err(|err| Error::Remote(format!("invalid todos payload: {err}")))?;
    Ok(page.todos)
}

/// HTTP client for the list endpoint.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    limit: u32,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limit: config.limit,
        })
    }

    pub fn list_url(&self) -> String {
        format!("{}/?limit={}", self.base_url, self.limit)
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch_todos(&self) -> Result<Vec<RemoteTask>> {
        let url = self.list_url();
        tracing::debug!(%url, "fetching remote todos");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("{url} returned {status}")));
        }

        let body = response.text().await?;
        parse_todos_page(&body)
    }
}

/// Remote that is never reachable. Used for `--offline`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRemote;

#[async_trait]
impl RemoteSource for OfflineRemote {
    async fn fetch_todos(&self) -> Result<Vec<RemoteTask>> {
        Err(Error::Remote("offline mode".to_string()))
    }
}

/// In-process remote with a scripted response.
///
/// `None` makes every fetch fail. A delay can be set to exercise fetch
/// timeouts.
#[derive(Debug, Default)]
pub struct StaticRemote {
    todos: Mutex<Option<Vec<RemoteTask>>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
}

impl StaticRemote {
    pub fn new(todos: Vec<RemoteTask>) -> Self {
        Self {
            todos: Mutex::new(Some(todos)),
            ..Self::default()
        }
    }

    /// Remote whose fetches always fail.
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn set_todos(&self, todos: Option<Vec<RemoteTask>>) {
        if let Ok(mut guard) = self.todos.lock() {
            *guard = todos;
        }
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.delay.lock() {
            *guard = delay;
        }
    }

    /// Number of fetch attempts so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for StaticRemote {
    async fn fetch_todos(&self) -> Result<Vec<RemoteTask>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay.lock().ok().and_then(|guard| *guard);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let todos = self
            .todos
            .lock()
            .map_err(|_| Error::Remote("static remote poisoned".to_string()))?
            .clone();
        todos.ok_or_else(|| Error::Remote("static remote unreachable".to_string()))
    }
}
