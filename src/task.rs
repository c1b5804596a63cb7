//! Task data model.
//!
//! Two id spaces coexist: ids assigned by the remote list API and ids minted
//! on this device. They are kept apart by [`TaskId`] so a local id can never
//! be mistaken for a remote one.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use ulid::{Generator, Ulid};

use crate::error::{Error, Result};

/// Owner tag applied to tasks that do not carry one.
pub const DEFAULT_OWNER_TAG: i64 = 1;

const LOCAL_ID_PREFIX: &str = "local-";

/// Identifier of a task, tagged by the id space it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    /// Assigned by the remote list API.
    Remote(u64),
    /// Minted on this device; never pushed anywhere.
    Local(Ulid),
}

impl TaskId {
    pub fn is_local(&self) -> bool {
        matches!(self, TaskId::Local(_))
    }

    pub fn as_remote(&self) -> Option<u64> {
        match self {
            TaskId::Remote(id) => Some(*id),
            TaskId::Local(_) => None,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Remote(id) => write!(f, "{id}"),
            TaskId::Local(ulid) => write!(f, "{LOCAL_ID_PREFIX}{ulid}"),
        }
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if let Some(raw) = trimmed.strip_prefix(LOCAL_ID_PREFIX) {
            return Ulid::from_string(raw)
                .map(TaskId::Local)
                .map_err(|_| Error::InvalidTaskId(input.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(TaskId::Remote)
            .map_err(|_| Error::InvalidTaskId(input.to_string()))
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TaskIdVisitor;

        impl Visitor<'_> for TaskIdVisitor {
            type Value = TaskId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a remote integer id or a local-<ULID> id")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<TaskId, E> {
                Ok(TaskId::Remote(value))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<TaskId, E> {
                value.parse().map_err(|_| E::custom(format!("invalid task id '{value}'")))
            }
        }

        deserializer.deserialize_any(TaskIdVisitor)
    }
}

/// Mints local ids. ULIDs are clock-based and the generator keeps them
/// strictly increasing within the process.
pub struct LocalIdMinter {
    generator: Mutex<Generator>,
}

impl Default for LocalIdMinter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalIdMinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdMinter").finish_non_exhaustive()
    }
}

impl LocalIdMinter {
    pub fn new() -> Self {
        Self {
            generator: Mutex::new(Generator::new()),
        }
    }

    pub fn mint(&self) -> Result<TaskId> {
        let mut generator = self
            .generator
            .lock()
            .map_err(|_| Error::OperationFailed("local id generator poisoned".to_string()))?;
        let ulid = generator
            .generate()
            .map_err(|err| Error::OperationFailed(format!("local id generation failed: {err}")))?;
        Ok(TaskId::Local(ulid))
    }
}

/// Where a task in the merged view comes from. Derived at merge time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Remote,
    Local,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Remote => "remote",
            Origin::Local => "local",
        }
    }
}

/// A task as persisted in the partitions and returned in the merged view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_tag: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip)]
    pub origin: Origin,
}

impl Task {
    /// Placeholder for a remote id with no cached record.
    pub fn synthesized(id: TaskId, default_owner_tag: i64) -> Self {
        Self {
            id,
            title: String::new(),
            completed: false,
            owner_tag: Some(default_owner_tag),
            due_date: None,
            origin: Origin::Remote,
        }
    }

    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(owner_tag) = patch.owner_tag {
            self.owner_tag = Some(owner_tag);
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Input for creating a local task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_tag: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial field update. Unset fields leave the target untouched.
///
/// `due_date` is tri-state: `None` keeps the date, `Some(None)` clears it,
/// `Some(Some(date))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_tag: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub due_date: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.owner_tag.is_none()
            && self.due_date.is_none()
    }

    /// Layer `newer` over `self`; fields set in `newer` win.
    pub fn merge(&self, newer: &TaskPatch) -> TaskPatch {
        TaskPatch {
            title: newer.title.clone().or_else(|| self.title.clone()),
            completed: newer.completed.or(self.completed),
            owner_tag: newer.owner_tag.or(self.owner_tag),
            due_date: newer.due_date.or(self.due_date),
        }
    }
}

// Distinguishes an explicit `null` (clear) from a missing field (keep).
fn deserialize_present<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NaiveDate>::deserialize(deserializer).map(Some)
}

/// Trim a title and reject it if nothing is left.
pub fn normalize_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

/// Task record as returned by the remote list API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: u64,
    #[serde(rename = "todo")]
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_tag: Option<i64>,
}

impl From<RemoteTask> for Task {
    fn from(remote: RemoteTask) -> Self {
        Task {
            id: TaskId::Remote(remote.id),
            title: remote.title,
            completed: remote.completed,
            owner_tag: remote.owner_tag,
            due_date: None,
            origin: Origin::Remote,
        }
    }
}
