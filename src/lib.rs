//! todo-sync - offline-first todo synchronization
//!
//! Presents a single task list assembled from a read-only remote source and
//! on-device state, and supports create, update and delete against that
//! merged view while the remote stays untouched.
//!
//! # Core Concepts
//!
//! - **Remote cache**: last successful remote fetch, served when offline
//! - **Local tasks**: tasks created on this device, ids `local-<ulid>`
//! - **Modifications**: field patches layered over remote tasks
//! - **Tombstones**: remote ids hidden from the merged view
//! - **Due-date index**: per-task entries derived from task fields
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.todo.toml`
//! - `engine`: Partition reads and writes plus all mutations
//! - `error`: Error types and result aliases
//! - `lock`: File locking and atomic writes
//! - `merge`: Pure merge of partitions into the view
//! - `output`: Human and JSON output envelopes
//! - `query`: Cached merged view with a freshness window
//! - `remote`: Remote list source trait and HTTP client
//! - `storage`: Key-value store trait with file and memory backends
//! - `task`: Task ids, records and patches

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod merge;
pub mod output;
pub mod query;
pub mod remote;
pub mod storage;
pub mod task;

pub use engine::{EngineConfig, TodoEngine};
pub use error::{Error, Result};
pub use query::{QueryState, TodoQuery};
