//! Command-line interface for todo
//!
//! This module defines the CLI structure using clap derive macros.
//! Task commands live in `task`, storage maintenance in `status`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::config::{Config, CONFIG_FILE};
use crate::engine::{EngineConfig, TodoEngine};
use crate::error::{Error, Result};
use crate::output::OutputOptions;
use crate::query::TodoQuery;
use crate::remote::{HttpRemote, OfflineRemote, RemoteSource};
use crate::storage::FileStore;

mod status;
mod task;

/// todo - offline-first task list
///
/// Merges a read-only remote todo list with local additions, edits and
/// deletions kept on this device.
#[derive(Parser, Debug)]
#[command(name = "todo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to <data dir>/.todo.toml)
    #[arg(long, global = true, env = "TODO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory for persisted partitions
    #[arg(long, global = true, env = "TODO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Never contact the remote; serve the cached list
    #[arg(long, global = true, env = "TODO_OFFLINE")]
    pub offline: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the merged task view
    List {
        /// Only tasks not yet completed
        #[arg(long, conflicts_with = "done")]
        pending: bool,

        /// Only completed tasks
        #[arg(long)]
        done: bool,
    },

    /// Show a single task
    Show {
        /// Task id (number for remote tasks, local-<ulid> for local ones)
        id: String,
    },

    /// Create a local task
    Add {
        /// Task title
        title: String,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,

        /// Owner tag
        #[arg(long)]
        owner: Option<i64>,

        /// Create already completed
        #[arg(long)]
        done: bool,
    },

    /// Edit task fields
    Edit {
        /// Task id
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New due date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,

        /// New owner tag
        #[arg(long)]
        owner: Option<i64>,
    },

    /// Mark a task completed
    Done {
        /// Task id
        id: String,
    },

    /// Mark a task not completed
    Undone {
        /// Task id
        id: String,
    },

    /// Delete a task
    Rm {
        /// Task id
        id: String,
    },

    /// Wipe all local state
    Reset,

    /// Push local tasks to the remote
    Push,

    /// Rebuild the due-date index from task fields
    Reindex,

    /// Show partition sizes and cache state
    Status,
}

/// Wired-up services shared by every command.
pub(crate) struct Context {
    pub query: TodoQuery,
    pub output: OutputOptions,
    pub data_dir: PathBuf,
    pub offline: bool,
}

impl Context {
    pub fn engine(&self) -> &TodoEngine {
        self.query.engine()
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.dispatch())
    }

    async fn dispatch(self) -> Result<()> {
        let ctx = self.context()?;
        match self.command {
            Commands::List { pending, done } => {
                task::run_list(
                    &ctx,
                    task::ListOptions {
                        completed: if pending {
                            Some(false)
                        } else if done {
                            Some(true)
                        } else {
                            None
                        },
                    },
                )
                .await
            }
            Commands::Show { id } => task::run_show(&ctx, &id).await,
            Commands::Add {
                title,
                due,
                owner,
                done,
            } => {
                task::run_add(
                    &ctx,
                    task::AddOptions {
                        title,
                        due: due.as_deref().map(parse_due_date).transpose()?,
                        owner,
                        done,
                    },
                )
                .await
            }
            Commands::Edit {
                id,
                title,
                due,
                clear_due,
                owner,
            } => {
                let due = if clear_due {
                    Some(None)
                } else {
                    due.as_deref().map(parse_due_date).transpose()?.map(Some)
                };
                task::run_edit(
                    &ctx,
                    task::EditOptions {
                        id,
                        title,
                        due,
                        owner,
                    },
                )
                .await
            }
            Commands::Done { id } => task::run_set_completed(&ctx, &id, true).await,
            Commands::Undone { id } => task::run_set_completed(&ctx, &id, false).await,
            Commands::Rm { id } => task::run_rm(&ctx, &id).await,
            Commands::Reset => status::run_reset(&ctx).await,
            Commands::Push => status::run_push(&ctx).await,
            Commands::Reindex => status::run_reindex(&ctx).await,
            Commands::Status => status::run_status(&ctx).await,
        }
    }

    fn context(&self) -> Result<Context> {
        let config = self.load_config()?;
        let data_dir = config.data_dir(self.data_dir.as_deref())?;

        let store = FileStore::new(&data_dir).with_lock_timeout(config.storage.lock_timeout_ms);
        store.init()?;

        let remote: Arc<dyn RemoteSource> = if self.offline {
            Arc::new(OfflineRemote)
        } else {
            Arc::new(HttpRemote::new(&config.remote)?)
        };

        let engine = TodoEngine::new(Arc::new(store), remote, EngineConfig::from(&config));
        let query = TodoQuery::with_stale_after(
            Arc::new(engine),
            Duration::from_secs(config.query.stale_after_secs),
        );
        tracing::debug!(data_dir = %data_dir.display(), offline = self.offline, "context ready");

        Ok(Context {
            query,
            output: OutputOptions {
                json: self.json,
                quiet: self.quiet,
            },
            data_dir,
            offline: self.offline,
        })
    }

    // An explicit --config must load cleanly; the implicit one falls back to
    // defaults.
    fn load_config(&self) -> Result<Config> {
        if let Some(path) = &self.config {
            return Config::load(path);
        }
        let dir = Config::default().data_dir(self.data_dir.as_deref())?;
        Ok(Config::load_or_default(&dir.join(CONFIG_FILE)))
    }
}

fn parse_due_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidArgument(format!("due date must be YYYY-MM-DD: '{raw}'")))
}
