//! todo storage maintenance commands
//!
//! status, reset, push and reindex.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::query::QueryState;

#[derive(Serialize)]
struct StatusReport {
    data_dir: PathBuf,
    offline: bool,
    partitions: PartitionSummary,
    due_dates: usize,
    query: QueryState,
}

#[derive(Serialize)]
struct PartitionSummary {
    remote_cache: usize,
    local: usize,
    modified: usize,
    deleted: usize,
}

#[derive(Serialize)]
struct CountReport {
    count: usize,
}

pub async fn run_status(ctx: &Context) -> Result<()> {
    let engine = ctx.engine();
    let partitions = engine.partitions().await;
    let due_dates = engine.due_date_index().await?.len();

    let report = StatusReport {
        data_dir: ctx.data_dir.clone(),
        offline: ctx.offline,
        partitions: PartitionSummary {
            remote_cache: partitions.remote.len(),
            local: partitions.local.len(),
            modified: partitions.modifications.len(),
            deleted: partitions.tombstones.len(),
        },
        due_dates,
        query: ctx.query.state().await,
    };

    let mut human = HumanOutput::new("todo status");
    human.push_summary("data dir", ctx.data_dir.display().to_string());
    human.push_summary("cached remote", report.partitions.remote_cache.to_string());
    human.push_summary("local", report.partitions.local.to_string());
    human.push_summary("modified", report.partitions.modified.to_string());
    human.push_summary("deleted", report.partitions.deleted.to_string());
    human.push_summary("due dates", due_dates.to_string());

    if ctx.offline {
        human.push_warning("offline mode");
    }
    if report.partitions.remote_cache == 0 && !ctx.offline {
        human.push_next_step("todo list");
    }
    if report.partitions.local > 0 {
        human.push_next_step("todo push");
    }

    emit_success(ctx.output, "status", &report, Some(&human))
}

pub async fn run_reset(ctx: &Context) -> Result<()> {
    ctx.engine().reset_all().await?;
    ctx.query.invalidate().await;

    let mut human = HumanOutput::new("todo reset: local state cleared");
    human.push_next_step("todo list");
    emit_success(ctx.output, "reset", &serde_json::json!({ "reset": true }), Some(&human))
}

pub async fn run_push(ctx: &Context) -> Result<()> {
    let count = ctx.engine().push_local_to_remote().await?;
    ctx.query.invalidate().await;

    let mut human = HumanOutput::new(format!("todo push: {count} local task(s)"));
    if count > 0 {
        human.push_warning("no writable remote; local tasks were discarded");
    }
    emit_success(ctx.output, "push", &CountReport { count }, Some(&human))
}

pub async fn run_reindex(ctx: &Context) -> Result<()> {
    let count = ctx.engine().rebuild_due_dates().await?;

    let human = HumanOutput::new(format!("todo reindex: {count} due date(s)"));
    emit_success(ctx.output, "reindex", &CountReport { count }, Some(&human))
}
