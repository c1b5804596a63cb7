//! todo task commands
//!
//! list, show, add, edit, done/undone and rm over the cached merged view.

use chrono::NaiveDate;
use serde::Serialize;

use crate::cli::Context;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::task::{Origin, Task, TaskDraft, TaskId, TaskPatch};

/// Options for `todo list`
pub struct ListOptions {
    /// Keep only tasks with this completion state
    pub completed: Option<bool>,
}

/// Options for `todo add`
pub struct AddOptions {
    pub title: String,
    pub due: Option<NaiveDate>,
    pub owner: Option<i64>,
    pub done: bool,
}

/// Options for `todo edit`
pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub due: Option<Option<NaiveDate>>,
    pub owner: Option<i64>,
}

/// A task plus the origin computed at merge time.
#[derive(Serialize)]
struct TaskRecord<'a> {
    #[serde(flatten)]
    task: &'a Task,
    origin: Origin,
}

impl<'a> From<&'a Task> for TaskRecord<'a> {
    fn from(task: &'a Task) -> Self {
        Self {
            task,
            origin: task.origin,
        }
    }
}

#[derive(Serialize)]
struct ListReport<'a> {
    total: usize,
    tasks: Vec<TaskRecord<'a>>,
}

#[derive(Serialize)]
struct RemoveReport {
    id: TaskId,
    removed: bool,
}

pub async fn run_list(ctx: &Context, options: ListOptions) -> Result<()> {
    let tasks: Vec<Task> = ctx
        .query
        .fetch_all()
        .await
        .into_iter()
        .filter(|task| options.completed.map_or(true, |done| task.completed == done))
        .collect();

    let mut human = HumanOutput::new(format!("todo list: {} task(s)", tasks.len()));
    for task in &tasks {
        human.push_detail(task_line(task));
    }
    if tasks.is_empty() {
        human.push_next_step("todo add \"<title>\"");
    }
    if ctx.offline {
        human.push_warning("offline: showing cached remote tasks");
    }

    let report = ListReport {
        total: tasks.len(),
        tasks: tasks.iter().map(TaskRecord::from).collect(),
    };
    emit_success(ctx.output, "list", &report, Some(&human))
}

pub async fn run_show(ctx: &Context, raw_id: &str) -> Result<()> {
    let id: TaskId = raw_id.parse()?;
    let task = ctx
        .engine()
        .resolve_by_id(id)
        .await
        .ok_or(Error::TaskNotFound(id))?;

    let mut human = HumanOutput::new(format!("todo show: {}", task.id));
    push_task_summary(&mut human, &task);
    emit_success(ctx.output, "show", &TaskRecord::from(&task), Some(&human))
}

pub async fn run_add(ctx: &Context, options: AddOptions) -> Result<()> {
    let draft = TaskDraft {
        title: options.title,
        completed: options.done.then_some(true),
        owner_tag: options.owner,
        due_date: options.due,
    };
    let task = ctx.query.create(draft).await?;

    let mut human = HumanOutput::new(format!("todo add: {}", task.id));
    push_task_summary(&mut human, &task);
    human.push_next_step(format!("todo done {}", task.id));
    emit_success(ctx.output, "add", &TaskRecord::from(&task), Some(&human))
}

pub async fn run_edit(ctx: &Context, options: EditOptions) -> Result<()> {
    let id: TaskId = options.id.parse()?;
    let patch = TaskPatch {
        title: options.title,
        completed: None,
        owner_tag: options.owner,
        due_date: options.due,
    };
    if patch.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to edit; pass --title, --due, --clear-due or --owner".to_string(),
        ));
    }

    let task = ctx.query.update(id, patch).await?;
    let mut human = HumanOutput::new(format!("todo edit: {}", task.id));
    push_task_summary(&mut human, &task);
    emit_success(ctx.output, "edit", &TaskRecord::from(&task), Some(&human))
}

pub async fn run_set_completed(ctx: &Context, raw_id: &str, completed: bool) -> Result<()> {
    let id: TaskId = raw_id.parse()?;
    let task = ctx.query.update(id, TaskPatch::completed(completed)).await?;

    let command = if completed { "done" } else { "undone" };
    let mut human = HumanOutput::new(format!("todo {command}: {}", task.id));
    push_task_summary(&mut human, &task);
    emit_success(ctx.output, command, &TaskRecord::from(&task), Some(&human))
}

pub async fn run_rm(ctx: &Context, raw_id: &str) -> Result<()> {
    let id: TaskId = raw_id.parse()?;
    ctx.query.delete(id).await?;

    let human = HumanOutput::new(format!("todo rm: {id}"));
    emit_success(
        ctx.output,
        "rm",
        &RemoveReport { id, removed: true },
        Some(&human),
    )
}

fn task_line(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    let mut line = format!("[{mark}] {} {}", task.id, task.title);
    if let Some(due) = task.due_date {
        line.push_str(&format!(" (due {due})"));
    }
    line
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("title", task.title.clone());
    human.push_summary("completed", task.completed.to_string());
    human.push_summary("origin", task.origin.as_str());
    if let Some(owner) = task.owner_tag {
        human.push_summary("owner", owner.to_string());
    }
    if let Some(due) = task.due_date {
        human.push_summary("due", due.to_string());
    }
}
