use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;

fn todo(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("todo").expect("binary");
    cmd.env_remove("RUST_LOG")
        .env_remove("TODO_CONFIG")
        .arg("--offline")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().expect("run todo");
    serde_json::from_slice(&output.stdout).expect("json output")
}

#[test]
fn todo_help_works() {
    Command::cargo_bin("todo")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("offline-first task list"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = [
        "list", "show", "add", "edit", "done", "undone", "rm", "reset", "push", "reindex",
        "status",
    ];

    for cmd in subcommands {
        Command::cargo_bin("todo")
            .expect("binary")
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}

#[test]
fn add_list_done_rm_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");

    let added = json_stdout(todo(dir.path()).args(["add", "Buy milk", "--due", "2025-04-01"]));
    assert_eq!(added["schema_version"], "todo.v1");
    assert_eq!(added["status"], "success");
    let id = added["data"]["id"].as_str().expect("id").to_string();
    assert!(id.starts_with("local-"));
    assert_eq!(added["data"]["due_date"], "2025-04-01");

    todo(dir.path())
        .args(["done", &id])
        .assert()
        .success()
        .stdout(contains("completed: true"));

    let listed = json_stdout(todo(dir.path()).args(["list", "--done"]));
    assert_eq!(listed["data"]["total"], 1);
    assert_eq!(listed["data"]["tasks"][0]["title"], "Buy milk");

    let pending = json_stdout(todo(dir.path()).args(["list", "--pending"]));
    assert_eq!(pending["data"]["total"], 0);

    todo(dir.path()).args(["rm", &id]).assert().success();
    let listed = json_stdout(todo(dir.path()).arg("list"));
    assert_eq!(listed["data"]["total"], 0);
}

#[test]
fn empty_title_is_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    todo(dir.path())
        .args(["add", "   "])
        .assert()
        .code(2)
        .stderr(contains("title cannot be empty"));
}

#[test]
fn unknown_local_id_is_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = todo(dir.path())
        .args(["show", "local-01ARZ3NDEKTSV4RRFFQ69G5FAV", "--json"])
        .output()
        .expect("run todo");
    assert_eq!(output.status.code(), Some(2));

    let body: Value = serde_json::from_slice(&output.stdout).expect("json error");
    assert_eq!(body["status"], "error");
    assert_eq!(body["command"], "show");
    assert_eq!(body["error"]["kind"], "user_error");
}

#[test]
fn garbage_id_is_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    todo(dir.path()).args(["rm", "not-an-id"]).assert().code(2);
}

#[test]
fn edit_after_delete_is_blocked() {
    let dir = tempfile::tempdir().expect("tempdir");
    todo(dir.path()).args(["rm", "5"]).assert().success();
    todo(dir.path())
        .args(["edit", "5", "--title", "again"])
        .assert()
        .code(3)
        .stderr(contains("has been deleted"));
}

#[test]
fn edit_without_fields_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    todo(dir.path()).args(["edit", "5"]).assert().code(2);
}

#[test]
fn status_reset_push_reindex() {
    let dir = tempfile::tempdir().expect("tempdir");
    todo(dir.path())
        .args(["add", "one", "--due", "2025-12-24"])
        .assert()
        .success();
    todo(dir.path()).args(["rm", "3"]).assert().success();

    let status = json_stdout(todo(dir.path()).arg("status"));
    assert_eq!(status["data"]["partitions"]["local"], 1);
    assert_eq!(status["data"]["partitions"]["deleted"], 1);
    assert_eq!(status["data"]["due_dates"], 1);

    let reindexed = json_stdout(todo(dir.path()).arg("reindex"));
    assert_eq!(reindexed["data"]["count"], 1);

    let pushed = json_stdout(todo(dir.path()).arg("push"));
    assert_eq!(pushed["data"]["count"], 1);

    todo(dir.path()).arg("reset").assert().success();
    let status = json_stdout(todo(dir.path()).arg("status"));
    assert_eq!(status["data"]["partitions"]["deleted"], 0);
    assert_eq!(status["data"]["due_dates"], 0);
}

#[test]
fn bad_due_date_is_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    todo(dir.path())
        .args(["add", "x", "--due", "tomorrow"])
        .assert()
        .code(2)
        .stderr(contains("YYYY-MM-DD"));
}
