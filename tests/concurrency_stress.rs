mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use todo_sync::task::{TaskDraft, TaskId, TaskPatch};

use support::{remote_task, FileFixture, MemoryFixture};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_are_all_kept() {
    let fx = MemoryFixture::offline();
    fx.store.set_latency(Duration::from_millis(2));

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&fx.engine);
        handles.push(tokio::spawn(async move {
            engine.create(TaskDraft::new(format!("task {i}"))).await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let task = handle.await.expect("join").expect("create");
        ids.insert(task.id);
    }
    assert_eq!(ids.len(), 16);

    let listed: HashSet<TaskId> = fx.engine.list_all().await.into_iter().map(|t| t.id).collect();
    assert_eq!(listed, ids);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_remote_edits_do_not_lose_updates() {
    let todos = (1..=8).map(|id| remote_task(id, "t", false)).collect();
    let fx = MemoryFixture::new(todos);
    fx.engine.list_all().await;
    fx.store.set_latency(Duration::from_millis(2));

    let mut handles = Vec::new();
    for id in 1..=8u64 {
        let engine = Arc::clone(&fx.engine);
        handles.push(tokio::spawn(async move {
            engine
                .update(TaskId::Remote(id), TaskPatch::completed(true))
                .await
        }));
        let engine = Arc::clone(&fx.engine);
        handles.push(tokio::spawn(async move {
            engine
                .update(TaskId::Remote(id), TaskPatch::title(format!("renamed {id}")))
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("update");
    }

    let partitions = fx.engine.partitions().await;
    assert_eq!(partitions.modifications.len(), 8);
    for task in fx.engine.list_all().await {
        assert!(task.completed, "{} lost its completion", task.id);
        assert!(task.title.starts_with("renamed"), "{} lost its title", task.id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deletes_and_edits_keep_tombstones() {
    let todos = (1..=6).map(|id| remote_task(id, "t", false)).collect();
    let fx = MemoryFixture::new(todos);
    fx.engine.list_all().await;
    fx.store.set_latency(Duration::from_millis(1));

    let mut handles = Vec::new();
    for id in 1..=6u64 {
        let engine = Arc::clone(&fx.engine);
        handles.push(tokio::spawn(async move {
            engine.remove(TaskId::Remote(id)).await
        }));
        let engine = Arc::clone(&fx.engine);
        handles.push(tokio::spawn(async move {
            // Either order is fine; a rejected edit is expected when the
            // delete lands first.
            let _ = engine
                .update(TaskId::Remote(id), TaskPatch::completed(true))
                .await;
            Ok::<(), todo_sync::Error>(())
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("mutation");
    }

    let partitions = fx.engine.partitions().await;
    assert_eq!(partitions.tombstones.len(), 6);
    assert!(partitions.modifications.is_empty());
    assert!(fx.engine.list_all().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_store_concurrent_creates() {
    let fx = Arc::new(FileFixture::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..10 {
        let fx = Arc::clone(&fx);
        handles.push(tokio::spawn(async move {
            fx.engine.create(TaskDraft::new(format!("file {i}"))).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("create");
    }

    let reopened = fx.reopen();
    assert_eq!(reopened.partitions().await.local.len(), 10);
}
