//! Integration tests for merging overlapping live queries.
//!
//! A task can match the assignee-id, assignee-email and legacy-assignee
//! queries at once. These tests check that it is held once, survives
//! leaving one query while still matching another, and that dropping the
//! live view releases every store listener.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use pace::store::faulty::{FaultyStore, Operation};
use pace::store::memory::MemoryStore;
use pace::tasks::{ReconcileSettings, Reconciler};
use pace_proto::identity::Identity;
use pace_proto::project::{NewProject, ProjectId};
use pace_proto::task::{Assignee, NewTask, Task, TaskId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

const UID: &str = "u-ana";
const EMAIL: &str = "ana@example.com";

fn identity() -> Identity {
    Identity {
        uid: Some(UID.to_string()),
        email: Some(EMAIL.to_string()),
        display_name: Some("Ana".to_string()),
    }
}

/// A task matching all three assignee queries.
fn triple_assigned(id: &str) -> Task {
    NewTask {
        title: format!("task {id}"),
        assignee: Assignee {
            id: Some(UID.to_string()),
            email: Some(EMAIL.to_string()),
            legacy: Some(EMAIL.to_string()),
        },
        ..NewTask::default()
    }
    .into_task(TaskId::new(id))
}

fn reconciler(store: &MemoryStore) -> Reconciler<MemoryStore> {
    Reconciler::new(Arc::new(store.clone()), identity(), ReconcileSettings::default())
}

// ===========================================================================
// Merging
// ===========================================================================

#[tokio::test]
async fn overlapping_queries_hold_one_copy() {
    let store = MemoryStore::new();
    store.put_task(triple_assigned("t1"));
    let board = reconciler(&store);
    let mut live = board.watch().await.unwrap();

    // Five initial batches: three task queries, two project queries.
    assert_eq!(live.drain(), 5);
    assert_eq!(board.tasks().len(), 1);
    assert_eq!(board.counts(&chrono::Utc::now()).to_do, 1);
}

#[tokio::test]
async fn leaving_one_query_keeps_the_task() {
    let store = MemoryStore::new();
    store.put_task(triple_assigned("t1"));
    let board = reconciler(&store);
    let mut live = board.watch().await.unwrap();
    live.drain();

    let mut moved = store.task(&TaskId::new("t1")).unwrap();
    moved.assignee.email = Some("bo@example.com".to_string());
    moved.title = "renamed".to_string();
    store.put_task(moved);
    live.drain();

    let held = board.task(&TaskId::new("t1")).unwrap();
    assert_eq!(held.title, "renamed");
    assert_eq!(held.assignee.email.as_deref(), Some("bo@example.com"));
}

#[tokio::test]
async fn leaving_every_query_removes_the_task() {
    let store = MemoryStore::new();
    store.put_task(triple_assigned("t1"));
    let board = reconciler(&store);
    let mut live = board.watch().await.unwrap();
    live.drain();

    let mut gone = store.task(&TaskId::new("t1")).unwrap();
    gone.assignee = Assignee::by_email("bo@example.com");
    store.put_task(gone);
    live.drain();
    assert!(board.task(&TaskId::new("t1")).is_none());

    store.put_task(triple_assigned("t2"));
    assert!(store.delete_task(&TaskId::new("t2")));
    live.drain();
    assert!(board.tasks().is_empty());
}

#[tokio::test]
async fn shared_and_owned_projects_are_visible() {
    let store = MemoryStore::new();
    store.put_project(
        NewProject {
            name: "Owned".to_string(),
            owner_email: EMAIL.to_string(),
            members: vec![EMAIL.to_string()],
            ..NewProject::default()
        }
        .into_project(ProjectId::new("p1")),
    );
    store.put_project(
        NewProject {
            name: "Shared".to_string(),
            owner_email: "bo@example.com".to_string(),
            members: vec![EMAIL.to_string()],
            ..NewProject::default()
        }
        .into_project(ProjectId::new("p2")),
    );
    store.put_project(
        NewProject {
            name: "Private".to_string(),
            owner_email: "bo@example.com".to_string(),
            ..NewProject::default()
        }
        .into_project(ProjectId::new("p3")),
    );

    let board = reconciler(&store);
    let mut live = board.watch().await.unwrap();
    live.drain();

    let names: Vec<String> = board.projects().into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["Owned", "Shared"]);
}

// ===========================================================================
// Listener lifetime
// ===========================================================================

#[tokio::test]
async fn dropping_the_view_releases_listeners() {
    let store = MemoryStore::new();
    let board = reconciler(&store);

    let live = board.watch().await.unwrap();
    assert_eq!(store.listener_count(), 5);
    assert_eq!(live.open_feeds(), 5);

    drop(live);
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn failed_open_releases_partial_subscriptions() {
    let memory = MemoryStore::new();
    let store = Arc::new(FaultyStore::new(memory.clone()));
    let board = Reconciler::new(Arc::clone(&store), identity(), ReconcileSettings::default());

    // The first two task queries open, the third fails.
    store.fail_after(Operation::Subscribe, 2, 1);
    let err = board.watch().await.err().expect("open should fail");
    assert!(err.to_string().contains("injected failure"));
    assert_eq!(memory.listener_count(), 0);

    let live = board.watch().await.unwrap();
    assert_eq!(memory.listener_count(), 5);
    drop(live);
    assert_eq!(memory.listener_count(), 0);
}

// ===========================================================================
// Waiting for changes
// ===========================================================================

#[tokio::test]
async fn changed_wakes_on_remote_write() {
    let store = MemoryStore::new();
    let board = reconciler(&store);
    let mut live = board.watch().await.unwrap();
    live.drain();

    let writer = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.put_task(triple_assigned("t9"));
    });

    let applied = tokio::time::timeout(Duration::from_secs(2), live.changed())
        .await
        .expect("change should arrive")
        .expect("feeds still open");
    assert!(applied >= 1);
    assert!(board.task(&TaskId::new("t9")).is_some());
}
