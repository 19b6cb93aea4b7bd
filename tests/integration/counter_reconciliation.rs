//! Integration tests for the repair passes.
//!
//! Project counters are adjusted by writes that can fail independently of
//! the task writes they follow. These tests check that recounting from the
//! store converges them, and that completion backfill stamps done tasks in
//! bounded batches.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use pace::store::faulty::{FaultyStore, Operation};
use pace::store::memory::MemoryStore;
use pace::tasks::{
    CounterScope, CounterSync, LiveView, ReconcileReport, ReconcileSettings, Reconciler,
    TransitionOutcome,
};
use pace_proto::identity::Identity;
use pace_proto::project::{NewProject, Project, ProjectId};
use pace_proto::status::normalize_status;
use pace_proto::task::{Assignee, NewTask, Task, TaskId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

const EMAIL: &str = "ana@example.com";

fn identity() -> Identity {
    Identity {
        uid: None,
        email: Some(EMAIL.to_string()),
        display_name: None,
    }
}

fn server_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// A project with the given stored counters.
fn project(id: &str, total: Option<u64>, done: Option<u64>) -> Project {
    Project {
        task_total: total,
        task_done: done,
        ..NewProject {
            name: format!("project {id}"),
            owner_email: EMAIL.to_string(),
            ..NewProject::default()
        }
        .into_project(ProjectId::new(id))
    }
}

/// A task with no completion fields, as written by older clients.
fn task(id: &str, status: &str, project: &str, assignee: &str) -> Task {
    Task {
        status: normalize_status(Some(status)),
        project_id: Some(ProjectId::new(project)),
        ..NewTask {
            title: format!("task {id}"),
            assignee: Assignee::by_email(assignee),
            ..NewTask::default()
        }
        .into_task(TaskId::new(id))
    }
}

/// Ten tasks in `p1`, four of them done.
fn seed_ten(memory: &MemoryStore) {
    for i in 0..10 {
        let status = if i < 4 { "done" } else { "to do" };
        memory.put_task(task(&format!("t{i:02}"), status, "p1", EMAIL));
    }
}

async fn board(
    memory: &MemoryStore,
    settings: ReconcileSettings,
) -> (Arc<FaultyStore<MemoryStore>>, Reconciler<FaultyStore<MemoryStore>>, LiveView) {
    let store = Arc::new(FaultyStore::new(memory.clone()));
    let reconciler = Reconciler::new(Arc::clone(&store), identity(), settings);
    let mut live = reconciler.watch().await.unwrap();
    live.drain();
    (store, reconciler, live)
}

fn counters(memory: &MemoryStore, id: &str) -> (Option<u64>, Option<u64>) {
    let p = memory.project(&ProjectId::new(id)).unwrap();
    (p.task_total, p.task_done)
}

// ===========================================================================
// Counter reconciliation
// ===========================================================================

#[tokio::test]
async fn uncounted_project_is_counted_on_load() {
    let memory = MemoryStore::new().with_clock(server_time);
    seed_ten(&memory);
    memory.put_project(project("p1", None, None));
    let (_store, reconciler, mut live) = board(&memory, ReconcileSettings::default()).await;

    let (_, report) = reconciler.reconcile_on_load().await;
    assert_eq!(
        report,
        ReconcileReport {
            examined: 1,
            corrected: 1,
            failed: 0,
        }
    );
    assert_eq!(counters(&memory, "p1"), (Some(10), Some(4)));

    live.drain();
    let again = reconciler.reconcile_counters(CounterScope::All).await;
    assert_eq!(again.corrected, 0);
}

#[tokio::test]
async fn counted_project_is_left_alone_on_load() {
    let memory = MemoryStore::new();
    seed_ten(&memory);
    memory.put_project(project("p1", Some(7), Some(1)));
    let (_store, reconciler, _live) = board(&memory, ReconcileSettings::default()).await;

    let report = reconciler.reconcile_counters(CounterScope::MissingOrDrifted).await;
    assert_eq!(report.examined, 0);
    assert_eq!(counters(&memory, "p1"), (Some(7), Some(1)));
}

#[tokio::test]
async fn missed_increment_converges() {
    let memory = MemoryStore::new();
    seed_ten(&memory);
    memory.put_project(project("p1", Some(10), Some(4)));
    let (store, reconciler, mut live) = board(&memory, ReconcileSettings::default()).await;

    store.fail_next(Operation::UpdateProject, 1);
    let outcome = reconciler.toggle_done(&TaskId::new("t05")).await.unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Applied {
            counter: CounterSync::Drifted
        }
    );
    live.drain();
    assert_eq!(counters(&memory, "p1"), (Some(10), Some(4)));

    let report = reconciler.reconcile_counters(CounterScope::MissingOrDrifted).await;
    assert_eq!(report.corrected, 1);
    assert_eq!(counters(&memory, "p1"), (Some(10), Some(5)));
    assert!(reconciler.drifted_projects().is_empty());
}

#[tokio::test]
async fn recount_includes_tasks_assigned_to_others() {
    let memory = MemoryStore::new();
    seed_ten(&memory);
    memory.put_task(task("x1", "done", "p1", "bo@example.com"));
    memory.put_task(task("x2", "to do", "p1", "bo@example.com"));
    memory.put_project(project("p1", None, None));
    let (_store, reconciler, _live) = board(&memory, ReconcileSettings::default()).await;

    assert_eq!(reconciler.tasks().len(), 10);
    reconciler.reconcile_counters(CounterScope::All).await;
    assert_eq!(counters(&memory, "p1"), (Some(12), Some(5)));
}

#[tokio::test]
async fn failed_recount_leaves_project_drifted() {
    let memory = MemoryStore::new();
    seed_ten(&memory);
    memory.put_project(project("p1", Some(0), Some(0)));
    let (store, reconciler, mut live) = board(&memory, ReconcileSettings::default()).await;

    store.fail_next(Operation::QueryTasks, 1);
    let report = reconciler.reconcile_counters(CounterScope::All).await;
    assert_eq!(report.failed, 1);
    assert_eq!(reconciler.drifted_projects(), vec![ProjectId::new("p1")]);

    store.fail_next(Operation::UpdateProject, 1);
    let report = reconciler.reconcile_counters(CounterScope::MissingOrDrifted).await;
    assert_eq!(report.failed, 1);
    assert_eq!(reconciler.drifted_projects(), vec![ProjectId::new("p1")]);

    reconciler.reconcile_counters(CounterScope::MissingOrDrifted).await;
    live.drain();
    assert_eq!(counters(&memory, "p1"), (Some(10), Some(4)));
    assert!(reconciler.drifted_projects().is_empty());
}

#[tokio::test]
async fn periodic_pass_repairs_corrupted_counters() {
    let memory = MemoryStore::new();
    seed_ten(&memory);
    memory.put_project(project("p1", Some(10), Some(4)));
    let settings = ReconcileSettings {
        counter_interval: Duration::from_millis(20),
        ..ReconcileSettings::default()
    };
    let (_store, reconciler, mut live) = board(&memory, settings).await;
    let reconciler = Arc::new(reconciler);
    let handle = reconciler.spawn_periodic_reconciliation();

    // Another client overwrites the counters with garbage.
    memory.put_project(project("p1", Some(99), Some(42)));
    live.drain();

    tokio::time::timeout(Duration::from_secs(2), async {
        while counters(&memory, "p1") != (Some(10), Some(4)) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("periodic reconciliation should converge");

    handle.abort();
}

// ===========================================================================
// Completion backfill
// ===========================================================================

#[tokio::test]
async fn backfill_runs_in_bounded_batches() {
    let memory = MemoryStore::new().with_clock(server_time);
    for i in 0..25 {
        memory.put_task(task(&format!("t{i:02}"), "complete", "p1", EMAIL));
    }
    let (_store, reconciler, mut live) = board(&memory, ReconcileSettings::default()).await;

    assert_eq!(reconciler.backfill_completions().await, 20);
    live.drain();
    assert_eq!(reconciler.backfill_completions().await, 5);
    live.drain();
    assert_eq!(reconciler.backfill_completions().await, 0);

    for t in memory.snapshot().tasks {
        assert_eq!(t.completed_at, Some(server_time()));
    }
}

#[tokio::test]
async fn backfill_failures_are_retried_next_pass() {
    let memory = MemoryStore::new().with_clock(server_time);
    for i in 0..25 {
        memory.put_task(task(&format!("t{i:02}"), "done", "p1", EMAIL));
    }
    memory.put_task(task("open", "to do", "p1", EMAIL));
    let (store, reconciler, mut live) = board(&memory, ReconcileSettings::default()).await;

    store.fail_next(Operation::UpdateTask, 3);
    assert_eq!(reconciler.backfill_completions().await, 17);
    live.drain();

    // The three failures sort first, so they lead the next batch.
    assert!(memory.task(&TaskId::new("t00")).unwrap().completed_at.is_none());
    assert_eq!(reconciler.backfill_completions().await, 8);
    live.drain();

    let snapshot = memory.snapshot();
    assert!(snapshot.tasks.iter().all(|t| !t.needs_completion_backfill()));
    assert!(memory.task(&TaskId::new("open")).unwrap().completed_at.is_none());
}
