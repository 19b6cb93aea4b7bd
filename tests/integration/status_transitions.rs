//! Integration tests for status transitions.
//!
//! Covers the optimistic local apply, the revert after a failed task
//! write, the drift left by a failed counter write, and a property test
//! that the completion fields stay consistent across arbitrary sequences
//! of transitions with injected failures.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::similar_names)]

use std::sync::Arc;

use pace::store::faulty::{FaultyStore, Operation};
use pace::store::memory::MemoryStore;
use pace::tasks::{
    CounterScope, CounterSync, LiveView, Reconciler, ReconcileSettings, TransitionError,
    TransitionOutcome,
};
use pace_proto::identity::Identity;
use pace_proto::project::{NewProject, Project, ProjectId};
use pace_proto::status::{TaskStatus, normalize_status};
use pace_proto::task::{Assignee, NewTask, Task, TaskId};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

const EMAIL: &str = "ana@example.com";

fn identity() -> Identity {
    Identity {
        uid: Some("u-ana".to_string()),
        email: Some(EMAIL.to_string()),
        display_name: Some("Ana".to_string()),
    }
}

fn project(id: &str) -> Project {
    NewProject {
        name: "Launch".to_string(),
        owner_email: EMAIL.to_string(),
        ..NewProject::default()
    }
    .into_project(ProjectId::new(id))
}

fn task(id: &str, status: &str, project: Option<&str>) -> Task {
    Task {
        status: normalize_status(Some(status)),
        project_id: project.map(ProjectId::new),
        ..NewTask {
            title: format!("task {id}"),
            assignee: Assignee::by_email(EMAIL),
            ..NewTask::default()
        }
        .into_task(TaskId::new(id))
    }
}

type Board = Reconciler<FaultyStore<MemoryStore>>;

/// Seeds a store, opens a live view and applies the initial snapshot.
async fn board(
    tasks: Vec<Task>,
    projects: Vec<Project>,
) -> (MemoryStore, Arc<FaultyStore<MemoryStore>>, Board, LiveView) {
    let memory = MemoryStore::new();
    for t in tasks {
        memory.put_task(t);
    }
    for p in projects {
        memory.put_project(p);
    }
    let store = Arc::new(FaultyStore::new(memory.clone()));
    let reconciler = Reconciler::new(Arc::clone(&store), identity(), ReconcileSettings::default());
    let mut live = reconciler.watch().await.unwrap();
    live.drain();
    (memory, store, reconciler, live)
}

// ===========================================================================
// Transitions
// ===========================================================================

#[tokio::test]
async fn completing_a_task_is_visible_before_and_after_confirmation() {
    let (memory, _store, reconciler, mut live) = board(vec![task("t1", "In Progress", None)], vec![]).await;
    let id = TaskId::new("t1");

    let outcome = reconciler.set_status(&id, TaskStatus::Done).await.unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Applied {
            counter: CounterSync::NotRequired
        }
    );

    // Optimistic state, before the echo is merged.
    let local = reconciler.task(&id).unwrap();
    assert!(local.is_done());
    assert_eq!(local.prev_status, Some(TaskStatus::InProgress));
    assert!(local.completion_fields_consistent());

    live.drain();
    let confirmed = memory.task(&id).unwrap();
    assert_eq!(reconciler.task(&id).unwrap(), confirmed);
    assert!(confirmed.completed_at.is_some());
}

#[tokio::test]
async fn toggle_round_trip_restores_prev_status() {
    let (memory, _store, reconciler, mut live) = board(vec![task("t1", "inprogress", Some("p1"))], vec![project("p1")]).await;
    let id = TaskId::new("t1");

    reconciler.toggle_done(&id).await.unwrap();
    live.drain();
    assert!(reconciler.task(&id).unwrap().is_done());
    assert_eq!(memory.project(&ProjectId::new("p1")).unwrap().task_done, Some(1));

    reconciler.toggle_done(&id).await.unwrap();
    live.drain();
    let back = reconciler.task(&id).unwrap();
    assert_eq!(back.status.canonical(), Some(TaskStatus::InProgress));
    assert!(back.completed_at.is_none());
    assert!(back.prev_status.is_none());
    assert_eq!(memory.project(&ProjectId::new("p1")).unwrap().task_done, Some(0));
}

#[tokio::test]
async fn toggle_without_prev_status_defaults_to_to_do() {
    let (_memory, _store, reconciler, mut live) = board(vec![task("t1", "Complete", None)], vec![]).await;
    let id = TaskId::new("t1");

    reconciler.toggle_done(&id).await.unwrap();
    live.drain();
    assert_eq!(reconciler.task(&id).unwrap().status.canonical(), Some(TaskStatus::ToDo));
}

#[tokio::test]
async fn same_status_is_a_no_op() {
    let (memory, _store, reconciler, _live) = board(vec![task("t1", "DONE", Some("p1"))], vec![project("p1")]).await;
    let before = memory.snapshot();

    let outcome = reconciler.set_status(&TaskId::new("t1"), TaskStatus::Done).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Unchanged);
    assert_eq!(memory.snapshot(), before);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let (_memory, _store, reconciler, _live) = board(vec![], vec![]).await;
    let err = reconciler.toggle_done(&TaskId::new("ghost")).await.unwrap_err();
    assert_eq!(err, TransitionError::TaskNotFound(TaskId::new("ghost")));
}

// ===========================================================================
// Failure handling
// ===========================================================================

#[tokio::test]
async fn failed_task_write_reverts_and_skips_counter() {
    let (memory, store, reconciler, mut live) = board(vec![task("t1", "to do", Some("p1"))], vec![project("p1")]).await;
    let id = TaskId::new("t1");
    let before = reconciler.task(&id).unwrap();

    store.fail_next(Operation::UpdateTask, 1);
    let err = reconciler.set_status(&id, TaskStatus::Done).await.unwrap_err();
    assert!(matches!(err, TransitionError::TaskWrite { .. }));

    live.drain();
    assert_eq!(reconciler.task(&id).unwrap(), before);
    assert_eq!(memory.task(&id).unwrap(), before);
    assert_eq!(memory.project(&ProjectId::new("p1")).unwrap().task_done, Some(0));
    assert!(reconciler.drifted_projects().is_empty());
}

#[tokio::test]
async fn failed_counter_write_keeps_task_and_marks_drift() {
    let (memory, store, reconciler, mut live) = board(vec![task("t1", "to do", Some("p1"))], vec![project("p1")]).await;
    let id = TaskId::new("t1");
    let p1 = ProjectId::new("p1");

    store.fail_next(Operation::UpdateProject, 1);
    let outcome = reconciler.set_status(&id, TaskStatus::Done).await.unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Applied {
            counter: CounterSync::Drifted
        }
    );

    live.drain();
    assert!(reconciler.task(&id).unwrap().is_done());
    assert!(memory.task(&id).unwrap().is_done());
    assert_eq!(memory.project(&p1).unwrap().task_done, Some(0));
    assert_eq!(reconciler.drifted_projects(), vec![p1.clone()]);

    live.drain();
    let report = reconciler.reconcile_counters(CounterScope::MissingOrDrifted).await;
    assert_eq!(report.corrected, 1);
    assert_eq!(memory.project(&p1).unwrap().task_done, Some(1));
    assert!(reconciler.drifted_projects().is_empty());
}

#[tokio::test]
async fn revert_restores_latest_merged_state() {
    let (memory, store, reconciler, mut live) = board(vec![task("t1", "to do", None)], vec![]).await;
    let id = TaskId::new("t1");

    // Another client moves the task before our write is attempted.
    store.fail_next(Operation::UpdateTask, 1);
    let mut remote = memory.task(&id).unwrap();
    remote.status = normalize_status(Some("in progress"));
    memory.put_task(remote.clone());
    live.drain();

    reconciler.set_status(&id, TaskStatus::Done).await.unwrap_err();
    live.drain();
    assert_eq!(reconciler.task(&id).unwrap(), remote);
}

// ===========================================================================
// Overlapping transitions
// ===========================================================================

/// Project `p1` counted correctly: `t1` to-do, `t2` done.
async fn overlapping_board() -> (MemoryStore, Arc<FaultyStore<MemoryStore>>, Board, LiveView) {
    let (memory, store, reconciler, live) = board(
        vec![task("t1", "to do", Some("p1")), task("t2", "done", Some("p1"))],
        vec![Project {
            task_total: Some(2),
            task_done: Some(1),
            ..project("p1")
        }],
    )
    .await;
    store.yield_before_calls(true);
    (memory, store, reconciler, live)
}

#[tokio::test]
async fn failed_write_under_a_later_transition_marks_drift() {
    let (memory, store, reconciler, mut live) = overlapping_board().await;
    let id = TaskId::new("t1");
    let p1 = ProjectId::new("p1");

    // The toggle is planned on the unconfirmed `done`, then the first
    // write fails and the toggle's decrement lands.
    store.fail_next(Operation::UpdateTask, 1);
    let (first, second) = futures_util::future::join(
        reconciler.set_status(&id, TaskStatus::Done),
        reconciler.toggle_done(&id),
    )
    .await;
    assert!(matches!(first, Err(TransitionError::TaskWrite { .. })));
    assert_eq!(
        second,
        Ok(TransitionOutcome::Applied {
            counter: CounterSync::Adjusted
        })
    );
    assert_eq!(memory.task(&id).unwrap().status.canonical(), Some(TaskStatus::ToDo));
    assert_eq!(memory.project(&p1).unwrap().task_done, Some(0));
    assert_eq!(reconciler.drifted_projects(), vec![p1.clone()]);

    live.drain();
    reconciler.reconcile_counters(CounterScope::MissingOrDrifted).await;
    let repaired = memory.project(&p1).unwrap();
    assert_eq!((repaired.task_total, repaired.task_done), (Some(2), Some(1)));
    assert!(reconciler.drifted_projects().is_empty());
}

#[tokio::test]
async fn overlapping_successful_transitions_are_rechecked() {
    let (memory, _store, reconciler, mut live) = overlapping_board().await;
    let id = TaskId::new("t1");
    let p1 = ProjectId::new("p1");

    let (first, second) = futures_util::future::join(
        reconciler.set_status(&id, TaskStatus::Done),
        reconciler.toggle_done(&id),
    )
    .await;
    assert!(first.is_ok() && second.is_ok());
    assert_eq!(memory.project(&p1).unwrap().task_done, Some(1));
    assert_eq!(reconciler.drifted_projects(), vec![p1.clone()]);

    live.drain();
    let report = reconciler.reconcile_counters(CounterScope::MissingOrDrifted).await;
    assert_eq!((report.examined, report.corrected), (1, 0));
    assert!(reconciler.drifted_projects().is_empty());
}

// ===========================================================================
// Property: completion fields stay consistent
// ===========================================================================

#[derive(Debug, Clone)]
enum Step {
    Set(usize, TaskStatus),
    Toggle(usize),
}

fn arb_step() -> impl Strategy<Value = (Step, bool, bool)> {
    let target = prop::sample::select(TaskStatus::ALL.to_vec());
    (
        prop_oneof![
            (0..4usize, target).prop_map(|(i, s)| Step::Set(i, s)),
            (0..4usize).prop_map(Step::Toggle),
        ],
        any::<bool>(),
        any::<bool>(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn completion_fields_track_done(steps in prop::collection::vec(arb_step(), 1..20)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let tasks = vec![
                task("t0", "to do", Some("p1")),
                task("t1", "in progress", Some("p1")),
                task("t2", "to do", None),
                task("t3", "in progress", Some("p1")),
            ];
            let (memory, store, reconciler, mut live) = board(tasks, vec![project("p1")]).await;

            for (step, fail_task, fail_counter) in steps {
                if fail_task {
                    store.fail_next(Operation::UpdateTask, 1);
                }
                if fail_counter {
                    store.fail_next(Operation::UpdateProject, 1);
                }
                let _ = match step {
                    Step::Set(i, target) => reconciler.set_status(&TaskId::new(format!("t{i}")), target).await,
                    Step::Toggle(i) => reconciler.toggle_done(&TaskId::new(format!("t{i}"))).await,
                };
                store.heal();
                live.drain();

                for t in reconciler.tasks() {
                    prop_assert!(t.completion_fields_consistent(), "local {t:?}");
                    let remote = memory.task(&t.id);
                    prop_assert_eq!(Some(&t), remote.as_ref());
                }
            }

            reconciler.reconcile_counters(CounterScope::MissingOrDrifted).await;
            let done = memory
                .snapshot()
                .tasks
                .iter()
                .filter(|t| t.project_id.is_some() && t.is_done())
                .count();
            prop_assert_eq!(
                memory.project(&ProjectId::new("p1")).unwrap().task_done,
                Some(u64::try_from(done).unwrap())
            );
            Ok(())
        })?;
    }
}
