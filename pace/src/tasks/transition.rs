//! Status transitions: optimistic local apply, task write, counter write.
//!
//! A transition runs in two phases with separate failure handling:
//!
//! 1. The task update. Its payload is applied to local state before the
//!    write is issued; if the write fails the local change is reverted and
//!    the transition fails.
//! 2. The project's `taskDone` adjustment, only when a project-scoped task
//!    crosses the `done` boundary. A failure here is not rolled back: the
//!    project is marked drifted and the next reconciliation recounts it.
//!
//! Transitions of the same task may overlap. A later one is planned on the
//! earlier one's optimistic state, so its counter delta is only right if
//! the earlier task write lands. Either way the project is marked drifted:
//! by the earlier transition when its write fails and its revert is
//! skipped, and by the later one once its counter write is issued.

use chrono::Utc;
use parking_lot::Mutex;

use pace_proto::project::{Counter, ProjectId, ProjectPatch};
use pace_proto::status::{NormalizedStatus, TaskStatus};
use pace_proto::task::{FieldWrite, Stamp, Task, TaskId, TaskPatch};

use super::reconciler::{BoardState, Reconciler};
use super::TransitionError;
use crate::store::DocumentStore;

/// What happened to the project counter after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterSync {
    /// The task is unscoped or did not cross the `done` boundary.
    NotRequired,
    /// `taskDone` was adjusted.
    Adjusted,
    /// The adjustment failed; the project is marked drifted.
    Drifted,
}

/// Result of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The task already had the target status. Nothing was written.
    Unchanged,
    /// The task update succeeded.
    Applied {
        /// Outcome of the counter phase.
        counter: CounterSync,
    },
}

/// The fields a transition touches, as they were before it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Prior {
    status: NormalizedStatus,
    completed_at: Option<chrono::DateTime<Utc>>,
    prev_status: Option<TaskStatus>,
}

/// A computed transition for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// The task being moved.
    pub task_id: TaskId,
    /// The status it moves to.
    pub target: TaskStatus,
    /// The task write.
    pub patch: TaskPatch,
    /// The `taskDone` adjustment, if the move crosses the `done` boundary
    /// of a project-scoped task.
    pub counter: Option<(ProjectId, i64)>,
    prior: Prior,
}

impl TransitionPlan {
    /// Plan moving `task` to `target`. Returns `None` if the task's
    /// canonical status already equals `target`.
    ///
    /// Entering `done` stamps `completedAt` with server time and remembers
    /// the current canonical status (or `to-do`) in `prevStatus`. Any other
    /// target clears both.
    #[must_use]
    pub fn new(task: &Task, target: TaskStatus) -> Option<Self> {
        let current = task.status.canonical();
        if current == Some(target) {
            return None;
        }

        let entering_done = target.is_done();
        let patch = if entering_done {
            TaskPatch {
                status: Some(target),
                completed_at: Some(FieldWrite::Set(Stamp::ServerTime)),
                prev_status: Some(FieldWrite::Set(current.unwrap_or(TaskStatus::ToDo))),
            }
        } else {
            TaskPatch {
                status: Some(target),
                completed_at: (task.is_done() || task.completed_at.is_some())
                    .then_some(FieldWrite::Clear),
                prev_status: (task.is_done() || task.prev_status.is_some())
                    .then_some(FieldWrite::Clear),
            }
        };

        let counter = (task.is_done() != entering_done)
            .then(|| task.project_id.clone())
            .flatten()
            .map(|project_id| (project_id, if entering_done { 1 } else { -1 }));

        Some(Self {
            task_id: task.id.clone(),
            target,
            patch,
            counter,
            prior: Prior {
                status: task.status.clone(),
                completed_at: task.completed_at,
                prev_status: task.prev_status,
            },
        })
    }

    /// Apply the write to a local copy, stamping with the local clock until
    /// the store's value arrives.
    pub fn apply_local(&self, task: &mut Task) {
        self.patch.apply(task, Utc::now());
    }

    /// Restore the three touched fields. Skipped, returning `false`, if the
    /// task no longer shows this transition's target because a newer
    /// remote state has already replaced the optimistic one.
    pub fn revert(&self, task: &mut Task) -> bool {
        if task.status != NormalizedStatus::Canonical(self.target) {
            return false;
        }
        task.status = self.prior.status.clone();
        task.completed_at = self.prior.completed_at;
        task.prev_status = self.prior.prev_status;
        true
    }

    /// The project write for the counter phase.
    #[must_use]
    pub fn counter_patch(&self) -> Option<(ProjectId, ProjectPatch)> {
        self.counter.as_ref().map(|(project_id, delta)| {
            (
                project_id.clone(),
                ProjectPatch::Adjust {
                    counter: Counter::Done,
                    delta: *delta,
                },
            )
        })
    }
}

/// Settles a task's in-flight transition count when the transition ends,
/// including when its future is dropped.
struct InFlight<'a> {
    state: &'a Mutex<BoardState>,
    task_id: &'a TaskId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().end_transition(self.task_id);
    }
}

/// The status a done-toggle moves `task` to: back to its remembered
/// status when done, otherwise to `done`.
#[must_use]
pub fn toggle_target(task: &Task) -> TaskStatus {
    if task.is_done() {
        task.prev_status
            .filter(|s| !s.is_done())
            .unwrap_or(TaskStatus::ToDo)
    } else {
        TaskStatus::Done
    }
}

impl<S: DocumentStore> Reconciler<S> {
    /// Move a task to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::TaskNotFound`] if the task is not visible,
    /// or [`TransitionError::TaskWrite`] if the task update failed and the
    /// local change was reverted.
    pub async fn set_status(
        &self,
        task_id: &TaskId,
        target: TaskStatus,
    ) -> Result<TransitionOutcome, TransitionError> {
        let (plan, stacked) = {
            let mut state = self.state.lock();
            let Some(task) = state.tasks.get(task_id) else {
                return Err(TransitionError::TaskNotFound(task_id.clone()));
            };
            let Some(plan) = TransitionPlan::new(task, target) else {
                tracing::debug!(task_id = %task_id, status = %target, "status unchanged");
                return Ok(TransitionOutcome::Unchanged);
            };
            state.tasks.update(task_id, |task| plan.apply_local(task));
            let stacked = state.begin_transition(task_id);
            (plan, stacked)
        };
        let _in_flight = InFlight {
            state: &self.state,
            task_id,
        };
        self.run(plan, stacked).await
    }

    /// Toggle a task in or out of `done`. Leaving `done` restores the
    /// status remembered in `prevStatus`, or `to-do`.
    ///
    /// # Errors
    ///
    /// Same as [`Reconciler::set_status`].
    pub async fn toggle_done(&self, task_id: &TaskId) -> Result<TransitionOutcome, TransitionError> {
        let target = {
            let state = self.state.lock();
            let Some(task) = state.tasks.get(task_id) else {
                return Err(TransitionError::TaskNotFound(task_id.clone()));
            };
            toggle_target(task)
        };
        self.set_status(task_id, target).await
    }

    async fn run(
        &self,
        plan: TransitionPlan,
        stacked: bool,
    ) -> Result<TransitionOutcome, TransitionError> {
        if let Err(source) = self.store.update_task(&plan.task_id, &plan.patch).await {
            let mut reverted = false;
            {
                let mut state = self.state.lock();
                state
                    .tasks
                    .update(&plan.task_id, |task| reverted = plan.revert(task));
                if let (false, Some((project_id, _))) = (reverted, &plan.counter) {
                    state.mark_drifted(project_id.clone());
                }
            }
            tracing::warn!(
                task_id = %plan.task_id,
                status = %plan.target,
                reverted,
                error = %source,
                "task update failed"
            );
            return Err(TransitionError::TaskWrite {
                task_id: plan.task_id,
                source,
            });
        }
        tracing::info!(task_id = %plan.task_id, status = %plan.target, "task status updated");

        let Some((project_id, patch)) = plan.counter_patch() else {
            return Ok(TransitionOutcome::Applied {
                counter: CounterSync::NotRequired,
            });
        };
        match self.store.update_project(&project_id, &patch).await {
            Ok(()) => {
                if stacked {
                    tracing::debug!(
                        task_id = %plan.task_id,
                        project_id = %project_id,
                        "counter adjusted over an unsettled transition"
                    );
                    self.state.lock().mark_drifted(project_id);
                }
                Ok(TransitionOutcome::Applied {
                    counter: CounterSync::Adjusted,
                })
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %plan.task_id,
                    project_id = %project_id,
                    error = %e,
                    "project counter adjustment failed"
                );
                self.state.lock().mark_drifted(project_id);
                Ok(TransitionOutcome::Applied {
                    counter: CounterSync::Drifted,
                })
            }
        }
    }
}
