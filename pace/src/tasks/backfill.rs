//! Repair passes for invariants that independent writes can break.
//!
//! - Completion backfill stamps `completedAt` on done tasks that lack it,
//!   a bounded batch per pass.
//! - Counter reconciliation recounts a project's tasks from the store and
//!   overwrites `taskTotal` / `taskDone`.
//!
//! Both passes log and swallow store failures. Whatever they miss is
//! picked up by the next pass.

use futures_util::future::join_all;

use pace_proto::project::{ProjectId, ProjectPatch};
use pace_proto::task::{Task, TaskId, TaskPatch};

use super::reconciler::Reconciler;
use crate::store::{DocumentStore, TaskQuery};

/// Which projects a counter pass recounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterScope {
    /// Projects never counted, plus those marked drifted.
    MissingOrDrifted,
    /// Every visible project, plus those marked drifted.
    All,
}

/// Summary of one counter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Projects recounted.
    pub examined: usize,
    /// Projects whose stored counters were rewritten.
    pub corrected: usize,
    /// Projects whose recount or rewrite failed.
    pub failed: usize,
}

/// Done tasks lacking `completedAt`, ordered by id, at most `limit`.
pub fn completion_backfill_candidates<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    limit: usize,
) -> Vec<TaskId> {
    let mut ids: Vec<TaskId> = tasks
        .into_iter()
        .filter(|t| t.needs_completion_backfill())
        .map(|t| t.id.clone())
        .collect();
    ids.sort();
    ids.truncate(limit);
    ids
}

/// Count `(total, done)` among the tasks that reference `project_id`.
pub fn count_project_tasks<'a>(
    project_id: &ProjectId,
    tasks: impl IntoIterator<Item = &'a Task>,
) -> (u64, u64) {
    tasks
        .into_iter()
        .filter(|t| t.project_id.as_ref() == Some(project_id))
        .fold((0, 0), |(total, done), t| (total + 1, done + u64::from(t.is_done())))
}

impl<S: DocumentStore> Reconciler<S> {
    /// Stamp server-time completions on up to `backfill_batch_size` done
    /// tasks lacking `completedAt`. Returns how many writes succeeded.
    pub async fn backfill_completions(&self) -> usize {
        let candidates = {
            let state = self.state.lock();
            completion_backfill_candidates(state.tasks.iter(), self.settings.backfill_batch_size)
        };
        if candidates.is_empty() {
            return 0;
        }

        let patch = TaskPatch::completion_stamp();
        let patch = &patch;
        let results = join_all(candidates.iter().map(|id| async move {
            (id, self.store.update_task(id, patch).await)
        }))
        .await;

        let mut stamped = 0;
        for (id, result) in results {
            match result {
                Ok(()) => stamped += 1,
                Err(e) => tracing::warn!(task_id = %id, error = %e, "completion backfill failed"),
            }
        }
        tracing::info!(stamped, attempted = candidates.len(), "completion backfill pass");
        stamped
    }

    /// Recount project counters from the store.
    ///
    /// Counters already equal to the recount are left alone. A project
    /// whose recount or rewrite fails stays (or becomes) drifted.
    pub async fn reconcile_counters(&self, scope: CounterScope) -> ReconcileReport {
        let targets: Vec<(ProjectId, Option<u64>, Option<u64>)> = {
            let state = self.state.lock();
            let mut targets: Vec<_> = state
                .projects
                .iter()
                .filter(|p| match scope {
                    CounterScope::All => true,
                    CounterScope::MissingOrDrifted => {
                        !p.has_counters() || state.is_drifted(&p.id)
                    }
                })
                .map(|p| (p.id.clone(), p.task_total, p.task_done))
                .collect();
            for id in state.drifted() {
                if state.projects.get(id).is_none() {
                    targets.push((id.clone(), None, None));
                }
            }
            targets.sort_by(|a, b| a.0.cmp(&b.0));
            targets
        };

        let mut report = ReconcileReport::default();
        for (project_id, stored_total, stored_done) in targets {
            report.examined += 1;
            let tasks = match self
                .store
                .query_tasks(&TaskQuery::Project(project_id.clone()))
                .await
            {
                Ok(tasks) => tasks,
                Err(e) => {
                    tracing::warn!(project_id = %project_id, error = %e, "project recount failed");
                    report.failed += 1;
                    self.state.lock().mark_drifted(project_id);
                    continue;
                }
            };

            let (total, done) = count_project_tasks(&project_id, &tasks);
            if stored_total == Some(total) && stored_done == Some(done) {
                self.state.lock().clear_drifted(&project_id);
                continue;
            }

            let patch = ProjectPatch::SetCounters { total, done };
            match self.store.update_project(&project_id, &patch).await {
                Ok(()) => {
                    tracing::info!(
                        project_id = %project_id,
                        total,
                        done,
                        ?stored_total,
                        ?stored_done,
                        "project counters corrected"
                    );
                    report.corrected += 1;
                    self.state.lock().clear_drifted(&project_id);
                }
                Err(e) => {
                    tracing::warn!(project_id = %project_id, error = %e, "project counter write failed");
                    report.failed += 1;
                    self.state.lock().mark_drifted(project_id);
                }
            }
        }
        report
    }
}
