//! The board's local state and the operations that keep it in step with
//! the store.
//!
//! [`Reconciler`] owns the merged task and project collections. They are
//! mutated by [`LiveView`] as change batches arrive and by the optimistic
//! step of status transitions. The state mutex is only held for short
//! synchronous sections and never across an await point, so any write may
//! find the collections changed by a batch that landed while it waited.
//!
//! Other operations live next to their policies:
//! - status transitions in [`super::transition`]
//! - completion and counter backfill in [`super::backfill`]
//! - project creation and joining in [`crate::projects`]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use parking_lot::Mutex;

use pace_proto::identity::Identity;
use pace_proto::project::{Counter, Project, ProjectId, ProjectPatch};
use pace_proto::task::{MAX_TASK_TITLE_LENGTH, NewTask, Task, TaskId};

use super::backfill::{CounterScope, ReconcileReport};
use super::live::LiveView;
use super::merge::{MergedCollection, SourceId};
use super::view::{self, Dashboard, TaskCounts, TaskView};
use super::TaskError;
use crate::store::{DocumentStore, StoreError};

/// Tunables for reconciliation and derived views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Maximum completion timestamps written per backfill pass.
    pub backfill_batch_size: usize,
    /// Length of the due-this-week window in days.
    pub due_window_days: u32,
    /// Window for the completed-this-week figure in days.
    pub weekly_window_days: u32,
    /// Period of the background counter reconciliation.
    pub counter_interval: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            backfill_batch_size: 20,
            due_window_days: 7,
            weekly_window_days: 7,
            counter_interval: Duration::from_secs(300),
        }
    }
}

/// Local view of the board.
#[derive(Debug, Default)]
pub struct BoardState {
    /// Tasks visible to the user, merged across queries.
    pub tasks: MergedCollection<Task>,
    /// Projects visible to the user, merged across queries.
    pub projects: MergedCollection<Project>,
    /// Projects whose counters missed an adjustment.
    drifted: BTreeSet<ProjectId>,
    /// Transitions issued per task whose writes have not settled.
    in_flight: HashMap<TaskId, usize>,
    next_source: u32,
}

impl BoardState {
    /// Returns `true` if the project's counters are known to be stale.
    #[must_use]
    pub fn is_drifted(&self, id: &ProjectId) -> bool {
        self.drifted.contains(id)
    }

    /// Projects whose counters are known to be stale.
    #[must_use]
    pub const fn drifted(&self) -> &BTreeSet<ProjectId> {
        &self.drifted
    }

    pub(crate) fn mark_drifted(&mut self, id: ProjectId) {
        self.drifted.insert(id);
    }

    pub(crate) fn clear_drifted(&mut self, id: &ProjectId) {
        self.drifted.remove(id);
    }

    /// Records a transition of `id` as issued. Returns `true` if an earlier
    /// one is still unsettled, so the new one was planned on optimistic
    /// state the store has not confirmed.
    pub(crate) fn begin_transition(&mut self, id: &TaskId) -> bool {
        let count = self.in_flight.entry(id.clone()).or_default();
        *count += 1;
        *count > 1
    }

    pub(crate) fn end_transition(&mut self, id: &TaskId) {
        if let Some(count) = self.in_flight.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(id);
            }
        }
    }

    pub(crate) fn allocate_source(&mut self) -> SourceId {
        self.next_source += 1;
        SourceId(self.next_source)
    }
}

/// Reconciles the board's local state against a [`DocumentStore`].
pub struct Reconciler<S: DocumentStore> {
    pub(crate) store: Arc<S>,
    pub(crate) identity: Identity,
    pub(crate) settings: ReconcileSettings,
    pub(crate) state: Arc<Mutex<BoardState>>,
}

impl<S: DocumentStore> Reconciler<S> {
    /// Create a reconciler with empty local state.
    pub fn new(store: Arc<S>, identity: Identity, settings: ReconcileSettings) -> Self {
        Self {
            store,
            identity,
            settings,
            state: Arc::new(Mutex::new(BoardState::default())),
        }
    }

    /// The underlying store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The signed-in user.
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The active settings.
    pub const fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Open the board's live queries and start merging them into the local
    /// state. Nothing is applied until the view is drained.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any subscription cannot be opened; those
    /// already opened are released.
    pub async fn watch(&self) -> Result<LiveView, StoreError> {
        LiveView::open(self.store.as_ref(), &self.identity, Arc::clone(&self.state)).await
    }

    /// All visible tasks, ordered by id.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.to_sorted_vec()
    }

    /// One visible task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.get(id).cloned()
    }

    /// All visible projects, ordered by id.
    #[must_use]
    pub fn projects(&self) -> Vec<Project> {
        self.state.lock().projects.to_sorted_vec()
    }

    /// One visible project.
    #[must_use]
    pub fn project(&self, id: &ProjectId) -> Option<Project> {
        self.state.lock().projects.get(id).cloned()
    }

    /// Projects whose counters are known to be stale.
    #[must_use]
    pub fn drifted_projects(&self) -> Vec<ProjectId> {
        self.state.lock().drifted().iter().cloned().collect()
    }

    /// Headline counts over the visible tasks.
    pub fn counts<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TaskCounts {
        view::task_counts(self.state.lock().tasks.iter(), now)
    }

    /// The tasks shown by `selected`, in display order.
    pub fn view<Tz: TimeZone>(&self, selected: TaskView, now: &DateTime<Tz>) -> Vec<Task> {
        let state = self.state.lock();
        view::filter_tasks(state.tasks.iter(), selected, now, self.settings.due_window_days)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Everything the summary screen shows.
    pub fn dashboard<Tz: TimeZone>(&self, selected: TaskView, now: &DateTime<Tz>) -> Dashboard {
        let state = self.state.lock();
        let mut projects: Vec<_> = state
            .projects
            .iter()
            .map(|p| (p.clone(), view::project_progress(p, state.tasks.iter())))
            .collect();
        projects.sort_by(|a, b| a.0.name.cmp(&b.0.name).then_with(|| a.0.id.cmp(&b.0.id)));
        Dashboard {
            view: selected,
            counts: view::task_counts(state.tasks.iter(), now),
            completed_this_week: view::completed_within(
                state.tasks.iter(),
                now,
                self.settings.weekly_window_days,
            ),
            weekly: view::weekly_progress(state.tasks.iter(), now),
            projects,
            tasks: view::filter_tasks(state.tasks.iter(), selected, now, self.settings.due_window_days)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    /// Validate and insert a new task, then bump its project's `taskTotal`.
    ///
    /// The task appears locally once the live view delivers it. A failed
    /// counter bump is logged and leaves the project drifted.
    ///
    /// # Errors
    ///
    /// Returns a validation [`TaskError`] before any remote call, or
    /// [`TaskError::Store`] if the insert fails.
    pub async fn create_task(&self, mut draft: NewTask) -> Result<TaskId, TaskError> {
        draft.title = draft.title.trim().to_string();
        validate_new_task(&draft)?;

        let project_id = draft.project_id.clone();
        let id = self.store.create_task(draft).await?;
        tracing::info!(task_id = %id, "task created");

        if let Some(project_id) = project_id {
            let patch = ProjectPatch::Adjust {
                counter: Counter::Total,
                delta: 1,
            };
            if let Err(e) = self.store.update_project(&project_id, &patch).await {
                tracing::warn!(
                    task_id = %id,
                    project_id = %project_id,
                    error = %e,
                    "failed to increment project task total"
                );
                self.state.lock().mark_drifted(project_id);
            }
        }
        Ok(id)
    }

    /// The on-load pass: stamp completions and count uncounted or drifted
    /// projects.
    pub async fn reconcile_on_load(&self) -> (usize, ReconcileReport) {
        let stamped = self.backfill_completions().await;
        let report = self.reconcile_counters(CounterScope::MissingOrDrifted).await;
        (stamped, report)
    }

    /// Spawn a background task that recounts every visible project each
    /// `settings.counter_interval`.
    ///
    /// The first pass runs one interval after spawning. The task stops when
    /// the returned [`tokio::task::JoinHandle`] is aborted or the runtime
    /// shuts down.
    pub fn spawn_periodic_reconciliation(self: &Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        S: 'static,
    {
        let reconciler = Arc::clone(self);
        let period = self.settings.counter_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await;
            loop {
                tick.tick().await;
                let report = reconciler.reconcile_counters(CounterScope::All).await;
                tracing::debug!(
                    examined = report.examined,
                    corrected = report.corrected,
                    failed = report.failed,
                    "periodic counter reconciliation"
                );
            }
        })
    }
}

/// Check a draft against the creation rules.
///
/// # Errors
///
/// Returns the first rule the draft breaks.
pub fn validate_new_task(draft: &NewTask) -> Result<(), TaskError> {
    if draft.title.trim().is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    if draft.title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(TaskError::TitleTooLong);
    }
    if draft.assignee.is_empty() {
        return Err(TaskError::MissingAssignee);
    }
    if draft.due_date.is_none() {
        return Err(TaskError::MissingDueDate);
    }
    Ok(())
}
