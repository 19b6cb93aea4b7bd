//! Failure-injecting store wrapper for tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use pace_proto::project::{NewProject, Project, ProjectId, ProjectPatch};
use pace_proto::task::{NewTask, Task, TaskId, TaskPatch};

use super::{DocumentStore, ProjectQuery, StoreError, Subscription, TaskQuery};

/// The store operations a [`FaultyStore`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`DocumentStore::create_task`].
    CreateTask,
    /// [`DocumentStore::update_task`].
    UpdateTask,
    /// [`DocumentStore::query_tasks`].
    QueryTasks,
    /// [`DocumentStore::create_project`].
    CreateProject,
    /// [`DocumentStore::update_project`].
    UpdateProject,
    /// [`DocumentStore::get_project`].
    GetProject,
    /// Both subscribe methods.
    Subscribe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateTask => "create_task",
            Self::UpdateTask => "update_task",
            Self::QueryTasks => "query_tasks",
            Self::CreateProject => "create_project",
            Self::UpdateProject => "update_project",
            Self::GetProject => "get_project",
            Self::Subscribe => "subscribe",
        };
        f.write_str(name)
    }
}

impl Operation {
    /// The error a failed call of this operation reports.
    fn failure(self) -> StoreError {
        let reason = format!("injected failure: {self}");
        match self {
            Self::CreateTask | Self::UpdateTask | Self::CreateProject | Self::UpdateProject => {
                StoreError::WriteFailed(reason)
            }
            Self::QueryTasks | Self::GetProject => StoreError::ReadFailed(reason),
            Self::Subscribe => StoreError::Unavailable(reason),
        }
    }
}

#[derive(Debug, Default)]
struct Schedule {
    skip: u32,
    fail: u32,
}

/// Wraps a store and fails the next N calls of chosen operations. Writes
/// fail with [`StoreError::WriteFailed`], reads with
/// [`StoreError::ReadFailed`] and subscriptions with
/// [`StoreError::Unavailable`]. Failed calls never reach the inner store.
pub struct FaultyStore<S> {
    inner: S,
    pending: Mutex<HashMap<Operation, Schedule>>,
    yielding: AtomicBool,
}

impl<S: DocumentStore> FaultyStore<S> {
    /// Wrap `inner` with no failures scheduled.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: Mutex::new(HashMap::new()),
            yielding: AtomicBool::new(false),
        }
    }

    /// Fail the next `count` calls of `op`, on top of any already scheduled.
    pub fn fail_next(&self, op: Operation, count: u32) {
        self.pending.lock().entry(op).or_default().fail += count;
    }

    /// Let `successes` calls of `op` through, then fail the `count` after.
    pub fn fail_after(&self, op: Operation, successes: u32, count: u32) {
        let mut pending = self.pending.lock();
        let schedule = pending.entry(op).or_default();
        schedule.skip = successes;
        schedule.fail += count;
    }

    /// Make every call yield to the runtime once before it is checked and
    /// forwarded, so concurrent callers interleave at the store boundary.
    pub fn yield_before_calls(&self, on: bool) {
        self.yielding.store(on, Ordering::Relaxed);
    }

    /// Cancel every scheduled failure.
    pub fn heal(&self) {
        self.pending.lock().clear();
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, op: Operation) -> Result<(), StoreError> {
        let mut pending = self.pending.lock();
        let Some(schedule) = pending.get_mut(&op) else {
            return Ok(());
        };
        if schedule.skip > 0 {
            schedule.skip -= 1;
            return Ok(());
        }
        if schedule.fail == 0 {
            return Ok(());
        }
        schedule.fail -= 1;
        Err(op.failure())
    }

    async fn gate(&self, op: Operation) -> Result<(), StoreError> {
        if self.yielding.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }
        self.check(op)
    }
}

impl<S: DocumentStore> DocumentStore for FaultyStore<S> {
    async fn create_task(&self, task: NewTask) -> Result<TaskId, StoreError> {
        self.gate(Operation::CreateTask).await?;
        self.inner.create_task(task).await
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        self.gate(Operation::UpdateTask).await?;
        self.inner.update_task(id, patch).await
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        self.gate(Operation::QueryTasks).await?;
        self.inner.query_tasks(query).await
    }

    async fn subscribe_tasks(&self, query: TaskQuery) -> Result<Subscription<Task>, StoreError> {
        self.gate(Operation::Subscribe).await?;
        self.inner.subscribe_tasks(query).await
    }

    async fn create_project(&self, project: NewProject) -> Result<ProjectId, StoreError> {
        self.gate(Operation::CreateProject).await?;
        self.inner.create_project(project).await
    }

    async fn update_project(&self, id: &ProjectId, patch: &ProjectPatch) -> Result<(), StoreError> {
        self.gate(Operation::UpdateProject).await?;
        self.inner.update_project(id, patch).await
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        self.gate(Operation::GetProject).await?;
        self.inner.get_project(id).await
    }

    async fn subscribe_projects(
        &self,
        query: ProjectQuery,
    ) -> Result<Subscription<Project>, StoreError> {
        self.gate(Operation::Subscribe).await?;
        self.inner.subscribe_projects(query).await
    }
}
