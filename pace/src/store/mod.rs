//! Document store abstraction.
//!
//! Defines the [`DocumentStore`] trait over the `tasks` and `projects`
//! collections of the managed backend. Implementations include:
//! - [`memory::MemoryStore`]: in-process store with live queries, used by
//!   the CLI (backed by a JSON snapshot) and by tests
//! - [`faulty::FaultyStore`]: wrapper that fails chosen operations, for
//!   exercising rollback and drift paths
//!
//! Writes to different documents are independent: the store offers no
//! atomicity between a task update and the project counter that tracks it.

pub mod faulty;
pub mod memory;
pub mod snapshot;

use std::future::Future;

use tokio::sync::mpsc;

use pace_proto::document::{ChangeSet, Document};
use pace_proto::identity::Identity;
use pace_proto::project::{NewProject, Project, ProjectId, ProjectPatch};
use pace_proto::task::{NewTask, Task, TaskId, TaskPatch};

/// Errors reported by a document store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached (network, quota, auth).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read or query failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The addressed document does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// A filter that decides which documents a live query holds.
pub trait Query<T>: Clone + Send + Sync + 'static {
    /// Returns `true` if `doc` belongs to the query's result set.
    fn matches(&self, doc: &T) -> bool;
}

/// Task queries used by the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskQuery {
    /// `assigneeId == uid`.
    AssigneeId(String),
    /// `assigneeEmail == email`.
    AssigneeEmail(String),
    /// Legacy `assignee == email`.
    LegacyAssignee(String),
    /// `projectId == id`.
    Project(ProjectId),
}

impl TaskQuery {
    /// The overlapping queries that together find every task assigned to
    /// `identity`. Queries for unknown identity fields are omitted.
    #[must_use]
    pub fn assigned_to(identity: &Identity) -> Vec<Self> {
        let mut queries = Vec::new();
        if let Some(uid) = identity.uid.as_deref().filter(|s| !s.is_empty()) {
            queries.push(Self::AssigneeId(uid.to_string()));
        }
        if let Some(email) = identity.email.as_deref().filter(|s| !s.is_empty()) {
            queries.push(Self::AssigneeEmail(email.to_string()));
            queries.push(Self::LegacyAssignee(email.to_string()));
        }
        queries
    }
}

impl std::fmt::Display for TaskQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssigneeId(v) => write!(f, "tasks where assigneeId == {v}"),
            Self::AssigneeEmail(v) => write!(f, "tasks where assigneeEmail == {v}"),
            Self::LegacyAssignee(v) => write!(f, "tasks where assignee == {v}"),
            Self::Project(v) => write!(f, "tasks where projectId == {v}"),
        }
    }
}

impl Query<Task> for TaskQuery {
    fn matches(&self, task: &Task) -> bool {
        match self {
            Self::AssigneeId(uid) => task.assignee.id.as_deref() == Some(uid),
            Self::AssigneeEmail(email) => task.assignee.email.as_deref() == Some(email),
            Self::LegacyAssignee(email) => task.assignee.legacy.as_deref() == Some(email),
            Self::Project(id) => task.project_id.as_ref() == Some(id),
        }
    }
}

/// Project queries used by the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectQuery {
    /// `ownerEmail == email`.
    OwnedBy(String),
    /// `members array-contains email`.
    SharedWith(String),
}

impl ProjectQuery {
    /// The queries that find every project visible to `identity`.
    #[must_use]
    pub fn visible_to(identity: &Identity) -> Vec<Self> {
        identity
            .email
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|email| {
                vec![
                    Self::OwnedBy(email.to_string()),
                    Self::SharedWith(email.to_string()),
                ]
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Display for ProjectQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnedBy(v) => write!(f, "projects where ownerEmail == {v}"),
            Self::SharedWith(v) => write!(f, "projects where members contains {v}"),
        }
    }
}

impl Query<Project> for ProjectQuery {
    fn matches(&self, project: &Project) -> bool {
        match self {
            Self::OwnedBy(email) => project.owner_email == *email,
            Self::SharedWith(email) => project.members.iter().any(|m| m == email),
        }
    }
}

/// Unregisters a listener when dropped.
pub struct ListenerGuard(Option<Box<dyn FnOnce() + Send>>);

impl ListenerGuard {
    /// Runs `release` exactly once, when the guard is dropped.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(release)))
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// A live query: a stream of change batches plus the registration that
/// produces them.
///
/// The first batch is the query's full result set as `Added` changes.
/// Dropping the subscription unregisters the listener from the store.
pub struct Subscription<T: Document> {
    rx: mpsc::UnboundedReceiver<ChangeSet<T>>,
    _guard: ListenerGuard,
}

impl<T: Document> Subscription<T> {
    /// Wraps a change receiver and the guard that releases its listener.
    #[must_use]
    pub const fn new(rx: mpsc::UnboundedReceiver<ChangeSet<T>>, guard: ListenerGuard) -> Self {
        Self { rx, _guard: guard }
    }

    /// Waits for the next batch. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<ChangeSet<T>> {
        self.rx.recv().await
    }

    /// Returns the next queued batch without waiting.
    pub fn try_next(&mut self) -> Option<ChangeSet<T>> {
        self.rx.try_recv().ok()
    }
}

/// Async access to the `tasks` and `projects` collections.
///
/// Every method may suspend on network I/O. Writes are not cancellable:
/// once issued they complete or fail independently of the caller.
pub trait DocumentStore: Send + Sync {
    /// Inserts a task and returns its store-assigned id.
    fn create_task(
        &self,
        task: NewTask,
    ) -> impl Future<Output = Result<TaskId, StoreError>> + Send;

    /// Applies a partial update to a task.
    fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// One-shot read of every task matching `query`.
    fn query_tasks(
        &self,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// Opens a live query over tasks.
    fn subscribe_tasks(
        &self,
        query: TaskQuery,
    ) -> impl Future<Output = Result<Subscription<Task>, StoreError>> + Send;

    /// Inserts a project and returns its store-assigned id.
    fn create_project(
        &self,
        project: NewProject,
    ) -> impl Future<Output = Result<ProjectId, StoreError>> + Send;

    /// Applies an update to a project.
    fn update_project(
        &self,
        id: &ProjectId,
        patch: &ProjectPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads one project, or `None` if it does not exist.
    fn get_project(
        &self,
        id: &ProjectId,
    ) -> impl Future<Output = Result<Option<Project>, StoreError>> + Send;

    /// Opens a live query over projects.
    fn subscribe_projects(
        &self,
        query: ProjectQuery,
    ) -> impl Future<Output = Result<Subscription<Project>, StoreError>> + Send;
}
