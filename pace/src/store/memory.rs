//! In-process document store with live queries.
//!
//! Holds both collections in a [`parking_lot::Mutex`] and pushes a change
//! batch to every registered listener after each write, computing
//! `Added` / `Modified` / `Removed` from whether the document matched the
//! listener's query before and after the write. The lock is never held
//! across an await point.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use pace_proto::document::{Change, ChangeSet, Document};
use pace_proto::project::{NewProject, Project, ProjectId, ProjectPatch};
use pace_proto::task::{NewTask, Task, TaskId, TaskPatch};

use super::snapshot::Snapshot;
use super::{
    DocumentStore, ListenerGuard, ProjectQuery, Query, StoreError, Subscription, TaskQuery,
};

/// Source of the time written for [`pace_proto::task::Stamp::ServerTime`].
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Listener<T: Document, Q> {
    query: Q,
    tx: mpsc::UnboundedSender<ChangeSet<T>>,
}

struct Inner {
    tasks: BTreeMap<TaskId, Task>,
    projects: BTreeMap<ProjectId, Project>,
    task_listeners: HashMap<u64, Listener<Task, TaskQuery>>,
    project_listeners: HashMap<u64, Listener<Project, ProjectQuery>>,
    next_listener: u64,
}

impl Inner {
    fn listener_id(&mut self) -> u64 {
        self.next_listener += 1;
        self.next_listener
    }
}

/// In-memory [`DocumentStore`].
///
/// Cloning is cheap and yields a handle to the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    clock: Clock,
}

impl MemoryStore {
    /// Create an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    /// Create a store pre-populated from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let inner = Inner {
            tasks: snapshot.tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
            projects: snapshot
                .projects
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            task_listeners: HashMap::new(),
            project_listeners: HashMap::new(),
            next_listener: 0,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the clock used to resolve server timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Copy both collections out, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            tasks: inner.tasks.values().cloned().collect(),
            projects: inner.projects.values().cloned().collect(),
        }
    }

    /// Read a task directly, bypassing queries.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(id).cloned()
    }

    /// Read a project directly, bypassing queries.
    #[must_use]
    pub fn project(&self, id: &ProjectId) -> Option<Project> {
        self.inner.lock().projects.get(id).cloned()
    }

    /// Write a task document as-is, notifying listeners. Used to seed
    /// legacy-shaped data that the typed write paths would never produce.
    pub fn put_task(&self, task: Task) {
        let mut inner = self.inner.lock();
        let id = task.id.clone();
        let before = inner.tasks.insert(id.clone(), task.clone());
        notify(&mut inner.task_listeners, before.as_ref(), Some(&task), &id);
    }

    /// Write a project document as-is, notifying listeners.
    pub fn put_project(&self, project: Project) {
        let mut inner = self.inner.lock();
        let id = project.id.clone();
        let before = inner.projects.insert(id.clone(), project.clone());
        notify(&mut inner.project_listeners, before.as_ref(), Some(&project), &id);
    }

    /// Delete a task, notifying listeners. Returns `false` if it was absent.
    pub fn delete_task(&self, id: &TaskId) -> bool {
        let mut inner = self.inner.lock();
        let Some(before) = inner.tasks.remove(id) else {
            return false;
        };
        notify(&mut inner.task_listeners, Some(&before), None, id);
        true
    }

    /// Number of live task and project listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.task_listeners.len() + inner.project_listeners.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Push the effect of one document write to every interested listener,
/// dropping listeners whose receiver is gone.
fn notify<T: Document, Q: Query<T>>(
    listeners: &mut HashMap<u64, Listener<T, Q>>,
    before: Option<&T>,
    after: Option<&T>,
    id: &T::Id,
) {
    listeners.retain(|_, listener| {
        let was = before.is_some_and(|doc| listener.query.matches(doc));
        let is = after.filter(|doc| listener.query.matches(doc));
        let change = match (was, is) {
            (false, Some(doc)) => Change::Added(doc.clone()),
            (true, Some(doc)) => Change::Modified(doc.clone()),
            (true, None) => Change::Removed(id.clone()),
            (false, None) => return true,
        };
        listener.tx.send(vec![change]).is_ok()
    });
}

fn initial_batch<'a, T: Document + 'a, Q: Query<T>>(
    docs: impl Iterator<Item = &'a T>,
    query: &Q,
) -> ChangeSet<T> {
    docs.filter(|doc| query.matches(doc))
        .cloned()
        .map(Change::Added)
        .collect()
}

fn release_task_listener(inner: Weak<Mutex<Inner>>, id: u64) -> ListenerGuard {
    ListenerGuard::new(move || {
        if let Some(inner) = inner.upgrade() {
            inner.lock().task_listeners.remove(&id);
        }
    })
}

fn release_project_listener(inner: Weak<Mutex<Inner>>, id: u64) -> ListenerGuard {
    ListenerGuard::new(move || {
        if let Some(inner) = inner.upgrade() {
            inner.lock().project_listeners.remove(&id);
        }
    })
}

impl DocumentStore for MemoryStore {
    async fn create_task(&self, task: NewTask) -> Result<TaskId, StoreError> {
        let id = TaskId::generate();
        self.put_task(task.into_task(id.clone()));
        Ok(id)
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        let now = (self.clock)();
        let mut inner = self.inner.lock();
        let Some(task) = inner.tasks.get_mut(id) else {
            return Err(StoreError::NotFound(format!("task {id}")));
        };
        let before = task.clone();
        patch.apply(task, now);
        let after = task.clone();
        notify(&mut inner.task_listeners, Some(&before), Some(&after), id);
        Ok(())
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .tasks
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn subscribe_tasks(&self, query: TaskQuery) -> Result<Subscription<Task>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.listener_id();
        // The receiver is alive here, so the initial send cannot fail.
        let _ = tx.send(initial_batch(inner.tasks.values(), &query));
        inner.task_listeners.insert(id, Listener { query, tx });
        drop(inner);
        Ok(Subscription::new(
            rx,
            release_task_listener(Arc::downgrade(&self.inner), id),
        ))
    }

    async fn create_project(&self, project: NewProject) -> Result<ProjectId, StoreError> {
        let id = ProjectId::generate();
        self.put_project(project.into_project(id.clone()));
        Ok(id)
    }

    async fn update_project(&self, id: &ProjectId, patch: &ProjectPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(project) = inner.projects.get_mut(id) else {
            return Err(StoreError::NotFound(format!("project {id}")));
        };
        let before = project.clone();
        patch.apply(project);
        let after = project.clone();
        notify(&mut inner.project_listeners, Some(&before), Some(&after), id);
        Ok(())
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.project(id))
    }

    async fn subscribe_projects(
        &self,
        query: ProjectQuery,
    ) -> Result<Subscription<Project>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.listener_id();
        let _ = tx.send(initial_batch(inner.projects.values(), &query));
        inner.project_listeners.insert(id, Listener { query, tx });
        drop(inner);
        Ok(Subscription::new(
            rx,
            release_project_listener(Arc::downgrade(&self.inner), id),
        ))
    }
}
