//! Task documents and the write payloads that mutate them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Document;
use crate::project::ProjectId;
use crate::status::{self, NormalizedStatus, TaskStatus};
use crate::timestamp;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Opaque, store-assigned task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an identifier issued by the store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh time-ordered identifier (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display priority. Carries no invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    /// Low priority (the form default).
    #[default]
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

impl Priority {
    /// Returns the lower-case text form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" | "urgent" => Self::High,
            "medium" | "med" | "normal" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl From<Priority> for String {
    fn from(priority: Priority) -> Self {
        priority.as_str().to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a task is assigned to.
///
/// Three generations of clients wrote this differently: by uid, by email,
/// and a legacy free-text `assignee` field that usually holds an email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    /// Assignee's user id.
    #[serde(rename = "assigneeId", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Assignee's email.
    #[serde(rename = "assigneeEmail", default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Legacy free-text assignee.
    #[serde(rename = "assignee", default, skip_serializing_if = "Option::is_none")]
    pub legacy: Option<String>,
}

impl Assignee {
    /// An assignee referenced by email.
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    /// An assignee referenced by user id.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Returns `true` if no reference is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.id, &self.email, &self.legacy]
            .into_iter()
            .all(|field| field.as_deref().is_none_or(|s| s.trim().is_empty()))
    }

    /// Returns the most readable reference.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.legacy.as_deref())
            .or(self.id.as_deref())
    }
}

/// A task document.
///
/// `completed_at` and `prev_status` are present exactly when the status is
/// `done`; [`Task::completion_fields_consistent`] checks this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Task title.
    #[serde(default)]
    pub title: String,
    /// Normalized status.
    #[serde(default)]
    pub status: NormalizedStatus,
    /// Display priority.
    #[serde(default)]
    pub priority: Priority,
    /// When the task is due.
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Who the task is assigned to.
    #[serde(flatten)]
    pub assignee: Assignee,
    /// Owning project, if the task is project-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// When the task entered `done`.
    #[serde(default, with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// The status held before entering `done`.
    #[serde(default, with = "status::lenient", skip_serializing_if = "Option::is_none")]
    pub prev_status: Option<TaskStatus>,
}

impl Task {
    /// Returns `true` if the status is a canonical `done`.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.status.is_done()
    }

    /// Returns `true` if `completed_at` and `prev_status` are present
    /// exactly when the task is done.
    #[must_use]
    pub const fn completion_fields_consistent(&self) -> bool {
        let done = self.is_done();
        done == self.completed_at.is_some() && done == self.prev_status.is_some()
    }

    /// Returns `true` if the task is done but has no completion timestamp.
    #[must_use]
    pub const fn needs_completion_backfill(&self) -> bool {
        self.is_done() && self.completed_at.is_none()
    }
}

impl Document for Task {
    type Id = TaskId;

    fn id(&self) -> &TaskId {
        &self.id
    }
}

/// The fields supplied when creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    /// Task title.
    pub title: String,
    /// Display priority.
    pub priority: Priority,
    /// When the task is due.
    pub due_date: Option<DateTime<Utc>>,
    /// Who the task is assigned to.
    pub assignee: Assignee,
    /// Owning project.
    pub project_id: Option<ProjectId>,
}

impl NewTask {
    /// Builds the stored document. New tasks always start in `to-do`.
    #[must_use]
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            title: self.title,
            status: NormalizedStatus::Canonical(TaskStatus::ToDo),
            priority: self.priority,
            due_date: self.due_date,
            assignee: self.assignee,
            project_id: self.project_id,
            completed_at: None,
            prev_status: None,
        }
    }
}

/// A timestamp value in a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// Filled in by the store when the write is applied.
    ServerTime,
    /// An explicit instant.
    At(DateTime<Utc>),
}

/// A write to an optional field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWrite<T> {
    /// Store this value.
    Set(T),
    /// Delete the field.
    Clear,
}

/// A partial update of a task document. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New status.
    pub status: Option<TaskStatus>,
    /// Write to `completedAt`.
    pub completed_at: Option<FieldWrite<Stamp>>,
    /// Write to `prevStatus`.
    pub prev_status: Option<FieldWrite<TaskStatus>>,
}

impl TaskPatch {
    /// A patch that only stamps `completedAt` with server time.
    #[must_use]
    pub const fn completion_stamp() -> Self {
        Self {
            status: None,
            completed_at: Some(FieldWrite::Set(Stamp::ServerTime)),
            prev_status: None,
        }
    }

    /// Returns `true` if the patch writes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none() && self.completed_at.is_none() && self.prev_status.is_none()
    }

    /// Applies the patch to a task, resolving [`Stamp::ServerTime`] to
    /// `server_time`.
    pub fn apply(&self, task: &mut Task, server_time: DateTime<Utc>) {
        if let Some(status) = self.status {
            task.status = NormalizedStatus::Canonical(status);
        }
        match self.completed_at {
            Some(FieldWrite::Set(Stamp::ServerTime)) => task.completed_at = Some(server_time),
            Some(FieldWrite::Set(Stamp::At(at))) => task.completed_at = Some(at),
            Some(FieldWrite::Clear) => task.completed_at = None,
            None => {}
        }
        match self.prev_status {
            Some(FieldWrite::Set(status)) => task.prev_status = Some(status),
            Some(FieldWrite::Clear) => task.prev_status = None,
            None => {}
        }
    }
}
