//! Project documents and their aggregate task counters.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Document;

/// Opaque, store-assigned project identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
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

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A project document.
///
/// `task_total` and `task_done` are maintained incrementally by separate
/// writes, so they may lag behind the tasks they count. `None` means the
/// project has never been counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Store-assigned identifier.
    pub id: ProjectId,
    /// Project name.
    #[serde(default)]
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Owner's email.
    #[serde(default)]
    pub owner_email: String,
    /// Owner's display name.
    #[serde(default)]
    pub owner_name: String,
    /// Member emails, excluding the owner.
    #[serde(default)]
    pub members: Vec<String>,
    /// Number of tasks referencing this project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_total: Option<u64>,
    /// Number of those tasks that are done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_done: Option<u64>,
}

impl Project {
    /// Returns `true` if both counters have been written.
    #[must_use]
    pub const fn has_counters(&self) -> bool {
        self.task_total.is_some() && self.task_done.is_some()
    }

    /// Returns `true` if `email` owns or belongs to the project.
    #[must_use]
    pub fn includes(&self, email: &str) -> bool {
        self.owner_email == email || self.members.iter().any(|m| m == email)
    }

    /// Number of people on the project, owner included.
    #[must_use]
    pub fn headcount(&self) -> usize {
        self.members.len() + 1
    }
}

impl Document for Project {
    type Id = ProjectId;

    fn id(&self) -> &ProjectId {
        &self.id
    }
}

/// The fields supplied when creating a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProject {
    /// Project name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Owner's email.
    pub owner_email: String,
    /// Owner's display name.
    pub owner_name: String,
    /// Member emails.
    pub members: Vec<String>,
}

impl NewProject {
    /// Builds the stored document with zeroed counters.
    #[must_use]
    pub fn into_project(self, id: ProjectId) -> Project {
        Project {
            id,
            name: self.name,
            description: self.description,
            owner_email: self.owner_email,
            owner_name: self.owner_name,
            members: self.members,
            task_total: Some(0),
            task_done: Some(0),
        }
    }
}

/// One of a project's aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// `taskTotal`.
    Total,
    /// `taskDone`.
    Done,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Total => f.write_str("taskTotal"),
            Self::Done => f.write_str("taskDone"),
        }
    }
}

/// An update of a project document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectPatch {
    /// Atomically add `delta` to a counter. A missing counter counts as 0
    /// and the result never drops below 0.
    Adjust {
        /// Which counter.
        counter: Counter,
        /// Signed amount.
        delta: i64,
    },
    /// Overwrite both counters with recounted values.
    SetCounters {
        /// New `taskTotal`.
        total: u64,
        /// New `taskDone`.
        done: u64,
    },
    /// Add a member email if not already present.
    AddMember(String),
}

impl ProjectPatch {
    /// Applies the patch to a project document.
    pub fn apply(&self, project: &mut Project) {
        match self {
            Self::Adjust { counter, delta } => {
                let slot = match counter {
                    Counter::Total => &mut project.task_total,
                    Counter::Done => &mut project.task_done,
                };
                let current = slot.unwrap_or(0);
                *slot = Some(current.saturating_add_signed(*delta));
            }
            Self::SetCounters { total, done } => {
                project.task_total = Some(*total);
                project.task_done = Some(*done);
            }
            Self::AddMember(email) => {
                if !project.members.iter().any(|m| m == email) {
                    project.members.push(email.clone());
                }
            }
        }
    }
}
