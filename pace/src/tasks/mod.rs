//! Task state reconciliation for the board.
//!
//! Merges the overlapping live queries into one collection, derives the
//! board's counts and views, writes status transitions optimistically and
//! repairs the invariants that independent writes can leave broken.

pub mod backfill;
pub mod live;
pub mod merge;
pub mod reconciler;
pub mod transition;
pub mod view;

pub use backfill::{CounterScope, ReconcileReport};
pub use live::LiveView;
pub use merge::{MergedCollection, SourceId};
pub use reconciler::{BoardState, ReconcileSettings, Reconciler};
pub use transition::{CounterSync, TransitionOutcome, TransitionPlan};
pub use view::{Dashboard, TaskCounts, TaskView, filter_tasks, task_counts};

use thiserror::Error;

use pace_proto::task::TaskId;

use crate::store::StoreError;

/// Errors that can occur creating a task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max 256 characters)")]
    TitleTooLong,
    /// A task must be assigned to someone.
    #[error("task must have an assignee")]
    MissingAssignee,
    /// A task must have a due date.
    #[error("task must have a due date")]
    MissingDueDate,
    /// The store rejected the insert.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from a status transition.
///
/// Only the task write can fail a transition; a failed counter adjustment
/// is reported through [`CounterSync::Drifted`] instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The task is not in the local collection.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The remote task update failed and the local change was reverted.
    #[error("failed to update task {task_id}: {source}")]
    TaskWrite {
        /// The task whose update failed.
        task_id: TaskId,
        /// The store error.
        source: StoreError,
    },
}
