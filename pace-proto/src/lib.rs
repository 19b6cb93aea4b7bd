//! Shared document model for the PACE task and project store.
//!
//! Everything here is pure data: the shapes of `tasks` and `projects`
//! documents, the status parsing boundary, the write payloads that mutate
//! documents, and the change notifications a live query delivers.

pub mod document;
pub mod identity;
pub mod project;
pub mod status;
pub mod task;
pub mod timestamp;
