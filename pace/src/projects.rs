//! Creating and joining projects.

use thiserror::Error;
use url::Url;

use pace_proto::project::{NewProject, ProjectId, ProjectPatch};

use crate::store::{DocumentStore, StoreError};
use crate::tasks::Reconciler;

/// Errors that can occur creating or joining a project.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectError {
    /// Project name cannot be empty.
    #[error("project name cannot be empty")]
    NameEmpty,
    /// The current user has no email to own or join a project with.
    #[error("an email address is required to own or join a project")]
    NoEmail,
    /// The join code was empty.
    #[error("enter a project id or invitation link")]
    EmptyJoinCode,
    /// The invitation link has no path segment to take the id from.
    #[error("invalid invitation link: {0}")]
    InvalidJoinCode(String),
    /// No project has the given id.
    #[error("project not found: {0}")]
    NotFound(ProjectId),
    /// The store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The fields of the create-project form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDraft {
    /// Project name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Comma-separated member emails.
    pub members: String,
}

/// Split a comma-separated member list, trimming entries and dropping
/// blanks and repeats. Order of first appearance is kept.
#[must_use]
pub fn parse_members(list: &str) -> Vec<String> {
    let mut members: Vec<String> = Vec::new();
    for member in list.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        if !members.iter().any(|m| m == member) {
            members.push(member.to_string());
        }
    }
    members
}

/// Resolve a join code to a project id. The code is either the id itself
/// or an invitation URL whose last path segment is the id.
///
/// # Errors
///
/// Returns [`ProjectError::EmptyJoinCode`] for blank input and
/// [`ProjectError::InvalidJoinCode`] for a URL without a path segment.
pub fn parse_join_code(code: &str) -> Result<ProjectId, ProjectError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ProjectError::EmptyJoinCode);
    }
    let Ok(url) = Url::parse(code) else {
        return Ok(ProjectId::new(code));
    };
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(ProjectId::new)
        .ok_or_else(|| ProjectError::InvalidJoinCode(code.to_string()))
}

impl<S: DocumentStore> Reconciler<S> {
    /// Create a project owned by the current user. Counters start at 0.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::NameEmpty`] or [`ProjectError::NoEmail`]
    /// before any remote call, or [`ProjectError::Store`] if the insert
    /// fails.
    pub async fn create_project(&self, draft: ProjectDraft) -> Result<ProjectId, ProjectError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(ProjectError::NameEmpty);
        }
        let Some(owner_email) = self.identity.email.clone().filter(|e| !e.is_empty()) else {
            return Err(ProjectError::NoEmail);
        };
        let owner_name = self
            .identity
            .display_name
            .clone()
            .unwrap_or_else(|| owner_email.clone());
        let project = NewProject {
            name: name.to_string(),
            description: draft.description.trim().to_string(),
            members: parse_members(&draft.members),
            owner_email,
            owner_name,
        };
        let id = self.store.create_project(project).await?;
        tracing::info!(project_id = %id, "project created");
        Ok(id)
    }

    /// Add the current user to the project named by `code`.
    ///
    /// # Errors
    ///
    /// Returns a parse error for a bad code, [`ProjectError::NoEmail`] for
    /// a user without an email, [`ProjectError::NotFound`] if the project
    /// does not exist, or [`ProjectError::Store`] on a store failure.
    pub async fn join_project(&self, code: &str) -> Result<ProjectId, ProjectError> {
        let id = parse_join_code(code)?;
        let Some(email) = self.identity.email.clone().filter(|e| !e.is_empty()) else {
            return Err(ProjectError::NoEmail);
        };
        if self.store.get_project(&id).await?.is_none() {
            return Err(ProjectError::NotFound(id));
        }
        self.store
            .update_project(&id, &ProjectPatch::AddMember(email))
            .await?;
        tracing::info!(project_id = %id, "joined project");
        Ok(id)
    }
}
