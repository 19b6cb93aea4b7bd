//! The signed-in user as seen by queries and ownership fields.

use serde::{Deserialize, Serialize};

/// Identity of the current user.
///
/// Older documents reference users by email, newer ones by uid, so both
/// are carried and either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Auth provider user id.
    pub uid: Option<String>,
    /// Account email.
    pub email: Option<String>,
    /// Human-readable name.
    pub display_name: Option<String>,
}

impl Identity {
    /// Returns `true` if neither uid nor email is known.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.uid.as_deref().is_none_or(str::is_empty)
            && self.email.as_deref().is_none_or(str::is_empty)
    }

    /// Returns the best name to show for this user.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .or(self.uid.as_deref())
            .unwrap_or("anonymous")
    }
}
