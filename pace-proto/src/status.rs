//! Task status parsing.
//!
//! Status values in the store are free text written by several generations
//! of clients ("To Do", "in progress", "Completed", "IN-PROGRESS", ...).
//! [`normalize_status`] is the only place where that text is interpreted;
//! everything downstream works with [`NormalizedStatus`] and the closed
//! [`TaskStatus`] enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// One of the three canonical task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum TaskStatus {
    /// Not started.
    ToDo,
    /// Actively being worked on.
    InProgress,
    /// Completed.
    Done,
}

impl TaskStatus {
    /// All canonical states in board column order.
    pub const ALL: [Self; 3] = [Self::ToDo, Self::InProgress, Self::Done];

    /// Returns the canonical text form (`to-do`, `in-progress`, `done`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToDo => "to-do",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }

    /// Returns `true` for [`TaskStatus::Done`].
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text that does not normalize to a canonical status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_status(Some(s))
            .canonical()
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The result of normalizing a stored status value.
///
/// Serializes as plain text: the canonical form, the lower-cased
/// unrecognized text, or the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum NormalizedStatus {
    /// The value was absent or blank.
    #[default]
    Empty,
    /// The value matched one of the canonical states.
    Canonical(TaskStatus),
    /// The value matched no rule; holds the trimmed, lower-cased text.
    Unrecognized(String),
}

impl NormalizedStatus {
    /// Returns the normalized text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Canonical(status) => status.as_str(),
            Self::Unrecognized(text) => text,
        }
    }

    /// Returns the canonical status, if the value matched one.
    #[must_use]
    pub const fn canonical(&self) -> Option<TaskStatus> {
        match self {
            Self::Canonical(status) => Some(*status),
            Self::Empty | Self::Unrecognized(_) => None,
        }
    }

    /// Returns `true` only for a canonical `done`.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Canonical(TaskStatus::Done))
    }

    /// Returns `true` if the task still has work left, including tasks whose
    /// status could not be interpreted.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !self.is_done()
    }
}

impl fmt::Display for NormalizedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TaskStatus> for NormalizedStatus {
    fn from(status: TaskStatus) -> Self {
        Self::Canonical(status)
    }
}

impl From<Option<String>> for NormalizedStatus {
    fn from(value: Option<String>) -> Self {
        normalize_status(value.as_deref())
    }
}

impl From<NormalizedStatus> for String {
    fn from(status: NormalizedStatus) -> Self {
        match status {
            NormalizedStatus::Empty => Self::new(),
            NormalizedStatus::Canonical(status) => status.as_str().to_string(),
            NormalizedStatus::Unrecognized(text) => text,
        }
    }
}

/// Maps arbitrary status text onto a [`NormalizedStatus`].
///
/// Matching is case-insensitive and splits words on whitespace and
/// punctuation. Rules are tested in a fixed order: "in progress" as two
/// words or one, then "to do" likewise, then anything mentioning "done" or
/// "complete". The function is
/// idempotent: normalizing the text form of a result yields the same result.
#[must_use]
pub fn normalize_status(raw: Option<&str>) -> NormalizedStatus {
    let Some(raw) = raw else {
        return NormalizedStatus::Empty;
    };
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return NormalizedStatus::Empty;
    }

    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let squashed = words.concat();
    if has_phrase(&words, "in", "progress") {
        NormalizedStatus::Canonical(TaskStatus::InProgress)
    } else if has_phrase(&words, "to", "do") {
        NormalizedStatus::Canonical(TaskStatus::ToDo)
    } else if squashed.contains("done") || squashed.contains("complete") {
        NormalizedStatus::Canonical(TaskStatus::Done)
    } else {
        NormalizedStatus::Unrecognized(lowered)
    }
}

/// Returns `true` if `first` and `second` appear as adjacent words, or
/// joined as one word.
fn has_phrase(words: &[&str], first: &str, second: &str) -> bool {
    let joined = [first, second].concat();
    words.windows(2).any(|pair| pair == [first, second]) || words.contains(&joined.as_str())
}

/// Serde adapter for optional canonical status fields such as `prevStatus`.
///
/// Anything that does not normalize to a canonical state decodes as `None`
/// instead of failing the whole document.
pub mod lenient {
    use super::{Deserialize, Deserializer, TaskStatus, normalize_status};

    /// Serializes the canonical text form, or `null`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<TaskStatus>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match value {
            Some(status) => serializer.serialize_str(status.as_str()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes free text into a canonical status, if it has one.
    ///
    /// # Errors
    ///
    /// Returns an error only if the value is not a string or `null`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<TaskStatus>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(normalize_status(raw.as_deref()).canonical())
    }
}
