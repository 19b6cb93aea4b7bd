//! Change notifications delivered by live queries.

use std::fmt;
use std::hash::Hash;

/// A record stored in one of the store's collections.
pub trait Document: Clone {
    /// Store-assigned identifier type.
    type Id: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Returns the document's identifier.
    fn id(&self) -> &Self::Id;
}

/// A single document change within a query's result set.
///
/// A live query first reports its whole result set as [`Change::Added`],
/// then incremental changes as documents enter, change within, or leave
/// the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T: Document> {
    /// The document entered the result set.
    Added(T),
    /// The document changed and is still in the result set.
    Modified(T),
    /// The document left the result set.
    Removed(T::Id),
}

impl<T: Document> Change<T> {
    /// Returns the identifier of the changed document.
    #[must_use]
    pub fn id(&self) -> &T::Id {
        match self {
            Self::Added(doc) | Self::Modified(doc) => doc.id(),
            Self::Removed(id) => id,
        }
    }
}

/// A batch of changes delivered together.
pub type ChangeSet<T> = Vec<Change<T>>;
