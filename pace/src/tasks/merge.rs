//! Merging overlapping live queries into one collection.
//!
//! A task can be found by several of the board's queries at once: by
//! assignee uid, by assignee email or by the legacy assignee field. Each
//! document keeps the set of sources currently holding it and is dropped
//! only when the last of them reports it removed. Re-delivering a batch is
//! idempotent.

use std::collections::{BTreeSet, HashMap};

use pace_proto::document::{Change, Document};

/// Identifies one contributing live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

/// What one batch did to the merged collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Documents that became visible.
    pub added: usize,
    /// Documents whose content was replaced.
    pub updated: usize,
    /// Documents that left the collection.
    pub removed: usize,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    doc: T,
    sources: BTreeSet<SourceId>,
}

/// Deduplicated union of several live query result sets.
#[derive(Debug, Clone)]
pub struct MergedCollection<T: Document> {
    entries: HashMap<T::Id, Entry<T>>,
}

impl<T: Document> Default for MergedCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> MergedCollection<T> {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Apply one change batch from `source`.
    ///
    /// `Added` and `Modified` both mean "`source` now holds this document
    /// with this content". The latest delivered content wins regardless of
    /// which source delivered it.
    pub fn apply(&mut self, source: SourceId, changes: impl IntoIterator<Item = Change<T>>) -> MergeStats {
        let mut stats = MergeStats::default();
        for change in changes {
            match change {
                Change::Added(doc) | Change::Modified(doc) => {
                    if let Some(entry) = self.entries.get_mut(doc.id()) {
                        entry.doc = doc;
                        entry.sources.insert(source);
                        stats.updated += 1;
                    } else {
                        self.entries.insert(
                            doc.id().clone(),
                            Entry {
                                doc,
                                sources: BTreeSet::from([source]),
                            },
                        );
                        stats.added += 1;
                    }
                }
                Change::Removed(id) => {
                    if self.release(&id, source) {
                        stats.removed += 1;
                    }
                }
            }
        }
        stats
    }

    /// Forget everything `source` contributed, as if it had removed every
    /// document it held. Returns the number of documents that left.
    pub fn drop_source(&mut self, source: SourceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.sources.remove(&source);
            !entry.sources.is_empty()
        });
        before - self.entries.len()
    }

    fn release(&mut self, id: &T::Id, source: SourceId) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        entry.sources.remove(&source);
        if entry.sources.is_empty() {
            self.entries.remove(id);
            true
        } else {
            false
        }
    }

    /// Look up a document.
    #[must_use]
    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.entries.get(id).map(|e| &e.doc)
    }

    /// Mutate a document in place (optimistic local writes). Returns
    /// `false` if the document is not in the collection.
    pub fn update(&mut self, id: &T::Id, f: impl FnOnce(&mut T)) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                f(&mut entry.doc);
                true
            }
            None => false,
        }
    }

    /// The sources currently holding a document.
    #[must_use]
    pub fn sources_of(&self, id: &T::Id) -> Option<&BTreeSet<SourceId>> {
        self.entries.get(id).map(|e| &e.sources)
    }

    /// Iterate over documents in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.values().map(|e| &e.doc)
    }

    /// Clone every document out, ordered by id.
    #[must_use]
    pub fn to_sorted_vec(&self) -> Vec<T> {
        let mut docs: Vec<T> = self.iter().cloned().collect();
        docs.sort_by(|a, b| a.id().cmp(b.id()));
        docs
    }

    /// Number of distinct documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no source holds any document.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
