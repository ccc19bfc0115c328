//! Partition key range records as described by the server.

use sextant_core::{KeyRange, RangeId};

/// A contiguous slice of the key space owned by one physical partition at a
/// point in time, as reported by the range feed.
///
/// A non-empty `parents` list marks this record as the product of a split
/// (or a merge referencing the pre-merge siblings); the named parents are
/// superseded and must be excluded from any current view. Absence of parents
/// is normalized to an empty vec at the feed boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKeyRange {
    /// Server-issued id of this range. Not stable across splits.
    pub id: RangeId,
    /// Inclusive lower bound of the owned key slice.
    pub min_inclusive: String,
    /// Exclusive upper bound of the owned key slice.
    pub max_exclusive: String,
    /// Ids of the ranges this record superseded, oldest first. Empty for
    /// ranges that have never split or merged.
    pub parents: Vec<RangeId>,
}

impl PartitionKeyRange {
    /// Creates a record with no parents.
    ///
    /// # Panics
    ///
    /// Panics if `min_inclusive > max_exclusive`.
    #[must_use]
    pub fn new(
        id: impl Into<RangeId>,
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
    ) -> Self {
        let min_inclusive = min_inclusive.into();
        let max_exclusive = max_exclusive.into();
        assert!(
            min_inclusive <= max_exclusive,
            "partition key range min must be <= max"
        );
        Self {
            id: id.into(),
            min_inclusive,
            max_exclusive,
            parents: Vec::new(),
        }
    }

    /// Builder: attaches the superseded parent ids.
    #[must_use]
    pub fn with_parents(mut self, parents: Vec<RangeId>) -> Self {
        self.parents = parents;
        self
    }

    /// Returns true if this record is the product of a split or merge.
    #[must_use]
    pub fn is_split_product(&self) -> bool {
        !self.parents.is_empty()
    }

    /// The owned key slice as a min-inclusive/max-exclusive range.
    #[must_use]
    pub fn span(&self) -> KeyRange {
        KeyRange::new(
            self.min_inclusive.clone(),
            self.max_exclusive.clone(),
            true,
            false,
        )
    }
}
