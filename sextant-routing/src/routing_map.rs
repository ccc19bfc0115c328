//! Collection routing map - immutable snapshot of a collection's partition
//! layout.
//!
//! A routing map is a complete, sorted, gap-free cover of the universal key
//! space by partition key ranges. Maps are built whole from a full feed read
//! or derived from a prior instance plus a delta via [`CollectionRoutingMap::try_combine`];
//! they are never mutated in place.

use std::collections::{BTreeMap, HashMap, HashSet};

use sextant_core::{
    CollectionRid, KeyRange, RangeId, RouteInfo, EFFECTIVE_KEY_MAX, EFFECTIVE_KEY_MIN,
    PARTITIONS_PER_COLLECTION_MAX,
};

use crate::error::{RoutingError, RoutingResult};
use crate::record::PartitionKeyRange;

/// Immutable snapshot of which partition key ranges cover a collection.
///
/// Invariant, checked on construction and combination: the ranges are sorted
/// ascending by `min_inclusive`, cover the key space from the minimum
/// sentinel to the maximum sentinel, and neither overlap nor leave gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRoutingMap {
    /// (record, route info) pairs sorted ascending by `min_inclusive`.
    ordered: Vec<(PartitionKeyRange, RouteInfo)>,
    /// Span of each record, aligned with `ordered`.
    spans: Vec<KeyRange>,
    /// Range id to index into `ordered`.
    by_id: HashMap<RangeId, usize>,
    /// Route info to index into `ordered`. Children of a split share their
    /// parent's info, so this mapping is lossy: the last range in min order
    /// wins.
    by_info: HashMap<RouteInfo, usize>,
    /// The collection this map describes.
    collection_rid: CollectionRid,
    /// Change-feed watermark of the read that produced this map.
    change_feed_etag: Option<String>,
}

impl CollectionRoutingMap {
    /// Builds a complete routing map from (record, route info) pairs.
    ///
    /// Records superseded by a split or merge - those whose id appears in
    /// some other record's `parents` - are discarded first. Returns
    /// `Ok(None)` if the surviving records leave a gap in the cover (the
    /// caller should perform a full reload).
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::InconsistentTopology`] if two surviving
    /// records overlap: the server returned an inconsistent partition set.
    pub fn complete(
        pairs: Vec<(PartitionKeyRange, RouteInfo)>,
        collection_rid: CollectionRid,
        change_feed_etag: Option<String>,
    ) -> RoutingResult<Option<Self>> {
        let superseded: HashSet<RangeId> = pairs
            .iter()
            .flat_map(|(record, _)| record.parents.iter().cloned())
            .collect();
        let live: Vec<(PartitionKeyRange, RouteInfo)> = pairs
            .into_iter()
            .filter(|(record, _)| !superseded.contains(&record.id))
            .collect();
        Self::build(live, collection_rid, change_feed_etag)
    }

    /// Derives a new map from this one plus new or changed pairs and a new
    /// watermark.
    ///
    /// Every id named in a new record's `parents` is superseded and removed.
    /// Returns `Ok(None)` if the delta cannot be reconciled into a complete,
    /// gap-free cover; the caller then falls back to a full reload.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::InconsistentTopology`] if the combined
    /// records overlap.
    pub fn try_combine(
        &self,
        changes: Vec<(PartitionKeyRange, RouteInfo)>,
        change_feed_etag: Option<String>,
    ) -> RoutingResult<Option<Self>> {
        let mut by_id: HashMap<RangeId, (PartitionKeyRange, RouteInfo)> = self
            .ordered
            .iter()
            .map(|(record, info)| (record.id.clone(), (record.clone(), info.clone())))
            .collect();

        let mut superseded: HashSet<RangeId> = HashSet::new();
        for (record, _) in &changes {
            superseded.extend(record.parents.iter().cloned());
        }
        for (record, info) in changes {
            by_id.insert(record.id.clone(), (record, info));
        }
        for id in &superseded {
            by_id.remove(id);
        }

        Self::build(
            by_id.into_values().collect(),
            self.collection_rid.clone(),
            change_feed_etag,
        )
    }

    /// Sorts, verifies completeness, and indexes the pairs.
    fn build(
        mut pairs: Vec<(PartitionKeyRange, RouteInfo)>,
        collection_rid: CollectionRid,
        change_feed_etag: Option<String>,
    ) -> RoutingResult<Option<Self>> {
        assert!(
            pairs.len() <= PARTITIONS_PER_COLLECTION_MAX as usize,
            "too many partition key ranges: {} > {}",
            pairs.len(),
            PARTITIONS_PER_COLLECTION_MAX
        );
        pairs.sort_by(|(a, _), (b, _)| a.min_inclusive.cmp(&b.min_inclusive));

        if !Self::verify_complete(&pairs, &collection_rid)? {
            return Ok(None);
        }

        let spans: Vec<KeyRange> = pairs.iter().map(|(record, _)| record.span()).collect();
        let mut by_id = HashMap::with_capacity(pairs.len());
        let mut by_info = HashMap::with_capacity(pairs.len());
        for (index, (record, info)) in pairs.iter().enumerate() {
            by_id.insert(record.id.clone(), index);
            by_info.insert(info.clone(), index);
        }

        Ok(Some(Self {
            ordered: pairs,
            spans,
            by_id,
            by_info,
            collection_rid,
            change_feed_etag,
        }))
    }

    /// Checks that sorted records cover the universal key space exactly.
    ///
    /// A gap is a soft failure (`Ok(false)`); an overlap is a hard error.
    fn verify_complete(
        sorted: &[(PartitionKeyRange, RouteInfo)],
        collection_rid: &CollectionRid,
    ) -> RoutingResult<bool> {
        let Some((first, _)) = sorted.first() else {
            return Ok(false);
        };
        if first.min_inclusive != EFFECTIVE_KEY_MIN {
            return Ok(false);
        }
        for pair in sorted.windows(2) {
            let (previous, _) = &pair[0];
            let (next, _) = &pair[1];
            match previous.max_exclusive.cmp(&next.min_inclusive) {
                std::cmp::Ordering::Equal => {}
                std::cmp::Ordering::Greater => {
                    return Err(RoutingError::InconsistentTopology {
                        collection: collection_rid.clone(),
                        first: previous.id.clone(),
                        second: next.id.clone(),
                    });
                }
                std::cmp::Ordering::Less => return Ok(false),
            }
        }
        let (last, _) = sorted.last().expect("non-empty checked above");
        Ok(last.max_exclusive == EFFECTIVE_KEY_MAX)
    }

    /// Returns the partition owning `key`.
    ///
    /// The minimum sentinel always maps to the first partition; the maximum
    /// sentinel is the open end of the key space and owns nothing.
    #[must_use]
    pub fn range_by_key(&self, key: &str) -> Option<&PartitionKeyRange> {
        if key >= EFFECTIVE_KEY_MAX {
            return None;
        }
        let index = self
            .ordered
            .partition_point(|(record, _)| record.min_inclusive.as_str() <= key);
        // The first record starts at the minimum sentinel, so every in-space
        // key has a predecessor.
        assert!(index > 0, "complete map must cover every in-space key");
        let (record, _) = &self.ordered[index - 1];
        assert!(key < record.max_exclusive.as_str());
        Some(record)
    }

    /// Returns the partitions overlapping any of the query ranges, sorted
    /// ascending by `min_inclusive` and deduplicated.
    #[must_use]
    pub fn overlapping(&self, query_ranges: &[KeyRange]) -> Vec<PartitionKeyRange> {
        let mut hits: BTreeMap<&str, usize> = BTreeMap::new();
        for query in query_ranges {
            if query.is_empty() {
                continue;
            }
            // Candidate window: partitions whose max may exceed the query's
            // min and whose min may fall below the query's max.
            let low = self
                .ordered
                .partition_point(|(record, _)| record.max_exclusive <= query.min);
            let high = self.ordered.partition_point(|(record, _)| {
                record.min_inclusive < query.max
                    || (record.min_inclusive == query.max && query.max_inclusive)
            });
            for index in low..high {
                if self.spans[index].overlaps(query) {
                    let (record, _) = &self.ordered[index];
                    hits.insert(record.min_inclusive.as_str(), index);
                }
            }
        }
        hits.into_values()
            .map(|index| self.ordered[index].0.clone())
            .collect()
    }

    /// Direct lookup by range id. An absent id is an expected outcome, not
    /// an error.
    #[must_use]
    pub fn range_by_id(&self, id: &RangeId) -> Option<&PartitionKeyRange> {
        self.by_id.get(id).map(|&index| &self.ordered[index].0)
    }

    /// Returns the route info recorded for a range id.
    #[must_use]
    pub fn route_info_by_id(&self, id: &RangeId) -> Option<&RouteInfo> {
        self.by_id.get(id).map(|&index| &self.ordered[index].1)
    }

    /// Reverse lookup from route info to the record it is associated with.
    #[must_use]
    pub fn record_by_info(&self, info: &RouteInfo) -> Option<&PartitionKeyRange> {
        self.by_info.get(info).map(|&index| &self.ordered[index].0)
    }

    /// The records in ascending min order.
    pub fn ordered_ranges(&self) -> impl Iterator<Item = &PartitionKeyRange> {
        self.ordered.iter().map(|(record, _)| record)
    }

    /// The collection this map describes.
    #[must_use]
    pub const fn collection_rid(&self) -> &CollectionRid {
        &self.collection_rid
    }

    /// Change-feed watermark of the read that produced this map.
    #[must_use]
    pub fn change_feed_etag(&self) -> Option<&str> {
        self.change_feed_etag.as_deref()
    }

    /// Number of partitions in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true if the map holds no partitions. A complete map is never
    /// empty; this exists for symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
