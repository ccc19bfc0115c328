//! Smart routing map provider - minimizes cache lookups for sorted query
//! ranges.
//!
//! Callers such as a query fan-out layer often supply many small, already
//! sorted, non-overlapping ranges that mostly land in the same few physical
//! partitions. Querying the cache once per input range would resolve the
//! same partition over and over; this provider queries once per physical
//! partition boundary crossing instead.

use std::sync::Arc;

use sextant_core::{CollectionRid, KeyRange, QUERY_RANGES_MAX};

use crate::cache::PartitionKeyRangeCache;
use crate::error::{RoutingError, RoutingResult};
use crate::feed::RangeFeed;
use crate::record::PartitionKeyRange;

/// Decomposes sorted query ranges into the minimal sequence of cache
/// lookups and recomposes the answer.
pub struct SmartRoutingMapProvider<F: RangeFeed> {
    cache: Arc<PartitionKeyRangeCache<F>>,
}

impl<F: RangeFeed> SmartRoutingMapProvider<F> {
    /// Creates a provider over an existing cache.
    #[must_use]
    pub const fn new(cache: Arc<PartitionKeyRangeCache<F>>) -> Self {
        Self { cache }
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<PartitionKeyRangeCache<F>> {
        &self.cache
    }

    /// Returns the partitions overlapping the query ranges, which must be
    /// sorted ascending and pairwise non-overlapping (touching boundaries
    /// are allowed only when at least one touching side is exclusive).
    ///
    /// Consistency caveat: each partition boundary crossing issues an
    /// independent cache lookup and no snapshot is pinned across them, so a
    /// split landing between two lookups of one decomposition can leave
    /// parts of the result built from different snapshots. Callers needing
    /// one coherent snapshot should use
    /// [`PartitionKeyRangeCache::routing_map`] and query it directly.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnsortedQueryRanges`] if the precondition is
    /// violated (a caller error, never retried), plus the refresh errors of
    /// the underlying cache.
    pub async fn overlapping_ranges(
        &self,
        collection: &CollectionRid,
        sorted_query_ranges: &[KeyRange],
    ) -> RoutingResult<Vec<PartitionKeyRange>> {
        if sorted_query_ranges.len() > QUERY_RANGES_MAX as usize {
            return Err(RoutingError::TooManyQueryRanges {
                count: sorted_query_ranges.len(),
                max: QUERY_RANGES_MAX,
            });
        }
        if !is_sorted_and_non_overlapping(sorted_query_ranges) {
            return Err(RoutingError::UnsortedQueryRanges);
        }

        let mut target: Vec<PartitionKeyRange> = Vec::new();
        let mut index = 0;
        while index < sorted_query_ranges.len() {
            let current = &sorted_query_ranges[index];
            if current.is_empty() {
                index += 1;
                continue;
            }

            // Only the part of the current range not already covered by the
            // most recently resolved partition needs a lookup.
            let query = match target.last() {
                Some(last) => current.subtract(&last.span()),
                None => current.clone(),
            };
            if query.is_empty() {
                index += 1;
                continue;
            }

            let resolved = self
                .cache
                .overlapping_ranges(collection, std::slice::from_ref(&query))
                .await?;
            assert!(
                !resolved.is_empty(),
                "a complete routing map covers every non-empty in-space query range"
            );
            target.extend(resolved);

            // Skip every input range already covered by the partition just
            // resolved; those need no further lookups.
            let covered_max = target[target.len() - 1].max_exclusive.clone();
            while index < sorted_query_ranges.len()
                && range_covered(&sorted_query_ranges[index], &covered_max)
            {
                index += 1;
            }
        }
        Ok(target)
    }
}

/// Precondition check: ascending and pairwise non-overlapping. Adjacent
/// ranges may touch only when at least one touching side excludes the
/// boundary point.
fn is_sorted_and_non_overlapping(ranges: &[KeyRange]) -> bool {
    for pair in ranges.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        match previous.max.cmp(&next.min) {
            std::cmp::Ordering::Greater => return false,
            std::cmp::Ordering::Equal => {
                if previous.max_inclusive && next.min_inclusive {
                    return false;
                }
            }
            std::cmp::Ordering::Less => {}
        }
    }
    true
}

/// True if `range` lies entirely below `covered_max` (the exclusive upper
/// bound of the last resolved partition). A range whose inclusive max equals
/// the bound still owns that point, which belongs to the next partition.
fn range_covered(range: &KeyRange, covered_max: &str) -> bool {
    match range.max.as_str().cmp(covered_max) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Equal => !range.max_inclusive,
        std::cmp::Ordering::Greater => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SimulatedRangeFeed;

    fn record(id: &str, min: &str, max: &str) -> PartitionKeyRange {
        PartitionKeyRange::new(id, min, max)
    }

    fn range(min: &str, max: &str) -> KeyRange {
        KeyRange::new(min, max, true, false)
    }

    fn seeded_provider() -> (SmartRoutingMapProvider<SimulatedRangeFeed>, CollectionRid) {
        let feed = SimulatedRangeFeed::new(42);
        let collection = CollectionRid::new("coll-1");
        feed.seed_collection(
            &collection,
            vec![
                record("0", "", "40"),
                record("1", "40", "80"),
                record("2", "80", "C0"),
                record("3", "C0", "FF"),
            ],
            "etag-1",
        );
        let cache = Arc::new(PartitionKeyRangeCache::new(feed));
        (SmartRoutingMapProvider::new(cache), collection)
    }

    #[tokio::test]
    async fn test_many_small_ranges_one_partition() {
        let (provider, collection) = seeded_provider();
        let queries = vec![range("00", "01"), range("02", "03"), range("04", "05")];
        let hits = provider
            .overlapping_ranges(&collection, &queries)
            .await
            .expect("resolves");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "0");
    }

    #[tokio::test]
    async fn test_spanning_range_resolves_every_partition() {
        let (provider, collection) = seeded_provider();
        let queries = vec![range("", "FF")];
        let hits = provider
            .overlapping_ranges(&collection, &queries)
            .await
            .expect("resolves");
        let ids: Vec<&str> = hits.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_matches_direct_map_lookup() {
        let (provider, collection) = seeded_provider();
        let queries = vec![
            range("00", "10"),
            range("10", "41"),
            range("7F", "81"),
            range("C1", "D0"),
        ];
        let smart = provider
            .overlapping_ranges(&collection, &queries)
            .await
            .expect("resolves");

        let map = provider
            .cache()
            .routing_map(&collection, None)
            .await
            .expect("load")
            .expect("complete");
        let direct = map.overlapping(&queries);

        let smart_ids: Vec<&str> = smart.iter().map(|r| r.id.as_str()).collect();
        let direct_ids: Vec<&str> = direct.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(smart_ids, direct_ids);
    }

    #[tokio::test]
    async fn test_empty_input_ranges_are_skipped() {
        let (provider, collection) = seeded_provider();
        let queries = vec![
            KeyRange::new("00", "00", true, false),
            range("41", "42"),
            KeyRange::new("43", "43", true, false),
        ];
        let hits = provider
            .overlapping_ranges(&collection, &queries)
            .await
            .expect("resolves");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "1");
    }

    #[tokio::test]
    async fn test_inclusive_max_at_partition_boundary() {
        let (provider, collection) = seeded_provider();
        // The inclusive max "40" belongs to partition 1 even though the
        // first sub-range otherwise lives in partition 0.
        let queries = vec![KeyRange::new("00", "40", true, true)];
        let hits = provider
            .overlapping_ranges(&collection, &queries)
            .await
            .expect("resolves");
        let ids: Vec<&str> = hits.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
    }

    #[tokio::test]
    async fn test_unsorted_input_is_rejected() {
        let (provider, collection) = seeded_provider();
        let queries = vec![range("40", "50"), range("00", "10")];
        let err = provider
            .overlapping_ranges(&collection, &queries)
            .await
            .expect_err("unsorted");
        assert_eq!(err, RoutingError::UnsortedQueryRanges);
    }

    #[tokio::test]
    async fn test_overlapping_input_is_rejected() {
        let (provider, collection) = seeded_provider();
        let queries = vec![range("00", "20"), range("10", "30")];
        let err = provider
            .overlapping_ranges(&collection, &queries)
            .await
            .expect_err("overlapping");
        assert_eq!(err, RoutingError::UnsortedQueryRanges);

        // Touching with both sides inclusive is also an overlap.
        let queries = vec![
            KeyRange::new("00", "20", true, true),
            KeyRange::new("20", "30", true, false),
        ];
        let err = provider
            .overlapping_ranges(&collection, &queries)
            .await
            .expect_err("touching inclusive");
        assert_eq!(err, RoutingError::UnsortedQueryRanges);
    }

    #[test]
    fn test_range_covered_boundary() {
        assert!(range_covered(&range("00", "3F"), "40"));
        assert!(range_covered(&range("00", "40"), "40"));
        assert!(!range_covered(&KeyRange::new("00", "40", true, true), "40"));
        assert!(!range_covered(&range("00", "41"), "40"));
    }
}
