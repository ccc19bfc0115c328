//! Per-collection routing map cache with single-flight refresh.
//!
//! The cache owns the refresh protocol: incremental reads via the change
//! feed where possible, falling back to a full reload when the incremental
//! delta cannot be reconciled. Two-level locking gives at most one refresh
//! in flight per collection while leaving unrelated collections fully
//! independent: a `std::sync::Mutex` guards the per-collection lock table
//! (held only for the lookup/insert of a lock handle), and one
//! `tokio::sync::Mutex` per collection is held across the refresh awaits.
//!
//! Readers on the fast path take only a brief `RwLock` read; snapshots are
//! immutable `Arc`s, safe to use without any lock once obtained.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use sextant_core::{
    CollectionRid, KeyRange, RangeId, RouteInfo, QUERY_RANGES_MAX, REFRESH_ATTEMPTS_MAX,
};
use tracing::{debug, warn};

use crate::error::{RoutingError, RoutingResult};
use crate::feed::{FeedOptions, RangeFeed};
use crate::record::PartitionKeyRange;
use crate::routing_map::CollectionRoutingMap;

/// Mutable, per-collection cache of the current [`CollectionRoutingMap`].
///
/// Entries are replaced, never mutated in place; a refresh aborted by a
/// collaborator failure releases the collection lock and leaves the
/// last-good entry untouched.
pub struct PartitionKeyRangeCache<F: RangeFeed> {
    /// The transport collaborator.
    feed: Arc<F>,
    /// Current snapshot per collection.
    maps: RwLock<HashMap<CollectionRid, Arc<CollectionRoutingMap>>>,
    /// Per-collection refresh locks, created on demand.
    refresh_locks: Mutex<HashMap<CollectionRid, Arc<tokio::sync::Mutex<()>>>>,
}

impl<F: RangeFeed> PartitionKeyRangeCache<F> {
    /// Creates a new cache backed by the given feed.
    #[must_use]
    pub fn new(feed: F) -> Self {
        Self {
            feed: Arc::new(feed),
            maps: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached snapshot for a collection, if any. Never performs
    /// I/O.
    ///
    /// # Panics
    ///
    /// Panics if the map table lock is poisoned.
    #[must_use]
    pub fn cached_map(&self, collection: &CollectionRid) -> Option<Arc<CollectionRoutingMap>> {
        self.maps
            .read()
            .expect("map table lock poisoned")
            .get(collection)
            .cloned()
    }

    /// Returns true if a caller holding `previous` should force a refresh:
    /// the cache has not advanced past the caller's copy, so the cached
    /// entry is presumed stale relative to the server.
    #[must_use]
    pub fn should_force_refresh(
        &self,
        collection: &CollectionRid,
        previous: &CollectionRoutingMap,
    ) -> bool {
        self.cached_map(collection).map_or(true, |current| {
            current.change_feed_etag() == previous.change_feed_etag()
        })
    }

    /// Drops the cached entry for a collection, forcing the next access to
    /// perform a full load.
    ///
    /// # Panics
    ///
    /// Panics if the map table lock is poisoned.
    pub fn evict(&self, collection: &CollectionRid) {
        self.maps
            .write()
            .expect("map table lock poisoned")
            .remove(collection);
    }

    /// Returns the current routing map for a collection, refreshing it if
    /// necessary.
    ///
    /// A caller that suspects its copy is stale (e.g. a request came back
    /// signalling an unknown partition) passes it as `previous`; the cache
    /// refreshes unless it has already advanced past that copy. Passing
    /// `None` refreshes only on a miss.
    ///
    /// Concurrent calls for the same collection collapse into one refresh
    /// (single-flight); calls for different collections never wait on each
    /// other.
    ///
    /// Returns `Ok(None)` if no complete map could be produced even by a
    /// full reload.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Feed`] if the feed collaborator fails, and
    /// [`RoutingError::InconsistentTopology`] if the server describes
    /// overlapping ranges.
    pub async fn routing_map(
        &self,
        collection: &CollectionRid,
        previous: Option<&Arc<CollectionRoutingMap>>,
    ) -> RoutingResult<Option<Arc<CollectionRoutingMap>>> {
        // Fast unlocked read.
        if let Some(current) = self.cached_map(collection) {
            if !Self::is_presumed_stale(&current, previous) {
                return Ok(Some(current));
            }
        }

        let lock = self.refresh_lock(collection);
        let _guard = lock.lock().await;

        // Re-check under the lock: another caller may have just finished.
        let cached = self.cached_map(collection);
        if let Some(current) = &cached {
            if !Self::is_presumed_stale(current, previous) {
                return Ok(Some(current.clone()));
            }
        }

        self.refresh_via_feed(collection, cached).await
    }

    /// Returns the partitions overlapping any of the query ranges for a
    /// collection, refreshing the map if necessary.
    ///
    /// An empty query set returns empty without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::MapUnavailable`] if no complete map could be
    /// produced, plus the refresh errors of [`Self::routing_map`].
    pub async fn overlapping_ranges(
        &self,
        collection: &CollectionRid,
        query_ranges: &[KeyRange],
    ) -> RoutingResult<Vec<PartitionKeyRange>> {
        if query_ranges.is_empty() {
            return Ok(Vec::new());
        }
        if query_ranges.len() > QUERY_RANGES_MAX as usize {
            return Err(RoutingError::TooManyQueryRanges {
                count: query_ranges.len(),
                max: QUERY_RANGES_MAX,
            });
        }
        let map = self
            .routing_map(collection, None)
            .await?
            .ok_or_else(|| RoutingError::MapUnavailable {
                collection: collection.clone(),
            })?;
        Ok(map.overlapping(query_ranges))
    }

    /// Looks up a partition key range by id, loading the map on a cache
    /// miss. An absent id yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the refresh errors of [`Self::routing_map`].
    pub async fn range_by_id(
        &self,
        collection: &CollectionRid,
        id: &RangeId,
    ) -> RoutingResult<Option<PartitionKeyRange>> {
        let map = self.routing_map(collection, None).await?;
        Ok(map.and_then(|map| map.range_by_id(id).cloned()))
    }

    /// True when the cached snapshot has not advanced past the caller's
    /// copy, judged by change-feed etag equality.
    fn is_presumed_stale(
        current: &Arc<CollectionRoutingMap>,
        previous: Option<&Arc<CollectionRoutingMap>>,
    ) -> bool {
        previous.is_some_and(|previous| current.change_feed_etag() == previous.change_feed_etag())
    }

    /// Fetches or creates the refresh lock for a collection. The table's own
    /// guard is held only for this lookup.
    fn refresh_lock(&self, collection: &CollectionRid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().expect("lock table poisoned");
        locks
            .entry(collection.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Runs the refresh protocol while holding the collection lock.
    ///
    /// At most [`REFRESH_ATTEMPTS_MAX`] attempts: an incremental pass over
    /// the change feed against `previous`, then - if the delta cannot be
    /// reconciled - a full reload with the cached entry dropped. A full load
    /// never needs parent resolution against a prior map, so the fallback
    /// chain terminates.
    async fn refresh_via_feed(
        &self,
        collection: &CollectionRid,
        mut previous: Option<Arc<CollectionRoutingMap>>,
    ) -> RoutingResult<Option<Arc<CollectionRoutingMap>>> {
        for _attempt in 0..REFRESH_ATTEMPTS_MAX {
            let watermark = previous
                .as_deref()
                .and_then(CollectionRoutingMap::change_feed_etag)
                .filter(|etag| !etag.is_empty());
            let (records, etag) = self.drain_feed(collection, watermark).await?;

            let combined = match &previous {
                None => {
                    let pairs = records
                        .into_iter()
                        .map(|record| {
                            let info = RouteInfo::implicit(&record.id);
                            (record, info)
                        })
                        .collect();
                    CollectionRoutingMap::complete(pairs, collection.clone(), etag)?
                }
                Some(previous_map) => match Self::resolve_route_infos(previous_map, records) {
                    Some(pairs) => previous_map.try_combine(pairs, etag)?,
                    None => None,
                },
            };

            match combined {
                Some(map) => {
                    let map = Arc::new(map);
                    self.maps
                        .write()
                        .expect("map table lock poisoned")
                        .insert(collection.clone(), map.clone());
                    debug!(
                        collection = %collection,
                        ranges = map.len(),
                        etag = ?map.change_feed_etag(),
                        "installed routing map"
                    );
                    return Ok(Some(map));
                }
                None => {
                    if previous.is_none() {
                        // A full load came back incomplete; retrying the
                        // identical read is pointless.
                        warn!(collection = %collection, "full reload produced an incomplete cover");
                        return Ok(None);
                    }
                    warn!(
                        collection = %collection,
                        "incremental refresh could not be reconciled; reloading from scratch"
                    );
                    self.evict(collection);
                    previous = None;
                }
            }
        }
        Ok(None)
    }

    /// Drains all pages of the feed into a flat record list, capturing the
    /// last page's etag.
    async fn drain_feed(
        &self,
        collection: &CollectionRid,
        watermark: Option<&str>,
    ) -> RoutingResult<(Vec<PartitionKeyRange>, Option<String>)> {
        let mut options = match watermark {
            Some(etag) => FeedOptions::incremental(etag),
            None => FeedOptions::all(),
        };
        let mut records = Vec::new();
        let mut etag = None;
        loop {
            let page = self.feed.read_ranges(collection, &options).await?;
            records.extend(page.records);
            if page.etag.is_some() {
                etag = page.etag;
            }
            match page.continuation {
                Some(continuation) => options.continuation = Some(continuation),
                None => break,
            }
        }
        Ok((records, etag))
    }

    /// Recovers the route info for each incremental record from the
    /// previous map: a split product inherits its first parent's info, an
    /// unsplit survivor keeps its own. Any miss means the feed and the
    /// cached map disagree; the caller falls back to a full reload.
    fn resolve_route_infos(
        previous: &CollectionRoutingMap,
        records: Vec<PartitionKeyRange>,
    ) -> Option<Vec<(PartitionKeyRange, RouteInfo)>> {
        let mut pairs = Vec::with_capacity(records.len());
        for record in records {
            let source = match record.parents.first() {
                Some(parent) => previous.route_info_by_id(parent),
                None => previous.route_info_by_id(&record.id),
            };
            match source {
                Some(info) => {
                    let info = info.clone();
                    pairs.push((record, info));
                }
                None => return None,
            }
        }
        Some(pairs)
    }
}
