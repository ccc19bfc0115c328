//! Range feed abstraction.
//!
//! Provides the [`RangeFeed`] trait - the transport collaborator that serves
//! pages of partition key range records - and [`SimulatedRangeFeed`] for
//! deterministic simulation testing.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sextant_core::{CollectionRid, RangeId, FEED_PAGE_ALL};

use crate::error::{RoutingError, RoutingResult};
use crate::record::PartitionKeyRange;

// -----------------------------------------------------------------------------
// Range Feed Trait
// -----------------------------------------------------------------------------

/// Fetch parameters for one page of the partition key range feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    /// Requested page size; [`FEED_PAGE_ALL`] asks for everything at once.
    pub max_item_count: i32,
    /// If-none-match continuation: the previously observed etag, asking the
    /// server for only the changes since that watermark.
    pub if_none_match: Option<String>,
    /// Opaque in-feed continuation returned by the previous page.
    pub continuation: Option<String>,
}

impl FeedOptions {
    /// Options for a full read: all records in one pass.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            max_item_count: FEED_PAGE_ALL,
            if_none_match: None,
            continuation: None,
        }
    }

    /// Options for an incremental read since `etag`.
    #[must_use]
    pub fn incremental(etag: impl Into<String>) -> Self {
        Self {
            max_item_count: FEED_PAGE_ALL,
            if_none_match: Some(etag.into()),
            continuation: None,
        }
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self::all()
    }
}

/// One page of the partition key range feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPage {
    /// Raw records on this page.
    pub records: Vec<PartitionKeyRange>,
    /// New change-feed watermark for this fetch.
    pub etag: Option<String>,
    /// Continuation for the next page; `None` terminates the feed.
    pub continuation: Option<String>,
}

/// Transport collaborator serving the partition key range feed.
///
/// Retries, auth, and wire format are the implementation's concern; a
/// transport or server failure must propagate as an error, and this layer
/// never retries it.
#[async_trait]
pub trait RangeFeed: Send + Sync {
    /// Reads the next page of partition key range records for a collection.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Feed`] on any transport or server failure.
    async fn read_ranges(
        &self,
        collection: &CollectionRid,
        options: &FeedOptions,
    ) -> RoutingResult<FeedPage>;
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Fault configuration for the simulated range feed.
#[derive(Debug, Clone, Default)]
pub struct RangeFeedFaultConfig {
    /// Probability of read operations failing (0.0 - 1.0).
    pub read_fail_rate: f64,
    /// Force the next read to fail (one-shot).
    pub force_read_fail: bool,
}

impl RangeFeedFaultConfig {
    /// No faults (all reads succeed).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            read_fail_rate: 0.0,
            force_read_fail: false,
        }
    }

    /// Flaky configuration for stress testing.
    #[must_use]
    pub const fn flaky() -> Self {
        Self {
            read_fail_rate: 0.05,
            force_read_fail: false,
        }
    }

    /// Builder: set read fail rate.
    #[must_use]
    pub const fn with_read_fail_rate(mut self, rate: f64) -> Self {
        self.read_fail_rate = rate;
        self
    }
}

// -----------------------------------------------------------------------------
// Simulated Range Feed
// -----------------------------------------------------------------------------

/// One observable state of a collection's topology.
#[derive(Debug, Clone)]
struct FeedVersion {
    /// Watermark identifying this state.
    etag: String,
    /// Every live record at this state.
    full: Vec<PartitionKeyRange>,
    /// Records added or changed relative to the previous state.
    delta: Vec<PartitionKeyRange>,
}

/// Scripted topology history for one collection.
#[derive(Debug, Clone, Default)]
struct CollectionFeed {
    versions: Vec<FeedVersion>,
}

/// In-memory simulated range feed for DST.
///
/// Clones share state via `Arc` for multi-handle testing. Topology changes
/// are scripted as versioned snapshots keyed by etag; reads carrying a known
/// `if_none_match` watermark receive only the deltas recorded after it.
/// Supports deterministic fault injection and per-read instrumentation
/// (total reads, concurrent-read high-water mark) for single-flight
/// assertions.
#[derive(Debug, Clone)]
pub struct SimulatedRangeFeed {
    /// Scripted topologies by collection.
    collections: Arc<Mutex<HashMap<CollectionRid, CollectionFeed>>>,
    /// Fault configuration.
    fault_config: Arc<Mutex<RangeFeedFaultConfig>>,
    /// Artificial latency per read, to widen race windows in tests.
    read_delay: Arc<Mutex<Option<Duration>>>,
    /// Total reads served (including failures).
    reads: Arc<AtomicU64>,
    /// Reads currently in flight.
    in_flight: Arc<AtomicU64>,
    /// High-water mark of concurrent reads.
    max_in_flight: Arc<AtomicU64>,
    /// RNG seed for deterministic faults.
    seed: u64,
    /// Operation counter for deterministic RNG.
    counter: Arc<AtomicU64>,
}

impl SimulatedRangeFeed {
    /// Creates a new simulated feed with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, RangeFeedFaultConfig::none())
    }

    /// Creates a simulated feed with fault injection.
    #[must_use]
    pub fn with_faults(seed: u64, config: RangeFeedFaultConfig) -> Self {
        Self {
            collections: Arc::new(Mutex::new(HashMap::new())),
            fault_config: Arc::new(Mutex::new(config)),
            read_delay: Arc::new(Mutex::new(None)),
            reads: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            max_in_flight: Arc::new(AtomicU64::new(0)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns fault config for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, RangeFeedFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Seeds a collection's initial topology.
    ///
    /// # Panics
    ///
    /// Panics if the collection is already seeded or the mutex is poisoned.
    pub fn seed_collection(
        &self,
        collection: &CollectionRid,
        records: Vec<PartitionKeyRange>,
        etag: &str,
    ) {
        let mut collections = self.collections.lock().expect("collections lock poisoned");
        let previous = collections.insert(
            collection.clone(),
            CollectionFeed {
                versions: vec![FeedVersion {
                    etag: etag.to_string(),
                    full: records,
                    delta: Vec::new(),
                }],
            },
        );
        assert!(previous.is_none(), "collection already seeded");
    }

    /// Scripts a topology change: `delta` records supersede their parents.
    ///
    /// # Panics
    ///
    /// Panics if the collection was never seeded or the mutex is poisoned.
    pub fn push_topology(
        &self,
        collection: &CollectionRid,
        delta: Vec<PartitionKeyRange>,
        etag: &str,
    ) {
        let mut collections = self.collections.lock().expect("collections lock poisoned");
        let feed = collections
            .get_mut(collection)
            .expect("collection must be seeded before topology changes");
        let previous_full = &feed
            .versions
            .last()
            .expect("seeded collections have a version")
            .full;

        let superseded: Vec<RangeId> = delta
            .iter()
            .flat_map(|record| record.parents.iter().cloned())
            .collect();
        let mut full: Vec<PartitionKeyRange> = previous_full
            .iter()
            .filter(|record| {
                !superseded.contains(&record.id) && !delta.iter().any(|d| d.id == record.id)
            })
            .cloned()
            .collect();
        full.extend(delta.iter().cloned());

        feed.versions.push(FeedVersion {
            etag: etag.to_string(),
            full,
            delta,
        });
    }

    /// Sets an artificial per-read latency.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().expect("read delay lock poisoned") = Some(delay);
    }

    /// Total reads served so far.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// High-water mark of concurrent reads.
    #[must_use]
    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::Relaxed)
    }

    /// Deterministic RNG following the simulated-store pattern.
    ///
    /// Uses the `(seed + counter) * M` formula for reproducible fault
    /// injection.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    async fn read_inner(
        &self,
        collection: &CollectionRid,
        options: &FeedOptions,
    ) -> RoutingResult<FeedPage> {
        assert!(
            options.max_item_count == FEED_PAGE_ALL || options.max_item_count > 0,
            "page size must be positive or the all-at-once sentinel"
        );

        let delay = *self.read_delay.lock().expect("read delay lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Check for forced failure.
        {
            let mut config = self.fault_config.lock().expect("lock poisoned");
            if config.force_read_fail {
                config.force_read_fail = false;
                return Err(RoutingError::Feed {
                    operation: "read_ranges",
                    message: "simulated failure (forced)".into(),
                });
            }
        }

        // Check for probabilistic failure.
        let read_fail_rate = self.fault_config.lock().expect("lock").read_fail_rate;
        if self.should_inject_fault(read_fail_rate) {
            return Err(RoutingError::Feed {
                operation: "read_ranges",
                message: "simulated failure (random)".into(),
            });
        }

        let collections = self.collections.lock().expect("collections lock poisoned");
        let feed = collections
            .get(collection)
            .ok_or_else(|| RoutingError::Feed {
                operation: "read_ranges",
                message: format!("unknown collection {collection}"),
            })?;
        let latest = feed.versions.last().expect("seeded");

        let records: Vec<PartitionKeyRange> = match &options.if_none_match {
            Some(watermark) => match feed.versions.iter().position(|v| v.etag == *watermark) {
                // Known watermark: everything recorded after it.
                Some(position) => feed.versions[position + 1..]
                    .iter()
                    .flat_map(|v| v.delta.iter().cloned())
                    .collect(),
                // Unknown watermark: serve the full current state.
                None => latest.full.clone(),
            },
            None => latest.full.clone(),
        };

        // Serve one page of the computed record set.
        let offset: usize = match &options.continuation {
            Some(token) => token.parse().map_err(|_| RoutingError::Feed {
                operation: "read_ranges",
                message: format!("malformed continuation {token:?}"),
            })?,
            None => 0,
        };
        let (page, continuation) = if options.max_item_count == FEED_PAGE_ALL {
            (records, None)
        } else {
            #[allow(clippy::cast_sign_loss)]
            let page_size = options.max_item_count as usize;
            let end = records.len().min(offset + page_size);
            let continuation = (end < records.len()).then(|| end.to_string());
            (records[offset.min(records.len())..end].to_vec(), continuation)
        };

        Ok(FeedPage {
            records: page,
            etag: Some(latest.etag.clone()),
            continuation,
        })
    }
}

#[async_trait]
impl RangeFeed for SimulatedRangeFeed {
    async fn read_ranges(
        &self,
        collection: &CollectionRid,
        options: &FeedOptions,
    ) -> RoutingResult<FeedPage> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::Relaxed);

        let result = self.read_inner(collection, options).await;

        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, min: &str, max: &str) -> PartitionKeyRange {
        PartitionKeyRange::new(id, min, max)
    }

    fn seeded_feed() -> (SimulatedRangeFeed, CollectionRid) {
        let feed = SimulatedRangeFeed::new(42);
        let collection = CollectionRid::new("coll-1");
        feed.seed_collection(
            &collection,
            vec![record("0", "", "7F"), record("1", "7F", "FF")],
            "etag-1",
        );
        (feed, collection)
    }

    #[tokio::test]
    async fn test_full_read() {
        let (feed, collection) = seeded_feed();
        let page = feed
            .read_ranges(&collection, &FeedOptions::all())
            .await
            .expect("read succeeds");

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.etag.as_deref(), Some("etag-1"));
        assert!(page.continuation.is_none());
    }

    #[tokio::test]
    async fn test_incremental_read_serves_delta_only() {
        let (feed, collection) = seeded_feed();
        feed.push_topology(
            &collection,
            vec![
                record("2", "7F", "BF").with_parents(vec![RangeId::new("1")]),
                record("3", "BF", "FF").with_parents(vec![RangeId::new("1")]),
            ],
            "etag-2",
        );

        let page = feed
            .read_ranges(&collection, &FeedOptions::incremental("etag-1"))
            .await
            .expect("read succeeds");
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.etag.as_deref(), Some("etag-2"));

        // Already at the latest watermark: nothing to report.
        let page = feed
            .read_ranges(&collection, &FeedOptions::incremental("etag-2"))
            .await
            .expect("read succeeds");
        assert!(page.records.is_empty());
        assert_eq!(page.etag.as_deref(), Some("etag-2"));
    }

    #[tokio::test]
    async fn test_unknown_watermark_serves_full_state() {
        let (feed, collection) = seeded_feed();
        let page = feed
            .read_ranges(&collection, &FeedOptions::incremental("bogus"))
            .await
            .expect("read succeeds");
        assert_eq!(page.records.len(), 2);
    }

    #[tokio::test]
    async fn test_paged_read() {
        let (feed, collection) = seeded_feed();
        let mut options = FeedOptions {
            max_item_count: 1,
            if_none_match: None,
            continuation: None,
        };

        let first = feed
            .read_ranges(&collection, &options)
            .await
            .expect("read succeeds");
        assert_eq!(first.records.len(), 1);
        let continuation = first.continuation.expect("more pages");

        options.continuation = Some(continuation);
        let second = feed
            .read_ranges(&collection, &options)
            .await
            .expect("read succeeds");
        assert_eq!(second.records.len(), 1);
        assert!(second.continuation.is_none());
        assert_ne!(first.records[0].id, second.records[0].id);
    }

    #[tokio::test]
    async fn test_forced_failure_is_one_shot() {
        let (feed, collection) = seeded_feed();
        feed.fault_config().force_read_fail = true;

        let err = feed
            .read_ranges(&collection, &FeedOptions::all())
            .await
            .expect_err("forced failure");
        assert!(matches!(err, RoutingError::Feed { .. }));

        // Next read succeeds.
        assert!(feed.read_ranges(&collection, &FeedOptions::all()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_collection_is_a_feed_error() {
        let feed = SimulatedRangeFeed::new(42);
        let err = feed
            .read_ranges(&CollectionRid::new("nope"), &FeedOptions::all())
            .await
            .expect_err("unknown collection");
        assert!(matches!(err, RoutingError::Feed { .. }));
    }

    #[tokio::test]
    async fn test_read_counters() {
        let (feed, collection) = seeded_feed();
        assert_eq!(feed.read_count(), 0);
        let _ = feed.read_ranges(&collection, &FeedOptions::all()).await;
        let _ = feed.read_ranges(&collection, &FeedOptions::all()).await;
        assert_eq!(feed.read_count(), 2);
        assert!(feed.max_in_flight() >= 1);
    }
}
