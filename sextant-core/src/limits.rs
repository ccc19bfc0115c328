//! System limits and protocol sentinels.
//!
//! Following TigerStyle: put limits on everything. Every retry loop and
//! collection-sized structure has an explicit bound.

/// Maximum refresh attempts per cache miss: one incremental pass, then one
/// full reload. A full reload never needs parent resolution against a prior
/// map, so the fallback chain terminates here.
pub const REFRESH_ATTEMPTS_MAX: u32 = 2;

/// Page-size sentinel asking the range feed for all records at once.
pub const FEED_PAGE_ALL: i32 = -1;

/// Maximum number of partition key ranges tracked for a single collection.
pub const PARTITIONS_PER_COLLECTION_MAX: u32 = 65_536;

/// Maximum number of query ranges accepted by a single overlap lookup.
pub const QUERY_RANGES_MAX: u32 = 65_536;
