//! Reusable topology builders for the simulated range feed.

use sextant_core::{CollectionRid, RangeId};
use sextant_routing::{PartitionKeyRange, SimulatedRangeFeed};

/// Shorthand for a parentless record.
#[must_use]
pub fn record(id: &str, min: &str, max: &str) -> PartitionKeyRange {
    PartitionKeyRange::new(id, min, max)
}

/// Shorthand for a split product superseding one parent.
#[must_use]
pub fn child(id: &str, min: &str, max: &str, parent: &str) -> PartitionKeyRange {
    PartitionKeyRange::new(id, min, max).with_parents(vec![RangeId::new(parent)])
}

/// Seeds the two-partition base topology `["", "A")`, `["A", "FF")` used by
/// the split scenarios, under watermark `etag-1`.
pub fn seed_two_way(feed: &SimulatedRangeFeed, collection: &CollectionRid) {
    feed.seed_collection(
        collection,
        vec![record("0", "", "A"), record("1", "A", "FF")],
        "etag-1",
    );
}

/// Builds `count` equal partitions over 2-digit hex keys, ids `"0"..`.
///
/// # Panics
///
/// Panics if `count` is zero or does not divide the key space evenly.
#[must_use]
pub fn uniform(count: u32) -> Vec<PartitionKeyRange> {
    assert!(count > 0 && 0xF0 % count == 0, "count must divide 0xF0");
    let width = 0xF0 / count;
    (0..count)
        .map(|index| {
            let min = if index == 0 {
                String::new()
            } else {
                format!("{:02X}", index * width)
            };
            let max = if index == count - 1 {
                "FF".to_string()
            } else {
                format!("{:02X}", (index + 1) * width)
            };
            record(&format!("{index}"), &min, &max)
        })
        .collect()
}
