//! Sextant Routing - Partition routing maps and the range cache.
//!
//! This crate maps requested key ranges of a collection onto the physical
//! partition key ranges that currently hold the data, and keeps that mapping
//! fresh as the server splits or merges partitions.
//!
//! # Design (TigerStyle)
//!
//! - **Immutable snapshots**: A [`CollectionRoutingMap`] is never mutated;
//!   refreshes install a replacement
//! - **Single-flight refresh**: At most one refresh in flight per collection
//! - **Explicit limits**: Bounded fallback loops, bounded map sizes

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cache;
mod error;
mod feed;
mod record;
mod routing_map;
mod smart_provider;

pub use cache::PartitionKeyRangeCache;
pub use error::{RoutingError, RoutingResult};
pub use feed::{FeedOptions, FeedPage, RangeFeed, RangeFeedFaultConfig, SimulatedRangeFeed};
pub use record::PartitionKeyRange;
pub use routing_map::CollectionRoutingMap;
pub use smart_provider::SmartRoutingMapProvider;
