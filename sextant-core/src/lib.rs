//! Sextant Core - Typed identifiers and the key-range algebra.
//!
//! This crate provides the leaf types shared by the routing and session
//! layers: strongly-typed string identifiers, the universal key-space
//! sentinels, explicit limits, and the half-open interval algebra over
//! hex-encoded effective partition keys.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: Prevent mixing up a collection rid with a
//!   partition range id
//! - **Immutable values**: Every range transform returns a new value
//! - **Explicit limits**: Every resource has a bounded maximum
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod limits;
mod range;
mod types;

pub use limits::{
    FEED_PAGE_ALL, PARTITIONS_PER_COLLECTION_MAX, QUERY_RANGES_MAX, REFRESH_ATTEMPTS_MAX,
};
pub use range::{KeyRange, EFFECTIVE_KEY_MAX, EFFECTIVE_KEY_MIN};
pub use types::{CollectionRid, RangeId, RouteInfo};
