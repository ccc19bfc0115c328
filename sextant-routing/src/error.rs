//! Routing error types.

use sextant_core::{CollectionRid, RangeId};
use thiserror::Error;

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors that can occur in routing operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The server described overlapping partition key ranges. Retrying the
    /// same malformed topology is pointless, so this is never retried
    /// internally.
    #[error("inconsistent partition topology for collection {collection}: ranges {first} and {second} overlap")]
    InconsistentTopology {
        /// The collection whose topology is inconsistent.
        collection: CollectionRid,
        /// First of the overlapping pair, in min order.
        first: RangeId,
        /// Second of the overlapping pair, in min order.
        second: RangeId,
    },

    /// Query ranges handed to the smart provider must be sorted ascending
    /// and pairwise non-overlapping.
    #[error("query ranges must be sorted and non-overlapping")]
    UnsortedQueryRanges,

    /// Too many query ranges in a single lookup.
    #[error("too many query ranges: {count} > {max}")]
    TooManyQueryRanges {
        /// Number of ranges supplied.
        count: usize,
        /// Maximum allowed.
        max: u32,
    },

    /// No complete routing map could be produced for the collection, even
    /// after falling back to a full reload.
    #[error("no routing map available for collection {collection}")]
    MapUnavailable {
        /// The collection that could not be mapped.
        collection: CollectionRid,
    },

    /// The range feed collaborator failed. Propagated unchanged; retries
    /// belong to the transport layer.
    #[error("range feed failed: {operation}: {message}")]
    Feed {
        /// The operation that failed.
        operation: &'static str,
        /// Error message from the collaborator.
        message: String,
    },
}
