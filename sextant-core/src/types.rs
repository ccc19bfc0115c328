//! Strongly-typed identifiers for Sextant entities.
//!
//! Following TigerStyle: explicit types prevent bugs from mixing up IDs.
//! Identifiers here are server-issued opaque strings, so the wrappers carry
//! `String` payloads rather than integers.

use std::fmt;

/// Macro to generate strongly-typed string ID wrappers.
///
/// Each ID type wraps a `String` and provides:
/// - Type safety (can't mix `CollectionRid` with `RangeId`)
/// - Debug/Display formatting
/// - Cheap borrowing via `as_str`
macro_rules! define_string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the raw string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_string_id!(
    CollectionRid,
    "Unique resource id of a collection (the owner of a routing map)."
);
define_string_id!(
    RangeId,
    "Unique identifier of a partition key range within a collection."
);
define_string_id!(
    RouteInfo,
    "Opaque routing association for a partition key range (e.g. a physical endpoint identity)."
);

impl RouteInfo {
    /// Derives a stable placeholder identity for a range the feed did not
    /// tag explicitly. Children of a split inherit their parent's identity,
    /// so this is only minted on full loads.
    #[must_use]
    pub fn implicit(range_id: &RangeId) -> Self {
        Self(format!("range/{}", range_id.as_str()))
    }
}
