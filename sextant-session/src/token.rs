//! Session token value types: vector timestamps, per-range tokens, and the
//! compound token grammar.

use std::collections::BTreeMap;
use std::fmt;

use sextant_core::RangeId;

use crate::error::{SessionError, SessionResult};

// -----------------------------------------------------------------------------
// Vector Timestamp
// -----------------------------------------------------------------------------

/// Versioned progress counters for one partition.
///
/// The `version` bumps when the partition's replica set is reconfigured; the
/// global LSN tracks overall progress, and the optional per-region LSNs track
/// progress of geo-replicated writes. Textual form:
/// `<version>#<globalLsn>[#<regionId>=<localLsn>]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorTimestamp {
    version: i64,
    global_lsn: i64,
    local_lsn_by_region: BTreeMap<u32, i64>,
}

impl VectorTimestamp {
    /// Creates a timestamp with no per-region counters.
    #[must_use]
    pub const fn new(version: i64, global_lsn: i64) -> Self {
        Self {
            version,
            global_lsn,
            local_lsn_by_region: BTreeMap::new(),
        }
    }

    /// Builder: sets a per-region counter.
    #[must_use]
    pub fn with_local_lsn(mut self, region: u32, lsn: i64) -> Self {
        self.local_lsn_by_region.insert(region, lsn);
        self
    }

    /// Parses the `version#globalLsn[#region=lsn]*` grammar.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MalformedToken`] on any deviation from the
    /// grammar.
    pub fn parse(text: &str) -> SessionResult<Self> {
        let malformed = || SessionError::MalformedToken {
            token: text.to_string(),
        };
        let mut segments = text.split('#');
        let version = segments
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(malformed)?;
        let global_lsn = segments
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(malformed)?;
        let mut local_lsn_by_region = BTreeMap::new();
        for segment in segments {
            let (region, lsn) = segment.split_once('=').ok_or_else(malformed)?;
            let region = region.parse().map_err(|_| malformed())?;
            let lsn = lsn.parse().map_err(|_| malformed())?;
            local_lsn_by_region.insert(region, lsn);
        }
        Ok(Self {
            version,
            global_lsn,
            local_lsn_by_region,
        })
    }

    /// Replica-set version.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Global progress counter.
    #[must_use]
    pub const fn global_lsn(&self) -> i64 {
        self.global_lsn
    }

    /// Merges two timestamps into the structurally-greatest one:
    /// component-wise maxima over the union of counters.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut local_lsn_by_region = self.local_lsn_by_region.clone();
        for (&region, &lsn) in &other.local_lsn_by_region {
            local_lsn_by_region
                .entry(region)
                .and_modify(|existing| *existing = (*existing).max(lsn))
                .or_insert(lsn);
        }
        Self {
            version: self.version.max(other.version),
            global_lsn: self.global_lsn.max(other.global_lsn),
            local_lsn_by_region,
        }
    }
}

impl fmt::Display for VectorTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.version, self.global_lsn)?;
        for (region, lsn) in &self.local_lsn_by_region {
            write!(f, "#{region}={lsn}")?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Range Token
// -----------------------------------------------------------------------------

/// A progress marker for one partition key range: `<rangeId>:<vector>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeToken {
    /// The partition range the marker was recorded against.
    pub range_id: RangeId,
    /// The progress counters.
    pub vector: VectorTimestamp,
}

impl RangeToken {
    /// Creates a range token.
    #[must_use]
    pub fn new(range_id: impl Into<RangeId>, vector: VectorTimestamp) -> Self {
        Self {
            range_id: range_id.into(),
            vector,
        }
    }

    /// Parses the `<rangeId>:<vector>` form.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MalformedToken`] if the separator or either
    /// side is malformed.
    pub fn parse(text: &str) -> SessionResult<Self> {
        let (range_id, vector) = text.split_once(':').ok_or_else(|| {
            SessionError::MalformedToken {
                token: text.to_string(),
            }
        })?;
        if range_id.is_empty() {
            return Err(SessionError::MalformedToken {
                token: text.to_string(),
            });
        }
        Ok(Self {
            range_id: RangeId::new(range_id),
            vector: VectorTimestamp::parse(vector)?,
        })
    }

    /// Merges two markers for the same logical partition. The counters take
    /// their component-wise maxima; the owning id follows the side with the
    /// greater global LSN, since ids can drift across splits while the
    /// underlying partition persists.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let range_id = if other.vector.global_lsn() > self.vector.global_lsn() {
            other.range_id.clone()
        } else {
            self.range_id.clone()
        };
        Self {
            range_id,
            vector: self.vector.merge(&other.vector),
        }
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.range_id, self.vector)
    }
}

// -----------------------------------------------------------------------------
// Session Token
// -----------------------------------------------------------------------------

/// A session token: one or more per-range markers covering disjoint
/// sub-ranges of the range it was recorded against. A single surviving
/// marker renders bare; several render comma-joined ("compound").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    parts: Vec<RangeToken>,
}

impl SessionToken {
    /// Creates a token with a single marker.
    #[must_use]
    pub fn single(part: RangeToken) -> Self {
        Self { parts: vec![part] }
    }

    /// Creates a token from markers.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty.
    #[must_use]
    pub fn compound(parts: Vec<RangeToken>) -> Self {
        assert!(!parts.is_empty(), "a session token has at least one part");
        Self { parts }
    }

    /// Parses a comma-joined token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MalformedToken`] if the text is empty or any
    /// part is malformed.
    pub fn parse(text: &str) -> SessionResult<Self> {
        if text.is_empty() {
            return Err(SessionError::MalformedToken {
                token: text.to_string(),
            });
        }
        let parts = text
            .split(',')
            .map(RangeToken::parse)
            .collect::<SessionResult<Vec<RangeToken>>>()?;
        Ok(Self { parts })
    }

    /// The per-range markers in order.
    #[must_use]
    pub fn parts(&self) -> &[RangeToken] {
        &self.parts
    }

    /// Consumes the token into its markers.
    #[must_use]
    pub fn into_parts(self) -> Vec<RangeToken> {
        self.parts
    }

    /// True when the token carries markers for more than one range.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        self.parts.len() > 1
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, part) in self.parts.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_parse_round_trip() {
        let cases = ["1#100", "1#100#1=90", "2#500#1=450#2=480", "-1#0"];
        for text in cases {
            let parsed = VectorTimestamp::parse(text).expect("valid vector");
            assert_eq!(parsed.to_string(), text, "round trip of {text}");
        }
    }

    #[test]
    fn test_vector_parse_rejects_garbage() {
        for text in ["", "1", "a#b", "1#2#nonsense", "1#2#3", "1#2#x=1", "1#2#1="] {
            assert!(
                VectorTimestamp::parse(text).is_err(),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_vector_merge_takes_componentwise_maxima() {
        let a = VectorTimestamp::new(1, 100)
            .with_local_lsn(1, 90)
            .with_local_lsn(2, 80);
        let b = VectorTimestamp::new(2, 90)
            .with_local_lsn(1, 95)
            .with_local_lsn(3, 70);
        let merged = a.merge(&b);
        assert_eq!(
            merged,
            VectorTimestamp::new(2, 100)
                .with_local_lsn(1, 95)
                .with_local_lsn(2, 80)
                .with_local_lsn(3, 70)
        );
        // Symmetric.
        assert_eq!(merged, b.merge(&a));
    }

    #[test]
    fn test_vector_merge_is_idempotent() {
        let a = VectorTimestamp::new(1, 100).with_local_lsn(1, 90);
        assert_eq!(a.merge(&a), a);
    }

    #[test]
    fn test_range_token_parse_and_display() {
        let token = RangeToken::parse("7:1#100#1=90").expect("valid token");
        assert_eq!(token.range_id, RangeId::new("7"));
        assert_eq!(token.vector, VectorTimestamp::new(1, 100).with_local_lsn(1, 90));
        assert_eq!(token.to_string(), "7:1#100#1=90");

        assert!(RangeToken::parse("no-separator").is_err());
        assert!(RangeToken::parse(":1#100").is_err());
    }

    #[test]
    fn test_range_token_merge_id_follows_greater_global_lsn() {
        let older = RangeToken::new("7", VectorTimestamp::new(1, 100));
        let newer = RangeToken::new("9", VectorTimestamp::new(1, 200));

        let merged = older.merge(&newer);
        assert_eq!(merged.range_id, RangeId::new("9"));
        assert_eq!(merged.vector.global_lsn(), 200);

        // On equal global progress, the receiver's id wins.
        let tied = RangeToken::new("9", VectorTimestamp::new(1, 100));
        assert_eq!(older.merge(&tied).range_id, RangeId::new("7"));
    }

    #[test]
    fn test_session_token_parse_and_display() {
        let single = SessionToken::parse("7:1#100").expect("valid");
        assert!(!single.is_compound());
        assert_eq!(single.to_string(), "7:1#100");

        let compound = SessionToken::parse("7:1#100,9:1#200#1=150").expect("valid");
        assert!(compound.is_compound());
        assert_eq!(compound.parts().len(), 2);
        assert_eq!(compound.to_string(), "7:1#100,9:1#200#1=150");

        assert!(SessionToken::parse("").is_err());
        assert!(SessionToken::parse("7:1#100,").is_err());
    }
}
