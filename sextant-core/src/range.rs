//! Key-range interval algebra.
//!
//! Ranges are intervals over lexicographically ordered key strings
//! (hex-encoded effective partition keys in practice, though the algebra is
//! key-agnostic). Every operation is pure: a `KeyRange` is never mutated
//! after construction and all transforms return new values.

use std::fmt;

/// Minimum sentinel of the universal key space (inclusive).
pub const EFFECTIVE_KEY_MIN: &str = "";

/// Maximum sentinel of the universal key space (exclusive).
pub const EFFECTIVE_KEY_MAX: &str = "FF";

/// An interval over ordered key strings, with per-bound inclusivity.
///
/// A range with `min == max` and both bounds inclusive holds exactly one
/// value; with `min == max` and either bound exclusive it is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    /// Lower bound.
    pub min: String,
    /// Upper bound.
    pub max: String,
    /// Whether `min` itself is part of the range.
    pub min_inclusive: bool,
    /// Whether `max` itself is part of the range.
    pub max_inclusive: bool,
}

impl KeyRange {
    /// Creates a new range.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    #[must_use]
    pub fn new(
        min: impl Into<String>,
        max: impl Into<String>,
        min_inclusive: bool,
        max_inclusive: bool,
    ) -> Self {
        let min = min.into();
        let max = max.into();
        assert!(min <= max, "key range min must be <= max");
        Self {
            min,
            max,
            min_inclusive,
            max_inclusive,
        }
    }

    /// The universal key space `[EFFECTIVE_KEY_MIN, EFFECTIVE_KEY_MAX)`.
    #[must_use]
    pub fn universal() -> Self {
        Self::new(EFFECTIVE_KEY_MIN, EFFECTIVE_KEY_MAX, true, false)
    }

    /// Returns true if the range contains no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min == self.max && !(self.min_inclusive && self.max_inclusive)
    }

    /// Returns true if the range holds exactly one value.
    #[must_use]
    pub fn is_single_value(&self) -> bool {
        self.min == self.max && self.min_inclusive && self.max_inclusive
    }

    /// Boundary test honoring the inclusivity flags on both ends.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        let above_min = if self.min_inclusive {
            value >= self.min.as_str()
        } else {
            value > self.min.as_str()
        };
        let below_max = if self.max_inclusive {
            value <= self.max.as_str()
        } else {
            value < self.max.as_str()
        };
        above_min && below_max
    }

    /// Symmetric overlap test.
    ///
    /// False if either range is empty. Two ranges that merely touch at a
    /// boundary overlap only when both touching sides include the boundary
    /// point.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.min <= other.max && other.min <= self.max {
            if self.min == other.max && !(self.min_inclusive && other.max_inclusive) {
                return false;
            }
            if other.min == self.max && !(other.min_inclusive && self.max_inclusive) {
                return false;
            }
            return true;
        }
        false
    }

    /// Canonicalizes to min-inclusive/max-exclusive form.
    ///
    /// An exclusive min is nudged up by one minimal key unit, as is an
    /// inclusive max, so two differently-inclusive ranges can be compared
    /// for subset/merge purely on endpoints. Empty ranges canonicalize to an
    /// empty range at their lower bound.
    #[must_use]
    pub fn normalize(&self) -> Self {
        if self.is_empty() {
            return Self {
                min: self.min.clone(),
                max: self.min.clone(),
                min_inclusive: true,
                max_inclusive: false,
            };
        }
        if self.min_inclusive && !self.max_inclusive {
            return self.clone();
        }
        let min = if self.min_inclusive {
            self.min.clone()
        } else {
            next_key(&self.min)
        };
        let max = if self.max_inclusive {
            next_key(&self.max)
        } else {
            self.max.clone()
        };
        // A nudge at the top of the key space can collapse the range.
        if min > max {
            return Self {
                min: max.clone(),
                max,
                min_inclusive: true,
                max_inclusive: false,
            };
        }
        Self {
            min,
            max,
            min_inclusive: true,
            max_inclusive: false,
        }
    }

    /// Returns true if `self` is contained in `parent`, compared on
    /// normalized endpoints.
    #[must_use]
    pub fn is_subset(&self, parent: &Self) -> bool {
        let this = self.normalize();
        let parent = parent.normalize();
        this.min >= parent.min && this.max <= parent.max
    }

    /// Returns true if `self` and `other` can be merged into one contiguous
    /// range: they overlap, or they touch at a boundary that at least one
    /// side includes, or both hold the same single value.
    #[must_use]
    pub fn can_merge(&self, other: &Self) -> bool {
        if self.overlaps(other) {
            return true;
        }
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.max == other.min && (self.max_inclusive || other.min_inclusive) {
            return true;
        }
        if other.max == self.min && (other.max_inclusive || self.min_inclusive) {
            return true;
        }
        self.is_single_value() && other.is_single_value() && self.min == other.min
    }

    /// Merges two ranges into their envelope, taking the more permissive
    /// inclusivity flag at each surviving boundary.
    ///
    /// Returns `None` if the ranges are not mergeable (see [`Self::can_merge`]).
    #[must_use]
    pub fn merge(&self, other: &Self) -> Option<Self> {
        if !self.can_merge(other) {
            return None;
        }
        let (min, min_inclusive) = match self.min.cmp(&other.min) {
            std::cmp::Ordering::Less => (self.min.clone(), self.min_inclusive),
            std::cmp::Ordering::Greater => (other.min.clone(), other.min_inclusive),
            std::cmp::Ordering::Equal => {
                (self.min.clone(), self.min_inclusive || other.min_inclusive)
            }
        };
        let (max, max_inclusive) = match self.max.cmp(&other.max) {
            std::cmp::Ordering::Greater => (self.max.clone(), self.max_inclusive),
            std::cmp::Ordering::Less => (other.max.clone(), other.max_inclusive),
            std::cmp::Ordering::Equal => {
                (self.max.clone(), self.max_inclusive || other.max_inclusive)
            }
        };
        Some(Self {
            min,
            max,
            min_inclusive,
            max_inclusive,
        })
    }

    /// Returns the remainder of `self` above `cut`'s upper bound.
    ///
    /// Used to advance a decomposition scan: after a partition covering
    /// `cut` has been resolved, only the part of `self` beyond it still
    /// needs a lookup. The remainder includes `cut.max` itself exactly when
    /// `cut` excludes it. Collapses to an empty range when `cut` reaches or
    /// passes `self.max`.
    #[must_use]
    pub fn subtract(&self, cut: &Self) -> Self {
        let (min, min_inclusive) = match cut.max.as_str().cmp(&self.min) {
            std::cmp::Ordering::Less => (self.min.clone(), self.min_inclusive),
            std::cmp::Ordering::Equal => {
                (self.min.clone(), self.min_inclusive && !cut.max_inclusive)
            }
            std::cmp::Ordering::Greater => (cut.max.clone(), !cut.max_inclusive),
        };
        if min > self.max {
            return Self {
                min: self.max.clone(),
                max: self.max.clone(),
                min_inclusive: true,
                max_inclusive: false,
            };
        }
        Self {
            min,
            max: self.max.clone(),
            min_inclusive,
            max_inclusive: self.max_inclusive,
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.min_inclusive { '[' } else { '(' };
        let close = if self.max_inclusive { ']' } else { ')' };
        write!(f, "{}{:?},{:?}{}", open, self.min, self.max, close)
    }
}

/// Returns the smallest representable key strictly greater than `key`,
/// stepping by one unit of the hex alphabet: the last digit not already at
/// the boundary is incremented, carrying left. A key whose digits are all at
/// the boundary saturates (returned unchanged).
///
/// Keys outside the uppercase hex alphabet (never produced by effective
/// partition key encoding) fall back to appending the minimum digit, which
/// is the immediate lexicographic successor for any string.
fn next_key(key: &str) -> String {
    if !key.bytes().all(|digit| matches!(digit, b'0'..=b'9' | b'A'..=b'F')) {
        return format!("{key}0");
    }
    let mut digits: Vec<u8> = key.bytes().collect();
    for index in (0..digits.len()).rev() {
        match hex_increment(digits[index]) {
            Some(incremented) => {
                digits[index] = incremented;
                return String::from_utf8(digits).expect("hex digits are valid UTF-8");
            }
            None => {
                digits[index] = b'0';
            }
        }
    }
    // Every digit carried: saturate at the top of the key space.
    key.to_string()
}

/// Increments a single hex digit, returning `None` at the `F` boundary.
const fn hex_increment(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'8' | b'A'..=b'E' => Some(digit + 1),
        b'9' => Some(b'A'),
        _ => None,
    }
}
