//! Sextant Session - Session token grammar and reconciliation.
//!
//! A session token is a per-partition progress marker used to bound read
//! staleness relative to a client's own prior writes. Partition range ids
//! are not stable across splits, so reconciling tokens recorded against
//! different partition layouts must operate on key ranges, not ids; that
//! reconciliation is [`latest_session_token`].
//!
//! # Token Grammar
//!
//! ```text
//! token     := part ("," part)*
//! part      := <range id> ":" vector
//! vector    := <version> "#" <global lsn> ("#" <region id> "=" <local lsn>)*
//! ```
//!
//! A token with several comma-joined parts is "compound": its parts cover
//! disjoint sub-ranges of the range it was recorded against.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod reconciler;
mod token;

pub use error::{SessionError, SessionResult};
pub use reconciler::latest_session_token;
pub use token::{RangeToken, SessionToken, VectorTimestamp};
