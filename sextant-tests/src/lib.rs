//! Sextant Tests - Integration tests for the routing layer.
//!
//! This crate contains the multi-component and concurrency tests for
//! Sextant. Tests are organized by component and type:
//!
//! ## Test Organization
//!
//! **Integration Tests** (`*_tests.rs`): Multi-component integration
//! - `routing_tests`: End-to-end split scenarios and smart-provider
//!   equivalence against the plain routing map
//! - `concurrency_tests`: Single-flight and lock-independence properties of
//!   the range cache, driven through the instrumented simulated feed
//! - `session_tests`: Session token reconciliation scenarios across
//!   topology changes
//!
//! **Support Modules**:
//! - `topologies`: Reusable topology builders for the simulated range feed
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod topologies;

#[cfg(test)]
mod session_tests;
