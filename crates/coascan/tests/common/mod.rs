//! Shared test utilities for coascan integration tests.
//!
//! - `TestHarness` wires a file-backed database, a filesystem blob store and
//!   every pipeline component inside one temp directory
//! - builders for documents and dispatcher settings

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
