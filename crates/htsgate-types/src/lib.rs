//! Pure data types for htsgate — formats, queries, pipeline outcomes, and
//! redirect-manifest tickets.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It
//! exists so that consumers (the engine, the server controller, the walker
//! client) can share the gateway's data contract without pulling in the
//! engine's process and HTTP machinery.

pub mod format;
pub mod manifest;
pub mod outcome;
pub mod query;

// Flat re-exports for convenience
pub use format::*;
pub use manifest::*;
pub use outcome::*;
pub use query::*;
