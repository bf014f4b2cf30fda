//! Language-specific event sources.
//!
//! Each language module turns a parsed syntax tree into the declaration and
//! invocation events consumed by the call-graph builder.

pub mod java;

pub use java::JavaExtractor;
