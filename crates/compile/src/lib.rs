//! teleq-compile: query compilation and execution.
//!
//! The terminal stages of the server pipeline plus the two public
//! entry points:
//!
//! - [`compile_streaming_query`] -- verified, bound, erased, compiled
//!   query returning an element stream per call
//! - [`compile_single_query`] -- same, for single asynchronous results
//!
//! Compilation is a tree-walking evaluator closing over the final tree;
//! no host code generation is involved.

pub mod interp;
pub mod pipeline;
pub mod query;

pub use pipeline::{compile_single_query, compile_streaming_query};
pub use query::{CompiledSingleQuery, CompiledStreamingQuery};
