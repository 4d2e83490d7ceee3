//! teleq-client: query normalization before transmission.
//!
//! The client builds a query tree by quoting, then normalizes it into
//! the form the server's pipeline expects:
//!
//! 1. [`rewrite_resource_calls`] — `QueryClient.resource` entry points
//!    become unbound parameters, one fresh identity per occurrence
//! 2. [`partially_evaluate`] — closed subtrees fold to constants
//! 3. [`flatten_records`] — anonymous records become positional tuples
//!
//! [`wire`] then carries the result as JSON. Decoding re-mints every
//! parameter identity, so sender ids never leak into the local
//! identity space.

pub mod flatten;
pub mod partial;
pub mod resource;
pub mod wire;

pub use flatten::flatten_records;
pub use partial::partially_evaluate;
pub use resource::{resource_call, resource_factory_call, rewrite_resource_calls};
pub use wire::{from_json, from_wire, to_json, to_wire, WireError, WireExpr};

use std::sync::Arc;
use teleq_core::expr::Expr;

/// Run the full normalization sequence on a quoted query tree.
pub fn normalize(tree: &Arc<Expr>) -> Arc<Expr> {
    let tree = rewrite_resource_calls(tree);
    let tree = partially_evaluate(&tree);
    flatten_records(&tree)
}
