//! teleq-bind: name resolution, authorization, and the bound-tree
//! rewrites.
//!
//! The middle of the server pipeline, in stage order:
//!
//! - [`bind_methods`] -- unbound parameter → source description, by name
//! - [`authorize`] -- combined policy evaluation (the one async stage)
//! - [`bind_invocations`] -- source description → invocation factory,
//!   with synthetic-parameter injection
//! - [`rewrite_bindings`] -- parameter invocations → source invocations
//! - [`erase_streaming`] / [`erase_single`] -- result-shape erasure

pub mod authorize;
pub mod invocations;
pub mod methods;
pub mod rewrite;
pub mod shape;

pub use authorize::{authorize, Claims, GrantedPolicyEvaluator, PolicyDecision, PolicyEvaluator};
pub use invocations::{bind_invocations, InvocationBindings, InvocationFactory};
pub use methods::{bind_methods, MethodBindings};
pub use rewrite::rewrite_bindings;
pub use shape::{erase_single, erase_streaming};
