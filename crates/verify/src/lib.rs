//! teleq-verify: feature and member verification for query trees.
//!
//! Two concrete verifiers plus the accumulating combinator:
//!
//! - [`FeatureVerifier`] -- refutes node kinds outside an allowed
//!   feature bitset
//! - [`MemberVerifier`] -- refutes types/methods/constructors/members
//!   outside a disjunctive allow-list, with the open/closed generic
//!   closing rule
//! - [`CombinedVerifier`] -- runs several verifiers and merges every
//!   error set

pub mod combine;
pub mod features;
pub mod members;

pub use combine::{CombinedVerifier, Verifier};
pub use features::{FeatureVerifier, Features};
pub use members::{Allowance, MemberUse, MemberVerifier};
