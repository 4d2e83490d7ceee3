//! teleq-core: expression model and shared pipeline types.
//!
//! Everything the verify/bind/compile stages have in common lives here:
//!
//! - [`Expr`], [`TypeSig`], [`Value`] -- the immutable query tree
//! - [`Param`]/[`ParamId`] -- identity-keyed parameters
//! - [`scan::find_unbound_parameters`] -- the free-variable scanner
//! - [`Validated`] -- the accumulating result type
//! - [`SourceDescription`]/[`SourceRegistry`] -- per-query source table
//! - [`CancelToken`], [`ValueStream`] -- execution primitives
//! - [`PipelineError`]/[`RuntimeError`] -- the error taxonomy

pub mod cancel;
pub mod error;
pub mod expr;
pub mod ops;
pub mod scan;
pub mod source;
pub mod stream;
pub mod types;
pub mod validated;
pub mod value;

pub use cancel::CancelToken;
pub use error::{PipelineError, RuntimeError};
pub use expr::{BinaryOp, CatchClause, Expr, MethodSig, Param, ParamId, ParamRef, UnaryOp};
pub use source::{SourceDescription, SourceInvocable, SourceRegistry};
pub use stream::{BoxValueStream, ValueStream, VecStream};
pub use types::TypeSig;
pub use validated::{sequence, ErrorSet, Validated};
pub use value::Value;
