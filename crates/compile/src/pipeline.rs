//! The per-query pipeline: scan, verify, bind, authorize, rewrite,
//! erase, compile.
//!
//! Runs once for each incoming query. Every entity involved is
//! call-scoped; nothing is cached across queries. All stages are
//! synchronous except authorization, which may suspend on the host's
//! policy evaluator.

use crate::query::{CompiledSingleQuery, CompiledStreamingQuery};
use std::sync::Arc;
use teleq_bind::authorize::{authorize, Claims, PolicyEvaluator};
use teleq_bind::invocations::bind_invocations;
use teleq_bind::methods::{bind_methods, MethodBindings};
use teleq_bind::rewrite::rewrite_bindings;
use teleq_bind::shape::{erase_single, erase_streaming};
use teleq_core::error::PipelineError;
use teleq_core::expr::{Expr, Param, ParamRef};
use teleq_core::scan::{distinct_unbound_parameters, find_unbound_parameters};
use teleq_core::source::SourceRegistry;
use teleq_core::types::TypeSig;
use teleq_verify::combine::Verifier;

/// The synthetic parameters appended to every bound invocation: one
/// cancellation signal per compiled query.
fn fresh_synthetics() -> Vec<ParamRef> {
    vec![Param::fresh("cancel", TypeSig::Signal)]
}

struct BoundQuery {
    tree: Arc<Expr>,
    synthetics: Vec<ParamRef>,
}

/// Stages shared by both entry points: everything up to shape erasure.
async fn bind_query(
    tree: &Arc<Expr>,
    verifier: &dyn Verifier,
    registry: &SourceRegistry,
    claims: &Claims,
    evaluator: &dyn PolicyEvaluator,
) -> Result<BoundQuery, PipelineError> {
    let unbound = find_unbound_parameters(tree);

    verifier
        .verify(tree)
        .or_pipeline_error(|reasons| PipelineError::Verification { reasons })?;

    let bindings: MethodBindings = bind_methods(&unbound, registry)
        .or_pipeline_error(|reasons| PipelineError::Binding { reasons })?;

    // Sources in scan order, for a stable policy-requirement union.
    let distinct = distinct_unbound_parameters(tree);
    let sources: Vec<_> = distinct
        .iter()
        .filter_map(|p| bindings.get(&p.id).cloned())
        .collect();
    authorize(&sources, claims, evaluator)
        .await
        .or_pipeline_error(|reasons| PipelineError::Authorization { reasons })?;

    let synthetics = fresh_synthetics();
    let factories = bind_invocations(&bindings, &distinct, &synthetics)?
        .or_pipeline_error(|reasons| PipelineError::Binding { reasons })?;

    let bound = rewrite_bindings(tree, &factories)?;
    Ok(BoundQuery {
        tree: bound,
        synthetics,
    })
}

/// Compile a streaming query end to end.
pub async fn compile_streaming_query(
    tree: &Arc<Expr>,
    verifier: &dyn Verifier,
    registry: &SourceRegistry,
    claims: &Claims,
    evaluator: &dyn PolicyEvaluator,
) -> Result<CompiledStreamingQuery, PipelineError> {
    let bound = bind_query(tree, verifier, registry, claims, evaluator).await?;
    let erased = erase_streaming(&bound.tree)?;
    Ok(CompiledStreamingQuery::new(erased, bound.synthetics))
}

/// Compile a single-result query end to end.
pub async fn compile_single_query(
    tree: &Arc<Expr>,
    verifier: &dyn Verifier,
    registry: &SourceRegistry,
    claims: &Claims,
    evaluator: &dyn PolicyEvaluator,
) -> Result<CompiledSingleQuery, PipelineError> {
    let bound = bind_query(tree, verifier, registry, claims, evaluator).await?;
    let erased = erase_single(&bound.tree)?;
    Ok(CompiledSingleQuery::new(erased, bound.synthetics))
}
