//! Result-shape rewriting: erasing the query's value to the uniform
//! transport shape.
//!
//! A streaming query must end in `Seq<T>` and becomes `Seq<Erased>` by
//! appending a `Seq.select` projection; a single-value query must end
//! in `Task<T>` and becomes `Task<Erased>` via `Task.map`. A tree whose
//! root type does not match the expected shape is structurally wrong —
//! that is a fatal shape error, not an accumulated user mistake, and
//! nothing is ever silently coerced.

use std::sync::Arc;
use teleq_core::error::PipelineError;
use teleq_core::expr::{Expr, MethodSig, Param};
use teleq_core::types::TypeSig;

/// Signature of the streaming erase projection intrinsic.
pub fn seq_select_sig(element: &TypeSig) -> MethodSig {
    MethodSig {
        owner: TypeSig::named("Seq"),
        name: "select".to_string(),
        type_args: vec![element.clone(), TypeSig::Erased],
        params: vec![
            TypeSig::seq(element.clone()),
            TypeSig::func(vec![element.clone()], TypeSig::Erased),
        ],
        ret: TypeSig::seq(TypeSig::Erased),
    }
}

/// Signature of the single-result erase intrinsic.
pub fn task_map_sig(result: &TypeSig) -> MethodSig {
    MethodSig {
        owner: TypeSig::named("Task"),
        name: "map".to_string(),
        type_args: vec![result.clone(), TypeSig::Erased],
        params: vec![
            TypeSig::task(result.clone()),
            TypeSig::func(vec![result.clone()], TypeSig::Erased),
        ],
        ret: TypeSig::task(TypeSig::Erased),
    }
}

fn erase_lambda(input: TypeSig) -> Arc<Expr> {
    let x = Param::fresh("x", input);
    let body = Expr::convert(Expr::parameter(&x), TypeSig::Erased);
    Expr::lambda(vec![x], body)
}

/// Erase a streaming tree to `Seq<Erased>`.
pub fn erase_streaming(tree: &Arc<Expr>) -> Result<Arc<Expr>, PipelineError> {
    match tree.ty() {
        TypeSig::Seq(element) => {
            let method = seq_select_sig(&element);
            Ok(Expr::call(
                method,
                None,
                vec![tree.clone(), erase_lambda(*element)],
            ))
        }
        other => Err(PipelineError::Shape(format!(
            "expected a streaming sequence, found {}",
            other
        ))),
    }
}

/// Erase a single-result tree to `Task<Erased>`.
pub fn erase_single(tree: &Arc<Expr>) -> Result<Arc<Expr>, PipelineError> {
    match tree.ty() {
        TypeSig::Task(result) => {
            let method = task_map_sig(&result);
            Ok(Expr::call(
                method,
                None,
                vec![tree.clone(), erase_lambda(*result)],
            ))
        }
        other => Err(PipelineError::Shape(format!(
            "expected a single asynchronous result, found {}",
            other
        ))),
    }
}
