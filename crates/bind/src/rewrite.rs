//! Binding rewriter: replacing unbound-parameter invocations with
//! bound source invocations.
//!
//! By the time this runs, the binders have produced a complete factory
//! map. Meeting an invoked unbound parameter with no factory, or an
//! unbound parameter outside invocation-target position, means an
//! earlier stage broke its contract; both are fatal, never accumulated.

use crate::invocations::InvocationBindings;
use std::collections::HashSet;
use std::sync::Arc;
use teleq_core::error::PipelineError;
use teleq_core::expr::{CatchClause, Expr, ParamId};

/// Rewrite every invocation of a bound parameter into the factory's
/// source invocation. Produces a new tree; the input is never mutated.
pub fn rewrite_bindings(
    tree: &Arc<Expr>,
    factories: &InvocationBindings,
) -> Result<Arc<Expr>, PipelineError> {
    let mut declared: HashSet<ParamId> = HashSet::new();
    tree.walk(&mut |node| {
        if let Expr::Lambda { params, .. } = node {
            for p in params {
                declared.insert(p.id);
            }
        }
    });
    rewrite(tree, factories, &declared)
}

fn rewrite_all(
    exprs: &[Arc<Expr>],
    factories: &InvocationBindings,
    declared: &HashSet<ParamId>,
) -> Result<Vec<Arc<Expr>>, PipelineError> {
    exprs
        .iter()
        .map(|e| rewrite(e, factories, declared))
        .collect()
}

fn rewrite(
    node: &Arc<Expr>,
    factories: &InvocationBindings,
    declared: &HashSet<ParamId>,
) -> Result<Arc<Expr>, PipelineError> {
    Ok(match &**node {
        Expr::Invoke { target, args } => {
            if let Expr::Parameter(p) = &**target {
                if !declared.contains(&p.id) {
                    let factory = factories.get(&p.id).ok_or_else(|| {
                        PipelineError::BinderContract(format!(
                            "invocation of parameter '{}' absent from resolved bindings",
                            p.name
                        ))
                    })?;
                    return Ok(factory.build(rewrite_all(args, factories, declared)?));
                }
            }
            Expr::invoke(
                rewrite(target, factories, declared)?,
                rewrite_all(args, factories, declared)?,
            )
        }
        Expr::Parameter(p) if !declared.contains(&p.id) => {
            return Err(PipelineError::BinderContract(format!(
                "unbound parameter '{}' occurs outside invocation-target position",
                p.name
            )));
        }
        Expr::Constant { .. } | Expr::Parameter(_) | Expr::Jump { .. } => node.clone(),
        Expr::Lambda { params, body } => Expr::lambda(
            params.clone(),
            rewrite(body, factories, declared)?,
        ),
        Expr::Call {
            method,
            target,
            args,
        } => Expr::call(
            method.clone(),
            target
                .as_ref()
                .map(|t| rewrite(t, factories, declared))
                .transpose()?,
            rewrite_all(args, factories, declared)?,
        ),
        Expr::Member { target, member, ty } => Expr::member(
            rewrite(target, factories, declared)?,
            member.clone(),
            ty.clone(),
        ),
        Expr::Binary {
            op,
            left,
            right,
            method,
        } => Arc::new(Expr::Binary {
            op: *op,
            left: rewrite(left, factories, declared)?,
            right: rewrite(right, factories, declared)?,
            method: method.clone(),
        }),
        Expr::Unary { op, operand } => Arc::new(Expr::Unary {
            op: *op,
            operand: rewrite(operand, factories, declared)?,
        }),
        Expr::New { ty, args } => Arc::new(Expr::New {
            ty: ty.clone(),
            args: rewrite_all(args, factories, declared)?,
        }),
        Expr::NewRecord { ty, args } => Arc::new(Expr::NewRecord {
            ty: ty.clone(),
            args: rewrite_all(args, factories, declared)?,
        }),
        Expr::NewTuple { items } => Arc::new(Expr::NewTuple {
            items: rewrite_all(items, factories, declared)?,
        }),
        Expr::Index { target, args, ty } => Arc::new(Expr::Index {
            target: rewrite(target, factories, declared)?,
            args: rewrite_all(args, factories, declared)?,
            ty: ty.clone(),
        }),
        Expr::Convert { operand, ty } => {
            Expr::convert(rewrite(operand, factories, declared)?, ty.clone())
        }
        Expr::TypeTest { operand, ty } => Arc::new(Expr::TypeTest {
            operand: rewrite(operand, factories, declared)?,
            ty: ty.clone(),
        }),
        Expr::Assign { target, value } => Arc::new(Expr::Assign {
            target: rewrite(target, factories, declared)?,
            value: rewrite(value, factories, declared)?,
        }),
        Expr::Block { exprs } => Arc::new(Expr::Block {
            exprs: rewrite_all(exprs, factories, declared)?,
        }),
        Expr::Try {
            body,
            catches,
            finally,
        } => Arc::new(Expr::Try {
            body: rewrite(body, factories, declared)?,
            catches: catches
                .iter()
                .map(|c| {
                    Ok(CatchClause {
                        param: c.param.clone(),
                        body: rewrite(&c.body, factories, declared)?,
                    })
                })
                .collect::<Result<Vec<_>, PipelineError>>()?,
            finally: finally
                .as_ref()
                .map(|f| rewrite(f, factories, declared))
                .transpose()?,
        }),
        Expr::Loop { body } => Arc::new(Expr::Loop {
            body: rewrite(body, factories, declared)?,
        }),
        Expr::NewArray { element, items } => Arc::new(Expr::NewArray {
            element: element.clone(),
            items: rewrite_all(items, factories, declared)?,
        }),
        Expr::SourceInvoke { source, args } => Expr::source_invoke(
            source.clone(),
            rewrite_all(args, factories, declared)?,
        ),
    })
}
