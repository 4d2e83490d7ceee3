//! Known-resource call rewriting.
//!
//! Client query code asks for remote sources through one entry point:
//! `QueryClient.resource(name)`, typed either as the resource itself or
//! as a factory function over it. Before transmission those calls are
//! replaced by unbound parameters — the convention the server's binder
//! expects. Every call site mints a distinct parameter identity, even
//! for the same name; the server binds each occurrence independently.

use std::sync::Arc;
use teleq_core::expr::{CatchClause, Expr, Param};
use teleq_core::types::TypeSig;
use teleq_core::value::Value;

/// Owner type of the client's resource entry points.
pub const QUERY_CLIENT_TYPE: &str = "QueryClient";
/// Entry point for a resource used directly.
pub const RESOURCE_METHOD: &str = "resource";
/// Entry point for a resource used as a factory over arguments.
pub const RESOURCE_FACTORY_METHOD: &str = "resource_factory";

/// Build the entry-point call a client query writes before
/// normalization: `QueryClient.resource("Name") : ty`.
pub fn resource_call(name: impl Into<String>, ty: TypeSig) -> Arc<Expr> {
    entry_point_call(RESOURCE_METHOD, name, ty)
}

/// Build the factory-form entry-point call:
/// `QueryClient.resource_factory("Name") : (args) -> ty`.
pub fn resource_factory_call(
    name: impl Into<String>,
    params: Vec<TypeSig>,
    ret: TypeSig,
) -> Arc<Expr> {
    entry_point_call(RESOURCE_FACTORY_METHOD, name, TypeSig::func(params, ret))
}

fn entry_point_call(method: &str, name: impl Into<String>, ty: TypeSig) -> Arc<Expr> {
    let name = name.into();
    Expr::call(
        teleq_core::expr::MethodSig {
            owner: TypeSig::named(QUERY_CLIENT_TYPE),
            name: method.to_string(),
            type_args: vec![ty.clone()],
            params: vec![TypeSig::Str],
            ret: ty,
        },
        None,
        vec![Expr::str(name)],
    )
}

fn is_resource_call(expr: &Expr) -> Option<(String, TypeSig)> {
    if let Expr::Call { method, args, .. } = expr {
        if (method.name == RESOURCE_METHOD || method.name == RESOURCE_FACTORY_METHOD)
            && matches!(&method.owner, TypeSig::Named { name, .. } if name == QUERY_CLIENT_TYPE)
        {
            if let Some(Expr::Constant {
                value: Value::Str(name),
                ..
            }) = args.first().map(|a| &**a)
            {
                return Some((name.clone(), method.ret.clone()));
            }
        }
    }
    None
}

/// Replace every `QueryClient.resource` call with a fresh unbound
/// parameter. A factory-typed resource becomes a function-typed
/// parameter, so an enclosing invocation of the call site turns into
/// the invocation of a synthesized unbound parameter.
pub fn rewrite_resource_calls(tree: &Arc<Expr>) -> Arc<Expr> {
    rewrite(tree)
}

fn rewrite_all(exprs: &[Arc<Expr>]) -> Vec<Arc<Expr>> {
    exprs.iter().map(rewrite).collect()
}

fn rewrite(node: &Arc<Expr>) -> Arc<Expr> {
    if let Some((name, ty)) = is_resource_call(node) {
        return Expr::parameter(&Param::fresh(name, ty));
    }
    match &**node {
        Expr::Constant { .. } | Expr::Parameter(_) | Expr::Jump { .. } => node.clone(),
        Expr::Lambda { params, body } => Expr::lambda(params.clone(), rewrite(body)),
        Expr::Invoke { target, args } => Expr::invoke(rewrite(target), rewrite_all(args)),
        Expr::Call {
            method,
            target,
            args,
        } => Expr::call(
            method.clone(),
            target.as_ref().map(rewrite),
            rewrite_all(args),
        ),
        Expr::Member { target, member, ty } => {
            Expr::member(rewrite(target), member.clone(), ty.clone())
        }
        Expr::Binary {
            op,
            left,
            right,
            method,
        } => Arc::new(Expr::Binary {
            op: *op,
            left: rewrite(left),
            right: rewrite(right),
            method: method.clone(),
        }),
        Expr::Unary { op, operand } => Arc::new(Expr::Unary {
            op: *op,
            operand: rewrite(operand),
        }),
        Expr::New { ty, args } => Arc::new(Expr::New {
            ty: ty.clone(),
            args: rewrite_all(args),
        }),
        Expr::NewRecord { ty, args } => Arc::new(Expr::NewRecord {
            ty: ty.clone(),
            args: rewrite_all(args),
        }),
        Expr::NewTuple { items } => Arc::new(Expr::NewTuple {
            items: rewrite_all(items),
        }),
        Expr::Index { target, args, ty } => Arc::new(Expr::Index {
            target: rewrite(target),
            args: rewrite_all(args),
            ty: ty.clone(),
        }),
        Expr::Convert { operand, ty } => Expr::convert(rewrite(operand), ty.clone()),
        Expr::TypeTest { operand, ty } => Arc::new(Expr::TypeTest {
            operand: rewrite(operand),
            ty: ty.clone(),
        }),
        Expr::Assign { target, value } => Arc::new(Expr::Assign {
            target: rewrite(target),
            value: rewrite(value),
        }),
        Expr::Block { exprs } => Arc::new(Expr::Block {
            exprs: rewrite_all(exprs),
        }),
        Expr::Try {
            body,
            catches,
            finally,
        } => Arc::new(Expr::Try {
            body: rewrite(body),
            catches: catches
                .iter()
                .map(|c| CatchClause {
                    param: c.param.clone(),
                    body: rewrite(&c.body),
                })
                .collect(),
            finally: finally.as_ref().map(rewrite),
        }),
        Expr::Loop { body } => Arc::new(Expr::Loop {
            body: rewrite(body),
        }),
        Expr::NewArray { element, items } => Arc::new(Expr::NewArray {
            element: element.clone(),
            items: rewrite_all(items),
        }),
        Expr::SourceInvoke { source, args } => {
            Expr::source_invoke(source.clone(), rewrite_all(args))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleq_core::scan::find_unbound_parameters;

    #[test]
    fn direct_resource_becomes_bare_parameter() {
        let tree = resource_call("Orders", TypeSig::seq(TypeSig::Int));
        let rewritten = rewrite_resource_calls(&tree);
        match &*rewritten {
            Expr::Parameter(p) => {
                assert_eq!(p.name, "Orders");
                assert_eq!(p.ty, TypeSig::seq(TypeSig::Int));
            }
            other => panic!("expected parameter, got {}", other.kind()),
        }
    }

    #[test]
    fn factory_resource_under_invocation_becomes_parameter_invocation() {
        let factory_ty = TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int));
        let tree = Expr::invoke(
            resource_factory_call("Echo", vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)),
            vec![Expr::int(42)],
        );
        let rewritten = rewrite_resource_calls(&tree);
        match &*rewritten {
            Expr::Invoke { target, args } => {
                assert_eq!(args.len(), 1);
                match &**target {
                    Expr::Parameter(p) => {
                        assert_eq!(p.name, "Echo");
                        assert_eq!(p.ty, factory_ty);
                    }
                    other => panic!("expected parameter target, got {}", other.kind()),
                }
            }
            other => panic!("expected invocation, got {}", other.kind()),
        }
    }

    #[test]
    fn each_occurrence_gets_a_distinct_identity() {
        let ty = TypeSig::func(vec![], TypeSig::seq(TypeSig::Int));
        let tree = Arc::new(Expr::NewTuple {
            items: vec![
                Expr::invoke(resource_call("R", ty.clone()), vec![]),
                Expr::invoke(resource_call("R", ty.clone()), vec![]),
            ],
        });
        let rewritten = rewrite_resource_calls(&tree);
        let unbound = find_unbound_parameters(&rewritten);
        assert_eq!(unbound.len(), 2);
        assert_eq!(unbound[0].name, "R");
        assert_eq!(unbound[1].name, "R");
        assert_ne!(unbound[0].id, unbound[1].id, "occurrences must not share identity");
        assert_eq!(unbound[0].ty, unbound[1].ty);
    }

    #[test]
    fn non_constant_resource_names_are_left_alone() {
        let p = Param::fresh("n", TypeSig::Str);
        let call = Expr::call(
            teleq_core::expr::MethodSig {
                owner: TypeSig::named(QUERY_CLIENT_TYPE),
                name: RESOURCE_METHOD.to_string(),
                type_args: vec![],
                params: vec![TypeSig::Str],
                ret: TypeSig::seq(TypeSig::Int),
            },
            None,
            vec![Expr::parameter(&p)],
        );
        let rewritten = rewrite_resource_calls(&call);
        assert!(matches!(&*rewritten, Expr::Call { .. }));
    }
}
