//! Client-side partial evaluation.
//!
//! Query trees are built by quoting client code, so they routinely
//! contain subtrees whose value is already known — captured locals,
//! arithmetic on literals, member access into constant records. Folding
//! those before transmission shrinks the tree and spares the server the
//! work. A subtree is folded when it is closed (no unbound parameters),
//! is not itself a parameter or lambda, and does not denote a function;
//! anything the constant evaluator cannot handle is left in place.

use std::collections::HashMap;
use std::sync::Arc;
use teleq_core::expr::{BinaryOp, CatchClause, Expr, ParamId};
use teleq_core::ops;
use teleq_core::scan::find_unbound_parameters;
use teleq_core::types::TypeSig;
use teleq_core::value::Value;

/// Fold every evaluable subtree into a constant, top-down. Redundant
/// same-type conversions are stripped as they are encountered so they
/// never block a fold.
pub fn partially_evaluate(tree: &Arc<Expr>) -> Arc<Expr> {
    reduce(tree)
}

fn evaluable(node: &Arc<Expr>) -> bool {
    if matches!(&**node, Expr::Parameter(_) | Expr::Lambda { .. }) {
        return false;
    }
    if matches!(node.ty(), TypeSig::Func { .. }) {
        return false;
    }
    find_unbound_parameters(node).is_empty()
}

fn reduce(node: &Arc<Expr>) -> Arc<Expr> {
    if let Expr::Convert { operand, ty } = &**node {
        if operand.ty() == *ty {
            return reduce(operand);
        }
    }
    if evaluable(node) && !matches!(&**node, Expr::Constant { .. }) {
        if let Ok(value) = const_eval(node, &HashMap::new()) {
            return Expr::constant(value, node.ty());
        }
        // Not constant-expressible as a whole; fold what we can below.
    }
    recurse(node)
}

fn reduce_all(exprs: &[Arc<Expr>]) -> Vec<Arc<Expr>> {
    exprs.iter().map(reduce).collect()
}

fn recurse(node: &Arc<Expr>) -> Arc<Expr> {
    match &**node {
        Expr::Constant { .. } | Expr::Parameter(_) | Expr::Jump { .. } => node.clone(),
        Expr::Lambda { params, body } => Expr::lambda(params.clone(), reduce(body)),
        Expr::Invoke { target, args } => Expr::invoke(reduce(target), reduce_all(args)),
        Expr::Call {
            method,
            target,
            args,
        } => Expr::call(method.clone(), target.as_ref().map(reduce), reduce_all(args)),
        Expr::Member { target, member, ty } => {
            Expr::member(reduce(target), member.clone(), ty.clone())
        }
        Expr::Binary {
            op,
            left,
            right,
            method,
        } => Arc::new(Expr::Binary {
            op: *op,
            left: reduce(left),
            right: reduce(right),
            method: method.clone(),
        }),
        Expr::Unary { op, operand } => Arc::new(Expr::Unary {
            op: *op,
            operand: reduce(operand),
        }),
        Expr::New { ty, args } => Arc::new(Expr::New {
            ty: ty.clone(),
            args: reduce_all(args),
        }),
        Expr::NewRecord { ty, args } => Arc::new(Expr::NewRecord {
            ty: ty.clone(),
            args: reduce_all(args),
        }),
        Expr::NewTuple { items } => Arc::new(Expr::NewTuple {
            items: reduce_all(items),
        }),
        Expr::Index { target, args, ty } => Arc::new(Expr::Index {
            target: reduce(target),
            args: reduce_all(args),
            ty: ty.clone(),
        }),
        Expr::Convert { operand, ty } => Expr::convert(reduce(operand), ty.clone()),
        Expr::TypeTest { operand, ty } => Arc::new(Expr::TypeTest {
            operand: reduce(operand),
            ty: ty.clone(),
        }),
        Expr::Assign { target, value } => Arc::new(Expr::Assign {
            target: reduce(target),
            value: reduce(value),
        }),
        Expr::Block { exprs } => Arc::new(Expr::Block {
            exprs: reduce_all(exprs),
        }),
        Expr::Try {
            body,
            catches,
            finally,
        } => Arc::new(Expr::Try {
            body: reduce(body),
            catches: catches
                .iter()
                .map(|c| CatchClause {
                    param: c.param.clone(),
                    body: reduce(&c.body),
                })
                .collect(),
            finally: finally.as_ref().map(reduce),
        }),
        Expr::Loop { body } => Arc::new(Expr::Loop { body: reduce(body) }),
        Expr::NewArray { element, items } => Arc::new(Expr::NewArray {
            element: element.clone(),
            items: reduce_all(items),
        }),
        Expr::SourceInvoke { source, args } => {
            Expr::source_invoke(source.clone(), reduce_all(args))
        }
    }
}

// ──────────────────────────────────────────────
// Constant evaluation
// ──────────────────────────────────────────────

/// Synchronous constant evaluator. Deliberately narrower than the
/// server's runtime: no sources, no streams, no effects. Any node it
/// does not understand fails the fold, which leaves the subtree intact.
fn const_eval(expr: &Expr, env: &HashMap<ParamId, Value>) -> Result<Value, String> {
    match expr {
        Expr::Constant { value, .. } => Ok(value.clone()),
        Expr::Parameter(p) => env
            .get(&p.id)
            .cloned()
            .ok_or_else(|| format!("parameter '{}' is not a constant", p.name)),
        Expr::Invoke { target, args } => {
            let Expr::Lambda { params, body } = &**target else {
                return Err("invocation target is not a literal lambda".to_string());
            };
            if params.len() != args.len() {
                return Err(format!(
                    "lambda expects {} arguments, got {}",
                    params.len(),
                    args.len()
                ));
            }
            let mut inner = env.clone();
            for (p, arg) in params.iter().zip(args) {
                inner.insert(p.id, const_eval(arg, env)?);
            }
            const_eval(body, &inner)
        }
        Expr::Member { target, member, .. } => {
            let value = const_eval(target, env)?;
            if let Some(v) = value.field(member) {
                return Ok(v.clone());
            }
            if let Some(rest) = member.strip_prefix("item") {
                if let Ok(i) = rest.parse::<usize>() {
                    if let Some(v) = value.item(i) {
                        return Ok(v.clone());
                    }
                }
            }
            Err(format!("value has no member '{}'", member))
        }
        Expr::Binary {
            op, left, right, ..
        } => {
            let l = const_eval(left, env)?;
            match (op, &l) {
                (BinaryOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
                (BinaryOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
                _ => {}
            }
            let r = const_eval(right, env)?;
            ops::apply_binary(*op, &l, &r)
        }
        Expr::Unary { op, operand } => {
            let v = const_eval(operand, env)?;
            ops::apply_unary(*op, &v)
        }
        Expr::NewTuple { items } => {
            let values = items
                .iter()
                .map(|i| const_eval(i, env))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(values))
        }
        Expr::NewRecord { ty, args } => {
            let TypeSig::Record { fields } = ty else {
                return Err("record construction with non-record type".to_string());
            };
            let mut record = std::collections::BTreeMap::new();
            for ((name, _), arg) in fields.iter().zip(args) {
                record.insert(name.clone(), const_eval(arg, env)?);
            }
            Ok(Value::Record(record))
        }
        Expr::NewArray { items, .. } => {
            let values = items
                .iter()
                .map(|i| const_eval(i, env))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Seq(values))
        }
        Expr::Index { target, args, .. } => {
            let value = const_eval(target, env)?;
            let index = match args.first() {
                Some(i) => const_eval(i, env)?,
                None => return Err("indexer without index".to_string()),
            };
            match (&value, &index) {
                (Value::Seq(items) | Value::Tuple(items), Value::Int(i)) => items
                    .get(*i as usize)
                    .cloned()
                    .ok_or_else(|| format!("index {} out of bounds", i)),
                _ => Err("unsupported indexer target".to_string()),
            }
        }
        Expr::Convert { operand, ty } => Ok(ops::convert(const_eval(operand, env)?, ty)),
        other => Err(format!("{} node is not constant-expressible", other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleq_core::expr::Param;

    #[test]
    fn closed_arithmetic_folds_to_a_constant() {
        let tree = Expr::binary(BinaryOp::Add, Expr::int(2), Expr::int(40));
        let reduced = partially_evaluate(&tree);
        match &*reduced {
            Expr::Constant { value, ty } => {
                assert_eq!(*value, Value::Int(42));
                assert_eq!(*ty, TypeSig::Int);
            }
            other => panic!("expected constant, got {}", other.kind()),
        }
    }

    #[test]
    fn open_subtrees_fold_only_their_closed_parts() {
        let x = Param::fresh("x", TypeSig::Int);
        let tree = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, Expr::int(2), Expr::int(40)),
            Expr::parameter(&x),
        );
        let reduced = partially_evaluate(&tree);
        match &*reduced {
            Expr::Binary { left, right, .. } => {
                assert!(
                    matches!(&**left, Expr::Constant { value: Value::Int(42), .. }),
                    "closed left operand should fold"
                );
                match &**right {
                    Expr::Parameter(p) => assert_eq!(p.id, x.id),
                    other => panic!("expected parameter, got {}", other.kind()),
                }
            }
            other => panic!("expected binary, got {}", other.kind()),
        }
    }

    #[test]
    fn lambdas_survive_but_their_bodies_fold() {
        let x = Param::fresh("x", TypeSig::Int);
        let lambda = Expr::lambda(
            vec![x.clone()],
            Expr::binary(
                BinaryOp::Add,
                Expr::parameter(&x),
                Expr::binary(BinaryOp::Mul, Expr::int(6), Expr::int(7)),
            ),
        );
        let reduced = partially_evaluate(&lambda);
        match &*reduced {
            Expr::Lambda { body, .. } => match &**body {
                Expr::Binary { right, .. } => {
                    assert!(matches!(
                        &**right,
                        Expr::Constant {
                            value: Value::Int(42),
                            ..
                        }
                    ));
                }
                other => panic!("expected binary body, got {}", other.kind()),
            },
            other => panic!("expected lambda, got {}", other.kind()),
        }
    }

    #[test]
    fn closed_lambda_invocation_folds() {
        let x = Param::fresh("x", TypeSig::Int);
        let lambda = Expr::lambda(
            vec![x.clone()],
            Expr::binary(BinaryOp::Mul, Expr::parameter(&x), Expr::int(3)),
        );
        let tree = Expr::invoke(lambda, vec![Expr::int(4)]);
        let reduced = partially_evaluate(&tree);
        assert!(matches!(
            &*reduced,
            Expr::Constant {
                value: Value::Int(12),
                ..
            }
        ));
    }

    #[test]
    fn redundant_conversions_are_stripped() {
        let x = Param::fresh("x", TypeSig::Int);
        let tree = Expr::convert(Expr::parameter(&x), TypeSig::Int);
        let reduced = partially_evaluate(&tree);
        match &*reduced {
            Expr::Parameter(p) => assert_eq!(p.id, x.id),
            other => panic!("expected parameter, got {}", other.kind()),
        }
    }

    #[test]
    fn member_access_into_a_constant_record_folds() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("limit".to_string(), Value::Int(10));
        let record_ty = TypeSig::Record {
            fields: vec![("limit".to_string(), TypeSig::Int)],
        };
        let tree = Expr::member(
            Expr::constant(Value::Record(fields), record_ty),
            "limit",
            TypeSig::Int,
        );
        let reduced = partially_evaluate(&tree);
        assert!(matches!(
            &*reduced,
            Expr::Constant {
                value: Value::Int(10),
                ..
            }
        ));
    }

    #[test]
    fn failing_folds_leave_the_tree_intact() {
        // Division by zero must not fold; the server reports it at run
        // time instead.
        let tree = Expr::binary(BinaryOp::Div, Expr::int(1), Expr::int(0));
        let reduced = partially_evaluate(&tree);
        assert!(matches!(&*reduced, Expr::Binary { .. }));
    }
}
