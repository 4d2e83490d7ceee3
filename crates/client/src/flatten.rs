//! Anonymous-record flattening.
//!
//! Anonymous record types are a client-language convenience with no
//! stable nominal identity, so they cannot cross the wire as-is. Before
//! transmission every record type is rewritten to a positional tuple in
//! the record's canonical field order: constructions become tuple
//! constructions, field reads become positional `item{N}` reads, and
//! every type annotation in the tree — including those nested inside
//! generics, shapes, and function signatures — is mapped the same way.
//!
//! Parameters keep their identity through the rewrite. A parameter
//! whose type mentions a record is re-typed with [`Param::retyped`], so
//! the declaring lambda and every reference site still agree on the
//! same [`ParamId`].

use std::collections::HashMap;
use std::sync::Arc;
use teleq_core::expr::{CatchClause, Expr, MethodSig, Param, ParamId, ParamRef};
use teleq_core::types::TypeSig;
use teleq_core::value::Value;

/// Rewrite every anonymous record in the tree to its tuple encoding.
pub fn flatten_records(tree: &Arc<Expr>) -> Arc<Expr> {
    Flattener::default().rewrite(tree)
}

#[derive(Default)]
struct Flattener {
    /// Re-typed parameters by identity, so every reference site of a
    /// parameter resolves to the same re-typed declaration.
    params: HashMap<ParamId, ParamRef>,
    /// One computed mapping per distinct record type per pass.
    records: HashMap<TypeSig, TypeSig>,
}

impl Flattener {
    fn map_type(&mut self, ty: &TypeSig) -> TypeSig {
        match ty {
            TypeSig::Record { fields } => {
                if let Some(mapped) = self.records.get(ty) {
                    return mapped.clone();
                }
                let mapped =
                    TypeSig::Tuple(fields.iter().map(|(_, t)| self.map_type(t)).collect());
                self.records.insert(ty.clone(), mapped.clone());
                mapped
            }
            TypeSig::Named { name, args } => TypeSig::Named {
                name: name.clone(),
                args: args.iter().map(|a| self.map_type(a)).collect(),
            },
            TypeSig::Func { params, ret } => TypeSig::Func {
                params: params.iter().map(|p| self.map_type(p)).collect(),
                ret: Box::new(self.map_type(ret)),
            },
            TypeSig::Seq(t) => TypeSig::Seq(Box::new(self.map_type(t))),
            TypeSig::Task(t) => TypeSig::Task(Box::new(self.map_type(t))),
            TypeSig::Tuple(items) => {
                TypeSig::Tuple(items.iter().map(|t| self.map_type(t)).collect())
            }
            other => other.clone(),
        }
    }

    /// Flatten record values inside a constant, guided by its type.
    fn map_value(&self, value: &Value, ty: &TypeSig) -> Value {
        match (value, ty) {
            (Value::Record(map), TypeSig::Record { fields }) => Value::Tuple(
                fields
                    .iter()
                    .map(|(name, field_ty)| {
                        map.get(name)
                            .map(|v| self.map_value(v, field_ty))
                            .unwrap_or(Value::Unit)
                    })
                    .collect(),
            ),
            (Value::Seq(items), TypeSig::Seq(el)) => {
                Value::Seq(items.iter().map(|v| self.map_value(v, el)).collect())
            }
            (Value::Tuple(items), TypeSig::Tuple(tys)) => Value::Tuple(
                items
                    .iter()
                    .zip(tys)
                    .map(|(v, t)| self.map_value(v, t))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    fn map_method(&mut self, method: &MethodSig) -> MethodSig {
        MethodSig {
            owner: self.map_type(&method.owner),
            name: method.name.clone(),
            type_args: method.type_args.iter().map(|t| self.map_type(t)).collect(),
            params: method.params.iter().map(|t| self.map_type(t)).collect(),
            ret: self.map_type(&method.ret),
        }
    }

    fn map_param(&mut self, param: &ParamRef) -> ParamRef {
        let mapped = self.map_type(&param.ty);
        if mapped == param.ty {
            return param.clone();
        }
        self.params
            .entry(param.id)
            .or_insert_with(|| Param::retyped(param, mapped))
            .clone()
    }

    fn rewrite_all(&mut self, exprs: &[Arc<Expr>]) -> Vec<Arc<Expr>> {
        exprs.iter().map(|e| self.rewrite(e)).collect()
    }

    fn rewrite(&mut self, node: &Arc<Expr>) -> Arc<Expr> {
        match &**node {
            Expr::Constant { value, ty } => {
                let mapped = self.map_type(ty);
                if mapped == *ty {
                    node.clone()
                } else {
                    Expr::constant(self.map_value(value, ty), mapped)
                }
            }
            Expr::Parameter(p) => Expr::parameter(&self.map_param(p)),
            Expr::Lambda { params, body } => {
                let params = params.iter().map(|p| self.map_param(p)).collect();
                Expr::lambda(params, self.rewrite(body))
            }
            Expr::Invoke { target, args } => {
                Expr::invoke(self.rewrite(target), self.rewrite_all(args))
            }
            Expr::Call {
                method,
                target,
                args,
            } => Expr::call(
                self.map_method(method),
                target.as_ref().map(|t| self.rewrite(t)),
                self.rewrite_all(args),
            ),
            Expr::Member { target, member, ty } => {
                // A read out of a record becomes a positional read.
                if let TypeSig::Record { fields } = target.ty() {
                    if let Some(index) = fields.iter().position(|(name, _)| name == member) {
                        return Expr::member(
                            self.rewrite(target),
                            format!("item{}", index),
                            self.map_type(ty),
                        );
                    }
                }
                Expr::member(self.rewrite(target), member.clone(), self.map_type(ty))
            }
            Expr::Binary {
                op,
                left,
                right,
                method,
            } => Arc::new(Expr::Binary {
                op: *op,
                left: self.rewrite(left),
                right: self.rewrite(right),
                method: method.as_ref().map(|m| self.map_method(m)),
            }),
            Expr::Unary { op, operand } => Arc::new(Expr::Unary {
                op: *op,
                operand: self.rewrite(operand),
            }),
            Expr::New { ty, args } => Arc::new(Expr::New {
                ty: self.map_type(ty),
                args: self.rewrite_all(args),
            }),
            // Record construction becomes tuple construction; the args
            // are already in canonical field order.
            Expr::NewRecord { args, .. } => Arc::new(Expr::NewTuple {
                items: self.rewrite_all(args),
            }),
            Expr::NewTuple { items } => Arc::new(Expr::NewTuple {
                items: self.rewrite_all(items),
            }),
            Expr::Index { target, args, ty } => Arc::new(Expr::Index {
                target: self.rewrite(target),
                args: self.rewrite_all(args),
                ty: self.map_type(ty),
            }),
            Expr::Convert { operand, ty } => {
                Expr::convert(self.rewrite(operand), self.map_type(ty))
            }
            Expr::TypeTest { operand, ty } => Arc::new(Expr::TypeTest {
                operand: self.rewrite(operand),
                ty: self.map_type(ty),
            }),
            Expr::Assign { target, value } => Arc::new(Expr::Assign {
                target: self.rewrite(target),
                value: self.rewrite(value),
            }),
            Expr::Block { exprs } => Arc::new(Expr::Block {
                exprs: self.rewrite_all(exprs),
            }),
            Expr::Try {
                body,
                catches,
                finally,
            } => Arc::new(Expr::Try {
                body: self.rewrite(body),
                catches: catches
                    .iter()
                    .map(|c| CatchClause {
                        param: c.param.as_ref().map(|p| self.map_param(p)),
                        body: self.rewrite(&c.body),
                    })
                    .collect(),
                finally: finally.as_ref().map(|f| self.rewrite(f)),
            }),
            Expr::Jump { .. } => node.clone(),
            Expr::Loop { body } => Arc::new(Expr::Loop {
                body: self.rewrite(body),
            }),
            Expr::NewArray { element, items } => Arc::new(Expr::NewArray {
                element: self.map_type(element),
                items: self.rewrite_all(items),
            }),
            Expr::SourceInvoke { source, args } => {
                Expr::source_invoke(source.clone(), self.rewrite_all(args))
            }
        }
    }
}
