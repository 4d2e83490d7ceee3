//! Wire encoding of normalized query trees.
//!
//! The wire form is a plain serde mirror of the expression tree. Two
//! things distinguish it from the in-memory form:
//!
//! - parameter identity travels as the sender's numeric id, and the
//!   decoder re-mints every parameter with a fresh local identity —
//!   sender ids are only ever used to reconstruct sharing, never
//!   trusted as process-unique;
//! - bound source invocations are not transportable. They only exist on
//!   the server after binding, and a client tree that contains one is
//!   refused at encode time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use teleq_core::expr::{BinaryOp, CatchClause, Expr, MethodSig, Param, ParamRef, UnaryOp};
use teleq_core::types::TypeSig;
use teleq_core::value::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("{0} node is not transportable")]
    NotTransportable(&'static str),
    #[error("wire decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireParam {
    pub id: u64,
    pub name: String,
    pub ty: TypeSig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMethod {
    pub owner: TypeSig,
    pub name: String,
    pub type_args: Vec<TypeSig>,
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireCatch {
    pub param: Option<WireParam>,
    pub body: WireExpr,
}

/// Serde mirror of [`Expr`], minus the server-only kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireExpr {
    Constant {
        value: Value,
        ty: TypeSig,
    },
    Parameter {
        param: WireParam,
    },
    Lambda {
        params: Vec<WireParam>,
        body: Box<WireExpr>,
    },
    Invoke {
        target: Box<WireExpr>,
        args: Vec<WireExpr>,
    },
    Call {
        method: WireMethod,
        target: Option<Box<WireExpr>>,
        args: Vec<WireExpr>,
    },
    Member {
        target: Box<WireExpr>,
        member: String,
        ty: TypeSig,
    },
    Binary {
        op: BinaryOp,
        left: Box<WireExpr>,
        right: Box<WireExpr>,
        method: Option<WireMethod>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<WireExpr>,
    },
    New {
        ty: TypeSig,
        args: Vec<WireExpr>,
    },
    NewRecord {
        ty: TypeSig,
        args: Vec<WireExpr>,
    },
    NewTuple {
        items: Vec<WireExpr>,
    },
    Index {
        target: Box<WireExpr>,
        args: Vec<WireExpr>,
        ty: TypeSig,
    },
    Convert {
        operand: Box<WireExpr>,
        ty: TypeSig,
    },
    TypeTest {
        operand: Box<WireExpr>,
        ty: TypeSig,
    },
    Assign {
        target: Box<WireExpr>,
        value: Box<WireExpr>,
    },
    Block {
        exprs: Vec<WireExpr>,
    },
    Try {
        body: Box<WireExpr>,
        catches: Vec<WireCatch>,
        finally: Option<Box<WireExpr>>,
    },
    Jump {
        label: String,
    },
    Loop {
        body: Box<WireExpr>,
    },
    NewArray {
        element: TypeSig,
        items: Vec<WireExpr>,
    },
}

// ──────────────────────────────────────────────
// Encoding
// ──────────────────────────────────────────────

fn wire_param(p: &ParamRef) -> WireParam {
    WireParam {
        id: p.id.0,
        name: p.name.clone(),
        ty: p.ty.clone(),
    }
}

fn wire_method(m: &MethodSig) -> WireMethod {
    WireMethod {
        owner: m.owner.clone(),
        name: m.name.clone(),
        type_args: m.type_args.clone(),
        params: m.params.clone(),
        ret: m.ret.clone(),
    }
}

fn encode_all(exprs: &[Arc<Expr>]) -> Result<Vec<WireExpr>, WireError> {
    exprs.iter().map(|e| to_wire(e)).collect()
}

/// Encode a normalized tree for transport.
pub fn to_wire(expr: &Expr) -> Result<WireExpr, WireError> {
    Ok(match expr {
        Expr::Constant { value, ty } => WireExpr::Constant {
            value: value.clone(),
            ty: ty.clone(),
        },
        Expr::Parameter(p) => WireExpr::Parameter {
            param: wire_param(p),
        },
        Expr::Lambda { params, body } => WireExpr::Lambda {
            params: params.iter().map(wire_param).collect(),
            body: Box::new(to_wire(body)?),
        },
        Expr::Invoke { target, args } => WireExpr::Invoke {
            target: Box::new(to_wire(target)?),
            args: encode_all(args)?,
        },
        Expr::Call {
            method,
            target,
            args,
        } => WireExpr::Call {
            method: wire_method(method),
            target: match target {
                Some(t) => Some(Box::new(to_wire(t)?)),
                None => None,
            },
            args: encode_all(args)?,
        },
        Expr::Member { target, member, ty } => WireExpr::Member {
            target: Box::new(to_wire(target)?),
            member: member.clone(),
            ty: ty.clone(),
        },
        Expr::Binary {
            op,
            left,
            right,
            method,
        } => WireExpr::Binary {
            op: *op,
            left: Box::new(to_wire(left)?),
            right: Box::new(to_wire(right)?),
            method: method.as_ref().map(wire_method),
        },
        Expr::Unary { op, operand } => WireExpr::Unary {
            op: *op,
            operand: Box::new(to_wire(operand)?),
        },
        Expr::New { ty, args } => WireExpr::New {
            ty: ty.clone(),
            args: encode_all(args)?,
        },
        Expr::NewRecord { ty, args } => WireExpr::NewRecord {
            ty: ty.clone(),
            args: encode_all(args)?,
        },
        Expr::NewTuple { items } => WireExpr::NewTuple {
            items: encode_all(items)?,
        },
        Expr::Index { target, args, ty } => WireExpr::Index {
            target: Box::new(to_wire(target)?),
            args: encode_all(args)?,
            ty: ty.clone(),
        },
        Expr::Convert { operand, ty } => WireExpr::Convert {
            operand: Box::new(to_wire(operand)?),
            ty: ty.clone(),
        },
        Expr::TypeTest { operand, ty } => WireExpr::TypeTest {
            operand: Box::new(to_wire(operand)?),
            ty: ty.clone(),
        },
        Expr::Assign { target, value } => WireExpr::Assign {
            target: Box::new(to_wire(target)?),
            value: Box::new(to_wire(value)?),
        },
        Expr::Block { exprs } => WireExpr::Block {
            exprs: encode_all(exprs)?,
        },
        Expr::Try {
            body,
            catches,
            finally,
        } => WireExpr::Try {
            body: Box::new(to_wire(body)?),
            catches: catches
                .iter()
                .map(|c| {
                    Ok(WireCatch {
                        param: c.param.as_ref().map(wire_param),
                        body: to_wire(&c.body)?,
                    })
                })
                .collect::<Result<Vec<_>, WireError>>()?,
            finally: match finally {
                Some(f) => Some(Box::new(to_wire(f)?)),
                None => None,
            },
        },
        Expr::Jump { label } => WireExpr::Jump {
            label: label.clone(),
        },
        Expr::Loop { body } => WireExpr::Loop {
            body: Box::new(to_wire(body)?),
        },
        Expr::NewArray { element, items } => WireExpr::NewArray {
            element: element.clone(),
            items: encode_all(items)?,
        },
        Expr::SourceInvoke { .. } => {
            return Err(WireError::NotTransportable(expr.kind()));
        }
    })
}

/// Encode straight to JSON text.
pub fn to_json(expr: &Expr) -> Result<String, WireError> {
    let wire = to_wire(expr)?;
    Ok(serde_json::to_string(&wire)?)
}

// ──────────────────────────────────────────────
// Decoding
// ──────────────────────────────────────────────

/// Decoder state: one fresh local parameter per sender id.
#[derive(Default)]
struct Decoder {
    params: HashMap<u64, ParamRef>,
}

impl Decoder {
    fn param(&mut self, wp: &WireParam) -> ParamRef {
        self.params
            .entry(wp.id)
            .or_insert_with(|| Param::fresh(wp.name.clone(), wp.ty.clone()))
            .clone()
    }

    fn decode_all(&mut self, exprs: &[WireExpr]) -> Vec<Arc<Expr>> {
        exprs.iter().map(|e| self.decode(e)).collect()
    }

    fn decode(&mut self, wire: &WireExpr) -> Arc<Expr> {
        match wire {
            WireExpr::Constant { value, ty } => Expr::constant(value.clone(), ty.clone()),
            WireExpr::Parameter { param } => Expr::parameter(&self.param(param)),
            WireExpr::Lambda { params, body } => Expr::lambda(
                params.iter().map(|p| self.param(p)).collect(),
                self.decode(body),
            ),
            WireExpr::Invoke { target, args } => {
                Expr::invoke(self.decode(target), self.decode_all(args))
            }
            WireExpr::Call {
                method,
                target,
                args,
            } => Expr::call(
                method_sig(method),
                target.as_deref().map(|t| self.decode(t)),
                self.decode_all(args),
            ),
            WireExpr::Member { target, member, ty } => {
                Expr::member(self.decode(target), member.clone(), ty.clone())
            }
            WireExpr::Binary {
                op,
                left,
                right,
                method,
            } => Arc::new(Expr::Binary {
                op: *op,
                left: self.decode(left),
                right: self.decode(right),
                method: method.as_ref().map(method_sig),
            }),
            WireExpr::Unary { op, operand } => Arc::new(Expr::Unary {
                op: *op,
                operand: self.decode(operand),
            }),
            WireExpr::New { ty, args } => Arc::new(Expr::New {
                ty: ty.clone(),
                args: self.decode_all(args),
            }),
            WireExpr::NewRecord { ty, args } => Arc::new(Expr::NewRecord {
                ty: ty.clone(),
                args: self.decode_all(args),
            }),
            WireExpr::NewTuple { items } => Arc::new(Expr::NewTuple {
                items: self.decode_all(items),
            }),
            WireExpr::Index { target, args, ty } => Arc::new(Expr::Index {
                target: self.decode(target),
                args: self.decode_all(args),
                ty: ty.clone(),
            }),
            WireExpr::Convert { operand, ty } => Expr::convert(self.decode(operand), ty.clone()),
            WireExpr::TypeTest { operand, ty } => Arc::new(Expr::TypeTest {
                operand: self.decode(operand),
                ty: ty.clone(),
            }),
            WireExpr::Assign { target, value } => Arc::new(Expr::Assign {
                target: self.decode(target),
                value: self.decode(value),
            }),
            WireExpr::Block { exprs } => Arc::new(Expr::Block {
                exprs: self.decode_all(exprs),
            }),
            WireExpr::Try {
                body,
                catches,
                finally,
            } => Arc::new(Expr::Try {
                body: self.decode(body),
                catches: catches
                    .iter()
                    .map(|c| CatchClause {
                        param: c.param.as_ref().map(|p| self.param(p)),
                        body: self.decode(&c.body),
                    })
                    .collect(),
                finally: finally.as_deref().map(|f| self.decode(f)),
            }),
            WireExpr::Jump { label } => Arc::new(Expr::Jump {
                label: label.clone(),
            }),
            WireExpr::Loop { body } => Arc::new(Expr::Loop {
                body: self.decode(body),
            }),
            WireExpr::NewArray { element, items } => Arc::new(Expr::NewArray {
                element: element.clone(),
                items: self.decode_all(items),
            }),
        }
    }
}

fn method_sig(m: &WireMethod) -> MethodSig {
    MethodSig {
        owner: m.owner.clone(),
        name: m.name.clone(),
        type_args: m.type_args.clone(),
        params: m.params.clone(),
        ret: m.ret.clone(),
    }
}

/// Decode a received tree, minting fresh parameter identities.
pub fn from_wire(wire: &WireExpr) -> Arc<Expr> {
    Decoder::default().decode(wire)
}

/// Decode from JSON text.
pub fn from_json(json: &str) -> Result<Arc<Expr>, WireError> {
    let wire: WireExpr = serde_json::from_str(json)?;
    Ok(from_wire(&wire))
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleq_core::scan::find_unbound_parameters;

    #[test]
    fn decoding_remints_identities_but_preserves_sharing() {
        let f = Param::fresh("f", TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)));
        let x = Param::fresh("x", TypeSig::Int);
        // \x -> f(x), with f unbound.
        let tree = Expr::lambda(
            vec![x.clone()],
            Expr::invoke(Expr::parameter(&f), vec![Expr::parameter(&x)]),
        );
        let decoded = from_json(&to_json(&tree).unwrap()).unwrap();
        // x's declaration and reference decode to the same new identity.
        let unbound = find_unbound_parameters(&decoded);
        assert_eq!(unbound.len(), 1);
        assert_eq!(unbound[0].name, "f");
        assert_ne!(unbound[0].id, f.id, "sender identity must not survive decode");
    }

    #[test]
    fn distinct_sender_identities_stay_distinct() {
        let ty = TypeSig::seq(TypeSig::Int);
        let a = Param::fresh("R", ty.clone());
        let b = Param::fresh("R", ty);
        let tree = Arc::new(Expr::NewTuple {
            items: vec![Expr::parameter(&a), Expr::parameter(&b)],
        });
        let decoded = from_json(&to_json(&tree).unwrap()).unwrap();
        let unbound = find_unbound_parameters(&decoded);
        assert_eq!(unbound.len(), 2);
        assert_ne!(unbound[0].id, unbound[1].id);
    }

    #[test]
    fn bound_source_invocations_are_refused() {
        let source = teleq_core::source::SourceDescription::single(
            "Answer",
            vec![],
            TypeSig::Int,
            vec![],
            |_, _| Box::pin(async { Ok(Value::Int(42)) }),
        );
        let tree = Expr::source_invoke(source, vec![]);
        let err = to_wire(&tree).err().unwrap();
        assert!(matches!(err, WireError::NotTransportable(_)));
    }
}
