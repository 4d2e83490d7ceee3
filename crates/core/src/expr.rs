//! The query expression tree.
//!
//! Trees are immutable: children are `Arc`-shared and every rewrite
//! produces a new tree. Node kinds form a closed enum; verifiers and
//! rewriters are recursive functions over that enum rather than a
//! visitor hierarchy.
//!
//! Parameter identity is the load-bearing subtlety here: a [`Param`]
//! carries a process-unique [`ParamId`], and every binding map in the
//! pipeline is keyed by that id, never by name. Two parameters that
//! happen to share a name are distinct bindings.

use crate::source::SourceDescription;
use crate::types::TypeSig;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ──────────────────────────────────────────────
// Parameters
// ──────────────────────────────────────────────

static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a parameter node, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u64);

/// A parameter declaration. Shared (`ParamRef`) between its declaring
/// lambda (if any) and every reference site in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub id: ParamId,
    pub name: String,
    pub ty: TypeSig,
}

pub type ParamRef = Arc<Param>;

impl Param {
    /// Mint a parameter with a fresh identity.
    pub fn fresh(name: impl Into<String>, ty: TypeSig) -> ParamRef {
        Arc::new(Param {
            id: ParamId(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            ty,
        })
    }

    /// Same identity, different static type. Used by type-mapping
    /// rewrites that must not disturb binding identity.
    pub fn retyped(param: &ParamRef, ty: TypeSig) -> ParamRef {
        Arc::new(Param {
            id: param.id,
            name: param.name.clone(),
            ty,
        })
    }
}

// ──────────────────────────────────────────────
// Method signatures
// ──────────────────────────────────────────────

/// Signature of a named host method referenced by a `Call` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    /// Declaring type.
    pub owner: TypeSig,
    pub name: String,
    /// Type arguments for a closed generic method; empty otherwise.
    pub type_args: Vec<TypeSig>,
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)?;
        if !self.type_args.is_empty() {
            write!(f, "<")?;
            for (i, t) in self.type_args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", t)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Operators
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// True for operators whose result is Bool regardless of operand type.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

// ──────────────────────────────────────────────
// Nodes
// ──────────────────────────────────────────────

/// A catch clause of a `Try` node.
#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<ParamRef>,
    pub body: Arc<Expr>,
}

/// One node of a query tree.
#[derive(Debug, Clone)]
pub enum Expr {
    Constant {
        value: Value,
        ty: TypeSig,
    },
    Parameter(ParamRef),
    Lambda {
        params: Vec<ParamRef>,
        body: Arc<Expr>,
    },
    /// Delegate invocation: applying a function-typed expression. An
    /// `Invoke` whose target is an unbound `Parameter` is the convention
    /// for calling a named remote source.
    Invoke {
        target: Arc<Expr>,
        args: Vec<Arc<Expr>>,
    },
    /// Named host method call. `target` is None for static methods.
    Call {
        method: MethodSig,
        target: Option<Arc<Expr>>,
        args: Vec<Arc<Expr>>,
    },
    /// Field or property access.
    Member {
        target: Arc<Expr>,
        member: String,
        ty: TypeSig,
    },
    Binary {
        op: BinaryOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
        /// Operator implemented by a host method, if any; the member
        /// verifier checks it like a call.
        method: Option<MethodSig>,
    },
    Unary {
        op: UnaryOp,
        operand: Arc<Expr>,
    },
    /// Nominal construction.
    New {
        ty: TypeSig,
        args: Vec<Arc<Expr>>,
    },
    /// Anonymous-record construction; `ty` is a `TypeSig::Record` and
    /// args follow its canonical field order.
    NewRecord {
        ty: TypeSig,
        args: Vec<Arc<Expr>>,
    },
    NewTuple {
        items: Vec<Arc<Expr>>,
    },
    /// Indexer access.
    Index {
        target: Arc<Expr>,
        args: Vec<Arc<Expr>>,
        ty: TypeSig,
    },
    Convert {
        operand: Arc<Expr>,
        ty: TypeSig,
    },
    TypeTest {
        operand: Arc<Expr>,
        ty: TypeSig,
    },
    // Restricted-feature kinds. Representable so the feature verifier
    // can refute them; the compiler does not execute them.
    Assign {
        target: Arc<Expr>,
        value: Arc<Expr>,
    },
    Block {
        exprs: Vec<Arc<Expr>>,
    },
    Try {
        body: Arc<Expr>,
        catches: Vec<CatchClause>,
        finally: Option<Arc<Expr>>,
    },
    Jump {
        label: String,
    },
    Loop {
        body: Arc<Expr>,
    },
    NewArray {
        element: TypeSig,
        items: Vec<Arc<Expr>>,
    },
    /// Server-only: a bound invocation of a resolved source. Produced by
    /// the binding rewriter, never accepted from the wire.
    SourceInvoke {
        source: Arc<SourceDescription>,
        args: Vec<Arc<Expr>>,
    },
}

impl Expr {
    // ── Constructors ─────────────────────────────

    pub fn constant(value: Value, ty: TypeSig) -> Arc<Expr> {
        Arc::new(Expr::Constant { value, ty })
    }

    pub fn int(i: i64) -> Arc<Expr> {
        Expr::constant(Value::Int(i), TypeSig::Int)
    }

    pub fn str(s: impl Into<String>) -> Arc<Expr> {
        Expr::constant(Value::Str(s.into()), TypeSig::Str)
    }

    pub fn parameter(param: &ParamRef) -> Arc<Expr> {
        Arc::new(Expr::Parameter(param.clone()))
    }

    pub fn lambda(params: Vec<ParamRef>, body: Arc<Expr>) -> Arc<Expr> {
        Arc::new(Expr::Lambda { params, body })
    }

    pub fn invoke(target: Arc<Expr>, args: Vec<Arc<Expr>>) -> Arc<Expr> {
        Arc::new(Expr::Invoke { target, args })
    }

    pub fn call(method: MethodSig, target: Option<Arc<Expr>>, args: Vec<Arc<Expr>>) -> Arc<Expr> {
        Arc::new(Expr::Call {
            method,
            target,
            args,
        })
    }

    pub fn member(target: Arc<Expr>, member: impl Into<String>, ty: TypeSig) -> Arc<Expr> {
        Arc::new(Expr::Member {
            target,
            member: member.into(),
            ty,
        })
    }

    pub fn binary(op: BinaryOp, left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
        Arc::new(Expr::Binary {
            op,
            left,
            right,
            method: None,
        })
    }

    pub fn convert(operand: Arc<Expr>, ty: TypeSig) -> Arc<Expr> {
        Arc::new(Expr::Convert { operand, ty })
    }

    pub fn source_invoke(source: Arc<SourceDescription>, args: Vec<Arc<Expr>>) -> Arc<Expr> {
        Arc::new(Expr::SourceInvoke { source, args })
    }

    /// Short node-kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Constant { .. } => "constant",
            Expr::Parameter(_) => "parameter",
            Expr::Lambda { .. } => "lambda",
            Expr::Invoke { .. } => "invocation",
            Expr::Call { .. } => "call",
            Expr::Member { .. } => "member access",
            Expr::Binary { .. } => "binary operator",
            Expr::Unary { .. } => "unary operator",
            Expr::New { .. } => "construction",
            Expr::NewRecord { .. } => "record construction",
            Expr::NewTuple { .. } => "tuple construction",
            Expr::Index { .. } => "indexer",
            Expr::Convert { .. } => "conversion",
            Expr::TypeTest { .. } => "type test",
            Expr::Assign { .. } => "assignment",
            Expr::Block { .. } => "block",
            Expr::Try { .. } => "try",
            Expr::Jump { .. } => "jump",
            Expr::Loop { .. } => "loop",
            Expr::NewArray { .. } => "array construction",
            Expr::SourceInvoke { .. } => "source invocation",
        }
    }

    // ── Static typing ────────────────────────────

    /// Static result type of this node.
    pub fn ty(&self) -> TypeSig {
        match self {
            Expr::Constant { ty, .. } => ty.clone(),
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Lambda { params, body } => TypeSig::Func {
                params: params.iter().map(|p| p.ty.clone()).collect(),
                ret: Box::new(body.ty()),
            },
            Expr::Invoke { target, .. } => match target.ty() {
                TypeSig::Func { ret, .. } => *ret,
                other => other,
            },
            Expr::Call { method, .. } => method.ret.clone(),
            Expr::Member { ty, .. } => ty.clone(),
            Expr::Binary { op, left, .. } => {
                if op.is_predicate() {
                    TypeSig::Bool
                } else {
                    left.ty()
                }
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => TypeSig::Bool,
                UnaryOp::Neg => operand.ty(),
            },
            Expr::New { ty, .. } => ty.clone(),
            Expr::NewRecord { ty, .. } => ty.clone(),
            Expr::NewTuple { items } => TypeSig::Tuple(items.iter().map(|i| i.ty()).collect()),
            Expr::Index { ty, .. } => ty.clone(),
            Expr::Convert { ty, .. } => ty.clone(),
            Expr::TypeTest { .. } => TypeSig::Bool,
            Expr::Assign { value, .. } => value.ty(),
            Expr::Block { exprs } => exprs.last().map_or(TypeSig::Unit, |e| e.ty()),
            Expr::Try { body, .. } => body.ty(),
            Expr::Jump { .. } => TypeSig::Unit,
            Expr::Loop { .. } => TypeSig::Unit,
            Expr::NewArray { element, .. } => {
                TypeSig::generic("Array", vec![element.clone()])
            }
            Expr::SourceInvoke { source, .. } => source.ret.clone(),
        }
    }

    // ── Traversal ────────────────────────────────

    /// Pre-order walk over every node in the tree.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Constant { .. } | Expr::Parameter(_) | Expr::Jump { .. } => {}
            Expr::Lambda { body, .. } => body.walk(visit),
            Expr::Invoke { target, args } => {
                target.walk(visit);
                for a in args {
                    a.walk(visit);
                }
            }
            Expr::Call { target, args, .. } => {
                if let Some(t) = target {
                    t.walk(visit);
                }
                for a in args {
                    a.walk(visit);
                }
            }
            Expr::Member { target, .. } => target.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::New { args, .. } | Expr::NewRecord { args, .. } => {
                for a in args {
                    a.walk(visit);
                }
            }
            Expr::NewTuple { items } | Expr::NewArray { items, .. } => {
                for i in items {
                    i.walk(visit);
                }
            }
            Expr::Index { target, args, .. } => {
                target.walk(visit);
                for a in args {
                    a.walk(visit);
                }
            }
            Expr::Convert { operand, .. } | Expr::TypeTest { operand, .. } => operand.walk(visit),
            Expr::Assign { target, value } => {
                target.walk(visit);
                value.walk(visit);
            }
            Expr::Block { exprs } => {
                for e in exprs {
                    e.walk(visit);
                }
            }
            Expr::Try {
                body,
                catches,
                finally,
            } => {
                body.walk(visit);
                for c in catches {
                    c.body.walk(visit);
                }
                if let Some(fin) = finally {
                    fin.walk(visit);
                }
            }
            Expr::Loop { body } => body.walk(visit),
            Expr::SourceInvoke { args, .. } => {
                for a in args {
                    a.walk(visit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_parameters_are_distinct() {
        let a = Param::fresh("xs", TypeSig::seq(TypeSig::Int));
        let b = Param::fresh("xs", TypeSig::seq(TypeSig::Int));
        assert_ne!(a.id, b.id);
        assert_eq!(a.name, b.name);
    }

    #[test]
    fn static_type_of_binary_predicate_is_bool() {
        let e = Expr::binary(BinaryOp::Lt, Expr::int(1), Expr::int(2));
        assert_eq!(e.ty(), TypeSig::Bool);
        let s = Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2));
        assert_eq!(s.ty(), TypeSig::Int);
    }

    #[test]
    fn walk_visits_in_preorder() {
        let tree = Expr::binary(
            BinaryOp::Add,
            Expr::int(1),
            Expr::binary(BinaryOp::Mul, Expr::int(2), Expr::int(3)),
        );
        let mut seen = Vec::new();
        tree.walk(&mut |e| {
            seen.push(match e {
                Expr::Binary { op, .. } => format!("{:?}", op),
                Expr::Constant { value, .. } => value.to_string(),
                _ => "?".to_string(),
            })
        });
        assert_eq!(seen, vec!["Add", "1", "Mul", "2", "3"]);
    }

    #[test]
    fn invoke_type_is_function_return() {
        let p = Param::fresh(
            "source",
            TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)),
        );
        let inv = Expr::invoke(Expr::parameter(&p), vec![Expr::int(5)]);
        assert_eq!(inv.ty(), TypeSig::seq(TypeSig::Int));
    }
}
