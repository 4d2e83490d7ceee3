//! Static type signatures carried by expression nodes.
//!
//! Every node in a query tree has a static result type. Types are
//! structural: two signatures are equal iff they print the same shape.
//! `Named` covers nominal (possibly generic) host types; `Seq` and
//! `Task` are the two result shapes the pipeline knows how to erase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSig {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    /// Nominal host type, possibly a closed generic (`args` non-empty).
    Named { name: String, args: Vec<TypeSig> },
    /// Function signature: used for lambdas and unbound parameters.
    Func { params: Vec<TypeSig>, ret: Box<TypeSig> },
    /// Streamed sequence of elements.
    Seq(Box<TypeSig>),
    /// Single asynchronous result.
    Task(Box<TypeSig>),
    /// Anonymous record: structural, field order is canonical order.
    Record { fields: Vec<(String, TypeSig)> },
    /// Positional tuple (the transportable encoding of a record).
    Tuple(Vec<TypeSig>),
    /// Cancellation signal threaded to source implementations.
    Signal,
    /// Transport-erased value type.
    Erased,
}

impl TypeSig {
    pub fn named(name: impl Into<String>) -> TypeSig {
        TypeSig::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeSig>) -> TypeSig {
        TypeSig::Named {
            name: name.into(),
            args,
        }
    }

    pub fn func(params: Vec<TypeSig>, ret: TypeSig) -> TypeSig {
        TypeSig::Func {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn seq(element: TypeSig) -> TypeSig {
        TypeSig::Seq(Box::new(element))
    }

    pub fn task(result: TypeSig) -> TypeSig {
        TypeSig::Task(Box::new(result))
    }

    /// True for the built-in scalar types.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeSig::Unit | TypeSig::Bool | TypeSig::Int | TypeSig::Float | TypeSig::Str
        )
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Unit => write!(f, "Unit"),
            TypeSig::Bool => write!(f, "Bool"),
            TypeSig::Int => write!(f, "Int"),
            TypeSig::Float => write!(f, "Float"),
            TypeSig::Str => write!(f, "Str"),
            TypeSig::Named { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeSig::Func { params, ret } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            TypeSig::Seq(t) => write!(f, "Seq<{}>", t),
            TypeSig::Task(t) => write!(f, "Task<{}>", t),
            TypeSig::Record { fields } => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            TypeSig::Tuple(items) => {
                write!(f, "(")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
            TypeSig::Signal => write!(f, "Signal"),
            TypeSig::Erased => write!(f, "Erased"),
        }
    }
}

/// Render a parameter-type list the way binder diagnostics expect it.
pub fn format_type_list(types: &[TypeSig]) -> String {
    let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    format!("({})", parts.join(", "))
}
