//! Free-variable scanner.
//!
//! An unbound parameter is a `Parameter` node whose declaration does not
//! appear in any lambda's parameter list anywhere in the tree. Scoping
//! is lexical and tree-global: once a parameter identity is declared by
//! some lambda, references to it are bound everywhere, and a same-named
//! parameter declared elsewhere is a different identity entirely.

use crate::expr::{Expr, ParamId, ParamRef};
use std::collections::HashSet;

/// Report every unbound parameter reference in traversal order.
/// Duplicates are preserved; the tree is never mutated.
pub fn find_unbound_parameters(tree: &Expr) -> Vec<ParamRef> {
    let mut declared: HashSet<ParamId> = HashSet::new();
    tree.walk(&mut |node| {
        if let Expr::Lambda { params, .. } = node {
            for p in params {
                declared.insert(p.id);
            }
        }
    });

    let mut unbound = Vec::new();
    tree.walk(&mut |node| {
        if let Expr::Parameter(p) = node {
            if !declared.contains(&p.id) {
                unbound.push(p.clone());
            }
        }
    });
    unbound
}

/// The distinct unbound parameters, first occurrence wins.
pub fn distinct_unbound_parameters(tree: &Expr) -> Vec<ParamRef> {
    let mut seen: HashSet<ParamId> = HashSet::new();
    find_unbound_parameters(tree)
        .into_iter()
        .filter(|p| seen.insert(p.id))
        .collect()
}
