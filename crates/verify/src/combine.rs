//! Verifier trait and the accumulating combinator.

use teleq_core::expr::Expr;
use teleq_core::validated::Validated;

/// A check run over a whole query tree.
pub trait Verifier: Send + Sync {
    /// Scan the entire tree and report every violation, never just the
    /// first.
    fn verify(&self, tree: &Expr) -> Validated<()>;
}

/// Runs every constituent verifier against the same tree and merges
/// their results with the applicative combine, so errors from all
/// failing verifiers appear in declaration order.
pub struct CombinedVerifier {
    verifiers: Vec<Box<dyn Verifier>>,
}

impl CombinedVerifier {
    pub fn new(verifiers: Vec<Box<dyn Verifier>>) -> CombinedVerifier {
        CombinedVerifier { verifiers }
    }

    /// A combinator with no constituents; accepts everything.
    pub fn empty() -> CombinedVerifier {
        CombinedVerifier {
            verifiers: Vec::new(),
        }
    }

    pub fn push(&mut self, verifier: Box<dyn Verifier>) {
        self.verifiers.push(verifier);
    }
}

impl Verifier for CombinedVerifier {
    fn verify(&self, tree: &Expr) -> Validated<()> {
        self.verifiers
            .iter()
            .map(|v| v.verify(tree))
            .fold(Validated::Valid(()), Validated::and)
    }
}
