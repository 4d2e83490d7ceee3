//! Feature verification: refuting node kinds outside the allowed set.
//!
//! Queries arriving over the wire may only use a restricted expression
//! subset. The allowed set is a bitset; everything the bitset does not
//! grant is refuted with one error per offending node, and the whole
//! tree is always scanned so the caller sees every violation at once.

use crate::combine::Verifier;
use bitflags::bitflags;
use teleq_core::expr::Expr;
use teleq_core::validated::{ErrorSet, Validated};

bitflags! {
    /// Expression features a query may use.
    pub struct Features: u16 {
        const ASSIGNMENT   = 0b0000_0000_0001;
        const BLOCKS       = 0b0000_0000_0010;
        const TRY_BLOCKS   = 0b0000_0000_0100;
        const CATCH_BLOCKS = 0b0000_0000_1000;
        const JUMPS        = 0b0000_0001_0000;
        const INVOCATION   = 0b0000_0010_0000;
        const LOOPS        = 0b0000_0100_0000;
        const NEW_ARRAY    = 0b0000_1000_0000;
        const TYPE_TESTS   = 0b0001_0000_0000;
        const CONVERSIONS  = 0b0010_0000_0000;
    }
}

/// Refutes trees that use features outside the allowed set.
#[derive(Debug, Clone)]
pub struct FeatureVerifier {
    allowed: Features,
}

impl FeatureVerifier {
    /// Catch support implies try support: granting `CATCH_BLOCKS`
    /// grants `TRY_BLOCKS` as well.
    pub fn new(allowed: Features) -> FeatureVerifier {
        let mut allowed = allowed;
        if allowed.contains(Features::CATCH_BLOCKS) {
            allowed |= Features::TRY_BLOCKS;
        }
        FeatureVerifier { allowed }
    }

    /// The feature set remote queries get by default: pure expressions
    /// plus delegate invocation (the unbound-parameter convention needs
    /// it). Everything imperative stays off.
    pub fn default_remote() -> FeatureVerifier {
        FeatureVerifier::new(Features::INVOCATION)
    }

    fn check(&self, node: &Expr, errors: &mut Vec<String>) {
        let mut deny = |feature: &str| {
            errors.push(format!("disallowed {}: {} node", feature, node.kind()));
        };
        match node {
            Expr::Assign { .. } => {
                if !self.allowed.contains(Features::ASSIGNMENT) {
                    deny("assignment");
                }
            }
            Expr::Block { .. } => {
                if !self.allowed.contains(Features::BLOCKS) {
                    deny("block expression");
                }
            }
            Expr::Try { catches, .. } => {
                if !self.allowed.contains(Features::TRY_BLOCKS) {
                    deny("try block");
                }
                if !catches.is_empty() && !self.allowed.contains(Features::CATCH_BLOCKS) {
                    deny("catch block");
                }
            }
            Expr::Jump { .. } => {
                if !self.allowed.contains(Features::JUMPS) {
                    deny("unstructured jump");
                }
            }
            Expr::Invoke { .. } => {
                if !self.allowed.contains(Features::INVOCATION) {
                    deny("delegate invocation");
                }
            }
            Expr::Loop { .. } => {
                if !self.allowed.contains(Features::LOOPS) {
                    deny("loop");
                }
            }
            Expr::NewArray { .. } => {
                if !self.allowed.contains(Features::NEW_ARRAY) {
                    deny("array instantiation");
                }
            }
            Expr::TypeTest { .. } => {
                if !self.allowed.contains(Features::TYPE_TESTS) {
                    deny("type test");
                }
            }
            // A conversion can smuggle a type test, so it needs both
            // grants.
            Expr::Convert { .. } => {
                if !self.allowed.contains(Features::CONVERSIONS) {
                    deny("conversion");
                }
                if !self.allowed.contains(Features::TYPE_TESTS) {
                    deny("type test (via conversion)");
                }
            }
            _ => {}
        }
    }
}

impl Verifier for FeatureVerifier {
    fn verify(&self, tree: &Expr) -> Validated<()> {
        let mut errors = Vec::new();
        tree.walk(&mut |node| self.check(node, &mut errors));
        match ErrorSet::from_vec(errors) {
            None => Validated::Valid(()),
            Some(e) => Validated::Invalid(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use teleq_core::expr::Param;
    use teleq_core::types::TypeSig;

    fn assign_in_loop() -> Arc<Expr> {
        let x = Param::fresh("x", TypeSig::Int);
        Arc::new(Expr::Loop {
            body: Arc::new(Expr::Assign {
                target: Expr::parameter(&x),
                value: Expr::int(1),
            }),
        })
    }

    #[test]
    fn reports_every_violation_not_just_the_first() {
        let v = FeatureVerifier::default_remote();
        let tree = assign_in_loop();
        match v.verify(&tree) {
            Validated::Invalid(e) => {
                assert_eq!(e.len(), 2);
                assert!(e.reasons()[0].contains("loop"));
                assert!(e.reasons()[1].contains("assignment"));
            }
            Validated::Valid(()) => panic!("expected violations"),
        }
    }

    #[test]
    fn granted_features_pass() {
        let v = FeatureVerifier::new(
            Features::LOOPS | Features::ASSIGNMENT | Features::INVOCATION,
        );
        assert!(v.verify(&assign_in_loop()).is_valid());
    }

    #[test]
    fn catch_grant_implies_try_grant() {
        let v = FeatureVerifier::new(Features::CATCH_BLOCKS);
        let tree = Expr::Try {
            body: Expr::int(1),
            catches: vec![teleq_core::expr::CatchClause {
                param: None,
                body: Expr::int(0),
            }],
            finally: None,
        };
        assert!(v.verify(&tree).is_valid());
    }

    #[test]
    fn conversion_needs_both_grants() {
        let tree = Expr::convert(Expr::int(1), TypeSig::Float);
        let only_convert = FeatureVerifier::new(Features::CONVERSIONS);
        match only_convert.verify(&tree) {
            Validated::Invalid(e) => {
                assert_eq!(e.len(), 1);
                assert!(e.reasons()[0].contains("type test"));
            }
            Validated::Valid(()) => panic!("expected violation"),
        }
        let both = FeatureVerifier::new(Features::CONVERSIONS | Features::TYPE_TESTS);
        assert!(both.verify(&tree).is_valid());
    }

    #[test]
    fn default_remote_allows_invocation() {
        let p = Param::fresh(
            "source",
            TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)),
        );
        let tree = Expr::invoke(Expr::parameter(&p), vec![Expr::int(1)]);
        assert!(FeatureVerifier::default_remote().verify(&tree).is_valid());
    }
}
