//! Member verification: types, methods, constructors, members against
//! an allow-list.
//!
//! Allowances are disjunctive: a use is permitted when any allowance
//! accepts it. Primitive types (and their methods and members) are
//! implicitly allowed wherever they appear directly, but NOT in
//! generic-argument position: `List<Str>` needs `Str` in the allow-set
//! even though a bare `Str` constant would pass. This is what makes the
//! open-generic closing rule meaningful — allowing `List<>` does not
//! transitively allow `List<anything>`.

use crate::combine::Verifier;
use std::sync::Arc;
use teleq_core::expr::{Expr, MethodSig};
use teleq_core::types::TypeSig;
use teleq_core::validated::{ErrorSet, Validated};

// ──────────────────────────────────────────────
// Allowances
// ──────────────────────────────────────────────

/// One way a member use can be permitted.
#[derive(Clone)]
pub enum Allowance {
    /// Exact type: a non-generic type, or one specific closed generic.
    Type(TypeSig),
    /// Open generic type definition; type arguments are checked
    /// recursively against the allow-set.
    OpenType { name: String },
    /// A non-generic method of a given owner.
    Method { owner: TypeSig, name: String },
    /// A generic method definition; type arguments are checked
    /// recursively against the allow-set.
    MethodDefinition { owner_name: String, name: String },
    /// A field or property of a given owner.
    Member { owner: TypeSig, name: String },
    /// Arbitrary predicate over the member use.
    Predicate(Arc<dyn Fn(&MemberUse<'_>) -> bool + Send + Sync>),
}

impl std::fmt::Debug for Allowance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Allowance::Type(t) => write!(f, "Type({})", t),
            Allowance::OpenType { name } => write!(f, "OpenType({}<>)", name),
            Allowance::Method { owner, name } => write!(f, "Method({}.{})", owner, name),
            Allowance::MethodDefinition { owner_name, name } => {
                write!(f, "MethodDefinition({}.{})", owner_name, name)
            }
            Allowance::Member { owner, name } => write!(f, "Member({}.{})", owner, name),
            Allowance::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// A member use presented to predicate allowances.
#[derive(Debug)]
pub enum MemberUse<'a> {
    Type(&'a TypeSig),
    Method(&'a MethodSig),
    Constructor { ty: &'a TypeSig },
    Member { owner: &'a TypeSig, name: &'a str },
    Indexer { owner: &'a TypeSig },
}

// ──────────────────────────────────────────────
// Verifier
// ──────────────────────────────────────────────

/// Refutes trees referencing types, methods, constructors, or members
/// outside the allow-set.
#[derive(Debug, Clone, Default)]
pub struct MemberVerifier {
    allowances: Vec<Allowance>,
}

impl MemberVerifier {
    pub fn new(allowances: Vec<Allowance>) -> MemberVerifier {
        MemberVerifier { allowances }
    }

    pub fn allow(mut self, allowance: Allowance) -> MemberVerifier {
        self.allowances.push(allowance);
        self
    }

    fn predicate_allows(&self, use_: &MemberUse<'_>) -> bool {
        self.allowances.iter().any(|a| match a {
            Allowance::Predicate(p) => p(use_),
            _ => false,
        })
    }

    /// Is `ty` allowed? `explicit_only` is set in generic-argument
    /// position, where the implicit primitive allowance is suspended.
    fn type_allowed(&self, ty: &TypeSig, explicit_only: bool) -> bool {
        if self
            .allowances
            .iter()
            .any(|a| matches!(a, Allowance::Type(t) if t == ty))
        {
            return true;
        }
        match ty {
            TypeSig::Named { name, args } if !args.is_empty() => {
                // Closed generic: open definition allowed and every
                // argument independently allowed (explicitly).
                let open = self
                    .allowances
                    .iter()
                    .any(|a| matches!(a, Allowance::OpenType { name: n } if n == name));
                open && args.iter().all(|arg| self.type_allowed(arg, true))
            }
            TypeSig::Named { .. } => self.predicate_allows(&MemberUse::Type(ty)),
            // Structural composites carry no nominal surface of their
            // own; their components are what gets checked.
            TypeSig::Seq(t) | TypeSig::Task(t) => self.type_allowed(t, explicit_only),
            TypeSig::Tuple(items) => items.iter().all(|t| self.type_allowed(t, explicit_only)),
            TypeSig::Record { fields } => fields
                .iter()
                .all(|(_, t)| self.type_allowed(t, explicit_only)),
            TypeSig::Func { params, ret } => {
                params.iter().all(|t| self.type_allowed(t, explicit_only))
                    && self.type_allowed(ret, explicit_only)
            }
            TypeSig::Signal | TypeSig::Erased => true,
            _ if ty.is_primitive() => {
                !explicit_only || self.predicate_allows(&MemberUse::Type(ty))
            }
            _ => self.predicate_allows(&MemberUse::Type(ty)),
        }
    }

    fn method_allowed(&self, sig: &MethodSig) -> bool {
        // Methods of primitive types are implicitly allowed.
        if sig.owner.is_primitive() {
            return true;
        }
        if !self.type_allowed(&sig.owner, false) {
            return false;
        }
        let exact = self.allowances.iter().any(|a| {
            matches!(a, Allowance::Method { owner, name }
                if *owner == sig.owner && *name == sig.name && sig.type_args.is_empty())
        });
        if exact {
            return true;
        }
        // Closed generic method: definition allowed and every type
        // argument explicitly allowed.
        if !sig.type_args.is_empty() {
            let owner_name = match &sig.owner {
                TypeSig::Named { name, .. } => name.as_str(),
                _ => "",
            };
            let definition = self.allowances.iter().any(|a| {
                matches!(a, Allowance::MethodDefinition { owner_name: o, name }
                    if *o == owner_name && *name == sig.name)
            });
            if definition && sig.type_args.iter().all(|t| self.type_allowed(t, true)) {
                return true;
            }
        }
        self.predicate_allows(&MemberUse::Method(sig))
    }

    fn member_allowed(&self, owner: &TypeSig, name: &str) -> bool {
        if owner.is_primitive()
            || matches!(owner, TypeSig::Record { .. } | TypeSig::Tuple(_))
        {
            return true;
        }
        if !self.type_allowed(owner, false) {
            return false;
        }
        self.allowances.iter().any(|a| {
            matches!(a, Allowance::Member { owner: o, name: n } if o == owner && n == name)
        }) || self.predicate_allows(&MemberUse::Member { owner, name })
    }

    fn check(&self, node: &Expr, errors: &mut Vec<String>) {
        match node {
            Expr::Constant { ty, .. } => {
                if !self.type_allowed(ty, false) {
                    errors.push(format!("disallowed type in constant: {}", ty));
                }
            }
            Expr::Call { method, .. } => {
                if !self.method_allowed(method) {
                    errors.push(format!("disallowed method: {}", method));
                }
            }
            Expr::Binary {
                method: Some(method),
                ..
            } => {
                if !self.method_allowed(method) {
                    errors.push(format!("disallowed operator method: {}", method));
                }
            }
            Expr::New { ty, .. } => {
                let ctor_ok = self.type_allowed(ty, false)
                    || self.predicate_allows(&MemberUse::Constructor { ty });
                if !ctor_ok {
                    errors.push(format!("disallowed constructor: {}", ty));
                }
            }
            Expr::Index { target, .. } => {
                let owner = target.ty();
                let ok = owner.is_primitive()
                    || self.type_allowed(&owner, false)
                    || self.predicate_allows(&MemberUse::Indexer { owner: &owner });
                if !ok {
                    errors.push(format!("disallowed indexer on type: {}", owner));
                }
            }
            Expr::Member { target, member, .. } => {
                let owner = target.ty();
                if !self.member_allowed(&owner, member) {
                    errors.push(format!("disallowed member: {}.{}", owner, member));
                }
            }
            _ => {}
        }
    }
}

impl Verifier for MemberVerifier {
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
    use teleq_core::value::Value;

    fn list_of(t: TypeSig) -> TypeSig {
        TypeSig::generic("List", vec![t])
    }

    fn constant_of(ty: TypeSig) -> Expr {
        Expr::Constant {
            value: Value::Seq(vec![]),
            ty,
        }
    }

    #[test]
    fn open_generic_closes_over_allowed_arguments() {
        let v = MemberVerifier::new(vec![
            Allowance::OpenType {
                name: "List".to_string(),
            },
            Allowance::Type(TypeSig::Str),
        ]);
        assert!(v.verify(&constant_of(list_of(TypeSig::Str))).is_valid());
        match v.verify(&constant_of(list_of(TypeSig::Int))) {
            Validated::Invalid(e) => {
                assert_eq!(e.len(), 1);
                assert!(e.reasons()[0].contains("List<Int>"));
            }
            Validated::Valid(()) => panic!("List<Int> must be refuted"),
        }
    }

    #[test]
    fn exact_closed_generic_does_not_open() {
        let v = MemberVerifier::new(vec![Allowance::Type(list_of(TypeSig::named("DateTime")))]);
        assert!(!v.verify(&constant_of(list_of(TypeSig::Str))).is_valid());
        assert!(!v.verify(&constant_of(list_of(TypeSig::Int))).is_valid());
        assert!(v
            .verify(&constant_of(list_of(TypeSig::named("DateTime"))))
            .is_valid());
    }

    #[test]
    fn nested_generics_close_recursively() {
        let v = MemberVerifier::new(vec![
            Allowance::OpenType {
                name: "List".to_string(),
            },
            Allowance::Type(TypeSig::Str),
        ]);
        // List<List<Str>> closes; List<List<Int>> does not.
        assert!(v
            .verify(&constant_of(list_of(list_of(TypeSig::Str))))
            .is_valid());
        assert!(!v
            .verify(&constant_of(list_of(list_of(TypeSig::Int))))
            .is_valid());
    }

    #[test]
    fn primitive_constants_implicitly_allowed() {
        let v = MemberVerifier::new(vec![]);
        assert!(v.verify(&Expr::Constant {
            value: Value::Int(42),
            ty: TypeSig::Int,
        })
        .is_valid());
    }

    #[test]
    fn generic_method_closes_via_definition() {
        let owner = TypeSig::named("Query");
        let allowed = MemberVerifier::new(vec![
            Allowance::Type(owner.clone()),
            Allowance::MethodDefinition {
                owner_name: "Query".to_string(),
                name: "of".to_string(),
            },
            Allowance::Type(TypeSig::Str),
        ]);
        let call = |arg: TypeSig| {
            Expr::Call {
                method: MethodSig {
                    owner: owner.clone(),
                    name: "of".to_string(),
                    type_args: vec![arg.clone()],
                    params: vec![],
                    ret: TypeSig::seq(arg),
                },
                target: None,
                args: vec![],
            }
        };
        assert!(allowed.verify(&call(TypeSig::Str)).is_valid());
        assert!(!allowed.verify(&call(TypeSig::Int)).is_valid());
    }

    #[test]
    fn disallowed_member_access_reported() {
        let secret = TypeSig::named("Vault");
        let v = MemberVerifier::new(vec![Allowance::Type(secret.clone())]);
        let tree = Expr::Member {
            target: Expr::constant(Value::Unit, secret.clone()),
            member: "master_key".to_string(),
            ty: TypeSig::Str,
        };
        match v.verify(&tree) {
            Validated::Invalid(e) => assert!(e.reasons()[0].contains("Vault.master_key")),
            Validated::Valid(()) => panic!("expected refutation"),
        }
    }

    #[test]
    fn predicate_allowance_is_disjunctive() {
        let v = MemberVerifier::new(vec![Allowance::Predicate(Arc::new(|u| {
            matches!(u, MemberUse::Type(TypeSig::Named { name, .. }) if name == "Orders")
        }))]);
        assert!(v
            .verify(&constant_of(TypeSig::named("Orders")))
            .is_valid());
        assert!(!v
            .verify(&constant_of(TypeSig::named("Vault")))
            .is_valid());
    }
}
