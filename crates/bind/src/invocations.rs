//! Invocation binding: turning a resolved (parameter → source) entry
//! into a factory that constructs the bound invocation node.
//!
//! An unbound parameter's declared signature may omit the synthetic
//! parameters (the cancellation signal) that every real implementation
//! takes; in that case the factory appends references to the synthetic
//! parameters after the call-site arguments, and the concatenated type
//! list must exactly sequence-match the implementation's parameters.

use crate::methods::MethodBindings;
use std::collections::HashMap;
use std::sync::Arc;
use teleq_core::error::PipelineError;
use teleq_core::expr::{Expr, ParamId, ParamRef};
use teleq_core::source::SourceDescription;
use teleq_core::types::{format_type_list, TypeSig};
use teleq_core::validated::{ErrorSet, Validated};

/// Builds the invocation node for one bound parameter. Exists only
/// during rewriting.
#[derive(Debug, Clone)]
pub struct InvocationFactory {
    source: Arc<SourceDescription>,
    /// Synthetic parameters to append after call-site arguments; empty
    /// when the declared and implementation signatures already match.
    append: Vec<ParamRef>,
}

impl InvocationFactory {
    /// Construct the bound invocation from the original call-site
    /// arguments.
    pub fn build(&self, mut args: Vec<Arc<Expr>>) -> Arc<Expr> {
        for synthetic in &self.append {
            args.push(Expr::parameter(synthetic));
        }
        Expr::source_invoke(self.source.clone(), args)
    }
}

/// Parameter identity → invocation factory.
pub type InvocationBindings = HashMap<ParamId, InvocationFactory>;

/// The declared argument types of an unbound parameter (its function
/// signature minus the return position).
fn declared_args(param: &ParamRef) -> Vec<TypeSig> {
    match &param.ty {
        TypeSig::Func { params, .. } => params.clone(),
        // A non-function unbound parameter is a nullary source
        // reference.
        _ => Vec::new(),
    }
}

/// Bind every resolved parameter to an invocation factory.
///
/// `order` fixes the error order (scan order of the distinct unbound
/// parameters). A parameter present in `order` but absent from
/// `bindings` is a binder-contract violation: the method binder
/// guarantees completeness, so this is fatal, not accumulated.
pub fn bind_invocations(
    bindings: &MethodBindings,
    order: &[ParamRef],
    synthetics: &[ParamRef],
) -> Result<Validated<InvocationBindings>, PipelineError> {
    let synthetic_types: Vec<TypeSig> = synthetics.iter().map(|p| p.ty.clone()).collect();
    let mut factories = InvocationBindings::new();
    let mut errors: Vec<String> = Vec::new();

    for param in order {
        let source = bindings.get(&param.id).ok_or_else(|| {
            PipelineError::BinderContract(format!(
                "no binding produced for parameter '{}'",
                param.name
            ))
        })?;

        let declared = declared_args(param);
        if declared == source.params {
            factories.insert(
                param.id,
                InvocationFactory {
                    source: source.clone(),
                    append: Vec::new(),
                },
            );
            continue;
        }

        let mut extended = declared.clone();
        extended.extend(synthetic_types.iter().cloned());
        if extended == source.params {
            factories.insert(
                param.id,
                InvocationFactory {
                    source: source.clone(),
                    append: synthetics.to_vec(),
                },
            );
        } else {
            errors.push(format!(
                "cannot bind '{}': declared arguments {} plus synthetics {} do not match implementation parameters {}",
                param.name,
                format_type_list(&declared),
                format_type_list(&synthetic_types),
                format_type_list(&source.params),
            ));
        }
    }

    Ok(match ErrorSet::from_vec(errors) {
        None => Validated::Valid(factories),
        Some(e) => Validated::Invalid(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleq_core::expr::Param;
    use teleq_core::stream::VecStream;
    use teleq_core::value::Value;

    fn echo_source(params: Vec<TypeSig>) -> Arc<SourceDescription> {
        SourceDescription::streaming("Echo", params, TypeSig::Int, vec![], |_args, _token| {
            Box::new(VecStream::new(vec![Value::Int(0)]))
        })
    }

    fn signal_param() -> ParamRef {
        Param::fresh("cancel", TypeSig::Signal)
    }

    #[test]
    fn exact_signature_appends_nothing() {
        let source = echo_source(vec![TypeSig::Int]);
        let param = Param::fresh(
            "Echo",
            TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)),
        );
        let mut bindings = MethodBindings::new();
        bindings.insert(param.id, source);
        let result = bind_invocations(&bindings, &[param.clone()], &[signal_param()]).unwrap();
        let factories = result.into_result().unwrap();
        let built = factories[&param.id].build(vec![Expr::int(42)]);
        match &*built {
            Expr::SourceInvoke { args, .. } => assert_eq!(args.len(), 1),
            other => panic!("expected SourceInvoke, got {}", other.kind()),
        }
    }

    #[test]
    fn trailing_synthetics_are_appended() {
        let source = echo_source(vec![TypeSig::Int, TypeSig::Signal]);
        let param = Param::fresh(
            "Echo",
            TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)),
        );
        let signal = signal_param();
        let mut bindings = MethodBindings::new();
        bindings.insert(param.id, source);
        let result = bind_invocations(&bindings, &[param.clone()], &[signal.clone()]).unwrap();
        let factories = result.into_result().unwrap();
        let built = factories[&param.id].build(vec![Expr::int(42)]);
        match &*built {
            Expr::SourceInvoke { args, .. } => {
                assert_eq!(args.len(), 2);
                match &*args[1] {
                    Expr::Parameter(p) => assert_eq!(p.id, signal.id),
                    other => panic!("expected synthetic parameter, got {}", other.kind()),
                }
            }
            other => panic!("expected SourceInvoke, got {}", other.kind()),
        }
    }

    #[test]
    fn mismatch_names_both_type_lists() {
        let source = echo_source(vec![TypeSig::Str, TypeSig::Signal]);
        let param = Param::fresh(
            "Echo",
            TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)),
        );
        let mut bindings = MethodBindings::new();
        bindings.insert(param.id, source);
        let result = bind_invocations(&bindings, &[param], &[signal_param()]).unwrap();
        match result {
            Validated::Invalid(e) => {
                assert_eq!(e.len(), 1);
                let msg = &e.reasons()[0];
                assert!(msg.contains("(Int)"));
                assert!(msg.contains("(Str, Signal)"));
            }
            Validated::Valid(_) => panic!("expected signature mismatch"),
        }
    }

    #[test]
    fn absent_binding_is_fatal() {
        let param = Param::fresh("Ghost", TypeSig::func(vec![], TypeSig::seq(TypeSig::Int)));
        let err = bind_invocations(&MethodBindings::new(), &[param], &[]).unwrap_err();
        assert!(matches!(err, PipelineError::BinderContract(_)));
    }
}
