//! Method binding: resolving unbound parameters to source descriptions
//! by name.
//!
//! Binding is keyed by parameter identity, so two distinct parameters
//! sharing a name each get their own entry (possibly to the same
//! source). Signature compatibility is deliberately NOT checked here:
//! unbound parameters are typically written in a simplified arity that
//! omits the synthetic parameters the real implementation requires, so
//! arity/type checking waits for invocation binding.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use teleq_core::expr::{ParamId, ParamRef};
use teleq_core::source::{SourceDescription, SourceRegistry};
use teleq_core::validated::{ErrorSet, Validated};

/// Parameter identity → resolved source.
pub type MethodBindings = HashMap<ParamId, Arc<SourceDescription>>;

/// Resolve each unbound parameter against the registry. One error per
/// unresolved name; failure never yields a partial map.
pub fn bind_methods(
    unbound: &[ParamRef],
    registry: &SourceRegistry,
) -> Validated<MethodBindings> {
    let mut bindings = MethodBindings::new();
    let mut errors: Vec<String> = Vec::new();
    let mut seen: HashSet<ParamId> = HashSet::new();

    for param in unbound {
        if !seen.insert(param.id) {
            continue;
        }
        match registry.get(&param.name) {
            Some(source) => {
                bindings.insert(param.id, source.clone());
            }
            None => errors.push(format!("no source found for name '{}'", param.name)),
        }
    }

    match ErrorSet::from_vec(errors) {
        None => Validated::Valid(bindings),
        Some(e) => Validated::Invalid(e),
    }
}
