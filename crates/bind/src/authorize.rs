//! Authorization of resolved sources against the caller's claims.
//!
//! The single asynchronous stage of the pipeline. The union of policy
//! requirements across every resolved source is evaluated once as a
//! combined policy; a query touching only unrestricted sources is
//! authorized without consulting the evaluator at all.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use teleq_core::source::SourceDescription;
use teleq_core::validated::{ErrorSet, Validated};

/// The caller's identity and granted policy names, as established by
/// the host's authentication layer.
#[derive(Debug, Clone, Default)]
pub struct Claims {
    pub subject: String,
    pub grants: BTreeSet<String>,
}

impl Claims {
    pub fn new(subject: impl Into<String>) -> Claims {
        Claims {
            subject: subject.into(),
            grants: BTreeSet::new(),
        }
    }

    pub fn grant(mut self, policy: impl Into<String>) -> Claims {
        self.grants.insert(policy.into());
        self
    }
}

/// Outcome of evaluating a combined policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Authorized,
    Forbidden(Vec<String>),
}

/// Host-provided policy evaluation. May suspend on external calls.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, claims: &Claims, requirements: &[String]) -> PolicyDecision;
}

/// Reference evaluator: a requirement is met iff the claims grant it.
#[derive(Debug, Default)]
pub struct GrantedPolicyEvaluator;

#[async_trait]
impl PolicyEvaluator for GrantedPolicyEvaluator {
    async fn evaluate(&self, claims: &Claims, requirements: &[String]) -> PolicyDecision {
        let unmet: Vec<String> = requirements
            .iter()
            .filter(|r| !claims.grants.contains(*r))
            .map(|r| format!("policy requirement '{}' not met", r))
            .collect();
        if unmet.is_empty() {
            PolicyDecision::Authorized
        } else {
            PolicyDecision::Forbidden(unmet)
        }
    }
}

/// Evaluate the combined policy of all resolved sources.
///
/// `sources` must be in a stable order (the pipeline passes scan
/// order); the requirement union preserves first occurrence.
pub async fn authorize(
    sources: &[Arc<SourceDescription>],
    claims: &Claims,
    evaluator: &dyn PolicyEvaluator,
) -> Validated<()> {
    let mut requirements: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for source in sources {
        for policy in &source.policies {
            if seen.insert(policy.as_str()) {
                requirements.push(policy.clone());
            }
        }
    }

    if requirements.is_empty() {
        return Validated::Valid(());
    }

    match evaluator.evaluate(claims, &requirements).await {
        PolicyDecision::Authorized => Validated::Valid(()),
        PolicyDecision::Forbidden(reasons) => match ErrorSet::from_vec(reasons) {
            Some(e) => Validated::Invalid(e),
            // A Forbidden decision with no reasons still denies.
            None => Validated::invalid("authorization denied"),
        },
    }
}
