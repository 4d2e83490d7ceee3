//! Accumulating success/failure result.
//!
//! `Validated` is the uniform return type of the verification, binding,
//! and authorization stages. Unlike `Result`, combining two failures
//! never discards either side: error sets concatenate left-to-right.
//! The applicative combinators (`apply`, `map2`) are what the verifier
//! combinator and the binders build on.

use crate::error::PipelineError;

// ──────────────────────────────────────────────
// ErrorSet
// ──────────────────────────────────────────────

/// A non-empty, ordered collection of error reasons.
///
/// Non-emptiness is a construction invariant: the only public
/// constructors start from at least one reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSet(Vec<String>);

impl ErrorSet {
    pub fn new(first: impl Into<String>) -> ErrorSet {
        ErrorSet(vec![first.into()])
    }

    /// Build from a list of reasons; `None` when the list is empty.
    pub fn from_vec(reasons: Vec<String>) -> Option<ErrorSet> {
        if reasons.is_empty() {
            None
        } else {
            Some(ErrorSet(reasons))
        }
    }

    pub fn push(&mut self, reason: impl Into<String>) {
        self.0.push(reason.into());
    }

    /// Concatenate another set after this one, preserving order.
    pub fn merge(mut self, other: ErrorSet) -> ErrorSet {
        self.0.extend(other.0);
        self
    }

    pub fn reasons(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

// ──────────────────────────────────────────────
// Validated
// ──────────────────────────────────────────────

/// Either a value or a non-empty set of accumulated errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated<T> {
    Valid(T),
    Invalid(ErrorSet),
}

impl<T> Validated<T> {
    pub fn invalid(reason: impl Into<String>) -> Validated<T> {
        Validated::Invalid(ErrorSet::new(reason))
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validated::Valid(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Validated<U> {
        match self {
            Validated::Valid(v) => Validated::Valid(f(v)),
            Validated::Invalid(e) => Validated::Invalid(e),
        }
    }

    /// Applicative apply: combine a wrapped function with a wrapped
    /// value. Errors from both sides accumulate when both are invalid.
    pub fn apply<A, U>(self, value: Validated<A>) -> Validated<U>
    where
        T: FnOnce(A) -> U,
    {
        match (self, value) {
            (Validated::Valid(f), Validated::Valid(a)) => Validated::Valid(f(a)),
            (Validated::Valid(_), Validated::Invalid(e)) => Validated::Invalid(e),
            (Validated::Invalid(e), Validated::Valid(_)) => Validated::Invalid(e),
            (Validated::Invalid(e1), Validated::Invalid(e2)) => Validated::Invalid(e1.merge(e2)),
        }
    }

    /// Combine two validated values with an explicit merge function.
    pub fn map2<A, U>(self, other: Validated<A>, f: impl FnOnce(T, A) -> U) -> Validated<U> {
        self.map(|t| move |a| f(t, a)).apply(other)
    }

    /// Pair two validated values, accumulating errors from both.
    pub fn zip<A>(self, other: Validated<A>) -> Validated<(T, A)> {
        self.map2(other, |t, a| (t, a))
    }

    pub fn into_result(self) -> Result<T, Vec<String>> {
        match self {
            Validated::Valid(v) => Ok(v),
            Validated::Invalid(e) => Err(e.into_vec()),
        }
    }

    /// Convert a failure into the given pipeline error class.
    pub fn or_pipeline_error(
        self,
        class: impl FnOnce(Vec<String>) -> PipelineError,
    ) -> Result<T, PipelineError> {
        self.into_result().map_err(class)
    }
}

impl Validated<()> {
    /// Merge two unit results, accumulating errors from both sides.
    pub fn and(self, other: Validated<()>) -> Validated<()> {
        self.map2(other, |(), ()| ())
    }
}

/// Collect a sequence of validated values, accumulating every error in
/// encounter order.
pub fn sequence<T>(items: impl IntoIterator<Item = Validated<T>>) -> Validated<Vec<T>> {
    let mut out = Vec::new();
    let mut errors: Option<ErrorSet> = None;
    for item in items {
        match item {
            Validated::Valid(v) => out.push(v),
            Validated::Invalid(e) => {
                errors = Some(match errors {
                    None => e,
                    Some(acc) => acc.merge(e),
                });
            }
        }
    }
    match errors {
        None => Validated::Valid(out),
        Some(e) => Validated::Invalid(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_accumulates_both_sides() {
        let f: Validated<fn(i64) -> i64> = Validated::invalid("bad function");
        let v: Validated<i64> = Validated::invalid("bad value");
        let r: Validated<i64> = f.apply(v);
        match r {
            Validated::Invalid(e) => {
                assert_eq!(e.reasons(), ["bad function", "bad value"]);
            }
            Validated::Valid(_) => panic!("expected invalid"),
        }
    }

    #[test]
    fn valid_and_invalid_is_invalid() {
        let ok: Validated<i64> = Validated::Valid(1);
        let bad: Validated<i64> = Validated::invalid("nope");
        match ok.zip(bad) {
            Validated::Invalid(e) => assert_eq!(e.reasons(), ["nope"]),
            Validated::Valid(_) => panic!("expected invalid"),
        }
    }

    #[test]
    fn map2_merges_valid_values() {
        let a = Validated::Valid(2);
        let b = Validated::Valid(40);
        assert_eq!(a.map2(b, |x, y| x + y), Validated::Valid(42));
    }

    #[test]
    fn sequence_preserves_error_order() {
        let items: Vec<Validated<i64>> = vec![
            Validated::invalid("one"),
            Validated::Valid(7),
            Validated::invalid("two"),
            Validated::invalid("three"),
        ];
        match sequence(items) {
            Validated::Invalid(e) => assert_eq!(e.reasons(), ["one", "two", "three"]),
            Validated::Valid(_) => panic!("expected invalid"),
        }
    }

    #[test]
    fn error_set_is_never_empty() {
        assert!(ErrorSet::from_vec(Vec::new()).is_none());
        let e = ErrorSet::new("only");
        assert_eq!(e.len(), 1);
        assert!(!e.is_empty());
    }
}
