//! End-to-end pipeline tests.
//!
//! Covers the full compile-verify-bind-authorize path:
//!
//! 1. Synthetic-parameter injection — a distinct cancellation token
//!    supplied at call time is observed inside the source implementation
//! 2. Distinct parameter identities bind independently (no cross-binding)
//! 3. Cancellation stops a streaming result from pulling further elements
//! 4. Single-result round trip, including the erased JSON form
//! 5. A pre-cancelled token prevents a single result from being used
//! 6. Verification failures accumulate across feature and member checks
//! 7. Binding failures list every unresolved name
//! 8. Authorization denial carries the unmet requirement names
//! 9. A wrong-shaped tree fails with a fatal shape error

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use teleq_bind::authorize::{Claims, GrantedPolicyEvaluator};
use teleq_compile::{compile_single_query, compile_streaming_query};
use teleq_core::cancel::CancelToken;
use teleq_core::error::{PipelineError, RuntimeError};
use teleq_core::expr::{Expr, Param, ParamRef};
use teleq_core::source::{SourceDescription, SourceRegistry};
use teleq_core::stream::{collect, ValueStream, VecStream};
use teleq_core::types::TypeSig;
use teleq_core::value::Value;
use teleq_verify::{CombinedVerifier, FeatureVerifier, MemberVerifier};

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

fn default_verifier() -> CombinedVerifier {
    CombinedVerifier::new(vec![
        Box::new(FeatureVerifier::default_remote()),
        Box::new(MemberVerifier::new(vec![])),
    ])
}

fn claims() -> Claims {
    Claims::new("tester")
}

/// Streaming `Echo(Int, Signal) -> Seq<Int>` that records the token it
/// observed and echoes its argument.
fn echo_source(observed: Arc<Mutex<Option<CancelToken>>>) -> Arc<SourceDescription> {
    SourceDescription::streaming(
        "Echo",
        vec![TypeSig::Int, TypeSig::Signal],
        TypeSig::Int,
        vec![],
        move |args, token| {
            *observed.lock().unwrap() = Some(token);
            Box::new(VecStream::new(args))
        },
    )
}

/// The unbound parameter a client would write for Echo: the simplified
/// arity omits the synthetic signal.
fn echo_param() -> ParamRef {
    Param::fresh(
        "Echo",
        TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)),
    )
}

struct CounterStream {
    next: i64,
    pulls: Arc<AtomicI64>,
}

#[async_trait]
impl ValueStream for CounterStream {
    async fn next(&mut self) -> Option<Result<Value, RuntimeError>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let n = self.next;
        self.next += 1;
        Some(Ok(Value::Int(n)))
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[tokio::test]
async fn synthetic_token_reaches_the_source_implementation() {
    let observed = Arc::new(Mutex::new(None));
    let registry = SourceRegistry::new().with(echo_source(observed.clone()));

    let param = echo_param();
    let tree = Expr::invoke(Expr::parameter(&param), vec![Expr::int(42)]);

    let compiled = compile_streaming_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap();

    let token = CancelToken::new();
    let mut stream = compiled.call(token.clone()).await.unwrap();
    let items = collect(&mut *stream).await.unwrap();
    assert_eq!(items, vec![Value::Int(42)]);

    let seen = observed.lock().unwrap().clone().expect("source never ran");
    assert!(seen.same(&token), "implementation saw a different token");
}

#[tokio::test]
async fn distinct_identities_bind_without_crossing() {
    let left_calls = Arc::new(AtomicUsize::new(0));
    let right_calls = Arc::new(AtomicUsize::new(0));

    let lc = left_calls.clone();
    let left = SourceDescription::streaming(
        "Left",
        vec![TypeSig::Int, TypeSig::Signal],
        TypeSig::Int,
        vec![],
        move |args, _token| {
            lc.fetch_add(1, Ordering::SeqCst);
            let x = match &args[0] {
                Value::Int(i) => *i,
                _ => 0,
            };
            Box::new(VecStream::new(vec![Value::Int(x + 100)]))
        },
    );
    let rc = right_calls.clone();
    let right = SourceDescription::single(
        "Right",
        vec![TypeSig::Signal],
        TypeSig::Int,
        vec![],
        move |_args, _token| {
            rc.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Value::Int(2)) })
        },
    );
    let registry = SourceRegistry::new().with(left).with(right);

    let left_param = Param::fresh(
        "Left",
        TypeSig::func(vec![TypeSig::Int], TypeSig::seq(TypeSig::Int)),
    );
    let right_param = Param::fresh("Right", TypeSig::func(vec![], TypeSig::task(TypeSig::Int)));
    let tree = Expr::invoke(
        Expr::parameter(&left_param),
        vec![Expr::invoke(Expr::parameter(&right_param), vec![])],
    );

    let compiled = compile_streaming_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap();

    let mut stream = compiled.call(CancelToken::new()).await.unwrap();
    let items = collect(&mut *stream).await.unwrap();
    assert_eq!(items, vec![Value::Int(102)]);
    assert_eq!(left_calls.load(Ordering::SeqCst), 1);
    assert_eq!(right_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_stops_pulling_elements() {
    let pulls = Arc::new(AtomicI64::new(0));
    let p = pulls.clone();
    let nat = SourceDescription::streaming(
        "Nat",
        vec![TypeSig::Signal],
        TypeSig::Int,
        vec![],
        move |_args, _token| {
            Box::new(CounterStream {
                next: 0,
                pulls: p.clone(),
            })
        },
    );
    let registry = SourceRegistry::new().with(nat);

    let param = Param::fresh("Nat", TypeSig::func(vec![], TypeSig::seq(TypeSig::Int)));
    let tree = Expr::invoke(Expr::parameter(&param), vec![]);

    let compiled = compile_streaming_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap();

    let token = CancelToken::new();
    let mut stream = compiled.call(token.clone()).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), Value::Int(0));
    assert_eq!(stream.next().await.unwrap().unwrap(), Value::Int(1));
    let pulled_before_cancel = pulls.load(Ordering::SeqCst);

    token.cancel();
    match stream.next().await {
        Some(Err(RuntimeError::Cancelled)) => {}
        other => panic!("expected cancellation, got {:?}", other.map(|r| r.is_ok())),
    }
    assert!(stream.next().await.is_none());
    assert_eq!(
        pulls.load(Ordering::SeqCst),
        pulled_before_cancel,
        "inner stream was pulled after cancellation"
    );
}

#[tokio::test]
async fn single_result_round_trip() {
    let total = SourceDescription::single(
        "Total",
        vec![TypeSig::Signal],
        TypeSig::Int,
        vec![],
        |_args, _token| Box::pin(async { Ok(Value::Int(7)) }),
    );
    let registry = SourceRegistry::new().with(total);

    let param = Param::fresh("Total", TypeSig::func(vec![], TypeSig::task(TypeSig::Int)));
    let tree = Expr::invoke(Expr::parameter(&param), vec![]);

    let compiled = compile_single_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap();

    assert_eq!(
        compiled.call(CancelToken::new()).await.unwrap(),
        Value::Int(7)
    );
    assert_eq!(
        compiled.call_json(CancelToken::new()).await.unwrap(),
        serde_json::json!(7)
    );
}

#[tokio::test]
async fn pre_cancelled_token_blocks_single_result() {
    let total = SourceDescription::single(
        "Total",
        vec![TypeSig::Signal],
        TypeSig::Int,
        vec![],
        |_args, _token| Box::pin(async { Ok(Value::Int(7)) }),
    );
    let registry = SourceRegistry::new().with(total);

    let param = Param::fresh("Total", TypeSig::func(vec![], TypeSig::task(TypeSig::Int)));
    let tree = Expr::invoke(Expr::parameter(&param), vec![]);

    let compiled = compile_single_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap();

    let token = CancelToken::new();
    token.cancel();
    assert_eq!(
        compiled.call(token).await.unwrap_err(),
        RuntimeError::Cancelled
    );
}

#[tokio::test]
async fn verification_failures_accumulate_across_verifiers() {
    let observed = Arc::new(Mutex::new(None));
    let registry = SourceRegistry::new().with(echo_source(observed));

    let param = echo_param();
    // A loop (feature violation) around a constant of a disallowed
    // nominal type (member violation).
    let tree = Arc::new(Expr::Block {
        exprs: vec![
            Arc::new(Expr::Loop {
                body: Expr::constant(Value::Unit, TypeSig::named("Vault")),
            }),
            Expr::invoke(Expr::parameter(&param), vec![Expr::int(1)]),
        ],
    });

    let err = compile_streaming_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap_err();

    match err {
        PipelineError::Verification { reasons } => {
            assert!(reasons.iter().any(|r| r.contains("loop")));
            assert!(reasons.iter().any(|r| r.contains("block")));
            assert!(reasons.iter().any(|r| r.contains("Vault")));
        }
        other => panic!("expected verification failure, got {:?}", other),
    }
}

#[tokio::test]
async fn binding_failure_lists_every_unresolved_name() {
    let registry = SourceRegistry::new()
        .with(SourceDescription::streaming(
            "A",
            vec![TypeSig::Signal],
            TypeSig::Int,
            vec![],
            |_args, _token| Box::new(VecStream::new(vec![])),
        ))
        .with(SourceDescription::streaming(
            "B",
            vec![TypeSig::Signal],
            TypeSig::Int,
            vec![],
            |_args, _token| Box::new(VecStream::new(vec![])),
        ));

    let make = |name: &str| {
        Param::fresh(name, TypeSig::func(vec![], TypeSig::seq(TypeSig::Int)))
    };
    let (a, b, c) = (make("A"), make("B"), make("C"));
    let tree = Arc::new(Expr::NewTuple {
        items: vec![
            Expr::invoke(Expr::parameter(&a), vec![]),
            Expr::invoke(Expr::parameter(&b), vec![]),
            Expr::invoke(Expr::parameter(&c), vec![]),
        ],
    });

    let err = compile_streaming_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap_err();

    match err {
        PipelineError::Binding { reasons } => {
            assert_eq!(reasons, vec!["no source found for name 'C'".to_string()]);
        }
        other => panic!("expected binding failure, got {:?}", other),
    }
}

#[tokio::test]
async fn authorization_denial_names_unmet_requirements() {
    let guarded = SourceDescription::streaming(
        "Ledger",
        vec![TypeSig::Signal],
        TypeSig::Int,
        vec!["auditor".to_string()],
        |_args, _token| Box::new(VecStream::new(vec![])),
    );
    let registry = SourceRegistry::new().with(guarded);

    let param = Param::fresh("Ledger", TypeSig::func(vec![], TypeSig::seq(TypeSig::Int)));
    let tree = Expr::invoke(Expr::parameter(&param), vec![]);

    let err = compile_streaming_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap_err();

    match err {
        PipelineError::Authorization { reasons } => {
            assert_eq!(reasons.len(), 1);
            assert!(reasons[0].contains("'auditor'"));
        }
        other => panic!("expected authorization failure, got {:?}", other),
    }
}

#[tokio::test]
async fn wrong_shape_is_fatal() {
    let total = SourceDescription::single(
        "Total",
        vec![TypeSig::Signal],
        TypeSig::Int,
        vec![],
        |_args, _token| Box::pin(async { Ok(Value::Int(7)) }),
    );
    let registry = SourceRegistry::new().with(total);

    let param = Param::fresh("Total", TypeSig::func(vec![], TypeSig::task(TypeSig::Int)));
    let tree = Expr::invoke(Expr::parameter(&param), vec![]);

    // A Task-typed tree compiled as streaming must fail, not coerce.
    let err = compile_streaming_query(
        &tree,
        &default_verifier(),
        &registry,
        &claims(),
        &GrantedPolicyEvaluator,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::Shape(_)));
}
