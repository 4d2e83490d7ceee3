//! Server-side source descriptions and the per-query registry.
//!
//! A source description is one invocable capability exposed under a
//! name: its implementation signature (including trailing synthetic
//! parameters such as the cancellation signal), the authorization
//! policies protecting it, and the closure that actually runs it.
//!
//! The registry is an explicit registration table built once per
//! incoming query by the host binding layer. There is no process-wide
//! default: whoever hosts the pipeline constructs and passes one in.

use crate::cancel::CancelToken;
use crate::error::RuntimeError;
use crate::stream::BoxValueStream;
use crate::types::TypeSig;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type SingleFuture = Pin<Box<dyn Future<Output = Result<Value, RuntimeError>> + Send>>;

/// The closure invoking a streaming source implementation.
pub type StreamingFn = dyn Fn(Vec<Value>, CancelToken) -> BoxValueStream + Send + Sync;
/// The closure invoking a single-result source implementation.
pub type SingleFn = dyn Fn(Vec<Value>, CancelToken) -> SingleFuture + Send + Sync;

/// How a source produces its result.
#[derive(Clone)]
pub enum SourceInvocable {
    Streaming(Arc<StreamingFn>),
    Single(Arc<SingleFn>),
}

/// One named server-side capability.
#[derive(Clone)]
pub struct SourceDescription {
    pub name: String,
    /// Implementation parameter types, synthetic parameters included.
    pub params: Vec<TypeSig>,
    /// `Seq<T>` for streaming sources, `Task<T>` for single-result ones.
    pub ret: TypeSig,
    /// Names of the authorization policy requirements attached to this
    /// source. Empty means unrestricted.
    pub policies: Vec<String>,
    pub invocable: SourceInvocable,
}

impl SourceDescription {
    pub fn streaming(
        name: impl Into<String>,
        params: Vec<TypeSig>,
        element: TypeSig,
        policies: Vec<String>,
        run: impl Fn(Vec<Value>, CancelToken) -> BoxValueStream + Send + Sync + 'static,
    ) -> Arc<SourceDescription> {
        Arc::new(SourceDescription {
            name: name.into(),
            params,
            ret: TypeSig::seq(element),
            policies,
            invocable: SourceInvocable::Streaming(Arc::new(run)),
        })
    }

    pub fn single(
        name: impl Into<String>,
        params: Vec<TypeSig>,
        result: TypeSig,
        policies: Vec<String>,
        run: impl Fn(Vec<Value>, CancelToken) -> SingleFuture + Send + Sync + 'static,
    ) -> Arc<SourceDescription> {
        Arc::new(SourceDescription {
            name: name.into(),
            params,
            ret: TypeSig::task(result),
            policies,
            invocable: SourceInvocable::Single(Arc::new(run)),
        })
    }

    /// The signature as a function type, for binder diagnostics.
    pub fn signature(&self) -> TypeSig {
        TypeSig::func(self.params.clone(), self.ret.clone())
    }
}

impl fmt::Debug for SourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescription")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

/// Name → source description table for one incoming query.
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<SourceDescription>>,
}

impl SourceRegistry {
    pub fn new() -> SourceRegistry {
        SourceRegistry::default()
    }

    pub fn register(&mut self, source: Arc<SourceDescription>) {
        self.sources.insert(source.name.clone(), source);
    }

    pub fn with(mut self, source: Arc<SourceDescription>) -> SourceRegistry {
        self.register(source);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SourceDescription>> {
        self.sources.get(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
