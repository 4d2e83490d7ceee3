//! Compiled queries: the executable artifacts the pipeline hands back.
//!
//! A compiled query closes over the final erased tree and its synthetic
//! parameters. Each invocation binds the supplied cancellation token to
//! every synthetic parameter, so the same token reaches every resolved
//! source invocation in the tree.

use crate::interp::{eval, Bound, CancelStream, Env, Evaluated};
use std::sync::Arc;
use teleq_core::cancel::CancelToken;
use teleq_core::error::RuntimeError;
use teleq_core::expr::{Expr, ParamRef};
use teleq_core::stream::BoxValueStream;
use teleq_core::value::Value;

fn synthetic_env(synthetics: &[ParamRef], token: &CancelToken) -> Env {
    Env::root().bind(
        synthetics
            .iter()
            .map(|p| (p.id, Bound::Signal(token.clone()))),
    )
}

/// A compiled streaming query. Invoke once per call with a fresh token.
#[derive(Debug)]
pub struct CompiledStreamingQuery {
    tree: Arc<Expr>,
    synthetics: Vec<ParamRef>,
}

impl CompiledStreamingQuery {
    pub fn new(tree: Arc<Expr>, synthetics: Vec<ParamRef>) -> CompiledStreamingQuery {
        CompiledStreamingQuery { tree, synthetics }
    }

    /// Execute, producing the erased element stream. The stream stops
    /// pulling once `token` is cancelled.
    pub async fn call(&self, token: CancelToken) -> Result<BoxValueStream, RuntimeError> {
        let env = synthetic_env(&self.synthetics, &token);
        match eval(&self.tree, &env).await? {
            Evaluated::Stream(s) => Ok(Box::new(CancelStream::new(s, token))),
            Evaluated::Value(Value::Seq(items)) => Ok(Box::new(CancelStream::new(
                Box::new(teleq_core::stream::VecStream::new(items)),
                token,
            ))),
            _ => Err(RuntimeError::Eval(
                "streaming query did not produce a sequence".to_string(),
            )),
        }
    }
}

/// A compiled single-result query.
#[derive(Debug)]
pub struct CompiledSingleQuery {
    tree: Arc<Expr>,
    synthetics: Vec<ParamRef>,
}

impl CompiledSingleQuery {
    pub fn new(tree: Arc<Expr>, synthetics: Vec<ParamRef>) -> CompiledSingleQuery {
        CompiledSingleQuery { tree, synthetics }
    }

    /// Execute to completion. A token cancelled before the underlying
    /// source completes prevents the result from being used.
    pub async fn call(&self, token: CancelToken) -> Result<Value, RuntimeError> {
        let env = synthetic_env(&self.synthetics, &token);
        let value = eval(&self.tree, &env).await?.into_single()?;
        if token.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        Ok(value)
    }

    /// Execute and render the erased transport form.
    pub async fn call_json(&self, token: CancelToken) -> Result<serde_json::Value, RuntimeError> {
        Ok(self.call(token).await?.to_json())
    }
}

impl Evaluated {
    fn into_single(self) -> Result<Value, RuntimeError> {
        match self {
            Evaluated::Value(v) => Ok(v),
            _ => Err(RuntimeError::Eval(
                "single-result query did not produce a value".to_string(),
            )),
        }
    }
}
