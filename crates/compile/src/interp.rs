//! Tree-walking evaluator for final (bound, erased) query trees.
//!
//! The portable compilation strategy: instead of generating host code,
//! the compiled callable closes over the tree and evaluates it against
//! the supplied synthetic-parameter values. The evaluator only supports
//! the node kinds that survive the pipeline — bound source invocations,
//! the erase intrinsics, lambdas, and pure expression arithmetic.
//! Restricted features (blocks, loops, assignment) are refused long
//! before compilation and have no evaluation rule.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use teleq_core::cancel::CancelToken;
use teleq_core::error::RuntimeError;
use teleq_core::expr::{BinaryOp, Expr, ParamId, ParamRef};
use teleq_core::ops;
use teleq_core::source::SourceInvocable;
use teleq_core::stream::{BoxValueStream, ValueStream, VecStream};
use teleq_core::types::TypeSig;
use teleq_core::value::Value;

// ──────────────────────────────────────────────
// Environment
// ──────────────────────────────────────────────

/// A runtime binding: an ordinary value or the cancellation signal.
#[derive(Debug, Clone)]
pub enum Bound {
    Value(Value),
    Signal(CancelToken),
}

#[derive(Debug)]
struct EnvNode {
    vars: HashMap<ParamId, Bound>,
    parent: Option<Env>,
}

/// Immutable environment chain; closures capture it by clone.
#[derive(Debug, Clone)]
pub struct Env(Arc<EnvNode>);

impl Env {
    pub fn root() -> Env {
        Env(Arc::new(EnvNode {
            vars: HashMap::new(),
            parent: None,
        }))
    }

    /// Child environment with additional bindings.
    pub fn bind(&self, pairs: impl IntoIterator<Item = (ParamId, Bound)>) -> Env {
        Env(Arc::new(EnvNode {
            vars: pairs.into_iter().collect(),
            parent: Some(self.clone()),
        }))
    }

    pub fn get(&self, id: ParamId) -> Option<Bound> {
        let mut node = &self.0;
        loop {
            if let Some(b) = node.vars.get(&id) {
                return Some(b.clone());
            }
            match &node.parent {
                Some(parent) => node = &parent.0,
                None => return None,
            }
        }
    }
}

// ──────────────────────────────────────────────
// Evaluated results
// ──────────────────────────────────────────────

/// A lambda closed over its environment.
#[derive(Debug, Clone)]
pub struct Closure {
    pub params: Vec<ParamRef>,
    pub body: Arc<Expr>,
    pub env: Env,
}

/// Result of evaluating one node.
pub enum Evaluated {
    Value(Value),
    Signal(CancelToken),
    Stream(BoxValueStream),
    Closure(Closure),
}

impl Evaluated {
    fn into_value(self) -> Result<Value, RuntimeError> {
        match self {
            Evaluated::Value(v) => Ok(v),
            Evaluated::Signal(_) => Err(RuntimeError::Eval(
                "cancellation signal used as a value".to_string(),
            )),
            Evaluated::Stream(_) => Err(RuntimeError::Eval(
                "stream used where a value was expected".to_string(),
            )),
            Evaluated::Closure(_) => Err(RuntimeError::Eval(
                "lambda used where a value was expected".to_string(),
            )),
        }
    }

    fn into_bound(self) -> Result<Bound, RuntimeError> {
        match self {
            Evaluated::Signal(token) => Ok(Bound::Signal(token)),
            other => Ok(Bound::Value(other.into_value()?)),
        }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ──────────────────────────────────────────────
// Evaluation
// ──────────────────────────────────────────────

/// Evaluate a tree against an environment.
pub fn eval<'a>(expr: &'a Expr, env: &'a Env) -> BoxFuture<'a, Result<Evaluated, RuntimeError>> {
    Box::pin(async move {
        match expr {
            Expr::Constant { value, .. } => Ok(Evaluated::Value(value.clone())),
            Expr::Parameter(p) => match env.get(p.id) {
                Some(Bound::Value(v)) => Ok(Evaluated::Value(v)),
                Some(Bound::Signal(t)) => Ok(Evaluated::Signal(t)),
                None => Err(RuntimeError::Eval(format!(
                    "parameter '{}' has no runtime binding",
                    p.name
                ))),
            },
            Expr::Lambda { params, body } => Ok(Evaluated::Closure(Closure {
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            })),
            Expr::Invoke { target, args } => match eval(target, env).await? {
                Evaluated::Closure(closure) => {
                    let mut bound = Vec::with_capacity(args.len());
                    for arg in args {
                        bound.push(eval(arg, env).await?.into_bound()?);
                    }
                    apply(&closure, bound).await
                }
                _ => Err(RuntimeError::Eval(
                    "invocation target is not a lambda".to_string(),
                )),
            },
            Expr::SourceInvoke { source, args } => {
                let mut values = Vec::new();
                let mut token: Option<CancelToken> = None;
                for arg in args {
                    match eval(arg, env).await? {
                        Evaluated::Signal(t) => token = Some(t),
                        other => values.push(other.into_value()?),
                    }
                }
                let token = token.unwrap_or_default();
                match &source.invocable {
                    SourceInvocable::Streaming(run) => {
                        Ok(Evaluated::Stream(run(values, token)))
                    }
                    SourceInvocable::Single(run) => {
                        let pending = run(values, token.clone());
                        tokio::select! {
                            _ = token.cancelled() => Err(RuntimeError::Cancelled),
                            result = pending => result.map(Evaluated::Value),
                        }
                    }
                }
            }
            Expr::Call {
                method,
                target: _,
                args,
            } => eval_intrinsic(method, args, env).await,
            Expr::Member { target, member, .. } => {
                let value = eval(target, env).await?.into_value()?;
                project_member(&value, member)
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let l = eval(left, env).await?.into_value()?;
                // Logical operators short-circuit.
                match (op, &l) {
                    (BinaryOp::And, Value::Bool(false)) => {
                        return Ok(Evaluated::Value(Value::Bool(false)))
                    }
                    (BinaryOp::Or, Value::Bool(true)) => {
                        return Ok(Evaluated::Value(Value::Bool(true)))
                    }
                    _ => {}
                }
                let r = eval(right, env).await?.into_value()?;
                ops::apply_binary(*op, &l, &r)
                    .map(Evaluated::Value)
                    .map_err(RuntimeError::Eval)
            }
            Expr::Unary { op, operand } => {
                let v = eval(operand, env).await?.into_value()?;
                ops::apply_unary(*op, &v)
                    .map(Evaluated::Value)
                    .map_err(RuntimeError::Eval)
            }
            Expr::NewTuple { items } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(eval(item, env).await?.into_value()?);
                }
                Ok(Evaluated::Value(Value::Tuple(values)))
            }
            Expr::NewRecord { ty, args } => {
                let fields = match ty {
                    TypeSig::Record { fields } => fields,
                    other => {
                        return Err(RuntimeError::Eval(format!(
                            "record construction with non-record type {}",
                            other
                        )))
                    }
                };
                let mut record = std::collections::BTreeMap::new();
                for ((name, _), arg) in fields.iter().zip(args) {
                    record.insert(name.clone(), eval(arg, env).await?.into_value()?);
                }
                Ok(Evaluated::Value(Value::Record(record)))
            }
            Expr::Index { target, args, .. } => {
                let value = eval(target, env).await?.into_value()?;
                let index = match args.first() {
                    Some(i) => eval(i, env).await?.into_value()?,
                    None => return Err(RuntimeError::Eval("indexer without index".to_string())),
                };
                match (&value, &index) {
                    (Value::Seq(items) | Value::Tuple(items), Value::Int(i)) => items
                        .get(*i as usize)
                        .cloned()
                        .map(Evaluated::Value)
                        .ok_or_else(|| {
                            RuntimeError::Eval(format!("index {} out of bounds", i))
                        }),
                    _ => Err(RuntimeError::Eval("unsupported indexer target".to_string())),
                }
            }
            Expr::Convert { operand, ty } => {
                let v = eval(operand, env).await?.into_value()?;
                Ok(Evaluated::Value(ops::convert(v, ty)))
            }
            other => Err(RuntimeError::Eval(format!(
                "no evaluation rule for {} node",
                other.kind()
            ))),
        }
    })
}

/// Apply a closure to already-evaluated arguments.
pub async fn apply(closure: &Closure, args: Vec<Bound>) -> Result<Evaluated, RuntimeError> {
    if closure.params.len() != args.len() {
        return Err(RuntimeError::Eval(format!(
            "lambda expects {} arguments, got {}",
            closure.params.len(),
            args.len()
        )));
    }
    let pairs: Vec<(ParamId, Bound)> = closure
        .params
        .iter()
        .map(|p| p.id)
        .zip(args)
        .collect();
    let env = closure.env.bind(pairs);
    eval(&closure.body, &env).await
}

fn project_member(value: &Value, member: &str) -> Result<Evaluated, RuntimeError> {
    if let Some(v) = value.field(member) {
        return Ok(Evaluated::Value(v.clone()));
    }
    // Positional tuple members use the canonical item{N} names.
    if let Some(rest) = member.strip_prefix("item") {
        if let Ok(i) = rest.parse::<usize>() {
            if let Some(v) = value.item(i) {
                return Ok(Evaluated::Value(v.clone()));
            }
        }
    }
    Err(RuntimeError::Eval(format!(
        "value has no member '{}'",
        member
    )))
}

// ──────────────────────────────────────────────
// Intrinsics
// ──────────────────────────────────────────────

/// `Seq.select` and `Task.map`, the erase-projection intrinsics the
/// shape rewriter appends. Everything else is refused: host method
/// dispatch is not part of the execution model.
async fn eval_intrinsic(
    method: &teleq_core::expr::MethodSig,
    args: &[Arc<Expr>],
    env: &Env,
) -> Result<Evaluated, RuntimeError> {
    let owner = match &method.owner {
        TypeSig::Named { name, .. } => name.as_str(),
        _ => "",
    };
    match (owner, method.name.as_str()) {
        ("Seq", "select") => {
            let (source, projection) = expect_two(args)?;
            let inner = match eval(source, env).await? {
                Evaluated::Stream(s) => s,
                Evaluated::Value(Value::Seq(items)) => {
                    Box::new(VecStream::new(items)) as BoxValueStream
                }
                _ => {
                    return Err(RuntimeError::Eval(
                        "Seq.select applied to a non-sequence".to_string(),
                    ))
                }
            };
            let closure = match eval(projection, env).await? {
                Evaluated::Closure(c) => c,
                _ => {
                    return Err(RuntimeError::Eval(
                        "Seq.select projection is not a lambda".to_string(),
                    ))
                }
            };
            Ok(Evaluated::Stream(Box::new(MapStream { inner, closure })))
        }
        ("Task", "map") => {
            let (source, projection) = expect_two(args)?;
            let value = eval(source, env).await?.into_value()?;
            let closure = match eval(projection, env).await? {
                Evaluated::Closure(c) => c,
                _ => {
                    return Err(RuntimeError::Eval(
                        "Task.map projection is not a lambda".to_string(),
                    ))
                }
            };
            apply(&closure, vec![Bound::Value(value)]).await
        }
        _ => Err(RuntimeError::Eval(format!(
            "no evaluation rule for method {}",
            method
        ))),
    }
}

fn expect_two(args: &[Arc<Expr>]) -> Result<(&Arc<Expr>, &Arc<Expr>), RuntimeError> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(RuntimeError::Eval(
            "intrinsic expects exactly two arguments".to_string(),
        )),
    }
}

/// Applies a projection closure to each element of an inner stream.
struct MapStream {
    inner: BoxValueStream,
    closure: Closure,
}

#[async_trait]
impl ValueStream for MapStream {
    async fn next(&mut self) -> Option<Result<Value, RuntimeError>> {
        match self.inner.next().await? {
            Err(e) => Some(Err(e)),
            Ok(item) => {
                let result = apply(&self.closure, vec![Bound::Value(item)]).await;
                Some(result.and_then(Evaluated::into_value))
            }
        }
    }
}

/// Stops pulling from the inner stream once the token is cancelled.
pub struct CancelStream {
    inner: BoxValueStream,
    token: CancelToken,
    done: bool,
}

impl CancelStream {
    pub fn new(inner: BoxValueStream, token: CancelToken) -> CancelStream {
        CancelStream {
            inner,
            token,
            done: false,
        }
    }
}

#[async_trait]
impl ValueStream for CancelStream {
    async fn next(&mut self) -> Option<Result<Value, RuntimeError>> {
        if self.done {
            return None;
        }
        if self.token.is_cancelled() {
            self.done = true;
            return Some(Err(RuntimeError::Cancelled));
        }
        match self.inner.next().await {
            None => {
                self.done = true;
                None
            }
            some => some,
        }
    }
}
