//! Asynchronous value streams.
//!
//! A streaming source yields its elements through the pull-based
//! [`ValueStream`] trait; the compiled query wraps it with erasure and
//! cancellation checks. `VecStream` is the in-memory adapter used by
//! fixtures and simple sources.

use crate::error::RuntimeError;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::VecDeque;

/// Pull-based asynchronous stream of query results.
#[async_trait]
pub trait ValueStream: Send {
    /// Next element, `None` at end of stream.
    async fn next(&mut self) -> Option<Result<Value, RuntimeError>>;
}

pub type BoxValueStream = Box<dyn ValueStream>;

/// Stream over an in-memory sequence.
pub struct VecStream {
    items: VecDeque<Value>,
}

impl VecStream {
    pub fn new(items: Vec<Value>) -> VecStream {
        VecStream {
            items: items.into(),
        }
    }
}

#[async_trait]
impl ValueStream for VecStream {
    async fn next(&mut self) -> Option<Result<Value, RuntimeError>> {
        self.items.pop_front().map(Ok)
    }
}

/// Drain a stream into a vector. Test and fixture helper.
pub async fn collect(stream: &mut dyn ValueStream) -> Result<Vec<Value>, RuntimeError> {
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.push(item?);
    }
    Ok(out)
}
