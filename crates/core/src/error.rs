//! Pipeline and runtime error types.

/// Join accumulated reasons into a single headline-friendly string.
fn join(reasons: &[String]) -> String {
    reasons.join("; ")
}

/// A pipeline stage failure, surfaced to the caller of the compile
/// entry points.
///
/// Verification, binding, and authorization failures carry the full
/// accumulated reason list — every stage completes its exhaustive scan
/// before reporting. `Shape` and `BinderContract` are fatal single
/// messages: the former signals a structurally wrong query, the latter
/// a broken internal contract that earlier stages should have made
/// impossible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("query verification failed: {}", join(reasons))]
    Verification { reasons: Vec<String> },

    #[error("query binding failed: {}", join(reasons))]
    Binding { reasons: Vec<String> },

    #[error("query authorization failed: {}", join(reasons))]
    Authorization { reasons: Vec<String> },

    #[error("result shape mismatch: {0}")]
    Shape(String),

    #[error("binder contract violation: {0}")]
    BinderContract(String),
}

impl PipelineError {
    /// The accumulated reasons, if this is an accumulated class.
    pub fn reasons(&self) -> Option<&[String]> {
        match self {
            PipelineError::Verification { reasons }
            | PipelineError::Binding { reasons }
            | PipelineError::Authorization { reasons } => Some(reasons),
            PipelineError::Shape(_) | PipelineError::BinderContract(_) => None,
        }
    }
}

/// A failure while executing a compiled query. These are the resolved
/// sources' concern, not the pipeline's; the pipeline only defines the
/// type so streams and single results have a uniform error channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("source '{name}' failed: {message}")]
    Source { name: String, message: String },

    #[error("query cancelled")]
    Cancelled,

    #[error("evaluation error: {0}")]
    Eval(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulated_reasons_render_in_order() {
        let e = PipelineError::Verification {
            reasons: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(
            e.to_string(),
            "query verification failed: first; second"
        );
        assert_eq!(e.reasons().unwrap().len(), 2);
    }

    #[test]
    fn source_failures_name_the_source() {
        let e = RuntimeError::Source {
            name: "Orders".to_string(),
            message: "backend unavailable".to_string(),
        };
        assert_eq!(e.to_string(), "source 'Orders' failed: backend unavailable");
    }

    #[test]
    fn fatal_classes_have_no_reason_list() {
        assert!(PipelineError::Shape("expected Seq".to_string())
            .reasons()
            .is_none());
    }
}
