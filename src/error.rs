//! Error types shared across the dispatch path
//!
//! A failed [`HandlerResult`](crate::message::HandlerResult) is a value; a
//! [`DispatchError`] aborts the pipeline. Middleware either propagates the
//! error unchanged or is explicitly documented to recover (retry exhaustion
//! converts, tracing records and re-raises).

use thiserror::Error;

/// Errors that abort a pipeline invocation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The cancellation token was observed. Never translated into a failed
    /// result by any middleware in this crate.
    #[error("dispatch cancelled")]
    Cancelled,

    /// The terminal agent handler failed abnormally.
    #[error("agent '{agent_id}' failed: {source}")]
    Agent {
        /// Id of the failing agent.
        agent_id: String,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// A middleware failed abnormally (as opposed to short-circuiting with a
    /// failed result).
    #[error("middleware '{name}' failed: {source}")]
    Middleware {
        /// Name of the failing middleware.
        name: String,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// Stable tag for telemetry (`error.type` span tag).
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Cancelled => "Cancelled",
            Self::Agent { .. } => "AgentError",
            Self::Middleware { .. } => "MiddlewareError",
        }
    }

    /// True for cancellation, which must always be propagated unchanged.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_tags_are_stable() {
        assert_eq!(DispatchError::Cancelled.error_type(), "Cancelled");
        let agent = DispatchError::Agent {
            agent_id: "tech".into(),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(agent.error_type(), "AgentError");
        assert!(!agent.is_cancelled());
        assert!(DispatchError::Cancelled.is_cancelled());
    }

    #[test]
    fn display_includes_context() {
        let err = DispatchError::Middleware {
            name: "retry".into(),
            source: anyhow::anyhow!("gave up"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("retry"));
        assert!(rendered.contains("gave up"));
    }
}
