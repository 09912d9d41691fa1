//! Error types for handler construction and dispatch.

use thiserror::Error;

/// Errors raised while building or running a subscription's handler chain.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// A configuration row or backend resource did not resolve by id.
    #[error("Configuration not found: {kind} for id {id}")]
    ConfigurationNotFound { kind: &'static str, id: i64 },

    /// The handler config carries a tag the factory does not know.
    #[error("Unsupported handler type: '{0}'")]
    UnsupportedHandlerType(String),

    /// A constructed handler failed while handling an event.
    #[error("Handler {handler_id} ({handler_type}) failed on event {event_key}: {reason}")]
    HandlerExecutionFailed {
        handler_id: i64,
        handler_type: String,
        event_key: String,
        reason: String,
        /// Whether the underlying failure was transient.
        retryable: bool,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    /// Queue, search index, log store, RPC or contract call failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A value could not be extracted from the event or state, or had the wrong shape.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ProcessingError {
    pub(crate) fn not_found(kind: &'static str, id: i64) -> Self {
        Self::ConfigurationNotFound { kind, id }
    }

    /// Returns `true` for errors caused by missing or malformed configuration.
    ///
    /// These are data defects: retrying the same event will fail the same way.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationNotFound { .. } | Self::UnsupportedHandlerType(_)
        )
    }

    /// Returns `true` if the error is transient and the event may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(_) | Self::Backend(_) => true,
            Self::HandlerExecutionFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_id() {
        let err = ProcessingError::not_found("contract query configuration", 50);
        assert_eq!(
            err.to_string(),
            "Configuration not found: contract query configuration for id 50"
        );
        assert!(err.is_configuration_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn backend_errors_are_retryable() {
        assert!(ProcessingError::Backend("queue unreachable".into()).is_retryable());
        assert!(!ProcessingError::InvalidValue("x".into()).is_retryable());
    }

    #[test]
    fn handler_failure_keeps_the_cause_retryability() {
        let failed = |retryable| ProcessingError::HandlerExecutionFailed {
            handler_id: 20,
            handler_type: "Rule".into(),
            event_key: "0xabc:0".into(),
            reason: "Invalid value: not a number".into(),
            retryable,
        };
        assert!(!failed(false).is_retryable());
        assert!(failed(true).is_retryable());
        assert_eq!(
            failed(false).to_string(),
            "Handler 20 (Rule) failed on event 0xabc:0: Invalid value: not a number"
        );
    }
}
