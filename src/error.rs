//! Error types for the batch analysis pipeline.

use std::time::Duration;
use thiserror::Error;

/// Why a single batch produced no payload. Recorded as that batch's
/// failure marker; never aborts sibling batches.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// The call did not finish within its own timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be delivered or the body could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("inference service error {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered, but not with the expected structure.
    #[error("malformed analysis payload: {0}")]
    Parse(String),
}

/// Pipeline-level failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input cannot be analyzed. Raised before any network call.
    #[error("invalid audit request: {0}")]
    Precondition(String),

    /// Every batch failed; there is nothing to merge.
    #[error("analysis failed: all {batches} batch(es) failed (first error: {first_error})")]
    TotalFailure { batches: usize, first_error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_duration() {
        let err = BatchError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "request timed out after 90s");

        let err = BatchError::Timeout(Duration::from_millis(200));
        assert_eq!(err.to_string(), "request timed out after 200ms");
    }

    #[test]
    fn test_status_message_includes_body() {
        let err = BatchError::Status {
            status: 503,
            body: "model loading".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("model loading"));
    }

    #[test]
    fn test_total_failure_is_distinct_from_precondition() {
        let err = PipelineError::TotalFailure {
            batches: 3,
            first_error: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("all 3 batch(es) failed"));
        assert!(!matches!(err, PipelineError::Precondition(_)));
    }
}
