//! Pipeline error types.
//!
//! Every adapter surfaces failures through [`PipelineError`].  Only
//! [`PipelineError::Decode`] is recovered locally (a malformed stream event is
//! logged and skipped); everything else travels to the adapter boundary where
//! it becomes the host-visible `"Error: <message>"` string.

/// Unified error type for the manifold pipelines.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // -- Request validation ----------------------------------------------------
    /// The request violates a user-correctable limit (image count or size).
    #[error("{reason}")]
    Validation { reason: String },

    // -- Transport ---------------------------------------------------------------
    /// The vendor answered with a non-success HTTP status.
    #[error("HTTP Error {status}: {body}")]
    Http { status: u16, body: String },

    /// The request could not be sent or the response body could not be read.
    #[error("Request failed: {reason}")]
    Transport { reason: String },

    // -- Decoding ----------------------------------------------------------------
    /// A response payload or stream event could not be decoded.
    #[error("decode error: {reason}")]
    Decode { reason: String },

    // -- Configuration -----------------------------------------------------------
    /// Configuration loading or header derivation failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Serialization -----------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the pipelines crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Shorthand for a [`PipelineError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`PipelineError::Decode`].
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Render the error the way the host expects to see failures.
    pub fn to_host_string(&self) -> String {
        format!("Error: {self}")
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_string_for_http_error() {
        let err = PipelineError::Http {
            status: 401,
            body: "unauthorized".into(),
        };
        assert_eq!(err.to_host_string(), "Error: HTTP Error 401: unauthorized");
    }

    #[test]
    fn host_string_for_validation_error() {
        let err = PipelineError::validation("Maximum of 5 images per API call exceeded");
        assert_eq!(
            err.to_host_string(),
            "Error: Maximum of 5 images per API call exceeded"
        );
    }
}
