use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("model response contains no recoverable JSON object: {0}")]
    MalformedResponse(String),

    #[error("generation failed after {attempts} attempts: {reason}")]
    GenerationExhausted { attempts: u32, reason: String },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failure: {0}")]
    AuthenticationFailure(String),
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedResponse(_) => "malformed_response",
            Self::GenerationExhausted { .. } => "generation_exhausted",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::InvalidInput(_) => "invalid_input",
            Self::AuthenticationFailure(_) => "authentication_failure",
        }
    }
}

/// Failure reported by an external provider call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("credential rejected or missing: {0}")]
    Unauthorized(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider unreachable: {0}")]
    Unavailable(String),

    #[error("unexpected provider payload: {0}")]
    InvalidPayload(String),
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<ProviderError> for PlanError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Unauthorized(message) => Self::AuthenticationFailure(message),
            other => Self::ProviderUnavailable(other.to_string()),
        }
    }
}

/// Wire shape of an error crossing a request/response boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl From<&PlanError> for ErrorBody {
    fn from(error: &PlanError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}
