//! Error types for dispatch and reconciliation.

use crate::task::classify::RecoveryAction;
use crate::types::{FailureDescriptor, ModelId};

/// Closed set of error codes carried by submit-boundary error envelopes.
///
/// The numeric values are the wire values used by the job gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    GenerationFailed,
    ModelNotFound,
    TaskNotFound,
    InvalidParams,
    RateLimitExceeded,
    InsufficientBalance,
}

impl ErrorCode {
    /// Decode a wire code. Unknown codes collapse to `GenerationFailed`.
    pub fn from_wire(code: i64) -> Self {
        match code {
            1005 => Self::ModelNotFound,
            1006 => Self::TaskNotFound,
            1007 => Self::InvalidParams,
            1010 => Self::RateLimitExceeded,
            1011 => Self::InsufficientBalance,
            _ => Self::GenerationFailed,
        }
    }

    /// Wire value of this code
    pub fn as_wire(self) -> i64 {
        match self {
            Self::GenerationFailed => 1004,
            Self::ModelNotFound => 1005,
            Self::TaskNotFound => 1006,
            Self::InvalidParams => 1007,
            Self::RateLimitExceeded => 1010,
            Self::InsufficientBalance => 1011,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GenerationFailed => "generation_failed",
            Self::ModelNotFound => "model_not_found",
            Self::TaskNotFound => "task_not_found",
            Self::InvalidParams => "invalid_params",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::InsufficientBalance => "insufficient_balance",
        };
        write!(f, "{}({})", name, self.as_wire())
    }
}

/// How far a failed submission got before it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Failed before anything reached the gateway
    NotSent,
    /// The request may have been accepted (and billed) before the failure
    Unknown,
    /// The gateway or provider answered
    Answered,
}

/// Status codes that mean the gateway turned the job away unprocessed
const UNPROCESSED_STATUSES: &[u16] = &[429, 503];

/// The main error type for genroute operations.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    /// No descriptor is registered under the id
    #[error("Unknown model: {0}")]
    UnknownModel(ModelId),

    /// Caller mistake detected while transforming a request
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A provider rejected or failed a submission
    #[error("Provider error: {message}")]
    Provider {
        message: String,
        code: Option<String>,
    },

    /// Error envelope returned by the submit boundary
    #[error("Submission rejected ({code}): {message}")]
    Envelope { code: ErrorCode, message: String },

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout errors
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// A prompt stage failed. Never escapes the prompt pipeline.
    #[error("Stage error ({stage}): {message}")]
    Stage { stage: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic errors
    #[error("Error: {0}")]
    Other(String),
}

impl GenError {
    /// Create an invalid params error
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// Create a provider error without a failure code
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
            code: None,
        }
    }

    /// Create a provider error carrying a provider failure code
    pub fn provider_with_code(msg: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
            code: Some(code.into()),
        }
    }

    /// Create an envelope error
    pub fn envelope(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::Envelope {
            code,
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a stage error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Caller mistakes that are never retried and never fallen back
    pub fn is_validation(&self) -> bool {
        matches!(self, GenError::InvalidParams(_))
    }

    /// Whether a fallback policy may be consulted for this error.
    ///
    /// Only failures that happened after a request was actually sent qualify.
    /// Account-level envelopes (balance, rate limit, unknown model or task,
    /// invalid params) are returned to the caller as they are.
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            GenError::Provider { .. } | GenError::Network(_) | GenError::Timeout(_) => true,
            GenError::Envelope { code, .. } => *code == ErrorCode::GenerationFailed,
            _ => false,
        }
    }

    /// Where the submission stood when it failed
    pub fn delivery(&self) -> Delivery {
        match self {
            GenError::Network(e) if e.is_connect() || e.is_builder() => Delivery::NotSent,
            GenError::Network(e) if e.status().is_some() => Delivery::Answered,
            GenError::Network(_) | GenError::Timeout(_) => Delivery::Unknown,
            GenError::Provider { .. } | GenError::Envelope { .. } => Delivery::Answered,
            _ => Delivery::NotSent,
        }
    }

    /// Whether resubmitting cannot create a second job.
    ///
    /// True for connection failures and for 429/503 answers. Timeouts and
    /// other transport failures after the request went out are never
    /// retryable: the first job may already be running.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenError::Network(e) => {
                e.is_connect()
                    || e.status()
                        .is_some_and(|status| UNPROCESSED_STATUSES.contains(&status.as_u16()))
            }
            GenError::Provider {
                code: Some(code), ..
            } => code
                .parse::<u16>()
                .is_ok_and(|status| UNPROCESSED_STATUSES.contains(&status)),
            _ => false,
        }
    }

    /// Failure descriptor handed to fallback predicates
    pub fn failure_descriptor(&self) -> FailureDescriptor {
        match self {
            GenError::Provider { message, code } => FailureDescriptor {
                message: message.clone(),
                code: code.clone(),
            },
            GenError::Envelope { code, message } => FailureDescriptor {
                message: message.clone(),
                code: Some(code.as_wire().to_string()),
            },
            GenError::Network(e) => FailureDescriptor {
                message: e.to_string(),
                code: e.status().map(|s| s.as_u16().to_string()),
            },
            other => FailureDescriptor {
                message: other.to_string(),
                code: None,
            },
        }
    }

    /// Caller-visible action for a failed submission
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            GenError::Envelope { code, .. } => RecoveryAction::for_code(*code),
            GenError::UnknownModel(_) => RecoveryAction::for_code(ErrorCode::ModelNotFound),
            GenError::InvalidParams(_) => RecoveryAction::for_code(ErrorCode::InvalidParams),
            _ => RecoveryAction::for_code(ErrorCode::GenerationFailed),
        }
    }
}

impl From<String> for GenError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for GenError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(ErrorCode::from_wire(1011), ErrorCode::InsufficientBalance);
        assert_eq!(ErrorCode::from_wire(1010), ErrorCode::RateLimitExceeded);
        assert_eq!(ErrorCode::from_wire(42), ErrorCode::GenerationFailed);
        assert_eq!(ErrorCode::TaskNotFound.as_wire(), 1006);
    }

    #[test]
    fn test_fallback_eligibility() {
        assert!(GenError::provider_with_code("boom", "500").is_fallback_eligible());
        assert!(GenError::envelope(ErrorCode::GenerationFailed, "x").is_fallback_eligible());
        assert!(!GenError::envelope(ErrorCode::InsufficientBalance, "x").is_fallback_eligible());
        assert!(!GenError::invalid_params("missing image").is_fallback_eligible());
        assert!(!GenError::UnknownModel(ModelId(9)).is_fallback_eligible());
    }

    #[test]
    fn test_only_unprocessed_failures_are_retryable() {
        assert!(GenError::provider_with_code("busy", "503").is_retryable());
        assert!(GenError::provider_with_code("slow down", "429").is_retryable());
        assert!(!GenError::provider_with_code("internal", "500").is_retryable());
        assert!(!GenError::provider("no code").is_retryable());
        assert!(!GenError::timeout("gateway").is_retryable());
        assert!(!GenError::envelope(ErrorCode::RateLimitExceeded, "x").is_retryable());
    }

    #[test]
    fn test_delivery() {
        assert_eq!(GenError::timeout("gateway").delivery(), Delivery::Unknown);
        assert_eq!(
            GenError::provider_with_code("busy", "503").delivery(),
            Delivery::Answered
        );
        assert_eq!(GenError::invalid_params("x").delivery(), Delivery::NotSent);
    }

    #[test]
    fn test_failure_descriptor_keeps_code() {
        let desc = GenError::provider_with_code("internal", "500").failure_descriptor();
        assert_eq!(desc.message, "internal");
        assert_eq!(desc.code.as_deref(), Some("500"));

        let desc = GenError::envelope(ErrorCode::GenerationFailed, "nope").failure_descriptor();
        assert_eq!(desc.code.as_deref(), Some("1004"));
    }
}
