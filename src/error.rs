use std::time::Duration;
use thiserror::Error;

/// Error surface for the agent execution substrate.
///
/// Mirrors the teacher's single-enum-with-structured-fields approach so the
/// classifier below never has to parse a `Display` string to decide
/// retryability -- it matches on variant and, where the spec calls for it,
/// on an embedded HTTP status or message substring.
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("network request failed: {message}")]
    Network { message: String, status: Option<u16> },

    #[error("request to {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("connection to {endpoint} refused or reset")]
    ConnectionFailed { endpoint: String },

    #[error("invalid api key for provider {provider}")]
    InvalidApiKey { provider: String },

    #[error("authentication failed for provider {provider}: {reason}")]
    AuthenticationFailed { provider: String, reason: String },

    #[error("provider {provider} returned HTTP {status}: {message}")]
    ProviderHttp {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("task failed validation: {message}")]
    InvalidInput { message: String },

    #[error("circuit breaker open for agent kind {agent_kind}, retry after {retry_after:?}")]
    CircuitOpen {
        agent_kind: String,
        retry_after: Duration,
    },

    #[error("fallback agent for {agent_kind} also failed: {fallback_cause}; primary cause: {primary_cause}")]
    FallbackFailed {
        agent_kind: String,
        primary_cause: String,
        fallback_cause: String,
    },

    #[error("external source error: {message}")]
    ExternalSource { message: String, retryable: bool },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("internal error in {component}: {message}")]
    Internal { component: String, message: String },
}

impl AgentError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AgentError::InvalidInput {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AgentError::Timeout {
                provider: err
                    .url()
                    .map(|u| u.host_str().unwrap_or("unknown").to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                timeout: Duration::from_secs(30),
            };
        }
        if err.is_connect() {
            return AgentError::ConnectionFailed {
                endpoint: err.url().map_or("unknown".to_string(), |u| u.to_string()),
            };
        }
        AgentError::Network {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// The error taxonomy from spec.md section 7. `ErrorKind` is what the retry
/// policy and fallback dispatcher actually branch on -- `classify` is a pure
/// function so it can be unit-tested exhaustively without standing up a
/// provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// INVALID_INPUT -- not retried, surfaced immediately.
    InvalidInput,
    /// PROVIDER_TRANSIENT -- retried, feeds the breaker on exhaustion.
    Transient,
    /// PROVIDER_FATAL -- not retried, breaker untouched.
    Fatal,
    /// CIRCUIT_OPEN -- breaker rejected the call before it reached the provider.
    CircuitOpen,
    /// Anything unrecognized. Fail-closed: treated as non-retryable.
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

const RETRYABLE_SUBSTRINGS: &[&str] = &[
    "rate limit",
    "throttle",
    "overloaded",
    "capacity",
    "acceleration limit",
];

const FATAL_SUBSTRINGS: &[&str] = &["unauthorized", "forbidden", "invalid_api_key"];

/// Classify an error chain root-cause-first, per spec.md section 4.3.
///
/// Retryable: network timeouts, connection reset/refused, I/O errors, HTTP
/// 429/502/503/504, and provider messages containing the throttling phrases
/// above. Non-retryable: HTTP 401/403/404, auth phrases, and malformed
/// input. Everything else classifies as `Unknown` (fail-closed).
pub fn classify(error: &AgentError) -> ErrorKind {
    match error {
        AgentError::InvalidInput { .. } => ErrorKind::InvalidInput,

        AgentError::CircuitOpen { .. } => ErrorKind::CircuitOpen,

        AgentError::Timeout { .. } | AgentError::ConnectionFailed { .. } => ErrorKind::Transient,

        AgentError::Network { status, message, .. } => {
            classify_status_or_message(*status, message)
        }

        AgentError::ProviderHttp {
            status, message, ..
        } => classify_status_or_message(Some(*status), message),

        AgentError::InvalidApiKey { .. } | AgentError::AuthenticationFailed { .. } => {
            ErrorKind::Fatal
        }

        AgentError::MalformedResponse { .. } => ErrorKind::Fatal,

        AgentError::ExternalSource { retryable, .. } => {
            if *retryable {
                ErrorKind::Transient
            } else {
                ErrorKind::Fatal
            }
        }

        AgentError::FallbackFailed { .. }
        | AgentError::Serialization { .. }
        | AgentError::Internal { .. } => ErrorKind::Unknown,
    }
}

fn classify_status_or_message(status: Option<u16>, message: &str) -> ErrorKind {
    if let Some(status) = status {
        match status {
            429 | 502 | 503 | 504 => return ErrorKind::Transient,
            401 | 403 | 404 => return ErrorKind::Fatal,
            _ => {}
        }
    }

    let lower = message.to_lowercase();
    if FATAL_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return ErrorKind::Fatal;
    }
    if RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return ErrorKind::Transient;
    }

    ErrorKind::Unknown
}
