//! Error types for voxrun.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::run::RunStatus;

/// Primary error type for every voxrun operation.
///
/// A turn either yields an [`AssistantReply`](crate::run::AssistantReply) or
/// one of these variants; nothing is dropped silently.
#[derive(Error, Debug)]
pub enum VoxError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Run {run_id} ended with status {status}: {reason}")]
    RunFailed {
        run_id: String,
        status: RunStatus,
        reason: String,
    },

    #[error("Run {run_id} expired")]
    RunExpired { run_id: String },

    #[error("Run {run_id} did not finish within {waited_ms}ms")]
    TurnTimedOut { run_id: String, waited_ms: u64 },

    #[error("Tool resolution error: {tool_name}: {message}")]
    ToolResolution { tool_name: String, message: String },

    #[error("Thread unavailable: {0}")]
    ThreadUnavailable(String),

    #[error("No answer produced")]
    NoAnswer,

    #[error("Turn canceled")]
    Canceled,

    #[error("Another turn is already in flight")]
    TurnInProgress,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl VoxError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(err) if err.is_timeout() => ErrorCategory::Timeout,
            Self::Network(err) if err.is_decode() => ErrorCategory::InvalidResponse,
            Self::Network(_) => ErrorCategory::Network,
            Self::Io(_) => ErrorCategory::Unknown,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) | Self::InvalidArgument(_) => ErrorCategory::Configuration,
            Self::Serialization(_) | Self::InvalidResponse(_) | Self::NoAnswer => {
                ErrorCategory::InvalidResponse
            }
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::RunFailed { .. } | Self::RunExpired { .. } | Self::TurnTimedOut { .. } => {
                ErrorCategory::RunTerminal
            }
            Self::ToolResolution { .. } => ErrorCategory::ToolResolution,
            Self::ThreadUnavailable(_) => ErrorCategory::Thread,
            Self::Canceled => ErrorCategory::Canceled,
            Self::TurnInProgress => ErrorCategory::Busy,
        }
    }

    /// Whether the transport may transparently retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolResolution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Thread | ErrorCategory::RunTerminal => RecoverySuggestion::RetryTurn,
            ErrorCategory::Busy => RecoverySuggestion::WaitForTurn,
            ErrorCategory::Canceled => RecoverySuggestion::None,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VoxError>;
