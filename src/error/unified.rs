//! Error classification and recovery hints.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    InvalidResponse,
    RunTerminal,
    ToolResolution,
    Thread,
    Canceled,
    Busy,
    Unknown,
}

/// Suggested recovery action for the caller of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    RetryTurn,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    WaitForTurn,
    CheckToolImplementation,
    None,
    ContactSupport,
}

impl RecoverySuggestion {
    /// Short user-facing hint, if there is anything useful to say.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::RetryWithBackoff => Some("the service is busy; try again in a few seconds"),
            Self::RetryTurn => Some("ask the question again"),
            Self::CheckCredentials => Some("check OPENAI_API_KEY"),
            Self::CheckConfiguration => Some("check the voxrun config file and environment"),
            Self::IncreaseTimeout => Some("raise the poll or stream limits in the config"),
            Self::WaitForTurn => Some("wait for the current question to finish"),
            Self::CheckToolImplementation => Some("check the tool handler's output"),
            Self::ContactSupport => Some("the backend reported an unexpected failure"),
            Self::None => None,
        }
    }
}
