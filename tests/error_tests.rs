//! Tests for the error system.

use voxrun::error::unified::*;
use voxrun::error::*;
use voxrun::run::RunStatus;

#[test]
fn error_api_creation() {
    let err = VoxError::api(404, "Not found");
    assert!(matches!(&err, VoxError::Api { status: 404, .. }));
    assert_eq!(err.to_string(), "API error (status 404): Not found");
}

#[test]
fn error_helper_mappings_are_stable_for_major_variants() {
    struct Case {
        error: VoxError,
        expected_category: ErrorCategory,
        expected_retryable: bool,
        expected_recovery: RecoverySuggestion,
    }

    let network_error = reqwest::Client::new()
        .get("http://[::1")
        .build()
        .unwrap_err();
    let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk");
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();

    let cases = vec![
        Case {
            error: VoxError::Authentication("bad-key".to_string()),
            expected_category: ErrorCategory::Authentication,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckCredentials,
        },
        Case {
            error: VoxError::RateLimited {
                retry_after_ms: Some(1000),
            },
            expected_category: ErrorCategory::RateLimit,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: VoxError::Timeout(5000),
            expected_category: ErrorCategory::Timeout,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::IncreaseTimeout,
        },
        Case {
            error: VoxError::Network(network_error),
            expected_category: ErrorCategory::Network,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: VoxError::api(503, "Server unavailable"),
            expected_category: ErrorCategory::Server,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: VoxError::api(418, "Teapot"),
            expected_category: ErrorCategory::Api,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
        Case {
            error: VoxError::Serialization(serde_error),
            expected_category: ErrorCategory::InvalidResponse,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
        Case {
            error: VoxError::RunFailed {
                run_id: "run_1".to_string(),
                status: RunStatus::Failed,
                reason: "server_error".to_string(),
            },
            expected_category: ErrorCategory::RunTerminal,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::RetryTurn,
        },
        Case {
            error: VoxError::TurnTimedOut {
                run_id: "run_1".to_string(),
                waited_ms: 30_000,
            },
            expected_category: ErrorCategory::RunTerminal,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::RetryTurn,
        },
        Case {
            error: VoxError::ToolResolution {
                tool_name: "get_stock_info".to_string(),
                message: "store offline".to_string(),
            },
            expected_category: ErrorCategory::ToolResolution,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckToolImplementation,
        },
        Case {
            error: VoxError::ThreadUnavailable("thread_1".to_string()),
            expected_category: ErrorCategory::Thread,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::RetryTurn,
        },
        Case {
            error: VoxError::TurnInProgress,
            expected_category: ErrorCategory::Busy,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::WaitForTurn,
        },
        Case {
            error: VoxError::Canceled,
            expected_category: ErrorCategory::Canceled,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::None,
        },
        Case {
            error: VoxError::Io(io_error),
            expected_category: ErrorCategory::Unknown,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
        Case {
            error: VoxError::InvalidArgument("bad-arg".to_string()),
            expected_category: ErrorCategory::Configuration,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckConfiguration,
        },
    ];

    for case in cases {
        assert_eq!(case.error.category(), case.expected_category, "{}", case.error);
        assert_eq!(case.error.is_retryable(), case.expected_retryable, "{}", case.error);
        assert_eq!(
            case.error.recovery_suggestion(),
            case.expected_recovery,
            "{}",
            case.error
        );
    }
}

#[test]
fn terminal_errors_carry_human_readable_reasons() {
    let err = VoxError::RunFailed {
        run_id: "run_9".to_string(),
        status: RunStatus::Incomplete,
        reason: "max tokens".to_string(),
    };
    let message = err.to_string();
    assert!(message.contains("run_9"));
    assert!(message.contains("incomplete"));
    assert!(message.contains("max tokens"));

    assert_eq!(VoxError::NoAnswer.to_string(), "No answer produced");
}
