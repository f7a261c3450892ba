//! Event kinds carried by a streaming run.

use serde::Deserialize;

use crate::error::VoxError;
use crate::transport::types::{MessageContent, RunObject};

/// One decoded event of a streaming run.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantStreamEvent {
    /// Non-terminal run status update (created, queued, in progress, cancelling).
    RunStatus(RunObject),
    /// The run is blocked on tool outputs.
    RequiresAction(RunObject),
    /// Incremental assistant text.
    MessageDelta(MessageDelta),
    /// Terminal success. The payload is absent when a stream only sends the kind.
    RunCompleted(Option<RunObject>),
    /// Terminal failure (`failed`, `cancelled`, `incomplete`).
    RunFailed(RunObject),
    RunExpired(RunObject),
    /// Server-side stream error.
    Error(String),
    /// `[DONE]` sentinel.
    Done,
    /// A kind this client does not act on.
    Ignored(String),
}

impl AssistantStreamEvent {
    /// Decode a `(kind, payload)` pair.
    pub fn from_parts(kind: &str, data: serde_json::Value) -> Result<Self, VoxError> {
        let event = match kind {
            "thread.run.created"
            | "thread.run.queued"
            | "thread.run.in_progress"
            | "thread.run.cancelling" => Self::RunStatus(run_payload(kind, data)?),
            "thread.run.requires_action" => Self::RequiresAction(run_payload(kind, data)?),
            "thread.run.completed" => {
                if data.is_null() {
                    Self::RunCompleted(None)
                } else {
                    Self::RunCompleted(Some(run_payload(kind, data)?))
                }
            }
            "thread.run.failed" | "thread.run.cancelled" | "thread.run.incomplete" => {
                Self::RunFailed(run_payload(kind, data)?)
            }
            "thread.run.expired" => Self::RunExpired(run_payload(kind, data)?),
            "thread.message.delta" => Self::MessageDelta(
                serde_json::from_value(data).map_err(|e| malformed(kind, e))?,
            ),
            "error" => Self::Error(error_message(&data)),
            "done" => Self::Done,
            other => Self::Ignored(other.to_string()),
        };
        Ok(event)
    }

    /// Whether no further events are expected after this one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted(_)
                | Self::RunFailed(_)
                | Self::RunExpired(_)
                | Self::Error(_)
                | Self::Done
        )
    }
}

/// Payload of `thread.message.delta`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessageDelta {
    #[serde(default)]
    pub id: Option<String>,
    pub delta: MessageDeltaBody,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl MessageDelta {
    /// The text fragment carried by this delta.
    pub fn text(&self) -> String {
        self.delta
            .content
            .iter()
            .filter_map(|part| match part {
                MessageContent::Text { text } => Some(text.value.as_str()),
                MessageContent::Unsupported => None,
            })
            .collect()
    }
}

fn run_payload(kind: &str, data: serde_json::Value) -> Result<RunObject, VoxError> {
    serde_json::from_value(data).map_err(|e| malformed(kind, e))
}

fn malformed(kind: &str, err: serde_json::Error) -> VoxError {
    VoxError::InvalidResponse(format!("Malformed {kind} event: {err}"))
}

fn error_message(data: &serde_json::Value) -> String {
    data.get("message")
        .or_else(|| data.get("error").and_then(|e| e.get("message")))
        .and_then(|m| m.as_str())
        .map(ToString::to_string)
        .unwrap_or_else(|| data.to_string())
}
