//! Wire types for the assistant backend (threads, messages, runs, tool outputs).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::run::RunStatus;
use crate::tools::ToolDefinition;

/// Author of a thread message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A message to append to a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateThreadRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<NewMessage>,
}

/// `POST /threads` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadObject {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// A stored thread message.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessageObject {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl MessageObject {
    /// Concatenated text of every text part.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                MessageContent::Text { text } => Some(text.value.as_str()),
                MessageContent::Unsupported => None,
            })
            .collect()
    }
}

/// One content part of a message. Only text parts are consumed.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TextContent {
    pub value: String,
}

/// `GET /threads/{id}/messages` response.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageList {
    pub data: Vec<MessageObject>,
    #[serde(default)]
    pub has_more: bool,
}

/// Body of `POST /threads/{id}/runs`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateRunRequest {
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl CreateRunRequest {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            tools: None,
            instructions: None,
            stream: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = Some(true);
        self
    }
}

/// A run as reported by the backend.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RunObject {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunLastError>,
}

impl RunObject {
    /// Tool calls awaiting outputs, if the run is blocked on them.
    pub fn pending_tool_calls(&self) -> Option<&[ToolCall]> {
        self.required_action
            .as_ref()
            .map(|action| action.submit_tool_outputs.tool_calls.as_slice())
    }

    /// Human-readable reason for a terminal status.
    pub fn failure_reason(&self) -> String {
        match &self.last_error {
            Some(err) => match &err.code {
                Some(code) => format!("{code}: {}", err.message),
                None => err.message.clone(),
            },
            None => format!("run ended with status {}", self.status),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RunLastError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RequiredAction {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SubmitToolOutputs {
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// A function call the assistant wants answered before it continues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the backend sent it.
    #[serde(default)]
    pub arguments: String,
}

/// The caller's answer to one [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// Body of `POST /threads/{id}/runs/{run_id}/submit_tool_outputs`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitToolOutputsRequest<'a> {
    pub tool_outputs: &'a [ToolOutput],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}
