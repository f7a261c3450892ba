//! Convenience re-exports for common use.

pub use crate::audio::{Transcriber, Transcript, WhisperTranscriber};
pub use crate::config::VoxConfig;
pub use crate::error::{Result, VoxError};
pub use crate::history::{ConversationLog, ConversationRecord};
pub use crate::run::{AssistantReply, RunDriver, RunLimits, RunStatus, TurnMode};
pub use crate::session::{AssistantSession, SpokenTurn};
pub use crate::thread::{ThreadId, ThreadManager};
pub use crate::tools::{Tool, ToolArguments, ToolCallContext, ToolParameters, ToolRegistry};
pub use crate::transport::{AssistantBackend, HttpTransport};
