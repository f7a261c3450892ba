//! Assistant backend transport: the operations the run driver depends on.

pub mod http;
pub mod types;

pub use http::HttpTransport;
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::VoxError;
use crate::stream::AssistantStreamEvent;

/// Decoded event stream of a streaming run.
pub type EventStream = BoxStream<'static, Result<AssistantStreamEvent, VoxError>>;

/// Remote conversational-assistant backend.
///
/// Implementations own retry and timeout policy for individual calls; the
/// run driver only sees the final outcome of each operation.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Create a thread, optionally seeded with messages.
    async fn create_thread(&self, initial: &[NewMessage]) -> Result<ThreadObject, VoxError>;

    /// Append a message to a thread.
    async fn send_message(
        &self,
        thread_id: &str,
        message: &NewMessage,
    ) -> Result<MessageObject, VoxError>;

    /// Start a run on a thread.
    async fn create_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<RunObject, VoxError>;

    /// Fetch the current state of a run.
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, VoxError>;

    /// Submit every tool output of one `requires_action` round in a single call.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunObject, VoxError>;

    /// Start a run and consume it as an event stream.
    async fn stream_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<EventStream, VoxError>;

    /// Submit tool outputs and continue the run as an event stream.
    async fn submit_tool_outputs_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<EventStream, VoxError>;

    /// Thread messages, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageObject>, VoxError>;
}
