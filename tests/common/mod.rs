//! Shared test helpers and a scripted assistant backend.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use voxrun::error::VoxError;
use voxrun::stream::decode_stream;
use voxrun::transport::{
    AssistantBackend, CreateRunRequest, EventStream, MessageObject, NewMessage, RunObject,
    ThreadObject, ToolOutput,
};

/// One scripted event stream: raw SSE chunks, optionally left open afterwards.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStream {
    pub chunks: Vec<String>,
    pub stall: bool,
}

impl ScriptedStream {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            stall: false,
        }
    }

    /// Keep the connection open after the last chunk.
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }
}

/// An [`AssistantBackend`] that replays canned responses and records calls.
#[derive(Default)]
pub struct ScriptedBackend {
    thread_failures: AtomicUsize,
    thread_delay: Mutex<Option<Duration>>,
    threads_created: AtomicUsize,
    message_error: Mutex<Option<VoxError>>,
    run_statuses: Mutex<VecDeque<RunObject>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    messages: Mutex<Vec<MessageObject>>,
    pub sent_messages: Mutex<Vec<(String, NewMessage)>>,
    pub run_requests: Mutex<Vec<CreateRunRequest>>,
    pub submissions: Mutex<Vec<Vec<ToolOutput>>>,
    pub polls: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` thread creations with a server error.
    pub fn fail_thread_creation(self, n: usize) -> Self {
        self.thread_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_thread_delay(self, delay: Duration) -> Self {
        *self.thread_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn fail_next_message(self, error: VoxError) -> Self {
        *self.message_error.lock().unwrap() = Some(error);
        self
    }

    /// Statuses returned by successive `get_run` calls; the last one repeats.
    pub fn with_statuses(self, runs: impl IntoIterator<Item = RunObject>) -> Self {
        self.run_statuses.lock().unwrap().extend(runs);
        self
    }

    /// Streams returned by `stream_run` and then each streaming submission.
    pub fn with_streams(self, streams: impl IntoIterator<Item = ScriptedStream>) -> Self {
        self.streams.lock().unwrap().extend(streams);
        self
    }

    /// Thread messages, newest first.
    pub fn with_messages(self, messages: impl IntoIterator<Item = MessageObject>) -> Self {
        self.messages.lock().unwrap().extend(messages);
        self
    }

    pub fn threads_created(&self) -> usize {
        self.threads_created.load(Ordering::SeqCst)
    }

    /// Backend operations in the order they were issued.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn submissions(&self) -> Vec<Vec<ToolOutput>> {
        self.submissions.lock().unwrap().clone()
    }

    fn next_stream(&self) -> Result<EventStream, VoxError> {
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| VoxError::InvalidResponse("no scripted stream left".to_string()))?;
        let chunks = futures::stream::iter(
            script
                .chunks
                .into_iter()
                .map(|chunk| Ok::<_, VoxError>(chunk.into_bytes())),
        );
        if script.stall {
            Ok(decode_stream(chunks.chain(futures::stream::pending())))
        } else {
            Ok(decode_stream(chunks))
        }
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    async fn create_thread(&self, _initial: &[NewMessage]) -> Result<ThreadObject, VoxError> {
        self.record("create_thread");
        let delay = *self.thread_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.thread_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.thread_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(VoxError::api(503, "overloaded"));
        }
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ThreadObject {
            id: format!("thread_{n}"),
            created_at: None,
        })
    }

    async fn send_message(
        &self,
        thread_id: &str,
        message: &NewMessage,
    ) -> Result<MessageObject, VoxError> {
        self.record("send_message");
        if let Some(err) = self.message_error.lock().unwrap().take() {
            return Err(err);
        }
        self.sent_messages
            .lock()
            .unwrap()
            .push((thread_id.to_string(), message.clone()));
        Ok(serde_json::from_value(json!({
            "id": "msg_user",
            "role": "user",
            "content": [{"type": "text", "text": {"value": message.content}}]
        }))
        .unwrap())
    }

    async fn create_run(
        &self,
        _thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<RunObject, VoxError> {
        self.record("create_run");
        self.run_requests.lock().unwrap().push(request.clone());
        Ok(run("run_1", "queued"))
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<RunObject, VoxError> {
        self.record("get_run");
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.run_statuses.lock().unwrap();
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(next.unwrap_or_else(|| run(run_id, "in_progress")))
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunObject, VoxError> {
        self.record("submit_tool_outputs");
        self.submissions.lock().unwrap().push(outputs.to_vec());
        Ok(run(run_id, "queued"))
    }

    async fn stream_run(
        &self,
        _thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<EventStream, VoxError> {
        self.record("stream_run");
        self.run_requests.lock().unwrap().push(request.clone());
        self.next_stream()
    }

    async fn submit_tool_outputs_stream(
        &self,
        _thread_id: &str,
        _run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<EventStream, VoxError> {
        self.record("submit_tool_outputs_stream");
        self.submissions.lock().unwrap().push(outputs.to_vec());
        self.next_stream()
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<MessageObject>, VoxError> {
        self.record("list_messages");
        Ok(self.messages.lock().unwrap().clone())
    }
}

pub fn run(id: &str, status: &str) -> RunObject {
    serde_json::from_value(json!({"id": id, "status": status})).unwrap()
}

pub fn failed_run(id: &str, message: &str) -> RunObject {
    serde_json::from_value(json!({
        "id": id,
        "status": "failed",
        "last_error": {"code": "server_error", "message": message}
    }))
    .unwrap()
}

/// A `requires_action` run; each call is `(call_id, function, arguments_json)`.
pub fn requires_action(id: &str, calls: &[(&str, &str, &str)]) -> RunObject {
    serde_json::from_value(requires_action_json(id, calls)).unwrap()
}

pub fn requires_action_json(id: &str, calls: &[(&str, &str, &str)]) -> serde_json::Value {
    let tool_calls: Vec<_> = calls
        .iter()
        .map(|(call_id, name, arguments)| {
            json!({
                "id": call_id,
                "type": "function",
                "function": {"name": name, "arguments": arguments}
            })
        })
        .collect();
    json!({
        "id": id,
        "status": "requires_action",
        "required_action": {
            "type": "submit_tool_outputs",
            "submit_tool_outputs": {"tool_calls": tool_calls}
        }
    })
}

pub fn assistant_message(id: &str, run_id: Option<&str>, text: &str) -> MessageObject {
    serde_json::from_value(json!({
        "id": id,
        "role": "assistant",
        "run_id": run_id,
        "content": [{"type": "text", "text": {"value": text, "annotations": []}}]
    }))
    .unwrap()
}

/// `event:` + `data:` framed SSE record.
pub fn sse(kind: &str, data: serde_json::Value) -> String {
    format!("event: {kind}\ndata: {data}\n\n")
}

pub fn delta_sse(text: &str) -> String {
    sse(
        "thread.message.delta",
        json!({
            "id": "msg_1",
            "object": "thread.message.delta",
            "delta": {"content": [{"index": 0, "type": "text", "text": {"value": text}}]}
        }),
    )
}
