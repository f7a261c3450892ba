//! Drives one user turn: post the message, start a run, answer tool calls,
//! and return the assistant's reply.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::types::{AssistantReply, RunLimits, RunStatus, TurnMode, TurnPhase, TurnState};
use crate::error::{Result, VoxError};
use crate::stream::AssistantStreamEvent;
use crate::tools::ToolRegistry;
use crate::transport::{
    AssistantBackend, CreateRunRequest, MessageObject, NewMessage, Role, RunObject, ToolOutput,
};

/// Executes turns against an [`AssistantBackend`].
///
/// Cancellation is observed between backend calls and while waiting, never in
/// the middle of a call, so a tool-output batch is either submitted whole or
/// not at all.
#[derive(Clone)]
pub struct RunDriver {
    backend: Arc<dyn AssistantBackend>,
    tools: Arc<ToolRegistry>,
    assistant_id: String,
    instructions: Option<String>,
    limits: RunLimits,
}

impl RunDriver {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        tools: Arc<ToolRegistry>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            tools,
            assistant_id: assistant_id.into(),
            instructions: None,
            limits: RunLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run a turn in the given mode.
    pub async fn execute(
        &self,
        mode: TurnMode,
        thread_id: &str,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<AssistantReply> {
        match mode {
            TurnMode::Poll => self.execute_turn(thread_id, user_message, cancel).await,
            TurnMode::Stream => {
                self.execute_turn_streaming(thread_id, user_message, cancel)
                    .await
            }
        }
    }

    /// Run a turn by polling the run status.
    pub async fn execute_turn(
        &self,
        thread_id: &str,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<AssistantReply> {
        let mut state = TurnState::new(thread_id);
        let result = self
            .poll_turn(thread_id, user_message, cancel, &mut state)
            .await;
        finish(&mut state, &result);
        result
    }

    /// Run a turn by consuming the run's event stream.
    pub async fn execute_turn_streaming(
        &self,
        thread_id: &str,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<AssistantReply> {
        let mut state = TurnState::new(thread_id);
        let result = self
            .stream_turn(thread_id, user_message, cancel, &mut state)
            .await;
        finish(&mut state, &result);
        result
    }

    async fn poll_turn(
        &self,
        thread_id: &str,
        user_message: &str,
        cancel: &CancellationToken,
        state: &mut TurnState,
    ) -> Result<AssistantReply> {
        self.post_user_message(thread_id, user_message, cancel, state)
            .await?;

        ensure_active(cancel)?;
        let run = self
            .backend
            .create_run(thread_id, &self.run_request())
            .await?;
        state.observe_run(&run.id);
        state.advance(TurnPhase::RunStarted);
        tracing::debug!(thread_id, run_id = %run.id, status = %run.status, "run created");

        let run_id = run.id;
        for attempt in 1..=self.limits.max_poll_attempts {
            state.advance(TurnPhase::Polling);
            self.pause(cancel).await?;

            ensure_active(cancel)?;
            let run = self.backend.get_run(thread_id, &run_id).await?;
            state.record_poll();
            tracing::debug!(thread_id, run_id = %run_id, attempt, status = %run.status, "run polled");

            match run.status {
                status if status.is_pending() => continue,
                RunStatus::RequiresAction => {
                    state.advance(TurnPhase::AwaitingToolOutputs);
                    let outputs = self.resolve_required_action(thread_id, &run, state).await?;
                    ensure_active(cancel)?;
                    self.backend
                        .submit_tool_outputs(thread_id, &run_id, &outputs)
                        .await?;
                    tracing::debug!(
                        thread_id,
                        run_id = %run_id,
                        outputs = outputs.len(),
                        "tool outputs submitted"
                    );
                }
                RunStatus::Completed => {
                    ensure_active(cancel)?;
                    let messages = self.backend.list_messages(thread_id).await?;
                    let text = select_reply(&messages, &run_id).ok_or(VoxError::NoAnswer)?;
                    return Ok(AssistantReply {
                        text,
                        thread_id: thread_id.to_string(),
                        run_id,
                        tool_rounds: state.tool_rounds(),
                        polls: state.polls(),
                    });
                }
                status if status.is_terminal() => return Err(terminal_error(&run)),
                status => {
                    return Err(VoxError::InvalidResponse(format!(
                        "run {run_id} reported unexpected status {status}"
                    )));
                }
            }
        }

        Err(VoxError::TurnTimedOut {
            run_id,
            waited_ms: duration_ms(self.limits.polling_budget()),
        })
    }

    async fn stream_turn(
        &self,
        thread_id: &str,
        user_message: &str,
        cancel: &CancellationToken,
        state: &mut TurnState,
    ) -> Result<AssistantReply> {
        self.post_user_message(thread_id, user_message, cancel, state)
            .await?;

        ensure_active(cancel)?;
        let mut stream = self
            .backend
            .stream_run(thread_id, &self.run_request().streaming())
            .await?;
        state.advance(TurnPhase::RunStarted);
        state.advance(TurnPhase::Streaming);

        let idle_timeout = self.limits.stream_idle_timeout;
        let deadline = time::sleep(self.limits.stream_deadline);
        tokio::pin!(deadline);
        let idle = time::sleep(idle_timeout);
        tokio::pin!(idle);

        let mut text = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VoxError::Canceled),
                _ = &mut deadline => {
                    return Err(VoxError::TurnTimedOut {
                        run_id: state.run_id().unwrap_or_default().to_string(),
                        waited_ms: duration_ms(self.limits.stream_deadline),
                    });
                }
                _ = &mut idle => {
                    tracing::warn!(thread_id, idle_ms = duration_ms(idle_timeout), "run stream went idle");
                    return Err(VoxError::TurnTimedOut {
                        run_id: state.run_id().unwrap_or_default().to_string(),
                        waited_ms: duration_ms(idle_timeout),
                    });
                }
                next = stream.next() => next,
            };
            idle.as_mut().reset(time::Instant::now() + idle_timeout);

            let Some(event) = next else {
                tracing::debug!(thread_id, "run stream ended without a terminal event");
                break;
            };

            let event = event?;
            let terminal = event.is_terminal();
            match event {
                AssistantStreamEvent::RunStatus(run) => {
                    state.observe_run(&run.id);
                    tracing::trace!(thread_id, run_id = %run.id, status = %run.status, "run status");
                }
                AssistantStreamEvent::MessageDelta(delta) => text.push_str(&delta.text()),
                AssistantStreamEvent::RequiresAction(run) => {
                    state.observe_run(&run.id);
                    state.advance(TurnPhase::AwaitingToolOutputs);
                    let outputs = self.resolve_required_action(thread_id, &run, state).await?;
                    ensure_active(cancel)?;
                    stream = self
                        .backend
                        .submit_tool_outputs_stream(thread_id, &run.id, &outputs)
                        .await?;
                    state.advance(TurnPhase::Streaming);
                    idle.as_mut().reset(time::Instant::now() + idle_timeout);
                }
                AssistantStreamEvent::RunCompleted(Some(run)) => state.observe_run(&run.id),
                AssistantStreamEvent::RunCompleted(None) | AssistantStreamEvent::Done => {}
                AssistantStreamEvent::RunFailed(run) | AssistantStreamEvent::RunExpired(run) => {
                    state.observe_run(&run.id);
                    return Err(terminal_error(&run));
                }
                AssistantStreamEvent::Error(message) => {
                    return Err(VoxError::RunFailed {
                        run_id: state.run_id().unwrap_or_default().to_string(),
                        status: RunStatus::Failed,
                        reason: message,
                    });
                }
                AssistantStreamEvent::Ignored(kind) => {
                    tracing::trace!(thread_id, kind = %kind, "stream event ignored");
                }
            }
            if terminal {
                break;
            }
        }

        if text.trim().is_empty() {
            return Err(VoxError::NoAnswer);
        }
        Ok(AssistantReply {
            text,
            thread_id: thread_id.to_string(),
            run_id: state.run_id().unwrap_or_default().to_string(),
            tool_rounds: state.tool_rounds(),
            polls: 0,
        })
    }

    async fn post_user_message(
        &self,
        thread_id: &str,
        user_message: &str,
        cancel: &CancellationToken,
        state: &mut TurnState,
    ) -> Result<()> {
        if user_message.trim().is_empty() {
            return Err(VoxError::InvalidArgument(
                "user message must not be empty".to_string(),
            ));
        }
        ensure_active(cancel)?;
        let message = self
            .backend
            .send_message(thread_id, &NewMessage::user(user_message))
            .await?;
        tracing::debug!(thread_id, message_id = %message.id, "user message posted");
        state.advance(TurnPhase::MessageSent);
        Ok(())
    }

    async fn resolve_required_action(
        &self,
        thread_id: &str,
        run: &RunObject,
        state: &mut TurnState,
    ) -> Result<Vec<ToolOutput>> {
        let calls = run
            .pending_tool_calls()
            .filter(|calls| !calls.is_empty())
            .ok_or_else(|| {
                VoxError::InvalidResponse(format!(
                    "run {} requires action but lists no tool calls",
                    run.id
                ))
            })?;

        let round = state.record_tool_round();
        if round > self.limits.max_tool_rounds {
            return Err(VoxError::RunFailed {
                run_id: run.id.clone(),
                status: RunStatus::RequiresAction,
                reason: format!(
                    "exceeded {} tool-call rounds",
                    self.limits.max_tool_rounds
                ),
            });
        }

        tracing::debug!(thread_id, run_id = %run.id, round, calls = calls.len(), "resolving tool calls");
        Ok(self.tools.resolve_all(thread_id, &run.id, calls).await)
    }

    fn run_request(&self) -> CreateRunRequest {
        CreateRunRequest::new(&self.assistant_id)
            .with_tools(self.tools.definitions())
            .with_instructions(self.instructions.clone())
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VoxError::Canceled),
            _ = time::sleep(self.limits.poll_interval) => Ok(()),
        }
    }
}

impl std::fmt::Debug for RunDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunDriver")
            .field("assistant_id", &self.assistant_id)
            .field("tools", &self.tools)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(VoxError::Canceled)
    } else {
        Ok(())
    }
}

fn finish(state: &mut TurnState, result: &Result<AssistantReply>) {
    let phase = match result {
        Ok(_) => TurnPhase::Completed,
        Err(VoxError::TurnTimedOut { .. }) => TurnPhase::TimedOut,
        Err(VoxError::Canceled) => TurnPhase::Canceled,
        Err(_) => TurnPhase::Failed,
    };
    state.advance(phase);
    match result {
        Ok(reply) => tracing::info!(
            thread_id = %reply.thread_id,
            run_id = %reply.run_id,
            tool_rounds = reply.tool_rounds,
            polls = reply.polls,
            "turn completed"
        ),
        Err(err) => tracing::info!(
            run_id = state.run_id().unwrap_or("-"),
            phase = %state.phase(),
            error = %err,
            "turn ended without a reply"
        ),
    }
}

/// Text of the assistant message produced by `run_id`, falling back to the
/// newest assistant message. `messages` is newest first.
fn select_reply(messages: &[MessageObject], run_id: &str) -> Option<String> {
    let assistant = || messages.iter().filter(|m| m.role == Role::Assistant);
    let message = assistant()
        .find(|m| m.run_id.as_deref() == Some(run_id))
        .or_else(|| assistant().next())?;
    let text = message.text();
    (!text.trim().is_empty()).then_some(text)
}

fn terminal_error(run: &RunObject) -> VoxError {
    match run.status {
        RunStatus::Expired => VoxError::RunExpired {
            run_id: run.id.clone(),
        },
        status => VoxError::RunFailed {
            run_id: run.id.clone(),
            status,
            reason: run.failure_reason(),
        },
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
