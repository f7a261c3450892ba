//! Run status, turn phases and turn results.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status of a remote run.
///
/// `queued → in_progress → (requires_action)* → completed | failed | expired`,
/// plus the backend's `cancelling`, `cancelled` and `incomplete`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// A status this client does not know.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// No further transitions happen after a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled | Self::Incomplete
        )
    }

    /// The run is still working and only needs to be polled again.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::InProgress | Self::Cancelling)
    }
}

/// How a turn consumes its run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TurnMode {
    #[default]
    Poll,
    Stream,
}

/// Bounds applied to a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Delay before each status poll.
    pub poll_interval: Duration,
    /// Status polls before the turn times out.
    pub max_poll_attempts: u32,
    /// Longest silence tolerated between two stream events.
    pub stream_idle_timeout: Duration,
    /// Whole-turn bound for the streaming path.
    pub stream_deadline: Duration,
    /// `requires_action` rounds allowed per turn.
    pub max_tool_rounds: u32,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 30,
            stream_idle_timeout: Duration::from_secs(30),
            stream_deadline: Duration::from_secs(120),
            max_tool_rounds: 8,
        }
    }
}

impl RunLimits {
    /// Wall-clock spent sleeping by a polling turn that never finishes.
    pub fn polling_budget(&self) -> Duration {
        self.poll_interval * self.max_poll_attempts
    }
}

/// Phase of a turn as seen by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TurnPhase {
    Created,
    MessageSent,
    RunStarted,
    Polling,
    Streaming,
    AwaitingToolOutputs,
    Completed,
    Failed,
    TimedOut,
    Canceled,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Canceled
        )
    }

    /// Whether `next` is a legal successor of this phase.
    pub fn can_advance_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (_, Canceled)
                | (Created, MessageSent)
                | (MessageSent, RunStarted)
                | (RunStarted, Polling | Streaming)
                | (Polling, AwaitingToolOutputs | Completed | TimedOut)
                | (Streaming, AwaitingToolOutputs | Completed | TimedOut)
                | (AwaitingToolOutputs, Polling | Streaming | TimedOut)
        )
    }
}

/// Book-keeping for one turn.
#[derive(Debug, Clone)]
pub struct TurnState {
    phase: TurnPhase,
    thread_id: String,
    run_id: Option<String>,
    polls: u32,
    tool_rounds: u32,
}

impl TurnState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            phase: TurnPhase::Created,
            thread_id: thread_id.into(),
            run_id: None,
            polls: 0,
            tool_rounds: 0,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn tool_rounds(&self) -> u32 {
        self.tool_rounds
    }

    /// Move to `next`. Repeating the current phase is a no-op.
    pub fn advance(&mut self, next: TurnPhase) {
        if self.phase == next {
            return;
        }
        if !self.phase.can_advance_to(next) {
            tracing::warn!(
                thread_id = %self.thread_id,
                from = %self.phase,
                to = %next,
                "unexpected turn phase transition"
            );
        } else {
            tracing::trace!(thread_id = %self.thread_id, from = %self.phase, to = %next, "turn phase");
        }
        self.phase = next;
    }

    pub(crate) fn observe_run(&mut self, run_id: &str) {
        if self.run_id.as_deref() != Some(run_id) {
            self.run_id = Some(run_id.to_string());
        }
    }

    pub(crate) fn record_poll(&mut self) {
        self.polls += 1;
    }

    /// Count a tool round; returns the new total.
    pub(crate) fn record_tool_round(&mut self) -> u32 {
        self.tool_rounds += 1;
        self.tool_rounds
    }
}

/// Final answer of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantReply {
    pub text: String,
    pub thread_id: String,
    pub run_id: String,
    /// `requires_action` rounds answered during the turn.
    pub tool_rounds: u32,
    /// Status polls issued (zero on the streaming path).
    pub polls: u32,
}
