//! Assistant-run orchestration: the per-turn state machine.

pub mod driver;
pub mod types;

pub use driver::RunDriver;
pub use types::{AssistantReply, RunLimits, RunStatus, TurnMode, TurnPhase, TurnState};
