//! Streaming run events: SSE line decoding into a tagged event union.

pub mod decoder;
pub mod events;

pub use decoder::{decode_stream, SseDecoder};
pub use events::{AssistantStreamEvent, MessageDelta};
