//! Speech-to-text for spoken questions.

pub mod mime;
pub mod whisper;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VoxError;

pub use whisper::WhisperTranscriber;

/// Text recognised from an audio clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub language: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// Turns recorded speech into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<Transcript, VoxError>;
}
