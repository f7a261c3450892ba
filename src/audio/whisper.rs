//! Whisper transcription over `/audio/transcriptions`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use uuid::Uuid;

use super::mime::{build_transcription_multipart, extension_for_mime, normalize_mime_type};
use super::{Transcriber, Transcript};
use crate::config::VoxConfig;
use crate::error::VoxError;
use crate::transport::http::{
    auth_headers, build_client, retry_after_header, status_to_error, trim_trailing_slash,
};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Whisper-compatible transcriber.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    beta_header: String,
    model: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl WhisperTranscriber {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            beta_header: crate::config::DEFAULT_BETA_HEADER.to_string(),
            model: crate::config::DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &VoxConfig) -> Result<Self, VoxError> {
        let client = build_client(&config.timeouts())?;
        Ok(Self::from_config_with_client(config, client))
    }

    pub fn from_config_with_client(config: &VoxConfig, client: reqwest::Client) -> Self {
        Self::new(client, config.api_key.clone(), config.base_url.clone())
            .with_beta_header(config.beta_header.clone())
            .with_model(config.transcription_model.clone())
            .with_timeout(config.read_timeout)
            .with_retry_policy(config.retry.clone())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Version marker sent alongside the bearer credential.
    pub fn with_beta_header(mut self, beta_header: impl Into<String>) -> Self {
        self.beta_header = beta_header.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn validate_inputs<'a>(
        &self,
        audio: &[u8],
        mime_type: &'a str,
        language: Option<&str>,
    ) -> Result<(&'a str, &'static str), VoxError> {
        if self.api_key.trim().is_empty() {
            return Err(VoxError::Authentication(
                "Missing API key for audio transcription".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(VoxError::InvalidArgument(
                "Transcription model cannot be empty".to_string(),
            ));
        }
        if audio.is_empty() {
            return Err(VoxError::InvalidArgument(
                "Audio payload cannot be empty".to_string(),
            ));
        }

        let normalized = normalize_mime_type(mime_type)
            .ok_or_else(|| VoxError::InvalidArgument("MIME type cannot be empty".to_string()))?;
        let extension = extension_for_mime(normalized).ok_or_else(|| {
            VoxError::InvalidArgument(format!("Unsupported transcription MIME type: {normalized}"))
        })?;

        if let Some(lang) = language {
            if lang.trim().is_empty() {
                return Err(VoxError::InvalidArgument(
                    "Language hint cannot be empty".to_string(),
                ));
            }
        }

        Ok((normalized, extension))
    }

    async fn transcribe_once(
        &self,
        audio: &[u8],
        mime_type: &str,
        extension: &str,
        language: Option<&str>,
    ) -> Result<Transcript, VoxError> {
        let boundary = format!("voxrun-{}", Uuid::new_v4().simple());
        let body =
            build_transcription_multipart(&boundary, &self.model, audio, mime_type, extension, language);

        let mut headers = auth_headers(&self.api_key, &self.beta_header)?;
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}")).map_err(
                |e| VoxError::InvalidArgument(format!("Failed to build multipart content-type: {e}")),
            )?,
        );

        let url = format!("{}/audio/transcriptions", trim_trailing_slash(&self.base_url));
        tracing::debug!(url = %url, bytes = audio.len(), mime_type, "transcription request");

        with_timeout(self.timeout, async {
            let response = self
                .client
                .post(url)
                .headers(headers)
                .body(body)
                .send()
                .await?;
            parse_transcription_response(response).await
        })
        .await
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<Transcript, VoxError> {
        let (mime_type, extension) = self.validate_inputs(audio, mime_type, language)?;

        let transcript = self
            .retry_policy
            .execute(|| self.transcribe_once(audio, mime_type, extension, language))
            .await?;
        tracing::info!(chars = transcript.text.len(), "audio transcribed");
        Ok(transcript)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    language: Option<String>,
    duration: Option<f64>,
}

async fn parse_transcription_response(response: reqwest::Response) -> Result<Transcript, VoxError> {
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let retry_after = retry_after_header(response.headers());
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status, body = %body, "transcription request failed");
        return Err(status_to_error(status, &body, retry_after));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !content_type.starts_with("application/json") {
        return Err(VoxError::InvalidResponse(format!(
            "Expected JSON transcription response, got '{content_type}'"
        )));
    }

    let body = response.text().await?;
    let parsed: TranscriptionResponse = serde_json::from_str(&body)
        .map_err(|e| VoxError::InvalidResponse(format!("Malformed transcription response: {e}")))?;
    let text = parsed.text.trim();
    if text.is_empty() {
        return Err(VoxError::InvalidResponse(
            "Transcription response missing text".to_string(),
        ));
    }

    Ok(Transcript {
        text: text.to_string(),
        language: parsed.language,
        duration_seconds: parsed.duration,
    })
}
