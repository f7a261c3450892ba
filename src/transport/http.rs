//! HTTP transport for the assistant backend (reqwest).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::*;
use super::{AssistantBackend, EventStream};
use crate::config::VoxConfig;
use crate::error::VoxError;
use crate::stream::decode_stream;
use crate::util::retry::RetryPolicy;

/// Header carrying the assistants API version marker.
pub const BETA_HEADER: &str = "OpenAI-Beta";

/// Connection-level timeouts applied to every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    /// Whole-request bound for non-streaming calls.
    pub request: Duration,
    /// Per-read bound; the only body bound for streaming calls.
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Duration::from_secs(30),
            read: Duration::from_secs(60),
        }
    }
}

/// Build the reqwest client shared by the assistant transport and the transcriber.
pub fn build_client(timeouts: &HttpTimeouts) -> Result<reqwest::Client, VoxError> {
    reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .pool_max_idle_per_host(4)
        .build()
        .map_err(|e| VoxError::Configuration(format!("Failed to build HTTP client: {e}")))
}

/// Bearer credential plus the API version marker.
pub fn auth_headers(api_key: &str, beta: &str) -> Result<HeaderMap, VoxError> {
    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| VoxError::Configuration("API key is not a valid header value".to_string()))?;
    headers.insert(AUTHORIZATION, bearer);
    if !beta.is_empty() {
        let marker = HeaderValue::from_str(beta).map_err(|_| {
            VoxError::Configuration(format!("Invalid {BETA_HEADER} header value: {beta}"))
        })?;
        headers.insert(BETA_HEADER, marker);
    }
    Ok(headers)
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str, retry_after_ms: Option<u64>) -> VoxError {
    match status {
        401 | 403 => VoxError::Authentication(extract_error_message(body)),
        429 => VoxError::RateLimited {
            retry_after_ms: retry_after_ms.or_else(|| extract_retry_after(body)),
        },
        _ => VoxError::api(status, extract_error_message(body)),
    }
}

pub(crate) fn trim_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

pub(crate) fn retry_after_header(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| (secs * 1000.0) as u64)
}

/// A 404 on a thread-scoped path means the thread itself is gone.
fn thread_scoped(thread_id: &str) -> impl Fn(VoxError) -> VoxError + '_ {
    move |err| match err {
        VoxError::Api { status: 404, message } => {
            VoxError::ThreadUnavailable(format!("{thread_id}: {message}"))
        }
        other => other,
    }
}

/// Assistant backend over HTTP.
///
/// Owns one reqwest client; every call carries the bearer credential and the
/// version marker, is bounded by the configured timeouts and retried per
/// [`RetryPolicy`].
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
    seq: AtomicU64,
}

impl HttpTransport {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: &str,
        beta: &str,
    ) -> Result<Self, VoxError> {
        if api_key.trim().is_empty() {
            return Err(VoxError::Authentication(
                "Missing API key for assistant backend".to_string(),
            ));
        }
        Ok(Self {
            client,
            base_url: base_url.into(),
            headers: auth_headers(api_key, beta)?,
            request_timeout: HttpTimeouts::default().request,
            retry_policy: RetryPolicy::default(),
            seq: AtomicU64::new(0),
        })
    }

    /// Build a transport (and its client) from configuration.
    pub fn from_config(config: &VoxConfig) -> Result<Self, VoxError> {
        let client = build_client(&config.timeouts())?;
        Self::from_config_with_client(config, client)
    }

    /// Build a transport around an existing client.
    pub fn from_config_with_client(
        config: &VoxConfig,
        client: reqwest::Client,
    ) -> Result<Self, VoxError> {
        Ok(
            Self::new(client, config.base_url.clone(), &config.api_key, &config.beta_header)?
                .with_request_timeout(config.request_timeout)
                .with_retry_policy(config.retry.clone()),
        )
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Number of HTTP requests issued so far, retries included.
    pub fn requests_sent(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", trim_trailing_slash(&self.base_url))
    }

    async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T, VoxError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let bytes = self
            .retry_policy
            .execute(|| self.send_once(method.clone(), &url, query, body, false))
            .await?
            .bytes()
            .await?;

        serde_json::from_slice(&bytes).map_err(|e| {
            VoxError::InvalidResponse(format!("Unexpected response shape from {path}: {e}"))
        })
    }

    async fn open_stream<B>(&self, path: &str, body: &B) -> Result<EventStream, VoxError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.url(path);
        let response = self
            .retry_policy
            .execute(|| self.send_once(Method::POST, &url, &[], Some(body), true))
            .await?;
        Ok(decode_stream(response.bytes_stream()))
    }

    async fn send_once<B>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        streaming: bool,
    ) -> Result<reqwest::Response, VoxError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();
        tracing::debug!(seq, method = %method, url, streaming, "assistant request");

        let mut request = self
            .client
            .request(method.clone(), url)
            .headers(self.headers.clone());
        if streaming {
            request = request.header(ACCEPT, "text/event-stream");
        } else {
            request = request.timeout(self.request_timeout);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(seq, method = %method, url, error = %err, "assistant request failed");
                return Err(err.into());
            }
        };

        let status = response.status().as_u16();
        tracing::debug!(
            seq,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "assistant response"
        );

        if !response.status().is_success() {
            let retry_after = retry_after_header(response.headers());
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(seq, status, url, body = %body, "assistant request rejected");
            return Err(status_to_error(status, &body, retry_after));
        }

        Ok(response)
    }
}

#[async_trait]
impl AssistantBackend for HttpTransport {
    async fn create_thread(&self, initial: &[NewMessage]) -> Result<ThreadObject, VoxError> {
        let body = CreateThreadRequest {
            messages: initial.to_vec(),
        };
        self.request_json(Method::POST, "/threads", &[], Some(&body))
            .await
    }

    async fn send_message(
        &self,
        thread_id: &str,
        message: &NewMessage,
    ) -> Result<MessageObject, VoxError> {
        let path = format!("/threads/{thread_id}/messages");
        self.request_json(Method::POST, &path, &[], Some(message))
            .await
            .map_err(thread_scoped(thread_id))
    }

    async fn create_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<RunObject, VoxError> {
        let path = format!("/threads/{thread_id}/runs");
        self.request_json(Method::POST, &path, &[], Some(request))
            .await
            .map_err(thread_scoped(thread_id))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, VoxError> {
        let path = format!("/threads/{thread_id}/runs/{run_id}");
        self.request_json::<(), _>(Method::GET, &path, &[], None)
            .await
            .map_err(thread_scoped(thread_id))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunObject, VoxError> {
        let path = format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs");
        let body = SubmitToolOutputsRequest {
            tool_outputs: outputs,
            stream: None,
        };
        self.request_json(Method::POST, &path, &[], Some(&body))
            .await
            .map_err(thread_scoped(thread_id))
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<EventStream, VoxError> {
        let path = format!("/threads/{thread_id}/runs");
        let request = request.clone().streaming();
        self.open_stream(&path, &request)
            .await
            .map_err(thread_scoped(thread_id))
    }

    async fn submit_tool_outputs_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<EventStream, VoxError> {
        let path = format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs");
        let body = SubmitToolOutputsRequest {
            tool_outputs: outputs,
            stream: Some(true),
        };
        self.open_stream(&path, &body)
            .await
            .map_err(thread_scoped(thread_id))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageObject>, VoxError> {
        let path = format!("/threads/{thread_id}/messages");
        let list: MessageList = self
            .request_json::<(), _>(Method::GET, &path, &[("order", "desc")], None)
            .await
            .map_err(thread_scoped(thread_id))?;
        Ok(list.data)
    }
}
