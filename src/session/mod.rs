//! Entry point for a voice client: one question in, one answer out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::audio::{Transcriber, Transcript, WhisperTranscriber};
use crate::config::VoxConfig;
use crate::error::{Result, VoxError};
use crate::history::{ConversationLog, ConversationRecord, JsonlConversationLog};
use crate::run::{AssistantReply, RunDriver, RunLimits, RunStatus, TurnMode};
use crate::thread::{ThreadId, ThreadManager};
use crate::tools::{MemoryStockStore, StockLookupTool, ToolRegistry};
use crate::transport::http::build_client;
use crate::transport::{AssistantBackend, HttpTransport};

/// A transcribed question together with its answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpokenTurn {
    pub transcript: Transcript,
    pub reply: AssistantReply,
}

/// Ties the thread cache, run driver, transcriber and history together.
///
/// At most one turn runs at a time; a second caller gets
/// [`VoxError::TurnInProgress`] instead of queuing behind the first.
pub struct AssistantSession {
    threads: Arc<ThreadManager>,
    driver: RunDriver,
    mode: TurnMode,
    transcriber: Option<Arc<dyn Transcriber>>,
    history: Option<Arc<dyn ConversationLog>>,
    in_flight: AtomicBool,
}

impl AssistantSession {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        tools: ToolRegistry,
        assistant_id: impl Into<String>,
    ) -> Self {
        let threads = Arc::new(ThreadManager::new(Arc::clone(&backend)));
        Self {
            threads,
            driver: RunDriver::new(backend, Arc::new(tools), assistant_id),
            mode: TurnMode::Poll,
            transcriber: None,
            history: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Wire the HTTP transport, stock tool, transcriber and history from `config`.
    pub async fn from_config(config: &VoxConfig) -> Result<Self> {
        config.validate()?;

        let client = build_client(&config.timeouts())?;
        let transport = HttpTransport::from_config_with_client(config, client.clone())?;
        let backend: Arc<dyn AssistantBackend> = Arc::new(transport);

        let store = match &config.stock_path {
            Some(path) => MemoryStockStore::from_json_file(path).await?,
            None => MemoryStockStore::new(),
        };
        let stock_tool =
            StockLookupTool::new(Arc::new(store)).with_name(config.stock_tool_name.clone());
        let tools = ToolRegistry::new().with_tool(Arc::new(stock_tool));

        let threads = ThreadManager::new(Arc::clone(&backend))
            .with_retry_delay(config.thread_retry_delay)
            .with_max_attempts(config.thread_max_attempts);

        let mut session = Self::new(backend, tools, config.assistant_id.clone())
            .with_thread_manager(threads)
            .with_mode(config.mode)
            .with_limits(config.limits())
            .with_transcriber(Arc::new(WhisperTranscriber::from_config_with_client(
                config, client,
            )));
        if let Some(instructions) = &config.instructions {
            session.driver = session.driver.with_instructions(instructions.clone());
        }
        if let Some(path) = &config.history_path {
            session = session.with_history(Arc::new(JsonlConversationLog::new(path)));
        }

        tracing::debug!(mode = %config.mode, assistant_id = %config.assistant_id, "assistant session ready");
        Ok(session)
    }

    pub fn with_mode(mut self, mode: TurnMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.driver = self.driver.with_limits(limits);
        self
    }

    pub fn with_thread_manager(mut self, threads: ThreadManager) -> Self {
        self.threads = Arc::new(threads);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn ConversationLog>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn mode(&self) -> TurnMode {
        self.mode
    }

    pub fn threads(&self) -> &ThreadManager {
        &self.threads
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Answer a typed question.
    pub async fn ask(&self, query: &str, cancel: &CancellationToken) -> Result<AssistantReply> {
        let query = validate_query(query)?;
        let _turn = TurnGuard::acquire(&self.in_flight)?;
        self.run_turn(query, cancel).await
    }

    /// Transcribe a spoken question, then answer it.
    pub async fn ask_audio(
        &self,
        audio: &[u8],
        mime_type: &str,
        cancel: &CancellationToken,
    ) -> Result<SpokenTurn> {
        let transcriber = self.transcriber.as_ref().ok_or_else(|| {
            VoxError::Configuration("no transcriber configured for audio questions".to_string())
        })?;
        let _turn = TurnGuard::acquire(&self.in_flight)?;

        let transcript = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VoxError::Canceled),
            transcript = transcriber.transcribe(audio, mime_type, None) => transcript?,
        };
        let query = validate_query(&transcript.text)?;
        tracing::info!(query, "spoken question recognised");

        let reply = self.run_turn(query, cancel).await?;
        Ok(SpokenTurn { transcript, reply })
    }

    async fn run_turn(&self, query: &str, cancel: &CancellationToken) -> Result<AssistantReply> {
        let thread = self.threads.ensure_thread(cancel).await?;
        match self
            .driver
            .execute(self.mode, thread.as_str(), query, cancel)
            .await
        {
            Ok(reply) => {
                self.record(query, &reply).await;
                Ok(reply)
            }
            Err(err) => {
                if abandons_thread(&err) {
                    self.recover_thread(&thread, &err).await;
                }
                Err(err)
            }
        }
    }

    async fn recover_thread(&self, thread: &ThreadId, cause: &VoxError) {
        if self.threads.invalidate_if(thread).await {
            tracing::warn!(
                thread_id = %thread,
                error = %cause,
                "thread dropped; a new one will be created on the next turn"
            );
        }
    }

    async fn record(&self, query: &str, reply: &AssistantReply) {
        let Some(history) = &self.history else {
            return;
        };
        let record = ConversationRecord::new(query, &reply.text, &reply.thread_id, &reply.run_id);
        if let Err(err) = history.append(&record).await {
            tracing::warn!(error = %err, "failed to append conversation record");
        }
    }
}

impl std::fmt::Debug for AssistantSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantSession")
            .field("mode", &self.mode)
            .field("driver", &self.driver)
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

/// Whether the thread can no longer take a new turn: it is gone, or a run
/// this session started may still be active on it.
fn abandons_thread(err: &VoxError) -> bool {
    matches!(
        err,
        VoxError::ThreadUnavailable(_)
            | VoxError::TurnTimedOut { .. }
            | VoxError::Canceled
            | VoxError::RunFailed {
                status: RunStatus::RequiresAction,
                ..
            }
    )
}

fn validate_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(VoxError::InvalidArgument(
            "question must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Clears the in-flight flag when the turn ends, however it ends.
struct TurnGuard<'a>(&'a AtomicBool);

impl<'a> TurnGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| VoxError::TurnInProgress)
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_rejects_second_turn_until_dropped() {
        let flag = AtomicBool::new(false);
        let first = TurnGuard::acquire(&flag).unwrap();
        assert!(matches!(TurnGuard::acquire(&flag), Err(VoxError::TurnInProgress)));
        drop(first);
        assert!(TurnGuard::acquire(&flag).is_ok());
    }

    #[test]
    fn only_turns_that_may_leave_a_run_active_drop_the_thread() {
        assert!(abandons_thread(&VoxError::Canceled));
        assert!(abandons_thread(&VoxError::TurnTimedOut {
            run_id: "run_1".to_string(),
            waited_ms: 30_000,
        }));
        assert!(abandons_thread(&VoxError::RunFailed {
            run_id: "run_1".to_string(),
            status: RunStatus::RequiresAction,
            reason: "exceeded 8 tool-call rounds".to_string(),
        }));
        assert!(!abandons_thread(&VoxError::RunFailed {
            run_id: "run_1".to_string(),
            status: RunStatus::Failed,
            reason: "boom".to_string(),
        }));
        assert!(!abandons_thread(&VoxError::NoAnswer));
    }

    #[test]
    fn blank_queries_are_rejected() {
        assert!(matches!(validate_query(" \n"), Err(VoxError::InvalidArgument(_))));
        assert_eq!(validate_query("  stock of rice ").unwrap(), "stock of rice");
    }
}
