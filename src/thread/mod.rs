//! The single active conversation thread.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VoxError};
use crate::transport::AssistantBackend;

/// Opaque identifier of a backend thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ThreadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Creates the thread lazily and caches it until invalidated.
///
/// The cache lock is held across creation so concurrent first callers share
/// one created thread.
pub struct ThreadManager {
    backend: Arc<dyn AssistantBackend>,
    current: Mutex<Option<ThreadId>>,
    retry_delay: Duration,
    max_attempts: u32,
}

impl ThreadManager {
    pub fn new(backend: Arc<dyn AssistantBackend>) -> Self {
        Self {
            backend,
            current: Mutex::new(None),
            retry_delay: Duration::from_secs(2),
            max_attempts: 5,
        }
    }

    /// Delay between failed creation attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Creation attempts before giving up. Clamped to at least one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Seed the cache with a known thread, e.g. one restored from disk.
    pub fn with_thread(self, thread_id: ThreadId) -> Self {
        Self {
            current: Mutex::new(Some(thread_id)),
            ..self
        }
    }

    /// Cached thread, if any.
    pub async fn current(&self) -> Option<ThreadId> {
        self.current.lock().await.clone()
    }

    /// Return the cached thread or create one.
    pub async fn ensure_thread(&self, cancel: &CancellationToken) -> Result<ThreadId> {
        let mut current = self.current.lock().await;
        if let Some(id) = current.as_ref() {
            return Ok(id.clone());
        }

        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(VoxError::Canceled);
            }
            match self.backend.create_thread(&[]).await {
                Ok(thread) => {
                    let id = ThreadId::new(thread.id);
                    tracing::info!(thread_id = %id, attempt, "conversation thread created");
                    *current = Some(id.clone());
                    return Ok(id);
                }
                Err(err @ (VoxError::Authentication(_) | VoxError::Configuration(_))) => {
                    return Err(err);
                }
                Err(err) if attempt >= self.max_attempts => {
                    tracing::warn!(attempt, error = %err, "giving up on thread creation");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        delay_ms = self.retry_delay.as_millis() as u64,
                        error = %err,
                        "thread creation failed, retrying"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VoxError::Canceled),
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            attempt += 1;
        }
    }

    /// Drop the cached thread unconditionally.
    pub async fn invalidate(&self) {
        if let Some(old) = self.current.lock().await.take() {
            tracing::info!(thread_id = %old, "conversation thread invalidated");
        }
    }

    /// Drop the cached thread only if it is still `stale`.
    ///
    /// Returns whether the cache was cleared. A thread already replaced by a
    /// concurrent recovery is left alone.
    pub async fn invalidate_if(&self, stale: &ThreadId) -> bool {
        let mut current = self.current.lock().await;
        if current.as_ref() == Some(stale) {
            *current = None;
            tracing::info!(thread_id = %stale, "conversation thread invalidated");
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for ThreadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadManager")
            .field("retry_delay", &self.retry_delay)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
