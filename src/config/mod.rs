//! Configuration (layered: setters > env > config file > defaults).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, VoxError};
use crate::run::{RunLimits, TurnMode};
use crate::transport::http::HttpTimeouts;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_BETA_HEADER: &str = "assistants=v2";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "VOXRUN_CONFIG";

/// Everything needed to run voice turns against an assistant backend.
#[derive(Clone)]
pub struct VoxConfig {
    pub api_key: String,
    pub base_url: String,
    pub assistant_id: String,
    /// Value of the `OpenAI-Beta` header.
    pub beta_header: String,
    pub transcription_model: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub read_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub stream_idle_timeout: Duration,
    pub stream_deadline: Duration,
    pub max_tool_rounds: u32,
    pub thread_retry_delay: Duration,
    pub thread_max_attempts: u32,
    pub retry: RetryPolicy,
    pub mode: TurnMode,
    /// Function name the assistant uses for stock lookups.
    pub stock_tool_name: String,
    pub instructions: Option<String>,
    /// JSON-lines conversation log.
    pub history_path: Option<PathBuf>,
    /// JSON file seeding the in-memory stock store.
    pub stock_path: Option<PathBuf>,
}

impl Default for VoxConfig {
    fn default() -> Self {
        let limits = RunLimits::default();
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            assistant_id: String::new(),
            beta_header: DEFAULT_BETA_HEADER.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            poll_interval: limits.poll_interval,
            max_poll_attempts: limits.max_poll_attempts,
            stream_idle_timeout: limits.stream_idle_timeout,
            stream_deadline: limits.stream_deadline,
            max_tool_rounds: limits.max_tool_rounds,
            thread_retry_delay: Duration::from_secs(2),
            thread_max_attempts: 5,
            retry: RetryPolicy::default(),
            mode: TurnMode::Poll,
            stock_tool_name: crate::tools::stock::DEFAULT_STOCK_TOOL_NAME.to_string(),
            instructions: None,
            history_path: None,
            stock_path: None,
        }
    }
}

impl fmt::Debug for VoxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("assistant_id", &self.assistant_id)
            .field("mode", &self.mode)
            .field("retry", &self.retry)
            .field("history_path", &self.history_path)
            .finish_non_exhaustive()
    }
}

impl VoxConfig {
    /// Defaults, then the config file, then the environment (after `.env`).
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Some(path) = config_file_path() {
            if path.exists() {
                config.apply_file(&FileConfig::read(&path)?);
                tracing::debug!(path = %path.display(), "config file loaded");
            }
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with the environment only.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(raw)
            .map_err(|e| VoxError::Configuration(format!("invalid config file: {e}")))?;
        let mut config = Self::default();
        config.apply_file(&file);
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(&FileConfig::read(path.as_ref())?);
        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_assistant_id(mut self, id: impl Into<String>) -> Self {
        self.assistant_id = id.into();
        self
    }

    pub fn with_mode(mut self, mode: TurnMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.poll_interval = limits.poll_interval;
        self.max_poll_attempts = limits.max_poll_attempts;
        self.stream_idle_timeout = limits.stream_idle_timeout;
        self.stream_deadline = limits.stream_deadline;
        self.max_tool_rounds = limits.max_tool_rounds;
        self
    }

    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    pub fn with_thread_retry(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.thread_retry_delay = delay;
        self.thread_max_attempts = max_attempts;
        self
    }

    /// Transport-level timeouts.
    pub fn timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: self.connect_timeout,
            request: self.request_timeout,
            read: self.read_timeout,
        }
    }

    pub fn limits(&self) -> RunLimits {
        RunLimits {
            poll_interval: self.poll_interval,
            max_poll_attempts: self.max_poll_attempts,
            stream_idle_timeout: self.stream_idle_timeout,
            stream_deadline: self.stream_deadline,
            max_tool_rounds: self.max_tool_rounds,
        }
    }

    /// Reject configurations that cannot produce a turn.
    pub fn validate(&self) -> Result<()> {
        fn require(ok: bool, message: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(VoxError::Configuration(message.to_string()))
            }
        }

        require(!self.api_key.trim().is_empty(), "api_key is not set (OPENAI_API_KEY)")?;
        require(
            !self.assistant_id.trim().is_empty(),
            "assistant_id is not set (VOXRUN_ASSISTANT_ID)",
        )?;
        require(
            self.base_url.starts_with("http://") || self.base_url.starts_with("https://"),
            "base_url must be an http(s) URL",
        )?;
        require(!self.stock_tool_name.trim().is_empty(), "stock_tool_name must not be empty")?;
        require(self.max_poll_attempts > 0, "max_poll_attempts must be positive")?;
        require(!self.poll_interval.is_zero(), "poll_interval must be positive")?;
        require(!self.stream_idle_timeout.is_zero(), "stream_idle_timeout must be positive")?;
        require(!self.stream_deadline.is_zero(), "stream_deadline must be positive")?;
        require(self.max_tool_rounds > 0, "max_tool_rounds must be positive")?;
        require(self.thread_max_attempts > 0, "thread_max_attempts must be positive")?;
        require(self.retry.max_attempts > 0, "retry.max_attempts must be positive")?;
        require(self.retry.multiplier >= 1.0, "retry.multiplier must be at least 1.0")?;
        require(
            self.retry.initial_backoff <= self.retry.max_backoff,
            "retry.initial_backoff must not exceed retry.max_backoff",
        )?;
        Ok(())
    }

    /// Overlay values from `lookup`, keyed by environment variable name.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(id) = get("VOXRUN_ASSISTANT_ID") {
            self.assistant_id = id;
        }
        if let Some(model) = get("VOXRUN_TRANSCRIPTION_MODEL") {
            self.transcription_model = model;
        }
        if let Some(name) = get("VOXRUN_STOCK_TOOL_NAME") {
            self.stock_tool_name = name;
        }
        if let Some(path) = get("VOXRUN_HISTORY_PATH") {
            self.history_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get("VOXRUN_STOCK_PATH") {
            self.stock_path = Some(PathBuf::from(path));
        }
        if let Some(mode) = get("VOXRUN_MODE") {
            self.mode = mode.trim().parse().map_err(|_| {
                VoxError::Configuration(format!("VOXRUN_MODE must be poll or stream, got {mode}"))
            })?;
        }
        Ok(())
    }

    fn apply_file(&mut self, file: &FileConfig) {
        let ms = Duration::from_millis;

        set(&mut self.api_key, file.api_key.clone());
        set(&mut self.base_url, file.base_url.clone());
        set(&mut self.assistant_id, file.assistant_id.clone());
        set(&mut self.beta_header, file.beta_header.clone());
        set(&mut self.transcription_model, file.transcription_model.clone());
        set(&mut self.connect_timeout, file.connect_timeout_ms.map(ms));
        set(&mut self.request_timeout, file.request_timeout_ms.map(ms));
        set(&mut self.read_timeout, file.read_timeout_ms.map(ms));
        set(&mut self.poll_interval, file.poll_interval_ms.map(ms));
        set(&mut self.max_poll_attempts, file.max_poll_attempts);
        set(&mut self.stream_idle_timeout, file.stream_idle_timeout_ms.map(ms));
        set(&mut self.stream_deadline, file.stream_deadline_ms.map(ms));
        set(&mut self.max_tool_rounds, file.max_tool_rounds);
        set(&mut self.thread_retry_delay, file.thread_retry_delay_ms.map(ms));
        set(&mut self.thread_max_attempts, file.thread_max_attempts);
        set(&mut self.mode, file.mode);
        set(&mut self.stock_tool_name, file.stock_tool_name.clone());
        if file.instructions.is_some() {
            self.instructions = file.instructions.clone();
        }
        if file.history_path.is_some() {
            self.history_path = file.history_path.clone();
        }
        if file.stock_path.is_some() {
            self.stock_path = file.stock_path.clone();
        }

        if let Some(retry) = &file.retry {
            set(&mut self.retry.max_attempts, retry.max_attempts);
            set(&mut self.retry.initial_backoff, retry.initial_backoff_ms.map(ms));
            set(&mut self.retry.max_backoff, retry.max_backoff_ms.map(ms));
            set(&mut self.retry.multiplier, retry.multiplier);
            set(&mut self.retry.jitter, retry.jitter);
        }
    }
}

/// On-disk shape of `config.toml`. Durations are in milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub assistant_id: Option<String>,
    pub beta_header: Option<String>,
    pub transcription_model: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub max_poll_attempts: Option<u32>,
    pub stream_idle_timeout_ms: Option<u64>,
    pub stream_deadline_ms: Option<u64>,
    pub max_tool_rounds: Option<u32>,
    pub thread_retry_delay_ms: Option<u64>,
    pub thread_max_attempts: Option<u32>,
    pub mode: Option<TurnMode>,
    pub stock_tool_name: Option<String>,
    pub instructions: Option<String>,
    pub history_path: Option<PathBuf>,
    pub stock_path: Option<PathBuf>,
    pub retry: Option<RetryFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryFileConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub jitter: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            VoxError::Configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }
}

/// `VOXRUN_CONFIG`, else `~/.voxrun/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    directories::UserDirs::new().map(|dirs| dirs.home_dir().join(".voxrun").join("config.toml"))
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn redact(key: &str) -> String {
    if key.is_empty() {
        "<unset>".to_string()
    } else {
        let skip = key.chars().count().saturating_sub(4);
        format!("***{}", key.chars().skip(skip).collect::<String>())
    }
}
