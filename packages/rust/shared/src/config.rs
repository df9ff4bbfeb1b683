//! Application configuration for PageChat.
//!
//! User config lives at `~/.pagechat/pagechat.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PageChatError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pagechat.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pagechat";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "pagechat.db";

// ---------------------------------------------------------------------------
// Config structs (matching pagechat.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend location and request resilience.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Indexing and readiness polling.
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Incremental rendering timings.
    #[serde(default)]
    pub render: RenderConfig,

    /// Conversation persistence.
    #[serde(default)]
    pub session: SessionConfig,
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the RAG backend (health check lives at its root).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path prefix for the API routes.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Hard per-attempt timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Additional attempts after the first failure.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Linear backoff unit in ms (attempt `n` waits `n * backoff_ms`).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}
fn default_api_prefix() -> String {
    "/api/v1".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    1000
}

/// `[indexing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Page budget sent with `/index`.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Give up polling `/analyze` after this many seconds.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Pause between `/analyze` polls in ms.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_wait_secs: default_max_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_max_pages() -> u32 {
    10
}
fn default_max_wait_secs() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    2000
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Delay between revealed tokens in ms.
    #[serde(default = "default_token_interval_ms")]
    pub token_interval_ms: u64,

    /// Delay before metadata fades in, in ms.
    #[serde(default = "default_fade_delay_ms")]
    pub fade_delay_ms: u64,

    /// Delay before the suggestion row appears, in ms.
    #[serde(default = "default_suggestion_delay_ms")]
    pub suggestion_delay_ms: u64,

    /// Render markdown for the terminal instead of showing it verbatim.
    #[serde(default = "default_true")]
    pub markdown: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            token_interval_ms: default_token_interval_ms(),
            fade_delay_ms: default_fade_delay_ms(),
            suggestion_delay_ms: default_suggestion_delay_ms(),
            markdown: true,
        }
    }
}

fn default_token_interval_ms() -> u64 {
    35
}
fn default_fade_delay_ms() -> u64 {
    200
}
fn default_suggestion_delay_ms() -> u64 {
    400
}
fn default_true() -> bool {
    true
}

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Keep at most this many question/answer turns; 0 keeps everything.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Database path; defaults to `~/.pagechat/pagechat.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            db_path: None,
        }
    }
}

fn default_max_turns() -> usize {
    50
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig, overridable by callers)
// ---------------------------------------------------------------------------

/// Runtime settings for the resilient request client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub timeout: Duration,
    pub retries: u32,
    pub backoff_unit: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ClientConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.backend.base_url.clone(),
            api_prefix: config.backend.api_prefix.clone(),
            timeout: Duration::from_secs(config.backend.timeout_secs),
            retries: config.backend.retries,
            backoff_unit: Duration::from_millis(config.backend.backoff_ms),
        }
    }
}

/// Runtime settings for the readiness poller.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_wait: Duration,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PollConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_wait: Duration::from_secs(config.indexing.max_wait_secs),
            interval: Duration::from_millis(config.indexing.poll_interval_ms),
        }
    }
}

/// Runtime settings for the incremental renderer.
#[derive(Debug, Clone)]
pub struct RenderTimings {
    pub token_interval: Duration,
    pub fade_delay: Duration,
    pub suggestion_delay: Duration,
}

impl Default for RenderTimings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RenderTimings {
    fn from(config: &AppConfig) -> Self {
        Self {
            token_interval: Duration::from_millis(config.render.token_interval_ms),
            fade_delay: Duration::from_millis(config.render.fade_delay_ms),
            suggestion_delay: Duration::from_millis(config.render.suggestion_delay_ms),
        }
    }
}

impl RenderTimings {
    /// No delays at all; used by non-interactive output.
    pub fn instant() -> Self {
        Self {
            token_interval: Duration::ZERO,
            fade_delay: Duration::ZERO,
            suggestion_delay: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pagechat/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PageChatError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pagechat/pagechat.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the session database path, honoring `[session] db_path`.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.session.db_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(DB_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PageChatError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PageChatError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PageChatError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PageChatError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PageChatError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values that would make the workflow unusable.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let base = &config.backend.base_url;
    match url::Url::parse(base) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(PageChatError::config(format!(
                "backend.base_url must be an http(s) URL, got '{base}'"
            )));
        }
    }
    if config.backend.timeout_secs == 0 {
        return Err(PageChatError::config("backend.timeout_secs must be at least 1"));
    }
    if config.indexing.poll_interval_ms == 0 {
        return Err(PageChatError::config(
            "indexing.poll_interval_ms must be at least 1",
        ));
    }
    Ok(())
}
