//! Shared types, error model, and configuration for PageChat.
//!
//! This crate is the foundation depended on by all other PageChat crates.
//! It provides:
//! - [`PageChatError`], the unified error type
//! - Domain types ([`Target`], [`Message`], [`AnalysisResult`], [`QueryResult`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, ClientConfig, IndexingConfig, PollConfig, RenderConfig,
    RenderTimings, SessionConfig, config_dir, config_file_path, database_path, init_config,
    load_config, load_config_from, validate_config,
};
pub use error::{PageChatError, Result};
pub use types::{
    AnalysisResult, AnalyzeRequest, Confidence, ConfidenceLevel, EMPTY_ANALYSIS_TYPE,
    IndexRequest, Message, QueryRequest, QueryResult, ResolvedPage, Role, Target,
};
