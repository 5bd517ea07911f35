//! Startup configuration.
//!
//! Everything the session needs from the outside world is resolved here once,
//! in `main`, and handed to [`AgentSession::new`](crate::session::AgentSession::new).
//! Core logic never reads the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::indexer::IndexLimits;
use crate::tools::ReadLimits;

pub const PRODUCT_NAME: &str = "Workspace Agent";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a helpful AI assistant running in the terminal.
You have access to the user's current workspace: {workspace_context}
You can read files from this directory when answering questions using the read_file tool.
Always provide context-aware responses considering the current workspace. Be concise but informative.";

const DEFAULT_LOG_FILTER: &str = "info";

/// Failures that stop the process before the first prompt.
#[derive(Debug, Error)]
pub enum FatalStartupError {
    #[error("missing credential: set {0} or choose --provider mock")]
    MissingCredential(&'static str),
    #[error("workspace root {path} is not accessible: {reason}")]
    WorkspaceRoot { path: PathBuf, reason: String },
    #[error("failed to initialize {transport} transport: {message}")]
    Transport { transport: String, message: String },
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Cohere,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cohere => "cohere",
            Self::Mock => "mock",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "workspace-agent", version)]
#[command(about = "Chat with a model about the files in your workspace", long_about = None)]
pub struct Cli {
    /// Directory the agent may read from. Defaults to the launch directory.
    #[arg(long, env = "WORKSPACE_AGENT_ROOT")]
    pub workspace: Option<PathBuf>,

    #[arg(long, value_enum, env = "WORKSPACE_AGENT_PROVIDER", default_value = "cohere")]
    pub provider: ProviderKind,

    /// Model identifier passed to the provider.
    #[arg(long, env = "WORKSPACE_AGENT_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "WORKSPACE_AGENT_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "COHERE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// System instructions; `{workspace_context}` is replaced by the summary.
    #[arg(long, env = "WORKSPACE_AGENT_SYSTEM_INSTRUCTIONS")]
    pub system_instructions: Option<String>,

    #[arg(long, env = "WORKSPACE_AGENT_TIMEOUT_SEC")]
    pub timeout_sec: Option<u64>,

    #[arg(long, env = "WORKSPACE_AGENT_LOG")]
    pub log: Option<String>,

    #[arg(long, env = "WORKSPACE_AGENT_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// Resolved settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub workspace_root: PathBuf,
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub system_instructions: String,
    pub request_timeout: Option<Duration>,
    pub index_limits: IndexLimits,
    pub read_limits: ReadLimits,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
}

impl AgentConfig {
    /// Config for `workspace_root` with the mock provider and default limits.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            provider: ProviderKind::Mock,
            model: None,
            base_url: None,
            api_key: None,
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            request_timeout: None,
            index_limits: IndexLimits::default(),
            read_limits: ReadLimits::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }

    /// Resolves CLI flags against the launch directory.
    ///
    /// `rust_log` is the fallback log filter when `--log` is absent.
    pub fn from_cli(
        cli: Cli,
        launch_dir: &Path,
        rust_log: Option<String>,
    ) -> Result<Self, FatalStartupError> {
        let root = match cli.workspace {
            Some(path) if path.is_absolute() => path,
            Some(path) => launch_dir.join(path),
            None => launch_dir.to_path_buf(),
        };
        let workspace_root = validate_workspace_root(&root)?;

        let api_key = cli.api_key.filter(|key| !key.trim().is_empty());
        if cli.provider == ProviderKind::Cohere && api_key.is_none() {
            return Err(FatalStartupError::MissingCredential("COHERE_API_KEY"));
        }

        let system_instructions = cli
            .system_instructions
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTIONS.to_string());
        let log_filter = cli
            .log
            .or(rust_log)
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            workspace_root,
            provider: cli.provider,
            model: cli.model.filter(|model| !model.trim().is_empty()),
            base_url: cli.base_url.filter(|url| !url.trim().is_empty()),
            api_key,
            system_instructions,
            request_timeout: cli.timeout_sec.filter(|secs| *secs > 0).map(Duration::from_secs),
            index_limits: IndexLimits::default(),
            read_limits: ReadLimits::default(),
            log_filter,
            log_file: cli.log_file,
        })
    }
}

/// Canonicalizes `root` and checks it is a readable directory.
pub fn validate_workspace_root(root: &Path) -> Result<PathBuf, FatalStartupError> {
    let fatal = |reason: String| FatalStartupError::WorkspaceRoot {
        path: root.to_path_buf(),
        reason,
    };
    let canonical = root.canonicalize().map_err(|error| fatal(error.to_string()))?;
    if !canonical.is_dir() {
        return Err(fatal("not a directory".to_string()));
    }
    std::fs::read_dir(&canonical).map_err(|error| fatal(error.to_string()))?;
    Ok(canonical)
}
