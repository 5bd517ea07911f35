//! Interactive terminal agent with read-only access to one workspace.
//!
//! ## Session core
//!
//! [`session::AgentSession`] drives the loop: local commands (`exit`, `help`,
//! `clear`, `rescan`) run synchronously, everything else becomes a chat turn.
//! A turn streams model output through [`inkstream::StreamRenderer`] and
//! answers `read_file` tool calls with [`tools::FileAccessTool`], resubmitting
//! the full history after each round until the model ends the turn.
//!
//! Cancelled or failed turns leave the conversation exactly as it was before
//! the turn began.
//!
//! At an interactive terminal, prompts are read by [`console::stdin_source`]
//! through a small line editor with up/down history recall.
//!
//! ## Configuration
//!
//! [`config::AgentConfig`] is built once in `main` from CLI flags with env
//! fallbacks and passed to the session. Nothing below `main` reads the
//! environment.
//!
//! - `COHERE_API_KEY` is required when `WORKSPACE_AGENT_PROVIDER=cohere` (the default).
//! - `WORKSPACE_AGENT_PROVIDER=mock` runs offline against a scripted demo transport.
//! - `WORKSPACE_AGENT_LOG_FILE` enables tracing output, filtered by
//!   `WORKSPACE_AGENT_LOG` or `RUST_LOG`.

pub mod commands;
pub mod config;
pub mod console;
pub mod conversation;
pub mod indexer;
pub mod logging;
pub mod provider;
pub mod runtime;
pub mod session;
pub mod tools;

pub use config::{AgentConfig, Cli, FatalStartupError, ProviderKind};
pub use conversation::ConversationState;
pub use indexer::{IndexLimits, WorkspaceIndexer, WorkspaceSummary};
pub use session::{AgentSession, SessionState};
pub use tools::{FileAccessTool, ReadLimits, ToolError};
