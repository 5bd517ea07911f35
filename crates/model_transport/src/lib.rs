//! Provider-neutral contract for streaming one model request.
//!
//! This crate defines the conversation message shape, the tagged stream
//! fragments a provider emits, and the blocking transport trait consumed by the
//! session core. Wire payloads, authentication, and retry policy belong to the
//! provider crates.

use std::sync::{atomic::AtomicBool, Arc};

use serde_json::Value;
use thiserror::Error;

/// Identifier for one model request. A turn with tool calls issues several.
pub type RequestId = u64;

/// Shared cancellation flag for an in-flight request.
pub type CancelSignal = Arc<AtomicBool>;

/// Placeholder substituted with the workspace summary in system instructions.
pub const WORKSPACE_CONTEXT_PLACEHOLDER: &str = "{workspace_context}";

/// Error returned while constructing a transport, before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportInitError {
    message: String,
}

impl TransportInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Recoverable failure of one streamed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request was cancelled")]
    Cancelled,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("stream failed: {0}")]
    Stream(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl TransportError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Structured request from the model to invoke a host tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    #[must_use]
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Returns the `file_path` argument when present and a string.
    #[must_use]
    pub fn target_path(&self) -> Option<&str> {
        self.arguments.get("file_path").and_then(Value::as_str)
    }
}

/// Host answer to exactly one [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub is_error: bool,
    pub content: String,
}

impl ToolResult {
    #[must_use]
    pub fn success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            is_error: false,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            is_error: true,
            content: content.into(),
        }
    }
}

/// One entry of the ordered conversation history.
///
/// Assistant messages that requested tools carry those calls so providers can
/// pair each following tool message with the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls,
        }
    }

    #[must_use]
    pub fn tool(result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: result.content.clone(),
            tool_call_id: Some(result.tool_call_id.clone()),
            tool_calls: Vec::new(),
        }
    }
}

/// Why the provider ended a response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    ToolCall,
    MaxTokens,
    Other(String),
}

impl FinishReason {
    /// Maps provider finish-reason spellings, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "COMPLETE" | "STOP" | "END_TURN" => Self::Complete,
            "TOOL_CALL" | "TOOL_CALLS" => Self::ToolCall,
            "MAX_TOKENS" | "LENGTH" => Self::MaxTokens,
            _ => Self::Other(value.to_string()),
        }
    }
}

/// Tagged element of a response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    Text(String),
    ToolCall(ToolCallRequest),
    EndOfTurn { finish_reason: FinishReason },
}

impl StreamFragment {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    #[must_use]
    pub fn end_of_turn() -> Self {
        Self::EndOfTurn {
            finish_reason: FinishReason::Complete,
        }
    }
}

/// Host tool exposed to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Input for one streamed model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub request_id: RequestId,
    pub messages: Vec<Message>,
    pub instructions: String,
    pub workspace_summary: String,
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    /// Returns system instructions with the workspace summary folded in.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        if self.instructions.contains(WORKSPACE_CONTEXT_PLACEHOLDER) {
            return self
                .instructions
                .replace(WORKSPACE_CONTEXT_PLACEHOLDER, &self.workspace_summary);
        }

        if self.workspace_summary.trim().is_empty() {
            return self.instructions.clone();
        }

        format!(
            "{}\n\nWorkspace context:\n{}",
            self.instructions, self.workspace_summary
        )
    }
}

/// Immutable identity of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportProfile {
    pub transport_id: String,
    pub model_id: String,
}

/// Transport interface for streaming one model request.
pub trait ModelTransport: Send + Sync + 'static {
    fn profile(&self) -> TransportProfile;

    /// Streams the response to `request`, calling `emit` once per fragment in
    /// provider order.
    ///
    /// A successful stream ends with exactly one [`StreamFragment::EndOfTurn`].
    /// Implementations poll `cancel` and return [`TransportError::Cancelled`]
    /// once it is set.
    fn stream(
        &self,
        request: ModelRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamFragment),
    ) -> Result<(), TransportError>;
}
