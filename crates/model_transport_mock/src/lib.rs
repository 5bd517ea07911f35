//! Deterministic mock implementations of the `model_transport` contract.
//!
//! No network or protocol logic lives here. [`MockTransport`] backs local
//! runs with `--provider mock`; [`ScriptedTransport`] replays per-request
//! scripts for session tests.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use model_transport::{
    CancelSignal, FinishReason, Message, ModelRequest, ModelTransport, Role, StreamFragment,
    ToolCallRequest, TransportError, TransportProfile,
};
use serde_json::{json, Value};
use tracing::debug;

/// Stable transport identifier used for explicit startup selection.
pub const MOCK_TRANSPORT_ID: &str = "mock";

const READ_PREFIX: &str = "read ";
const EXCERPT_LINES: usize = 12;

/// Demo transport that streams a markdown showcase word by word.
///
/// A user message of the form `read <path>` produces a `read_file` tool call,
/// and the follow-up request answers with an excerpt of the returned content.
#[derive(Debug)]
pub struct MockTransport {
    chunks: Vec<String>,
    model_id: String,
    token_delay: Duration,
}

impl MockTransport {
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            model_id: "mock".to_string(),
            token_delay: Duration::from_millis(Self::TOKEN_DELAY_MS),
        }
    }

    #[must_use]
    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }

    const TOKEN_DELAY_MS: u64 = 30;

    fn stream_words(
        &self,
        text: &str,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(StreamFragment),
    ) -> Result<(), TransportError> {
        let mut pending_token = String::new();
        for ch in text.chars() {
            pending_token.push(ch);
            if matches!(ch, ' ' | '\n') {
                self.emit_token(std::mem::take(&mut pending_token), cancel, emit)?;
            }
        }

        if !pending_token.is_empty() {
            self.emit_token(pending_token, cancel, emit)?;
        }

        Ok(())
    }

    fn emit_token(
        &self,
        token: String,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(StreamFragment),
    ) -> Result<(), TransportError> {
        if cancel.load(Ordering::Acquire) {
            return Err(TransportError::Cancelled);
        }
        emit(StreamFragment::Text(token));
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(vec![
            "# Workspace agent (mock transport)\n".to_string(),
            "Responses stream through the **same renderer** used for real models.\n".to_string(),
            "\n".to_string(),
            "## Things to try\n".to_string(),
            "- Type `read README.md` to exercise the `read_file` tool round trip.\n".to_string(),
            "- Type `rescan` after creating files to refresh the workspace summary.\n"
                .to_string(),
            "- Press *Ctrl-C* mid-stream to cancel a turn.\n".to_string(),
            "\n".to_string(),
            "## Rendering\n".to_string(),
            "> Partial markdown is closed while streaming, so open `code` spans and\n"
                .to_string(),
            "> **bold** runs never leak styles into later lines.\n".to_string(),
            "\n".to_string(),
            "```rust\n".to_string(),
            "fn main() {\n".to_string(),
            "    println!(\"streamed and highlighted\");\n".to_string(),
            "}\n".to_string(),
            "```\n".to_string(),
            "\n".to_string(),
            "| Command | Effect |\n".to_string(),
            "| --- | --- |\n".to_string(),
            "| help | list commands |\n".to_string(),
            "| clear | clear the screen |\n".to_string(),
            "| rescan | rebuild the workspace summary |\n".to_string(),
            "| exit | leave the session |\n".to_string(),
        ])
    }
}

impl ModelTransport for MockTransport {
    fn profile(&self) -> TransportProfile {
        TransportProfile {
            transport_id: MOCK_TRANSPORT_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn stream(
        &self,
        request: ModelRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamFragment),
    ) -> Result<(), TransportError> {
        debug!(request_id = request.request_id, "mock transport request");

        match request.messages.last() {
            Some(message) if message.role == Role::Tool => {
                let path = requested_path(&request.messages, message)
                    .unwrap_or_else(|| "the file".to_string());
                let reply = excerpt_reply(&path, &message.content);
                self.stream_words(&reply, &cancel, emit)?;
            }
            Some(message) if message.role == Role::User => {
                let prompt = message.content.trim();
                if let Some(path) = read_request_path(prompt) {
                    self.stream_words(&format!("Reading `{path}`.\n"), &cancel, emit)?;
                    emit(StreamFragment::ToolCall(ToolCallRequest::new(
                        format!("mock-call-{}", request.request_id),
                        "read_file",
                        json!({ "file_path": path }),
                    )));
                    emit(StreamFragment::EndOfTurn {
                        finish_reason: FinishReason::ToolCall,
                    });
                    return Ok(());
                }

                for chunk in &self.chunks {
                    self.stream_words(chunk, &cancel, emit)?;
                }
            }
            _ => {
                return Err(TransportError::Protocol(
                    "request must end with a user or tool message".to_string(),
                ));
            }
        }

        if cancel.load(Ordering::Acquire) {
            return Err(TransportError::Cancelled);
        }
        emit(StreamFragment::end_of_turn());
        Ok(())
    }
}

fn read_request_path(prompt: &str) -> Option<&str> {
    let head = prompt.get(..READ_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(READ_PREFIX) {
        return None;
    }
    let path = prompt[READ_PREFIX.len()..].trim();
    (!path.is_empty()).then_some(path)
}

fn requested_path(messages: &[Message], tool_message: &Message) -> Option<String> {
    let call_id = tool_message.tool_call_id.as_deref()?;
    messages
        .iter()
        .rev()
        .flat_map(|message| message.tool_calls.iter())
        .find(|call| call.id == call_id)
        .and_then(|call| call.target_path().map(ToString::to_string))
}

/// Tool output is a JSON document with a `content` or `error` field; anything
/// else is excerpted as-is.
fn tool_output_text(content: &str) -> String {
    serde_json::from_str::<Value>(content)
        .ok()
        .and_then(|value| {
            value
                .get("content")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| content.to_string())
}

fn excerpt_reply(path: &str, content: &str) -> String {
    let content = tool_output_text(content);
    let excerpt: Vec<&str> = content.lines().take(EXCERPT_LINES).collect();
    format!(
        "Here is the start of `{path}`:\n\n```\n{}\n```\n",
        excerpt.join("\n")
    )
}

/// One scripted action of a [`ScriptedTransport`] response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Text(String),
    ToolCall(ToolCallRequest),
    End(FinishReason),
    /// Returns this error without emitting anything further.
    Fail(TransportError),
    /// Blocks until the request is cancelled.
    WaitForCancel,
    Pause(Duration),
}

impl ScriptStep {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    #[must_use]
    pub fn read_file(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::ToolCall(ToolCallRequest::new(
            id,
            "read_file",
            json!({ "file_path": path.into() }),
        ))
    }

    #[must_use]
    pub fn end() -> Self {
        Self::End(FinishReason::Complete)
    }
}

/// Transport that answers each request with the next queued script and
/// records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_script(&self, script: Vec<ScriptStep>) {
        lock_unpoisoned(&self.scripts).push_back(script);
    }

    /// Returns every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    #[must_use]
    pub fn remaining_scripts(&self) -> usize {
        lock_unpoisoned(&self.scripts).len()
    }

    const CANCEL_POLL_MS: u64 = 2;
}

impl ModelTransport for ScriptedTransport {
    fn profile(&self) -> TransportProfile {
        TransportProfile {
            transport_id: "scripted".to_string(),
            model_id: "scripted-model".to_string(),
        }
    }

    fn stream(
        &self,
        request: ModelRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamFragment),
    ) -> Result<(), TransportError> {
        let request_id = request.request_id;
        lock_unpoisoned(&self.requests).push(request);

        let Some(script) = lock_unpoisoned(&self.scripts).pop_front() else {
            return Err(TransportError::Protocol(format!(
                "no scripted response left for request {request_id}"
            )));
        };

        for step in script {
            if cancel.load(Ordering::Acquire) {
                return Err(TransportError::Cancelled);
            }

            match step {
                ScriptStep::Text(text) => emit(StreamFragment::Text(text)),
                ScriptStep::ToolCall(call) => emit(StreamFragment::ToolCall(call)),
                ScriptStep::End(finish_reason) => {
                    emit(StreamFragment::EndOfTurn { finish_reason })
                }
                ScriptStep::Fail(error) => return Err(error),
                ScriptStep::WaitForCancel => {
                    while !cancel.load(Ordering::Acquire) {
                        thread::sleep(Duration::from_millis(Self::CANCEL_POLL_MS));
                    }
                    return Err(TransportError::Cancelled);
                }
                ScriptStep::Pause(duration) => thread::sleep(duration),
            }
        }

        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
