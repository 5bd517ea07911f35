//! The agent session state machine.
//!
//! One [`AgentSession`] owns the conversation, the renderer, and the request
//! runner. Input lines are either local commands, handled synchronously, or
//! chat turns, which stream model output and resolve tool calls until the
//! model ends the turn without requesting more.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use inkstream::{StreamRenderer, Terminal};
use model_transport::{
    CancelSignal, FinishReason, Message, ModelRequest, ModelTransport, RequestId,
    StreamFragment, ToolCallRequest, TransportError, TransportProfile,
};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::commands::{parse_input, Command, Input, HELP_TEXT};
use crate::config::{validate_workspace_root, AgentConfig, FatalStartupError, PRODUCT_NAME, VERSION};
use crate::console::LineSource;
use crate::conversation::ConversationState;
use crate::indexer::{WorkspaceIndexer, WorkspaceSummary};
use crate::runtime::RequestRunner;
use crate::tools::{read_file_tool_definition, FileAccessTool};

pub const USER_PROMPT: &str = "You: ";
pub const ASSISTANT_LABEL: &str = "Assistant:";
/// Resubmissions allowed in one turn before the turn is abandoned.
pub const MAX_TOOL_ROUNDS: usize = 8;

const THINKING_STATUS: &str = "Thinking...";
const CANCELLED_NOTICE: &str = "Request cancelled.";
const GOODBYE: &str = "Goodbye!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingModel,
    StreamingResponse,
    AwaitingTool,
    Terminated,
}

/// What one model request produced.
#[derive(Debug, Default)]
struct Round {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
    finish: Option<FinishReason>,
}

pub struct AgentSession<T: Terminal> {
    config: AgentConfig,
    runner: RequestRunner,
    profile: TransportProfile,
    indexer: WorkspaceIndexer,
    files: FileAccessTool,
    conversation: ConversationState,
    renderer: StreamRenderer<T>,
    state: SessionState,
    interrupt: CancelSignal,
    turn_active: Arc<AtomicBool>,
    next_request_id: RequestId,
    last_scan: WorkspaceSummary,
}

impl<T: Terminal> AgentSession<T> {
    /// Validates the workspace root and indexes it before the first turn.
    pub fn new(
        mut config: AgentConfig,
        transport: Arc<dyn ModelTransport>,
        renderer: StreamRenderer<T>,
    ) -> Result<Self, FatalStartupError> {
        config.workspace_root = validate_workspace_root(&config.workspace_root)?;

        let indexer = WorkspaceIndexer::new(config.index_limits.clone());
        let files = FileAccessTool::new(&config.workspace_root, config.read_limits);
        let last_scan = indexer.scan(&config.workspace_root);
        let mut conversation = ConversationState::new();
        conversation.set_workspace_summary(last_scan.text.clone());

        let profile = transport.profile();
        info!(
            transport = %profile.transport_id,
            model = %profile.model_id,
            root = %config.workspace_root.display(),
            files = last_scan.file_count,
            "session started"
        );

        Ok(Self {
            config,
            runner: RequestRunner::new(transport),
            profile,
            indexer,
            files,
            conversation,
            renderer,
            state: SessionState::Idle,
            interrupt: Arc::new(AtomicBool::new(false)),
            turn_active: Arc::new(AtomicBool::new(false)),
            next_request_id: 1,
            last_scan,
        })
    }

    /// Shares `interrupt` with whoever raises user cancellation.
    pub fn with_interrupt(mut self, interrupt: CancelSignal) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt_handle(&self) -> CancelSignal {
        Arc::clone(&self.interrupt)
    }

    /// Set while a chat turn is in flight; cleared at the prompt.
    pub fn turn_active_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.turn_active)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn renderer(&self) -> &StreamRenderer<T> {
        &self.renderer
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn print_header(&mut self) {
        let header = format!(
            "{PRODUCT_NAME} v{VERSION}\nModel: {} ({})\nWorkspace: {} ({} files indexed)\nType 'help' for available commands\n",
            self.profile.model_id,
            self.profile.transport_id,
            self.config.workspace_root.display(),
            self.last_scan.file_count,
        );
        self.renderer.write_line(&header);
        if let Some(warning) = self.last_scan.warning.clone() {
            self.renderer.write_line(&warning);
        }
    }

    /// Reads and handles lines until `exit` or end of input.
    pub fn run(&mut self, input: &mut dyn LineSource) -> io::Result<()> {
        self.print_header();
        while self.state != SessionState::Terminated {
            self.renderer.write(USER_PROMPT);
            match input.read_line()? {
                Some(line) => {
                    self.handle_input(&line);
                }
                None => {
                    self.renderer.write_line("");
                    self.terminate();
                }
            }
        }
        Ok(())
    }

    /// Handles one line of input and returns the resulting state.
    pub fn handle_input(&mut self, line: &str) -> SessionState {
        if self.state == SessionState::Terminated {
            return self.state;
        }

        match parse_input(line) {
            Input::Empty => {}
            Input::Command(command) => self.run_command(command),
            Input::Chat(text) => self.run_turn(text),
        }
        self.state
    }

    fn run_command(&mut self, command: Command) {
        debug!(command = command.name(), "local command");
        match command {
            Command::Exit => self.terminate(),
            Command::Help => self.renderer.write_line(HELP_TEXT),
            Command::Clear => {
                self.renderer.clear_screen();
                self.print_header();
            }
            Command::Rescan => self.rescan(),
        }
    }

    fn rescan(&mut self) {
        let scan = self.indexer.scan(&self.config.workspace_root);
        self.conversation.set_workspace_summary(scan.text.clone());
        match scan.warning.as_deref() {
            Some(warning) => self.renderer.write_line(warning),
            None => self
                .renderer
                .write_line(&format!("Workspace rescanned ({} files)", scan.file_count)),
        }
        info!(files = scan.file_count, truncated = scan.truncated, "workspace rescanned");
        self.last_scan = scan;
    }

    fn terminate(&mut self) {
        self.renderer.write_line(GOODBYE);
        self.state = SessionState::Terminated;
    }

    fn run_turn(&mut self, text: String) {
        self.interrupt.store(false, Ordering::Release);
        self.turn_active.store(true, Ordering::Release);

        self.conversation.begin_turn();
        self.conversation.append(Message::user(text));
        self.state = SessionState::AwaitingModel;

        self.renderer.write_line(&assistant_label());
        self.renderer.set_status(Some(THINKING_STATUS.to_string()));

        let outcome = self.drive_turn();

        self.turn_active.store(false, Ordering::Release);
        self.interrupt.store(false, Ordering::Release);

        match outcome {
            Ok(()) => {
                self.conversation.commit_turn();
                info!(messages = self.conversation.len(), "turn completed");
            }
            Err(error) => {
                self.renderer.abort_turn();
                self.conversation.discard_turn();
                if error.is_cancelled() {
                    info!("turn cancelled");
                    self.renderer.write_line(CANCELLED_NOTICE);
                } else {
                    warn!(%error, "turn failed");
                    self.renderer.write_line(&format!("Error: {error}"));
                }
            }
        }
        self.state = SessionState::Idle;
    }

    /// Request, stream, and resolve tool calls until a round ends without any.
    fn drive_turn(&mut self) -> Result<(), TransportError> {
        let mut streaming = false;
        let mut status_shown = true;

        for round_index in 0..=MAX_TOOL_ROUNDS {
            let request = self.build_request();
            let request_id = request.request_id;
            debug!(request_id, messages = request.messages.len(), "submitting model request");

            let mut round = Round::default();
            {
                let renderer = &mut self.renderer;
                let state = &mut self.state;
                self.runner
                    .run(request, &self.interrupt, &mut |batch| {
                        if !streaming {
                            streaming = true;
                            renderer.begin_turn();
                        }
                        let mut chunk = String::new();
                        for fragment in batch {
                            if round.finish.is_some() {
                                debug!(request_id, "ignoring fragment after end of turn");
                                continue;
                            }
                            *state = SessionState::StreamingResponse;
                            match fragment {
                                StreamFragment::Text(text) => {
                                    if text.is_empty() {
                                        continue;
                                    }
                                    if round.text.is_empty() && !renderer.buffer().is_empty() {
                                        chunk.push_str("\n\n");
                                    }
                                    chunk.push_str(&text);
                                    round.text.push_str(&text);
                                }
                                StreamFragment::ToolCall(call) => {
                                    debug!(request_id, tool_call_id = %call.id, tool = %call.tool_name, "tool call buffered");
                                    round.tool_calls.push(call);
                                }
                                StreamFragment::EndOfTurn { finish_reason } => {
                                    round.finish = Some(finish_reason);
                                }
                            }
                        }
                        if chunk.is_empty() {
                            return;
                        }
                        if status_shown {
                            status_shown = false;
                            renderer.set_status(None);
                        }
                        // One repaint per batch.
                        renderer.append(&chunk);
                    })?;
            }

            let Some(finish_reason) = round.finish else {
                return Err(TransportError::Protocol(
                    "stream ended without an end-of-turn marker".to_string(),
                ));
            };

            if round.tool_calls.is_empty() {
                debug!(request_id, ?finish_reason, "model finished turn");
                self.renderer.end_turn();
                self.conversation.append(Message::assistant(round.text));
                return Ok(());
            }

            if round_index == MAX_TOOL_ROUNDS {
                return Err(TransportError::Protocol(format!(
                    "model requested tools in more than {MAX_TOOL_ROUNDS} consecutive rounds"
                )));
            }

            self.resolve_tool_calls(round.text, round.tool_calls)?;
            self.renderer.set_status(Some(THINKING_STATUS.to_string()));
            status_shown = true;
            self.state = SessionState::AwaitingModel;
        }

        Err(TransportError::Protocol("tool round limit reached".to_string()))
    }

    /// Answers every pending call, in request order, before the next request.
    fn resolve_tool_calls(
        &mut self,
        text: String,
        calls: Vec<ToolCallRequest>,
    ) -> Result<(), TransportError> {
        self.state = SessionState::AwaitingTool;
        self.conversation
            .append(Message::assistant_with_tool_calls(text, calls.clone()));

        for call in &calls {
            if self.interrupt.load(Ordering::Acquire) {
                return Err(TransportError::Cancelled);
            }
            let target = call.target_path().unwrap_or("file");
            self.renderer.set_status(Some(format!("Reading {target}...")));
            let result = self.files.execute(call);
            info!(
                tool_call_id = %result.tool_call_id,
                is_error = result.is_error,
                "tool call resolved"
            );
            self.conversation.append(Message::tool(&result));
        }
        Ok(())
    }

    fn build_request(&mut self) -> ModelRequest {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        ModelRequest {
            request_id,
            messages: self.conversation.history().to_vec(),
            instructions: self.config.system_instructions.clone(),
            workspace_summary: self.conversation.workspace_summary().to_string(),
            tools: vec![read_file_tool_definition()],
        }
    }
}

fn assistant_label() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    match now.format(format_description!("[hour]:[minute]:[second]")) {
        Ok(stamp) => format!("{stamp} {ASSISTANT_LABEL}"),
        Err(_) => ASSISTANT_LABEL.to_string(),
    }
}
