//! Live redraw of a streaming assistant turn.

use crate::core::output::{OutputGate, TerminalCmd, CLEAR_ALL, SYNC_END, SYNC_START};
use crate::core::terminal::Terminal;
use crate::markdown::MarkdownRenderer;
use crate::render::diff::diff_frames;
use crate::render::state::RenderState;
use crate::text::{sanitize_line, truncate_to_width};

/// Owns the terminal while a session runs and repaints the live region of the
/// current turn after every append.
///
/// The live region is the rendered buffer followed by an optional status
/// line. Everything printed before it is left alone; `end_turn` commits the
/// region so later output starts below it.
pub struct StreamRenderer<T: Terminal> {
    terminal: T,
    markdown: MarkdownRenderer,
    state: RenderState,
    status: Option<String>,
    drawn: Vec<String>,
    gate: OutputGate,
    synchronized: bool,
}

impl<T: Terminal> StreamRenderer<T> {
    pub fn new(terminal: T, markdown: MarkdownRenderer) -> Self {
        let width = usize::from(terminal.columns());
        Self {
            terminal,
            markdown,
            state: RenderState::new(width),
            status: None,
            drawn: Vec::new(),
            gate: OutputGate::new(),
            synchronized: true,
        }
    }

    /// Wraps each repaint in synchronized-update markers when enabled.
    pub fn with_synchronized_output(mut self, enabled: bool) -> Self {
        self.synchronized = enabled;
        self
    }

    /// Starts a fresh buffer. The status line, if any, stays up.
    pub fn begin_turn(&mut self) {
        self.state = RenderState::new(self.width());
        self.redraw();
    }

    pub fn append(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        let width = self.width();
        if width != self.state.width() {
            self.state = self.state.resize(width, &self.markdown);
        }
        self.state.push(fragment, &self.markdown);
        self.redraw();
    }

    /// Shows `status` as a dim line under the buffer, or removes it. Control
    /// characters and escape sequences in `status` are not passed through.
    pub fn set_status(&mut self, status: Option<String>) {
        self.status = status.map(|status| sanitize_line(&status));
        self.redraw();
    }

    /// Draws the final frame without the status line, commits it, and
    /// returns the turn's full text.
    pub fn end_turn(&mut self) -> String {
        self.status = None;
        self.redraw();
        self.commit_live_region();
        let width = self.width();
        std::mem::replace(&mut self.state, RenderState::new(width))
            .buffer()
            .to_string()
    }

    /// Erases the live region and drops the buffer.
    pub fn abort_turn(&mut self) {
        self.status = None;
        let erase = diff_frames(&self.drawn, &[], self.height());
        self.emit(erase);
        self.drawn.clear();
        self.state = RenderState::new(self.width());
    }

    /// Prints `text` below everything drawn so far.
    pub fn write_line(&mut self, text: &str) {
        self.commit_live_region();
        let mut out = text.replace("\r\n", "\n").replace('\n', "\r\n");
        out.push_str("\r\n");
        self.gate.push(TerminalCmd::Bytes(out));
        self.gate.flush(&mut self.terminal);
    }

    /// Prints `text` without a trailing newline, leaving the cursor after it.
    pub fn write(&mut self, text: &str) {
        self.commit_live_region();
        let out = text.replace("\r\n", "\n").replace('\n', "\r\n");
        self.gate.push(TerminalCmd::Bytes(out));
        self.gate.flush(&mut self.terminal);
    }

    /// Clears screen and scrollback. The buffer is kept.
    pub fn clear_screen(&mut self) {
        self.drawn.clear();
        self.gate.push(TerminalCmd::BytesStatic(CLEAR_ALL));
        self.gate.flush(&mut self.terminal);
    }

    pub fn buffer(&self) -> &str {
        self.state.buffer()
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    fn width(&self) -> usize {
        usize::from(self.terminal.columns()).max(1)
    }

    fn height(&self) -> usize {
        usize::from(self.terminal.rows()).max(1)
    }

    fn frame(&self) -> Vec<String> {
        let mut lines = self.state.lines().to_vec();
        if let Some(status) = self.status.as_deref().filter(|status| !status.is_empty()) {
            let status = truncate_to_width(status, self.width());
            lines.push(format!("\x1b[2m{status}\x1b[22m"));
        }
        lines
    }

    fn redraw(&mut self) {
        let next = self.frame();
        let out = diff_frames(&self.drawn, &next, self.height());
        self.emit(out);
        self.drawn = next;
    }

    fn emit(&mut self, out: String) {
        if out.is_empty() {
            return;
        }
        if self.synchronized {
            self.gate.push(TerminalCmd::BytesStatic(SYNC_START));
        }
        self.gate.push(TerminalCmd::HideCursor);
        self.gate.push(TerminalCmd::Bytes(out));
        self.gate.push(TerminalCmd::ShowCursor);
        if self.synchronized {
            self.gate.push(TerminalCmd::BytesStatic(SYNC_END));
        }
        self.gate.flush(&mut self.terminal);
    }

    fn commit_live_region(&mut self) {
        if self.drawn.is_empty() {
            return;
        }
        self.drawn.clear();
        self.gate.push(TerminalCmd::BytesStatic("\r\n"));
        self.gate.flush(&mut self.terminal);
    }
}
