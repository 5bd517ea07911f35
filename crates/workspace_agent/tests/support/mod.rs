#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use inkstream::{strip_ansi, MarkdownRenderer, StreamRenderer, Terminal};
use model_transport::ModelTransport;
use tempfile::TempDir;
use workspace_agent::console::LineSource;
use workspace_agent::{AgentConfig, AgentSession};

#[derive(Default)]
pub struct TerminalTrace {
    pub writes: Vec<String>,
}

/// Terminal that records every write for inspection after the session runs.
pub struct SharedTerminal {
    state: Arc<Mutex<TerminalTrace>>,
    columns: u16,
    rows: u16,
}

impl SharedTerminal {
    pub fn new(columns: u16, rows: u16) -> (Self, Arc<Mutex<TerminalTrace>>) {
        let state = Arc::new(Mutex::new(TerminalTrace::default()));
        (
            Self {
                state: Arc::clone(&state),
                columns,
                rows,
            },
            state,
        )
    }
}

impl Terminal for SharedTerminal {
    fn write(&mut self, data: &str) {
        lock_unpoisoned(&self.state).writes.push(data.to_string());
    }

    fn columns(&self) -> u16 {
        self.columns
    }

    fn rows(&self) -> u16 {
        self.rows
    }
}

/// Input lines fed to [`AgentSession::run`], then end of input.
pub struct ScriptedLines {
    lines: VecDeque<String>,
}

impl ScriptedLines {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|line| line.to_string()).collect(),
        }
    }
}

impl LineSource for ScriptedLines {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

pub const README: &str = "# Demo\n\nA small project used by the session tests.\n";

/// Workspace holding `main.py` and `README.md`.
pub fn workspace() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "main.py", "print('hello')\n");
    write_file(dir.path(), "README.md", README);
    dir
}

pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, content).expect("write fixture");
}

pub fn session(
    root: &Path,
    transport: Arc<dyn ModelTransport>,
) -> (AgentSession<SharedTerminal>, Arc<Mutex<TerminalTrace>>) {
    let (terminal, trace) = SharedTerminal::new(80, 40);
    let renderer = StreamRenderer::new(terminal, MarkdownRenderer::plain());
    let session =
        AgentSession::new(AgentConfig::new(root), transport, renderer).expect("session starts");
    (session, trace)
}

/// Everything written so far, with escape sequences removed.
pub fn plain_output(trace: &Arc<Mutex<TerminalTrace>>) -> String {
    strip_ansi(&lock_unpoisoned(trace).writes.concat())
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
