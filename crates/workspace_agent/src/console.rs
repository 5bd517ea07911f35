//! Prompt input: a line source trait, a cooked stdin reader, and a raw-mode
//! line editor with history recall for interactive terminals.

#[cfg(unix)]
use std::collections::VecDeque;
use std::io::{self, BufRead};

use inkstream::visible_width;
#[cfg(unix)]
use inkstream::{OutputGate, ProcessTerminal, TerminalCmd};
#[cfg(unix)]
use libc::c_int;

/// Entries kept by [`PromptHistory`].
pub const HISTORY_LIMIT: usize = 100;

/// Source of user input lines for the session loop.
pub trait LineSource {
    /// Returns the next line without its terminator, or `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Line-buffered reader over the process stdin.
#[derive(Debug, Default)]
pub struct StdinLines;

impl LineSource for StdinLines {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        read_trimmed_line(&mut io::stdin().lock())
    }
}

fn read_trimmed_line(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    loop {
        match reader.read_line(&mut line) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// The line editor when stdin and stdout are both terminals, plain lines
/// otherwise.
pub fn stdin_source() -> Box<dyn LineSource> {
    #[cfg(unix)]
    {
        let interactive = unsafe {
            libc::isatty(libc::STDIN_FILENO) == 1 && libc::isatty(libc::STDOUT_FILENO) == 1
        };
        if interactive {
            return Box::new(TerminalLines::new());
        }
    }
    Box::new(StdinLines)
}

/// Previously submitted prompts, newest first.
#[derive(Debug, Clone, Default)]
pub struct PromptHistory {
    entries: Vec<String>,
    position: Option<usize>,
    draft: String,
}

impl PromptHistory {
    /// Records a submitted line. Blank lines and repeats of the newest entry
    /// are skipped.
    pub fn push(&mut self, line: &str) {
        self.reset();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.entries.first().is_some_and(|newest| newest == trimmed) {
            return;
        }
        self.entries.insert(0, trimmed.to_string());
        self.entries.truncate(HISTORY_LIMIT);
    }

    /// Steps to the next older entry. `current` is kept as the draft when
    /// leaving the line being typed.
    pub fn older(&mut self, current: &str) -> Option<&str> {
        let next = self.position.map_or(0, |position| position + 1);
        if next >= self.entries.len() {
            return None;
        }
        if self.position.is_none() {
            self.draft = current.to_string();
        }
        self.position = Some(next);
        self.entries.get(next).map(String::as_str)
    }

    /// Steps back toward the present, ending on the saved draft.
    pub fn newer(&mut self) -> Option<&str> {
        match self.position? {
            0 => {
                self.position = None;
                Some(self.draft.as_str())
            }
            position => {
                self.position = Some(position - 1);
                self.entries.get(position - 1).map(String::as_str)
            }
        }
    }

    /// Leaves recall mode.
    pub fn reset(&mut self) {
        self.position = None;
        self.draft.clear();
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    /// Ctrl-U.
    ClearToStart,
    /// Ctrl-C.
    Interrupt,
    /// Ctrl-D.
    EndOfInput,
}

/// Turns raw terminal bytes into keys. Escape sequences and UTF-8
/// characters split across reads are held until complete.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    pending: Vec<u8>,
}

impl KeyDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Key> {
        self.pending.extend_from_slice(bytes);
        let data = std::mem::take(&mut self.pending);
        let mut keys = Vec::new();
        let mut idx = 0;

        while idx < data.len() {
            let control = match data[idx] {
                b'\r' if data.get(idx + 1) == Some(&b'\n') => {
                    keys.push(Key::Enter);
                    idx += 2;
                    continue;
                }
                b'\r' | b'\n' => Some(Key::Enter),
                0x7f | 0x08 => Some(Key::Backspace),
                0x01 => Some(Key::Home),
                0x02 => Some(Key::Left),
                0x03 => Some(Key::Interrupt),
                0x04 => Some(Key::EndOfInput),
                0x05 => Some(Key::End),
                0x06 => Some(Key::Right),
                0x0e => Some(Key::Down),
                0x10 => Some(Key::Up),
                0x15 => Some(Key::ClearToStart),
                0x1b => match escape_sequence(&data[idx..]) {
                    Some((len, key)) => {
                        keys.extend(key);
                        idx += len;
                        continue;
                    }
                    None => {
                        self.pending = data[idx..].to_vec();
                        break;
                    }
                },
                byte if byte < 0x20 => None,
                byte => {
                    let len = utf8_len(byte);
                    if idx + len > data.len() {
                        self.pending = data[idx..].to_vec();
                        break;
                    }
                    if let Some(ch) = std::str::from_utf8(&data[idx..idx + len])
                        .ok()
                        .and_then(|text| text.chars().next())
                    {
                        keys.push(Key::Char(ch));
                    }
                    idx += len;
                    continue;
                }
            };
            keys.extend(control);
            idx += 1;
        }
        keys
    }
}

fn utf8_len(first: u8) -> usize {
    match first {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

/// Length and meaning of the escape sequence at the start of `data`, or
/// `None` while it is still incomplete.
fn escape_sequence(data: &[u8]) -> Option<(usize, Option<Key>)> {
    const MAX_SEQUENCE: usize = 16;
    match data.get(1)? {
        b'[' => {
            let Some(offset) = data[2..].iter().position(|byte| (0x40..=0x7e).contains(byte))
            else {
                if data.len() > MAX_SEQUENCE {
                    return Some((data.len(), None));
                }
                return None;
            };
            let end = offset + 2;
            let params = &data[2..end];
            let key = match data[end] {
                b'A' => Some(Key::Up),
                b'B' => Some(Key::Down),
                b'C' => Some(Key::Right),
                b'D' => Some(Key::Left),
                b'H' => Some(Key::Home),
                b'F' => Some(Key::End),
                b'~' => match params {
                    b"1" | b"7" => Some(Key::Home),
                    b"4" | b"8" => Some(Key::End),
                    b"3" => Some(Key::Delete),
                    _ => None,
                },
                _ => None,
            };
            Some((end + 1, key))
        }
        b'O' => {
            let key = match data.get(2)? {
                b'A' => Some(Key::Up),
                b'B' => Some(Key::Down),
                b'C' => Some(Key::Right),
                b'D' => Some(Key::Left),
                b'H' => Some(Key::Home),
                b'F' => Some(Key::End),
                _ => None,
            };
            Some((3, key))
        }
        _ => Some((1, None)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Continue,
    Submit(String),
    /// Ctrl-C, or Ctrl-D on an empty line.
    Exit,
}

/// Single-line editing state with history recall.
#[derive(Debug, Default)]
pub struct LineEditor {
    chars: Vec<char>,
    cursor: usize,
    history: PromptHistory,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Display column of the cursor, measured from the start of the input.
    pub fn cursor_column(&self) -> usize {
        let before: String = self.chars[..self.cursor].iter().collect();
        visible_width(&before)
    }

    pub fn apply(&mut self, key: Key) -> EditOutcome {
        match key {
            Key::Char(ch) => {
                self.chars.insert(self.cursor, ch);
                self.cursor += 1;
                self.history.reset();
            }
            Key::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.chars.remove(self.cursor);
                self.history.reset();
            }
            Key::Delete if self.cursor < self.chars.len() => {
                self.chars.remove(self.cursor);
                self.history.reset();
            }
            Key::Backspace | Key::Delete => {}
            Key::Left => self.cursor = self.cursor.saturating_sub(1),
            Key::Right => self.cursor = (self.cursor + 1).min(self.chars.len()),
            Key::Home => self.cursor = 0,
            Key::End => self.cursor = self.chars.len(),
            Key::ClearToStart => {
                self.chars.drain(..self.cursor);
                self.cursor = 0;
                self.history.reset();
            }
            Key::Up => {
                let current = self.text();
                if let Some(entry) = self.history.older(&current).map(str::to_string) {
                    self.set_text(&entry);
                }
            }
            Key::Down => {
                if let Some(entry) = self.history.newer().map(str::to_string) {
                    self.set_text(&entry);
                }
            }
            Key::Enter => {
                let line = self.text();
                self.history.push(&line);
                self.chars.clear();
                self.cursor = 0;
                return EditOutcome::Submit(line);
            }
            Key::Interrupt => {
                self.chars.clear();
                self.cursor = 0;
                self.history.reset();
                return EditOutcome::Exit;
            }
            Key::EndOfInput if self.chars.is_empty() => return EditOutcome::Exit,
            Key::EndOfInput => return self.apply(Key::Delete),
        }
        EditOutcome::Continue
    }

    /// Bytes that repaint the input in place, given the cursor column left
    /// by the previous paint.
    pub fn repaint(&self, drawn_column: usize) -> String {
        let mut out = String::new();
        if drawn_column > 0 {
            out.push_str(&format!("\x1b[{drawn_column}D"));
        }
        out.push_str(&self.text());
        out.push_str("\x1b[K");
        let after: String = self.chars[self.cursor..].iter().collect();
        let back = visible_width(&after);
        if back > 0 {
            out.push_str(&format!("\x1b[{back}D"));
        }
        out
    }

    fn set_text(&mut self, text: &str) {
        self.chars = text.chars().collect();
        self.cursor = self.chars.len();
    }
}

#[cfg(unix)]
fn get_termios(fd: c_int) -> io::Result<libc::termios> {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(termios)
}

#[cfg(unix)]
fn set_termios(fd: c_int, termios: &libc::termios) -> io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Non-canonical, no-echo input for the lifetime of the guard. Output
/// processing is left on so `\n` still returns the carriage.
#[cfg(unix)]
struct RawInput {
    fd: c_int,
    original: libc::termios,
}

#[cfg(unix)]
impl RawInput {
    fn enable(fd: c_int) -> io::Result<Self> {
        let original = get_termios(fd)?;
        let mut raw = original;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG | libc::IEXTEN);
        raw.c_iflag &= !(libc::IXON | libc::ICRNL);
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;
        set_termios(fd, &raw)?;
        Ok(Self { fd, original })
    }
}

#[cfg(unix)]
impl Drop for RawInput {
    fn drop(&mut self) {
        if let Err(error) = set_termios(self.fd, &self.original) {
            tracing::warn!(%error, "failed to restore terminal mode");
        }
    }
}

#[cfg(unix)]
fn read_stdin(buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let read = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
        if read >= 0 {
            return Ok(read as usize);
        }
        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

/// Interactive prompt input: raw-mode editing with up/down history recall.
///
/// Raw mode is held only while a line is being read, so Ctrl-C during a turn
/// still arrives as SIGINT.
#[cfg(unix)]
pub struct TerminalLines {
    editor: LineEditor,
    decoder: KeyDecoder,
    queued: VecDeque<Key>,
    terminal: ProcessTerminal,
    gate: OutputGate,
}

#[cfg(unix)]
impl TerminalLines {
    pub fn new() -> Self {
        Self {
            editor: LineEditor::new(),
            decoder: KeyDecoder::default(),
            queued: VecDeque::new(),
            terminal: ProcessTerminal::new(),
            gate: OutputGate::new(),
        }
    }

    fn echo(&mut self, out: String) {
        if out.is_empty() {
            return;
        }
        self.gate.push(TerminalCmd::Bytes(out));
        self.gate.flush(&mut self.terminal);
    }
}

#[cfg(unix)]
impl Default for TerminalLines {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl LineSource for TerminalLines {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let _raw = RawInput::enable(libc::STDIN_FILENO)?;
        let mut buf = [0u8; 256];
        loop {
            while let Some(key) = self.queued.pop_front() {
                let drawn = self.editor.cursor_column();
                match self.editor.apply(key) {
                    EditOutcome::Continue => {
                        let out = self.editor.repaint(drawn);
                        self.echo(out);
                    }
                    EditOutcome::Submit(line) => {
                        self.echo("\r\n".to_string());
                        return Ok(Some(line));
                    }
                    EditOutcome::Exit => return Ok(None),
                }
            }
            let read = read_stdin(&mut buf)?;
            if read == 0 {
                return Ok(None);
            }
            let keys = self.decoder.feed(&buf[..read]);
            self.queued.extend(keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    fn type_text(editor: &mut LineEditor, text: &str) {
        for ch in text.chars() {
            assert_eq!(editor.apply(Key::Char(ch)), EditOutcome::Continue);
        }
    }

    #[test]
    fn strips_line_terminators_and_reports_eof() {
        let mut input = Cursor::new("first\r\nsecond\n");
        assert_eq!(read_trimmed_line(&mut input).expect("read"), Some("first".to_string()));
        assert_eq!(read_trimmed_line(&mut input).expect("read"), Some("second".to_string()));
        assert_eq!(read_trimmed_line(&mut input).expect("read"), None);
    }

    #[test]
    fn history_recalls_newest_first_and_returns_to_the_draft() {
        let mut history = PromptHistory::default();
        history.push("first");
        history.push("second");

        assert_eq!(history.older("half typed"), Some("second"));
        assert_eq!(history.older("second"), Some("first"));
        assert_eq!(history.older("first"), None);
        assert_eq!(history.newer(), Some("second"));
        assert_eq!(history.newer(), Some("half typed"));
        assert_eq!(history.newer(), None);
    }

    #[test]
    fn history_skips_blank_lines_and_repeats_and_is_bounded() {
        let mut history = PromptHistory::default();
        history.push("   ");
        history.push("read README.md");
        history.push("read README.md ");
        assert_eq!(history.entries(), ["read README.md"]);

        for index in 0..HISTORY_LIMIT + 5 {
            history.push(&format!("prompt {index}"));
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(
            history.entries().first().map(String::as_str),
            Some("prompt 104")
        );
    }

    #[test]
    fn up_and_down_recall_submitted_prompts() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "list files");
        assert_eq!(
            editor.apply(Key::Enter),
            EditOutcome::Submit("list files".to_string())
        );
        type_text(&mut editor, "/help");
        editor.apply(Key::Enter);

        type_text(&mut editor, "dra");
        editor.apply(Key::Up);
        assert_eq!(editor.text(), "/help");
        editor.apply(Key::Up);
        assert_eq!(editor.text(), "list files");
        assert_eq!(editor.cursor(), "list files".len());
        editor.apply(Key::Down);
        editor.apply(Key::Down);
        assert_eq!(editor.text(), "dra");
    }

    #[test]
    fn editing_in_the_middle_of_the_line() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "abc");
        editor.apply(Key::Left);
        editor.apply(Key::Left);
        type_text(&mut editor, "X");
        assert_eq!(editor.text(), "aXbc");

        editor.apply(Key::Backspace);
        editor.apply(Key::Delete);
        assert_eq!(editor.text(), "ac");

        editor.apply(Key::End);
        editor.apply(Key::Left);
        editor.apply(Key::ClearToStart);
        assert_eq!(editor.text(), "c");
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn interrupt_and_end_of_input_on_an_empty_line_exit() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.apply(Key::EndOfInput), EditOutcome::Exit);

        type_text(&mut editor, "half");
        assert_eq!(editor.apply(Key::EndOfInput), EditOutcome::Continue);
        assert_eq!(editor.apply(Key::Interrupt), EditOutcome::Exit);
        assert_eq!(editor.text(), "");
    }

    #[test]
    fn repaint_redraws_from_the_input_start_and_parks_the_cursor() {
        let mut editor = LineEditor::new();
        type_text(&mut editor, "h\u{e9}llo");
        let drawn = editor.cursor_column();
        editor.apply(Key::Left);
        editor.apply(Key::Left);
        editor.apply(Key::Left);

        assert_eq!(drawn, 5);
        assert_eq!(editor.repaint(drawn), "\x1b[5Dh\u{e9}llo\x1b[K\x1b[3D");
        assert_eq!(editor.cursor_column(), 2);
    }

    #[test]
    fn decoder_reassembles_split_sequences_and_characters() {
        let mut decoder = KeyDecoder::default();
        assert_eq!(decoder.feed(b"a\x1b["), vec![Key::Char('a')]);
        assert_eq!(decoder.feed(b"A\x1bOB"), vec![Key::Up, Key::Down]);

        let accented = "\u{e9}".as_bytes();
        assert_eq!(decoder.feed(&accented[..1]), Vec::new());
        assert_eq!(decoder.feed(&accented[1..]), vec![Key::Char('\u{e9}')]);

        assert_eq!(
            decoder.feed(b"\x1b[3~\x1b[1;5C\x7f\r\n\x03"),
            vec![
                Key::Delete,
                Key::Right,
                Key::Backspace,
                Key::Enter,
                Key::Interrupt
            ]
        );
    }
}
