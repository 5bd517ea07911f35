//! Word wrapping that keeps SGR styles intact across line breaks.

use unicode_segmentation::UnicodeSegmentation;

use super::ansi::{next_escape, SgrState, SGR_RESET};
use super::width::{grapheme_width, visible_width};

enum Token<'a> {
    Escape(&'a str),
    Space(&'a str),
    Word(&'a str),
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut idx = 0;
    let mut start = 0;
    let mut in_space = false;

    while idx < line.len() {
        if let Some(len) = next_escape(line, idx) {
            if start < idx {
                tokens.push(text_token(&line[start..idx], in_space));
            }
            tokens.push(Token::Escape(&line[idx..idx + len]));
            idx += len;
            start = idx;
            continue;
        }

        let Some(ch) = line[idx..].chars().next() else {
            break;
        };
        let is_space = ch == ' ';
        if is_space != in_space && start < idx {
            tokens.push(text_token(&line[start..idx], in_space));
            start = idx;
        }
        in_space = is_space;
        idx += ch.len_utf8();
    }

    if start < line.len() {
        tokens.push(text_token(&line[start..], in_space));
    }
    tokens
}

fn text_token(text: &str, is_space: bool) -> Token<'_> {
    if is_space {
        Token::Space(text)
    } else {
        Token::Word(text)
    }
}

struct LineBuilder<'s> {
    width: usize,
    state: &'s mut SgrState,
    lines: Vec<String>,
    current: String,
    current_width: usize,
    pending_space: String,
    pending_escapes: String,
    wrapped: bool,
}

impl<'s> LineBuilder<'s> {
    fn new(width: usize, state: &'s mut SgrState) -> Self {
        let current = state.prefix();
        Self {
            width,
            state,
            lines: Vec::new(),
            current,
            current_width: 0,
            pending_space: String::new(),
            pending_escapes: String::new(),
            wrapped: false,
        }
    }

    /// Escapes directly after a word stick to it; escapes after a space travel
    /// with the next word so a line break does not strand them.
    fn escape(&mut self, sequence: &str) {
        if self.pending_space.is_empty() {
            self.current.push_str(sequence);
            self.state.apply(sequence);
        } else {
            self.pending_escapes.push_str(sequence);
        }
    }

    fn space(&mut self, text: &str) {
        if !self.wrapped || self.current_width > 0 {
            self.pending_space.push_str(text);
        }
    }

    fn word(&mut self, word: &str) {
        let word_width = visible_width(word);
        let space_width = visible_width(&self.pending_space);

        if self.current_width + space_width + word_width <= self.width {
            self.place_pending();
            self.current.push_str(word);
            self.current_width += word_width;
            return;
        }

        if word_width <= self.width {
            self.break_line();
            self.place_pending();
            self.current.push_str(word);
            self.current_width = word_width;
            return;
        }

        if self.current_width + space_width >= self.width {
            self.break_line();
        }
        self.place_pending();
        for grapheme in word.graphemes(true) {
            let cells = grapheme_width(grapheme);
            if self.current_width > 0 && self.current_width + cells > self.width {
                self.break_line();
            }
            self.current.push_str(grapheme);
            self.current_width += cells;
        }
    }

    fn place_pending(&mut self) {
        if !self.wrapped || self.current_width > 0 {
            self.current.push_str(&self.pending_space);
            self.current_width += visible_width(&self.pending_space);
        }
        self.pending_space.clear();
        self.current.push_str(&self.pending_escapes);
        self.state.apply_all(&self.pending_escapes);
        self.pending_escapes.clear();
    }

    fn break_line(&mut self) {
        let mut line = std::mem::take(&mut self.current);
        trim_trailing_spaces(&mut line);
        if !self.state.is_plain() {
            line.push_str(SGR_RESET);
        }
        self.lines.push(line);
        self.current = self.state.prefix();
        self.current_width = 0;
        self.pending_space.clear();
        self.wrapped = true;
    }

    fn finish(mut self) -> Vec<String> {
        self.current.push_str(&self.pending_escapes);
        self.state.apply_all(&self.pending_escapes);
        trim_trailing_spaces(&mut self.current);
        if !self.state.is_plain() {
            self.current.push_str(SGR_RESET);
        }
        self.lines.push(self.current);
        self.lines
    }
}

fn trim_trailing_spaces(line: &mut String) {
    let trimmed = line.trim_end_matches(' ').len();
    line.truncate(trimmed);
}

/// Wraps `text` to `width` cells, breaking at spaces and splitting words that
/// cannot fit on a line of their own.
///
/// Every returned line is self-contained: active styles are closed with a
/// reset at the end of a line and re-opened at the start of the next one.
pub fn wrap_text_with_ansi(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut state = SgrState::default();
    let mut lines = Vec::new();

    for input_line in text.split('\n') {
        let mut builder = LineBuilder::new(width, &mut state);
        for token in tokenize(input_line) {
            match token {
                Token::Escape(sequence) => builder.escape(sequence),
                Token::Space(space) => builder.space(space),
                Token::Word(word) => builder.word(word),
            }
        }
        lines.extend(builder.finish());
    }

    lines
}

/// Cuts `text` to at most `width` cells, ending with `…` when shortened.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    if visible_width(text) <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }

    let mut state = SgrState::default();
    let mut out = String::new();
    let mut used = 0;
    for token in tokenize(text) {
        let piece = match token {
            Token::Escape(sequence) => {
                out.push_str(sequence);
                state.apply(sequence);
                continue;
            }
            Token::Space(piece) | Token::Word(piece) => piece,
        };
        for grapheme in piece.graphemes(true) {
            let cells = grapheme_width(grapheme);
            if used + cells > width - 1 {
                out.push('…');
                if !state.is_plain() {
                    out.push_str(SGR_RESET);
                }
                return out;
            }
            out.push_str(grapheme);
            used += cells;
        }
    }
    out
}
