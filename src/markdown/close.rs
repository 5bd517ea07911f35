//! Closing markdown constructs left open by a stream cut mid-token.

use std::borrow::Cow;
use std::ops::Range;

/// Tracks whether a fenced code block is open, one line at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FenceState {
    open: Option<(char, usize)>,
}

impl FenceState {
    /// Feeds one line without its terminator. Returns true if it closed a fence.
    pub(crate) fn feed(&mut self, content: &str) -> bool {
        let trimmed = content.trim_start_matches(' ');
        let indent = content.len() - trimmed.len();

        let fence = trimmed
            .chars()
            .next()
            .filter(|ch| matches!(ch, '`' | '~') && indent <= 3)
            .map(|ch| (ch, trimmed.chars().take_while(|c| *c == ch).count()))
            .filter(|(_, run)| *run >= 3);

        match (self.open, fence) {
            (None, Some((ch, run))) => {
                let info = &trimmed[run..];
                if ch == '~' || !info.contains('`') {
                    self.open = Some((ch, run));
                }
                false
            }
            (Some((open_ch, open_run)), Some((ch, run)))
                if ch == open_ch && run >= open_run && trimmed[run..].trim().is_empty() =>
            {
                self.open = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn marker(&self) -> Option<String> {
        self.open.map(|(ch, run)| ch.to_string().repeat(run))
    }
}

struct FenceScan {
    open_marker: Option<String>,
    inline_start: usize,
}

/// Scans fenced code blocks. Also reports where the last paragraph outside
/// any fence starts, since inline markers never span a blank line or a fence.
fn scan_fences(text: &str) -> FenceScan {
    let mut fences = FenceState::default();
    let mut inline_start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_end = offset + line.len();
        let content = line.trim_end_matches(['\n', '\r']);
        let was_open = fences.is_open();
        if fences.feed(content) || (!was_open && !fences.is_open() && content.trim().is_empty()) {
            inline_start = line_end;
        }
        offset = line_end;
    }

    FenceScan {
        open_marker: fences.marker(),
        inline_start,
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct InlineScan {
    closers: String,
    dangling: Option<Range<usize>>,
}

fn run_length(chars: &[(usize, char)], start: usize, ch: char) -> usize {
    chars[start..].iter().take_while(|(_, c)| *c == ch).count()
}

fn rest_is_blank(chars: &[(usize, char)], from: usize) -> bool {
    chars[from..].iter().all(|(_, c)| c.is_whitespace())
}

fn scan_inline(tail: &str) -> InlineScan {
    let chars: Vec<(usize, char)> = tail.char_indices().collect();
    let byte_at = |idx: usize| chars.get(idx).map_or(tail.len(), |(byte, _)| *byte);
    let mut stack: Vec<&'static str> = Vec::new();
    let mut scan = InlineScan::default();
    let mut code_closer = None;
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx].1;
        match ch {
            '\\' => idx += 2,
            '`' => {
                let run = run_length(&chars, idx, '`');
                let after = idx + run;
                let mut cursor = after;
                let mut matched = None;
                while cursor < chars.len() {
                    if chars[cursor].1 == '`' {
                        let close = run_length(&chars, cursor, '`');
                        if close == run {
                            matched = Some(cursor + close);
                            break;
                        }
                        cursor += close;
                    } else {
                        cursor += 1;
                    }
                }
                match matched {
                    Some(next) => idx = next,
                    None => {
                        if rest_is_blank(&chars, after) {
                            scan.dangling = Some(byte_at(idx)..byte_at(after));
                        } else {
                            code_closer = Some("`".repeat(run));
                        }
                        break;
                    }
                }
            }
            '*' | '_' | '~' => {
                let run = run_length(&chars, idx, ch);
                let after = idx + run;
                let before = idx.checked_sub(1).map(|prev| chars[prev].1);
                let next = chars.get(after).map(|(_, c)| *c);
                idx = after;

                let intraword = ch == '_'
                    && before.is_some_and(char::is_alphanumeric)
                    && next.is_some_and(char::is_alphanumeric);
                let markers: &[&'static str] = match (ch, run) {
                    ('~', 1) => &["~"],
                    ('~', 2) => &["~~"],
                    ('~', _) => &[],
                    ('*', 1) => &["*"],
                    ('*', 2) => &["**"],
                    ('*', _) if stack.contains(&"*") => &["*", "**"],
                    ('*', _) => &["**", "*"],
                    (_, 1) => &["_"],
                    (_, 2) => &["__"],
                    (_, _) if stack.contains(&"_") => &["_", "__"],
                    (_, _) => &["__", "_"],
                };
                if intraword || markers.is_empty() {
                    continue;
                }

                let can_open = next.is_some_and(|c| !c.is_whitespace());
                let can_close = before.is_some_and(|c| !c.is_whitespace());
                let mut used = false;
                for marker in markers {
                    if can_close {
                        if let Some(position) = stack.iter().rposition(|open| open == marker) {
                            stack.truncate(position);
                            used = true;
                            continue;
                        }
                    }
                    if can_open {
                        stack.push(*marker);
                        used = true;
                    }
                }
                if !used && rest_is_blank(&chars, after) {
                    scan.dangling = Some(byte_at(after - run)..byte_at(after));
                }
            }
            _ => idx += 1,
        }
    }

    if let Some(closer) = code_closer {
        scan.closers.push_str(&closer);
    }
    for marker in stack.iter().rev() {
        scan.closers.push_str(marker);
    }
    scan
}

/// Returns `text` with unterminated fences, code spans, and emphasis markers
/// closed, and a trailing marker with no content after it removed.
///
/// Applied to every partial buffer before rendering so a response cut
/// mid-construct never leaves styling bleeding into the rest of the output.
pub fn close_open_constructs(text: &str) -> Cow<'_, str> {
    let fences = scan_fences(text);
    if let Some(marker) = fences.open_marker {
        let mut closed = String::with_capacity(text.len() + marker.len() + 1);
        closed.push_str(text);
        if !closed.ends_with('\n') {
            closed.push('\n');
        }
        closed.push_str(&marker);
        return Cow::Owned(closed);
    }

    let tail_start = fences.inline_start;
    let scan = scan_inline(&text[tail_start..]);
    if scan.closers.is_empty() && scan.dangling.is_none() {
        return Cow::Borrowed(text);
    }

    let mut closed = text.to_string();
    if let Some(range) = scan.dangling {
        closed.replace_range(tail_start + range.start..tail_start + range.end, "");
    }
    let insert_at = closed.trim_end().len();
    closed.insert_str(insert_at, &scan.closers);
    Cow::Owned(closed)
}
