//! Escape sequence scanning and SGR style tracking.

/// Reset every SGR attribute.
pub const SGR_RESET: &str = "\x1b[0m";

/// Returns the byte length of the escape sequence starting at `pos`, if any.
///
/// Recognizes CSI (`ESC [ ... final`) and string sequences (OSC/DCS/APC)
/// terminated by BEL or `ESC \`. A lone or unterminated escape is not a
/// sequence and is treated as text.
pub fn next_escape(input: &str, pos: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if bytes.get(pos) != Some(&0x1b) {
        return None;
    }

    match bytes.get(pos + 1)? {
        b'[' => bytes[pos + 2..]
            .iter()
            .position(|byte| (0x40..=0x7e).contains(byte))
            .map(|offset| offset + 3),
        b']' | b'P' | b'_' => {
            let mut idx = pos + 2;
            while idx < bytes.len() {
                match bytes[idx] {
                    0x07 => return Some(idx + 1 - pos),
                    0x1b if bytes.get(idx + 1) == Some(&b'\\') => return Some(idx + 2 - pos),
                    _ => idx += 1,
                }
            }
            None
        }
        _ => None,
    }
}

/// Removes every recognized escape sequence.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut idx = 0;
    while idx < input.len() {
        if let Some(len) = next_escape(input, idx) {
            idx += len;
            continue;
        }
        let Some(ch) = input[idx..].chars().next() else {
            break;
        };
        out.push(ch);
        idx += ch.len_utf8();
    }
    out
}

/// Flattens untrusted text to one printable line: escape sequences and
/// control characters are dropped, line breaks and tabs become spaces.
pub fn sanitize_line(input: &str) -> String {
    strip_ansi(input)
        .chars()
        .filter_map(|ch| match ch {
            '\n' | '\r' | '\t' => Some(' '),
            ch if ch.is_control() => None,
            ch => Some(ch),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Intensity,
    Italic,
    Underline,
    Blink,
    Inverse,
    Strike,
    Foreground,
    Background,
}

/// Active SGR attributes, so styles can be re-opened after a line break.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SgrState {
    active: Vec<(Slot, String)>,
}

impl SgrState {
    /// Applies one escape sequence. Non-SGR sequences are ignored.
    pub fn apply(&mut self, sequence: &str) {
        let Some(params) = sequence
            .strip_prefix("\x1b[")
            .and_then(|rest| rest.strip_suffix('m'))
        else {
            return;
        };

        if params.is_empty() {
            self.active.clear();
            return;
        }

        let parts: Vec<&str> = params.split(';').collect();
        let mut idx = 0;
        while idx < parts.len() {
            let code = parts[idx].parse::<u16>().unwrap_or(0);
            match code {
                38 | 48 => {
                    let span = match parts.get(idx + 1) {
                        Some(&"5") => 3,
                        Some(&"2") => 5,
                        _ => 1,
                    };
                    let end = (idx + span).min(parts.len());
                    let slot = if code == 38 {
                        Slot::Foreground
                    } else {
                        Slot::Background
                    };
                    self.set(slot, parts[idx..end].join(";"));
                    idx = end;
                    continue;
                }
                0 => self.active.clear(),
                1 | 2 => self.set(Slot::Intensity, code.to_string()),
                3 => self.set(Slot::Italic, code.to_string()),
                4 => self.set(Slot::Underline, code.to_string()),
                5 => self.set(Slot::Blink, code.to_string()),
                7 => self.set(Slot::Inverse, code.to_string()),
                9 => self.set(Slot::Strike, code.to_string()),
                21 | 22 => self.unset(Slot::Intensity),
                23 => self.unset(Slot::Italic),
                24 => self.unset(Slot::Underline),
                25 => self.unset(Slot::Blink),
                27 => self.unset(Slot::Inverse),
                29 => self.unset(Slot::Strike),
                39 => self.unset(Slot::Foreground),
                49 => self.unset(Slot::Background),
                30..=37 | 90..=97 => self.set(Slot::Foreground, code.to_string()),
                40..=47 | 100..=107 => self.set(Slot::Background, code.to_string()),
                _ => {}
            }
            idx += 1;
        }
    }

    /// Applies every escape sequence found in `text`.
    pub fn apply_all(&mut self, text: &str) {
        let mut idx = 0;
        while idx < text.len() {
            if let Some(len) = next_escape(text, idx) {
                self.apply(&text[idx..idx + len]);
                idx += len;
                continue;
            }
            let Some(ch) = text[idx..].chars().next() else {
                break;
            };
            idx += ch.len_utf8();
        }
    }

    pub fn is_plain(&self) -> bool {
        self.active.is_empty()
    }

    /// One SGR sequence re-establishing the current style, or empty.
    pub fn prefix(&self) -> String {
        if self.active.is_empty() {
            return String::new();
        }
        let codes: Vec<&str> = self.active.iter().map(|(_, code)| code.as_str()).collect();
        format!("\x1b[{}m", codes.join(";"))
    }

    fn set(&mut self, slot: Slot, code: String) {
        self.unset(slot);
        self.active.push((slot, code));
    }

    fn unset(&mut self, slot: Slot) {
        self.active.retain(|(existing, _)| *existing != slot);
    }
}

#[cfg(test)]
mod tests {
    use super::{next_escape, sanitize_line, strip_ansi, SgrState};

    #[test]
    fn csi_and_osc_lengths() {
        assert_eq!(next_escape("\x1b[31mred", 0), Some(5));
        assert_eq!(next_escape("\x1b]8;;http://x\x07", 0), Some(14));
        assert_eq!(next_escape("\x1b]0;t\x1b\\", 0), Some(7));
        assert_eq!(next_escape("plain", 0), None);
        assert_eq!(next_escape("\x1b[", 0), None);
    }

    #[test]
    fn strip_removes_styles_and_links() {
        let input = "\x1b[1mbold\x1b[22m \x1b]8;;https://example.com\x07link\x1b]8;;\x07";
        assert_eq!(strip_ansi(input), "bold link");
    }

    #[test]
    fn sanitize_flattens_controls_to_one_line() {
        assert_eq!(sanitize_line("a\x1b[2J\nb\tc"), "a b c");
        assert_eq!(sanitize_line("x\x1b]0;title\x07y\x08\x1bz"), "xyz");
        assert_eq!(sanitize_line("caf\u{e9}\u{9b}"), "caf\u{e9}");
    }

    #[test]
    fn sgr_state_tracks_open_and_close() {
        let mut state = SgrState::default();
        state.apply("\x1b[1;31m");
        assert_eq!(state.prefix(), "\x1b[1;31m");

        state.apply("\x1b[22m");
        assert_eq!(state.prefix(), "\x1b[31m");

        state.apply("\x1b[38;2;1;2;3m");
        assert_eq!(state.prefix(), "\x1b[38;2;1;2;3m");

        state.apply("\x1b[0m");
        assert!(state.is_plain());
    }

    #[test]
    fn cursor_sequences_do_not_change_style() {
        let mut state = SgrState::default();
        state.apply_all("\x1b[2K\x1b[3Ahello");
        assert!(state.is_plain());
    }
}
