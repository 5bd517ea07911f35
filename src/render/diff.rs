//! Frame diffing for redraw-in-place.

use std::fmt::Write as _;

/// Escape sequences that turn the on-screen `prev` frame into `next`.
///
/// The cursor is assumed to sit at the end of the last line of `prev` (or at
/// the start of the frame's first row when `prev` is empty) and is left at
/// the end of the last line of `next`. Lines that already scrolled out of a
/// `height`-row viewport cannot be repainted, so a change there repaints from
/// the first visible row. Identical frames produce an empty string.
pub fn diff_frames(prev: &[String], next: &[String], height: usize) -> String {
    if prev == next {
        return String::new();
    }
    if prev.is_empty() {
        return next.join("\r\n");
    }

    let common = prev
        .iter()
        .zip(next)
        .take_while(|(before, after)| before == after)
        .count();
    let mut out = String::new();

    if common == prev.len() {
        for line in &next[common..] {
            out.push_str("\r\n");
            out.push_str(line);
        }
        return out;
    }

    let first_visible = prev.len().saturating_sub(height.max(1));
    let mut start = common.max(first_visible);
    if !next.is_empty() {
        start = start.min(next.len() - 1);
    }
    let start = start.max(first_visible);

    let up = prev.len() - 1 - start;
    if up > 0 {
        let _ = write!(out, "\x1b[{up}A");
    }
    out.push('\r');

    for (idx, line) in next.iter().enumerate().skip(start) {
        if idx > start {
            out.push_str("\r\n");
        }
        out.push_str("\x1b[2K");
        out.push_str(line);
    }
    if next.len() < prev.len() || next.len() <= start {
        out.push_str("\x1b[J");
    }
    out
}
