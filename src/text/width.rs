//! Terminal cell width of graphemes and styled strings.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use super::ansi::strip_ansi;

/// Cells a tab occupies once expanded.
pub const TAB_WIDTH: usize = 4;

/// Width of one grapheme cluster. RGI emoji always take two cells.
pub fn grapheme_width(grapheme: &str) -> usize {
    match grapheme {
        "" => 0,
        "\t" => TAB_WIDTH,
        _ if emojis::get(grapheme).is_some() => 2,
        _ => UnicodeWidthStr::width(grapheme),
    }
}

/// Display width of `input`, ignoring escape sequences.
pub fn visible_width(input: &str) -> usize {
    if input.is_ascii() && !input.contains(['\x1b', '\t']) {
        return input.len();
    }
    strip_ansi(input).graphemes(true).map(grapheme_width).sum()
}
