//! ANSI-aware text helpers: escape scanning, display width, and wrapping.
//!
//! Everything here is pure (string in, string out) so the markdown and render
//! layers can share it without touching a terminal.

pub mod ansi;
pub mod width;
pub mod wrap;

pub use ansi::{next_escape, sanitize_line, strip_ansi, SgrState};
pub use width::{grapheme_width, visible_width};
pub use wrap::{truncate_to_width, wrap_text_with_ansi};
