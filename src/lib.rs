//! Streaming markdown rendering for terminal chat sessions.
//!
//! Invariant: single output gate. Only `core::output::OutputGate::flush(..)`
//! writes to the terminal.
//!
//! # Public API Overview
//! - [`MarkdownRenderer`] turns a markdown document into width-bounded styled lines.
//! - [`close_open_constructs`] repairs a buffer cut mid-construct so it renders cleanly.
//! - [`RenderState`] is the pure incremental render step; [`StreamRenderer`] drives it
//!   against a [`Terminal`], repainting in place.
//! - Text helpers measure, wrap, and truncate ANSI-styled strings.

pub mod config;
pub mod core;
pub mod error;
pub mod markdown;
pub mod platform;
pub mod render;
pub mod text;

pub use crate::config::RenderConfig;
pub use crate::core::output::{OutputGate, TerminalCmd};
pub use crate::core::terminal::Terminal;
pub use crate::error::RenderError;
pub use crate::markdown::{
    close_open_constructs, highlight_code, prewarm_highlighting, MarkdownRenderer, MarkdownTheme,
};
pub use crate::platform::ProcessTerminal;
pub use crate::render::{diff_frames, BlockRender, RenderState, StreamRenderer};
pub use crate::text::{
    sanitize_line, strip_ansi, truncate_to_width, visible_width, wrap_text_with_ansi,
};
