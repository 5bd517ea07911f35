//! Environment configuration for the renderer.

use std::env;
use std::path::PathBuf;

use crate::markdown::{MarkdownRenderer, MarkdownTheme};
use crate::platform::ProcessTerminal;
use crate::render::StreamRenderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// SGR styling. Off when `NO_COLOR` is set to anything non-empty.
    pub color: bool,
    /// Syntax highlighting of fenced code. `INKSTREAM_HIGHLIGHT=0` turns it off.
    pub highlight: bool,
    /// `INKSTREAM_SYNC_OUTPUT=0` disables synchronized-update markers.
    pub synchronized_output: bool,
    /// `INKSTREAM_WRITE_LOG` mirrors every terminal write into this file.
    pub write_log: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            color: true,
            highlight: true,
            synchronized_output: true,
            write_log: None,
        }
    }
}

impl RenderConfig {
    pub fn from_env() -> Self {
        let color = env_string_opt("NO_COLOR").is_none();
        Self {
            color,
            highlight: color && !env_flag_off("INKSTREAM_HIGHLIGHT"),
            synchronized_output: !env_flag_off("INKSTREAM_SYNC_OUTPUT"),
            write_log: env_string_opt("INKSTREAM_WRITE_LOG").map(PathBuf::from),
        }
    }

    pub fn markdown_renderer(&self) -> MarkdownRenderer {
        let theme = if self.color {
            MarkdownTheme::ansi()
        } else {
            MarkdownTheme::plain()
        };
        MarkdownRenderer::new(theme).with_highlighting(self.color && self.highlight)
    }

    /// Stream renderer over the process's stdout.
    pub fn stream_renderer(&self) -> StreamRenderer<ProcessTerminal> {
        let terminal = ProcessTerminal::new().with_write_log(self.write_log.clone());
        StreamRenderer::new(terminal, self.markdown_renderer())
            .with_synchronized_output(self.synchronized_output)
    }
}

fn env_flag_off(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim(), "0" | "false" | "off"))
        .unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
