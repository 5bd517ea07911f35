//! Pure render state for a streaming turn.

use crate::error::RenderError;
use crate::markdown::{close_open_constructs, FenceState, MarkdownRenderer};
use crate::text::wrap_text_with_ansi;

/// Turns markdown text into lines at a width. [`MarkdownRenderer::render`]
/// in production; tests substitute their own.
pub type BlockRender<'a> = &'a dyn Fn(&str, usize) -> Result<Vec<String>, RenderError>;

/// Leading part of the buffer that no later fragment can change.
///
/// The buffer is split only at the start of a line that follows a blank line
/// outside any fence and cannot continue a list, quote, table or HTML block.
/// Everything before the split is rendered once and reused.
#[derive(Debug, Clone, Default)]
struct Settled {
    /// Bytes of the buffer covered by `lines`.
    len: usize,
    lines: Vec<String>,
    /// Bytes of complete lines already scanned for split points.
    scanned: usize,
    fences: FenceState,
    after_blank: bool,
    split: usize,
    /// Set once the buffer holds something that can reach across blocks,
    /// such as a link reference definition. Every render is full after that.
    disabled: bool,
}

impl Settled {
    fn scan_line(&mut self, offset: usize, line: &str) {
        let content = line.trim_end_matches(['\n', '\r']);
        let outside = !self.fences.is_open();
        if outside {
            if self.after_blank && starts_independent_block(content) {
                self.split = offset;
            }
            if content.contains("]:") || opens_html_block(content) {
                self.disabled = true;
            }
        }
        self.fences.feed(content);
        self.after_blank = outside && !self.fences.is_open() && content.trim().is_empty();
    }

    fn disable(&mut self) {
        self.disabled = true;
        self.len = 0;
        self.lines.clear();
    }
}

fn starts_independent_block(content: &str) -> bool {
    content.chars().next().is_some_and(|ch| {
        !ch.is_whitespace()
            && !ch.is_ascii_digit()
            && !matches!(ch, '-' | '*' | '+' | '>' | '|' | '[' | '<' | '$')
    })
}

fn opens_html_block(content: &str) -> bool {
    let trimmed = content.trim_start_matches(' ');
    content.len() - trimmed.len() <= 3 && trimmed.starts_with('<')
}

/// The accumulated buffer of one turn and the lines it renders to.
///
/// Feeding fragments one at a time always lands on the same lines as
/// rendering their concatenation. Completed blocks are cached, so each
/// fragment only re-renders the open block at the end of the buffer.
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    buffer: String,
    lines: Vec<String>,
    width: usize,
    settled: Settled,
}

impl PartialEq for RenderState {
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer && self.lines == other.lines && self.width == other.width
    }
}

impl Eq for RenderState {}

impl RenderState {
    pub fn new(width: usize) -> Self {
        Self {
            buffer: String::new(),
            lines: Vec::new(),
            width: width.max(1),
            settled: Settled::default(),
        }
    }

    /// Renders `text` in one shot.
    pub fn render(text: &str, width: usize, markdown: &MarkdownRenderer) -> Self {
        let mut state = Self::new(width);
        state.push(text, markdown);
        state
    }

    /// Returns the state after appending `fragment`.
    pub fn advance(&self, fragment: &str, markdown: &MarkdownRenderer) -> Self {
        let mut next = self.clone();
        next.push(fragment, markdown);
        next
    }

    /// Like [`RenderState::advance`] with a custom block renderer.
    pub fn advance_with(&self, fragment: &str, render: BlockRender<'_>) -> Self {
        let mut next = self.clone();
        next.push_with(fragment, render);
        next
    }

    /// Appends `fragment` in place.
    pub fn push(&mut self, fragment: &str, markdown: &MarkdownRenderer) {
        self.push_with(fragment, &|text, width| markdown.render(text, width));
    }

    pub fn push_with(&mut self, fragment: &str, render: BlockRender<'_>) {
        if fragment.is_empty() {
            return;
        }
        self.buffer.push_str(fragment);
        self.settle(render);
        self.lines = self.compose(render);
    }

    /// Returns the same buffer laid out for a new width.
    pub fn resize(&self, width: usize, markdown: &MarkdownRenderer) -> Self {
        if width.max(1) == self.width {
            return self.clone();
        }
        Self::render(&self.buffer, width, markdown)
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes at the front of the buffer whose lines are cached.
    pub fn settled_len(&self) -> usize {
        self.settled.len
    }

    fn settle(&mut self, render: BlockRender<'_>) {
        let settled = &mut self.settled;
        if settled.disabled {
            return;
        }

        let complete = self.buffer.rfind('\n').map_or(0, |newline| newline + 1);
        if complete > settled.scanned {
            let mut offset = settled.scanned;
            for line in self.buffer[settled.scanned..complete].split_inclusive('\n') {
                settled.scan_line(offset, line);
                offset += line.len();
            }
            settled.scanned = complete;
        }
        if settled.disabled {
            settled.disable();
            return;
        }

        if settled.split > settled.len {
            match render(&self.buffer[settled.len..settled.split], self.width) {
                Ok(lines) => {
                    if !lines.is_empty() && !settled.lines.is_empty() {
                        settled.lines.push(String::new());
                    }
                    settled.lines.extend(lines);
                    settled.len = settled.split;
                }
                Err(error) => {
                    tracing::debug!(%error, "block cache disabled for this turn");
                    settled.disable();
                }
            }
        }
    }

    fn compose(&self, render: BlockRender<'_>) -> Vec<String> {
        let settled = &self.settled;
        if settled.disabled || settled.len == 0 || self.buffer[settled.scanned..].contains("]:") {
            return render_lines(&self.buffer, self.width, render);
        }

        let tail = &self.buffer[settled.len..];
        let tail_lines = if tail.trim().is_empty() {
            Vec::new()
        } else {
            match render(&close_open_constructs(tail), self.width) {
                Ok(lines) => lines,
                Err(_) => return render_lines(&self.buffer, self.width, render),
            }
        };

        let mut lines = Vec::with_capacity(settled.lines.len() + tail_lines.len() + 1);
        lines.extend_from_slice(&settled.lines);
        if !lines.is_empty() && !tail_lines.is_empty() {
            lines.push(String::new());
        }
        lines.extend(tail_lines);
        lines
    }
}

fn render_lines(text: &str, width: usize, render: BlockRender<'_>) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let closed = close_open_constructs(text);
    match render(&closed, width) {
        Ok(lines) => lines,
        Err(error) => {
            tracing::warn!(%error, "rendering streamed text without markup");
            wrap_text_with_ansi(text.trim_end(), width)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::{render_lines, RenderState};
    use crate::error::RenderError;
    use crate::markdown::{MarkdownRenderer, MarkdownTheme};
    use crate::text::wrap_text_with_ansi;
    use pretty_assertions::assert_eq;

    const RESPONSE: &str = "# Plan\n\nI will **read** the `README.md` file first, then:\n\n1. summarize it\n2. list *open* items\n\n```python\nprint(\"hello\")\n```\n\n> done";

    const DOCUMENTS: &[&str] = &[
        RESPONSE,
        "Intro paragraph.\n\n- one\n- two\n\n  still two\n\nAfter the list.\n\nLast *words",
        "Before.\n\n```\nfn main() {\n\n    body();\n}\n```\n\nAfter the fence.\n\n~~~\nnever closed\n\nstill code",
        "> quoted\n\nplain\n\n| a | b |\n| - | - |\n| 1 | 2 |\n\nTrailing **bold",
        "See [the docs][docs].\n\nMore text.\n\n[docs]: https://example.com\n\nDone.",
        "<div>\n\nhtml body\n\n</div>\n\nOutside.",
        "Para one.\n\n## Heading\n\nPara with `code\n\nanother",
        "Footnote[^1] here.\n\nNext.\n\n[^1]: The note.\n",
    ];

    fn renderers() -> Vec<MarkdownRenderer> {
        vec![
            MarkdownRenderer::plain(),
            MarkdownRenderer::new(MarkdownTheme::ansi()),
        ]
    }

    fn chunk(text: &str, size: usize) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(size).map(|chunk| chunk.iter().collect()).collect()
    }

    #[test]
    fn incremental_matches_one_shot_for_any_chunking() {
        for markdown in renderers() {
            let expected = RenderState::render(RESPONSE, 32, &markdown);
            for size in [1, 2, 3, 7, 16, RESPONSE.len()] {
                let mut state = RenderState::new(32);
                for fragment in chunk(RESPONSE, size) {
                    state = state.advance(&fragment, &markdown);
                }
                assert_eq!(state, expected, "chunk size {size}");
            }
        }
    }

    #[test]
    fn cached_blocks_match_a_full_render_at_every_step() {
        for markdown in renderers() {
            let render = |text: &str, width: usize| markdown.render(text, width);
            for document in DOCUMENTS {
                for size in [1, 5, 13] {
                    let mut state = RenderState::new(36);
                    for fragment in chunk(document, size) {
                        state.push(&fragment, &markdown);
                        assert_eq!(
                            state.lines(),
                            render_lines(state.buffer(), 36, &render).as_slice(),
                            "buffer {:?}",
                            state.buffer()
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn long_responses_render_each_block_a_bounded_number_of_times() {
        let markdown = MarkdownRenderer::plain();
        let rendered_bytes = Cell::new(0usize);
        let render = |text: &str, width: usize| {
            rendered_bytes.set(rendered_bytes.get() + text.len());
            markdown.render(text, width)
        };

        let mut state = RenderState::new(60);
        for index in 0..300 {
            state.push_with(&format!("Paragraph {index} has **bold** text.\n\n"), &render);
        }

        let total = state.buffer().len();
        assert!(total - state.settled_len() < 64, "live tail is {} bytes", total - state.settled_len());
        assert!(
            rendered_bytes.get() < 4 * total,
            "rendered {} bytes for a {total} byte buffer",
            rendered_bytes.get()
        );
        assert_eq!(state.lines().first().map(String::as_str), Some("Paragraph 0 has bold text."));
        assert_eq!(state.lines().last().map(String::as_str), Some("Paragraph 299 has bold text."));
    }

    #[test]
    fn reference_definitions_switch_to_full_renders() {
        let markdown = MarkdownRenderer::plain();
        let mut state = RenderState::new(40);
        state.push("Read [this][x].\n\nMore.\n\n", &markdown);
        state.push("Tail.\n\n", &markdown);
        assert!(state.settled_len() > 0);

        state.push("[x]: https://example.com\n", &markdown);
        assert_eq!(state.settled_len(), 0);
        let first = state.lines().first().cloned().unwrap_or_default();
        assert!(!first.contains("[x]"), "unresolved reference in {first:?}");
    }

    #[test]
    fn render_errors_fall_back_to_plain_wrapping() {
        let failing = |_: &str, _: usize| -> Result<Vec<String>, RenderError> {
            Err(RenderError::Markdown("unsupported construct".to_string()))
        };
        let text = "Some **bold and a long tail that wraps\n\nnext";

        let state = RenderState::new(16).advance_with(text, &failing);

        assert_eq!(state.buffer(), text);
        assert_eq!(state.lines(), wrap_text_with_ansi(text, 16).as_slice());
        assert!(state.lines().iter().any(|line| line.contains("**bold")));
    }

    #[test]
    fn advance_leaves_previous_state_untouched() {
        let markdown = MarkdownRenderer::plain();
        let first = RenderState::new(20).advance("Hello", &markdown);
        let second = first.advance(" world", &markdown);
        assert_eq!(first.buffer(), "Hello");
        assert_eq!(second.buffer(), "Hello world");
        assert_eq!(second.lines(), ["Hello world"]);
    }

    #[test]
    fn partial_constructs_render_closed() {
        let markdown = MarkdownRenderer::plain();
        let state = RenderState::new(40).advance("Some **bold", &markdown);
        assert_eq!(state.lines(), ["Some bold"]);

        let state = RenderState::new(40).advance("```\nlet x = 1;", &markdown);
        assert_eq!(state.lines(), ["```", "  let x = 1;", "```"]);
    }

    #[test]
    fn whitespace_only_buffer_has_no_lines() {
        let markdown = MarkdownRenderer::plain();
        let state = RenderState::new(40).advance("\n\n", &markdown);
        assert!(state.lines().is_empty());
        assert_eq!(state.buffer(), "\n\n");
    }

    #[test]
    fn resize_rewraps_the_same_buffer() {
        let markdown = MarkdownRenderer::plain();
        let state = RenderState::render("alpha beta gamma", 40, &markdown);
        let narrow = state.resize(10, &markdown);
        assert_eq!(narrow.buffer(), state.buffer());
        assert_eq!(narrow.lines(), ["alpha beta", "gamma"]);
    }
}
