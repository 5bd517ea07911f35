//! Markdown to styled terminal lines.

pub mod close;
pub mod highlight;

use std::sync::Mutex;

use markdown::{mdast, to_mdast, ParseOptions};

use crate::error::RenderError;
use crate::text::{visible_width, wrap_text_with_ansi};

pub use close::close_open_constructs;
pub(crate) use close::FenceState;
pub use highlight::{highlight_code, prewarm_highlighting, HighlightCache};

pub type StyleFn = Box<dyn Fn(&str) -> String + Send + Sync>;

pub struct MarkdownTheme {
    pub heading: StyleFn,
    pub link: StyleFn,
    pub link_url: StyleFn,
    pub code: StyleFn,
    pub code_block: StyleFn,
    pub code_block_border: StyleFn,
    pub quote: StyleFn,
    pub quote_border: StyleFn,
    pub hr: StyleFn,
    pub list_bullet: StyleFn,
    pub bold: StyleFn,
    pub italic: StyleFn,
    pub strikethrough: StyleFn,
    pub underline: StyleFn,
}

fn sgr(open: &'static str, close: &'static str) -> StyleFn {
    Box::new(move |text| format!("\x1b[{open}m{text}\x1b[{close}m"))
}

fn identity() -> StyleFn {
    Box::new(str::to_string)
}

impl MarkdownTheme {
    /// Colored theme for terminals that accept SGR sequences. Each style
    /// closes only its own attribute so nesting composes.
    pub fn ansi() -> Self {
        Self {
            heading: sgr("36", "39"),
            link: sgr("34", "39"),
            link_url: sgr("90", "39"),
            code: sgr("33", "39"),
            code_block: sgr("32", "39"),
            code_block_border: sgr("90", "39"),
            quote: sgr("3", "23"),
            quote_border: sgr("90", "39"),
            hr: sgr("90", "39"),
            list_bullet: sgr("36", "39"),
            bold: sgr("1", "22"),
            italic: sgr("3", "23"),
            strikethrough: sgr("9", "29"),
            underline: sgr("4", "24"),
        }
    }

    /// Theme that emits no escape sequences.
    pub fn plain() -> Self {
        Self {
            heading: identity(),
            link: identity(),
            link_url: identity(),
            code: identity(),
            code_block: identity(),
            code_block_border: identity(),
            quote: identity(),
            quote_border: identity(),
            hr: identity(),
            list_bullet: identity(),
            bold: identity(),
            italic: identity(),
            strikethrough: identity(),
            underline: identity(),
        }
    }
}

impl Default for MarkdownTheme {
    fn default() -> Self {
        Self::ansi()
    }
}

const CODE_INDENT: &str = "  ";
const QUOTE_BORDER: &str = "│ ";
const MAX_RULE_WIDTH: usize = 80;

/// Renders a complete markdown document into width-bounded lines.
///
/// Output is a pure function of `(text, width)`. Streaming callers feed it
/// the open tail of a turn after closing any unfinished constructs; the
/// highlighter resumes where the previous call's code block left off.
pub struct MarkdownRenderer {
    theme: MarkdownTheme,
    highlight: bool,
    highlights: Mutex<HighlightCache>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(MarkdownTheme::ansi())
    }
}

impl MarkdownRenderer {
    pub fn new(theme: MarkdownTheme) -> Self {
        Self {
            theme,
            highlight: true,
            highlights: Mutex::new(HighlightCache::default()),
        }
    }

    pub fn plain() -> Self {
        Self::new(MarkdownTheme::plain()).with_highlighting(false)
    }

    pub fn with_highlighting(mut self, enabled: bool) -> Self {
        self.highlight = enabled;
        self
    }

    pub fn render(&self, text: &str, width: usize) -> Result<Vec<String>, RenderError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let normalized = text.replace('\t', "    ");
        let root = to_mdast(&normalized, &ParseOptions::gfm())
            .map_err(|message| RenderError::Markdown(message.to_string()))?;
        let children = match root {
            mdast::Node::Root(root) => root.children,
            other => vec![other],
        };

        Ok(self.render_blocks(&children, width.max(1), true))
    }

    fn render_blocks(&self, nodes: &[mdast::Node], width: usize, separated: bool) -> Vec<String> {
        let mut lines = Vec::new();
        for node in nodes {
            let block = self.render_block(node, width);
            if block.is_empty() {
                continue;
            }
            if separated && !lines.is_empty() {
                lines.push(String::new());
            }
            lines.extend(block);
        }
        lines
    }

    fn render_block(&self, node: &mdast::Node, width: usize) -> Vec<String> {
        match node {
            mdast::Node::Heading(heading) => {
                let prefix = style_prefix(|text| self.heading_style(heading.depth, text));
                let text = self.render_inline(&heading.children, &prefix);
                let text = if heading.depth >= 3 {
                    format!("{} {text}", "#".repeat(usize::from(heading.depth)))
                } else {
                    text
                };
                wrap_text_with_ansi(&self.heading_style(heading.depth, &text), width)
            }
            mdast::Node::Paragraph(paragraph) => {
                wrap_text_with_ansi(&self.render_inline(&paragraph.children, ""), width)
            }
            mdast::Node::Code(code) => self.render_code(&code.value, code.lang.as_deref(), width),
            mdast::Node::Math(math) => self.render_code(&math.value, None, width),
            mdast::Node::List(list) => self.render_list(list, width),
            mdast::Node::Blockquote(quote) => {
                let inner = width.saturating_sub(visible_width(QUOTE_BORDER)).max(1);
                self.render_blocks(&quote.children, inner, true)
                    .into_iter()
                    .map(|line| {
                        let body = if line.is_empty() {
                            line
                        } else {
                            (self.theme.quote)(&line)
                        };
                        format!("{}{body}", (self.theme.quote_border)(QUOTE_BORDER))
                    })
                    .collect()
            }
            mdast::Node::ThematicBreak(_) => {
                vec![(self.theme.hr)(&"─".repeat(width.min(MAX_RULE_WIDTH)))]
            }
            mdast::Node::Table(table) => self.render_table(table, width),
            mdast::Node::Html(html) => wrap_text_with_ansi(html.value.trim_end(), width),
            mdast::Node::FootnoteDefinition(definition) => {
                let mut lines = self.render_blocks(&definition.children, width, false);
                if let Some(first) = lines.first_mut() {
                    *first = format!("[^{}]: {first}", definition.identifier);
                }
                lines
            }
            mdast::Node::Definition(_) => Vec::new(),
            other => wrap_text_with_ansi(&other.to_string(), width),
        }
    }

    fn heading_style(&self, depth: u8, text: &str) -> String {
        match depth {
            1 => (self.theme.heading)(&(self.theme.bold)(&(self.theme.underline)(text))),
            _ => (self.theme.heading)(&(self.theme.bold)(text)),
        }
    }

    fn render_code(&self, code: &str, lang: Option<&str>, width: usize) -> Vec<String> {
        let body = if self.highlight {
            let highlighted = match self.highlights.lock() {
                Ok(mut cache) => cache.highlight(code, lang),
                Err(poisoned) => poisoned.into_inner().highlight(code, lang),
            };
            match highlighted {
                Ok(Some(lines)) => Some(lines),
                Ok(None) => None,
                Err(error) => {
                    tracing::warn!(%error, "falling back to plain code block");
                    None
                }
            }
        } else {
            None
        };
        let body = body.unwrap_or_else(|| {
            code.split('\n')
                .map(|line| (self.theme.code_block)(line))
                .collect()
        });

        let inner = width.saturating_sub(CODE_INDENT.len()).max(1);
        let mut lines = vec![(self.theme.code_block_border)(&format!(
            "```{}",
            lang.unwrap_or_default()
        ))];
        for line in body {
            for wrapped in wrap_text_with_ansi(&line, inner) {
                lines.push(format!("{CODE_INDENT}{wrapped}"));
            }
        }
        lines.push((self.theme.code_block_border)("```"));
        lines
    }

    fn render_list(&self, list: &mdast::List, width: usize) -> Vec<String> {
        let start = list.start.unwrap_or(1);
        let mut lines = Vec::new();

        for (idx, node) in list.children.iter().enumerate() {
            let mdast::Node::ListItem(item) = node else {
                continue;
            };
            let mut bullet = if list.ordered {
                format!("{}. ", u64::from(start) + idx as u64)
            } else {
                "- ".to_string()
            };
            let bullet_width = visible_width(&bullet);
            match item.checked {
                Some(true) => bullet.push_str("[x] "),
                Some(false) => bullet.push_str("[ ] "),
                None => {}
            }

            if list.spread && !lines.is_empty() {
                lines.push(String::new());
            }

            let first_width = width.saturating_sub(visible_width(&bullet)).max(1);
            let item_lines = self.render_blocks(&item.children, first_width, item.spread);
            let styled_bullet = (self.theme.list_bullet)(&bullet);
            let indent = " ".repeat(bullet_width);
            if item_lines.is_empty() {
                lines.push(styled_bullet.trim_end().to_string());
                continue;
            }
            for (line_idx, line) in item_lines.into_iter().enumerate() {
                if line_idx == 0 {
                    lines.push(format!("{styled_bullet}{line}"));
                } else if line.is_empty() {
                    lines.push(line);
                } else {
                    lines.push(format!("{indent}{line}"));
                }
            }
        }

        lines
    }

    fn render_table(&self, table: &mdast::Table, width: usize) -> Vec<String> {
        let rows: Vec<Vec<String>> = table
            .children
            .iter()
            .filter_map(|row| match row {
                mdast::Node::TableRow(row) => Some(
                    row.children
                        .iter()
                        .map(|cell| match cell {
                            mdast::Node::TableCell(cell) => self.render_inline(&cell.children, ""),
                            other => other.to_string(),
                        })
                        .collect(),
                ),
                _ => None,
            })
            .collect();
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return Vec::new();
        }

        let mut natural = vec![1usize; columns];
        for row in &rows {
            for (col, cell) in row.iter().enumerate() {
                natural[col] = natural[col].max(visible_width(cell));
            }
        }

        let overhead = 3 * columns + 1;
        let available = width.saturating_sub(overhead);
        let natural_total: usize = natural.iter().sum();
        let widths = if natural_total <= available {
            natural
        } else if available >= columns * 3 {
            shrink_columns(&natural, available)
        } else {
            return rows
                .iter()
                .flat_map(|row| wrap_text_with_ansi(&row.join(" | "), width))
                .collect();
        };

        let border = |left: &str, mid: &str, right: &str| {
            let cells: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            format!("{left}─{}─{right}", cells.join(&format!("─{mid}─")))
        };

        let mut lines = vec![border("┌", "┬", "┐")];
        for (row_idx, row) in rows.iter().enumerate() {
            let wrapped: Vec<Vec<String>> = widths
                .iter()
                .enumerate()
                .map(|(col, col_width)| {
                    let cell = row.get(col).map(String::as_str).unwrap_or_default();
                    wrap_text_with_ansi(cell, *col_width)
                })
                .collect();
            let height = wrapped.iter().map(Vec::len).max().unwrap_or(1);
            for line_idx in 0..height {
                let parts: Vec<String> = wrapped
                    .iter()
                    .zip(&widths)
                    .map(|(cell_lines, col_width)| {
                        let text = cell_lines.get(line_idx).map(String::as_str).unwrap_or("");
                        let padded = format!(
                            "{text}{}",
                            " ".repeat(col_width.saturating_sub(visible_width(text)))
                        );
                        if row_idx == 0 {
                            (self.theme.bold)(&padded)
                        } else {
                            padded
                        }
                    })
                    .collect();
                lines.push(format!("│ {} │", parts.join(" │ ")));
            }
            if row_idx == 0 && rows.len() > 1 {
                lines.push(border("├", "┼", "┤"));
            }
        }
        lines.push(border("└", "┴", "┘"));
        lines
    }

    /// Renders inline children to a single string. `prefix` re-opens the
    /// enclosing block style after a nested style closes its attribute.
    fn render_inline(&self, nodes: &[mdast::Node], prefix: &str) -> String {
        let mut out = String::new();
        for node in nodes {
            match node {
                mdast::Node::Text(text) => out.push_str(&text.value),
                mdast::Node::Strong(strong) => {
                    let inner = self.render_inline(&strong.children, prefix);
                    out.push_str(&(self.theme.bold)(&inner));
                    out.push_str(prefix);
                }
                mdast::Node::Emphasis(emphasis) => {
                    let inner = self.render_inline(&emphasis.children, prefix);
                    out.push_str(&(self.theme.italic)(&inner));
                    out.push_str(prefix);
                }
                mdast::Node::Delete(delete) => {
                    let inner = self.render_inline(&delete.children, prefix);
                    out.push_str(&(self.theme.strikethrough)(&inner));
                    out.push_str(prefix);
                }
                mdast::Node::InlineCode(code) => {
                    out.push_str(&(self.theme.code)(&code.value));
                    out.push_str(prefix);
                }
                mdast::Node::Link(link) => {
                    let label = self.render_inline(&link.children, prefix);
                    let plain_label = plain_text(&link.children);
                    out.push_str(&(self.theme.link)(&(self.theme.underline)(&label)));
                    let href = link.url.as_str();
                    let bare = href.strip_prefix("mailto:").unwrap_or(href);
                    if plain_label != href && plain_label != bare {
                        out.push_str(&(self.theme.link_url)(&format!(" ({href})")));
                    }
                    out.push_str(prefix);
                }
                mdast::Node::Image(image) => {
                    out.push_str(if image.alt.is_empty() {
                        &image.url
                    } else {
                        &image.alt
                    });
                }
                mdast::Node::Break(_) => out.push('\n'),
                mdast::Node::Html(html) => out.push_str(&html.value),
                mdast::Node::InlineMath(math) => out.push_str(&math.value),
                mdast::Node::FootnoteReference(reference) => {
                    out.push_str(&format!("[^{}]", reference.identifier));
                }
                other => out.push_str(&other.to_string()),
            }
        }
        out
    }
}

fn style_prefix(style: impl Fn(&str) -> String) -> String {
    let sentinel = "\u{0}";
    let styled = style(sentinel);
    styled
        .find(sentinel)
        .map(|idx| styled[..idx].to_string())
        .unwrap_or_default()
}

fn plain_text(nodes: &[mdast::Node]) -> String {
    nodes.iter().map(ToString::to_string).collect()
}

fn shrink_columns(natural: &[usize], available: usize) -> Vec<usize> {
    let total: usize = natural.iter().sum();
    let mut widths: Vec<usize> = natural
        .iter()
        .map(|width| (width * available / total.max(1)).max(1))
        .collect();
    let mut used: usize = widths.iter().sum();
    let mut col = 0;
    while used < available {
        if widths[col] < natural[col] {
            widths[col] += 1;
            used += 1;
        }
        col = (col + 1) % widths.len();
        if widths.iter().zip(natural).all(|(w, n)| w >= n) {
            break;
        }
    }
    widths
}
