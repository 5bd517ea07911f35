//! Code block highlighting backed by syntect's bundled grammars and themes.

use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{HighlightState, Theme, ThemeSet};
use syntect::parsing::{ParseState, SyntaxReference, SyntaxSet};
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

use crate::error::RenderError;

/// Bundled theme used for fenced code blocks.
pub const HIGHLIGHT_THEME: &str = "base16-ocean.dark";

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME: Lazy<Option<Theme>> =
    Lazy::new(|| ThemeSet::load_defaults().themes.remove(HIGHLIGHT_THEME));

/// Loads grammars and theme up front so the first streamed code block does
/// not stall the redraw loop.
pub fn prewarm_highlighting() {
    Lazy::force(&SYNTAX_SET);
    Lazy::force(&THEME);
}

fn resolve(lang: Option<&str>) -> Option<(&str, &'static SyntaxReference, &'static Theme)> {
    let token = lang.map(str::trim).filter(|token| !token.is_empty())?;
    let syntax = SYNTAX_SET.find_syntax_by_token(token)?;
    let theme = THEME.as_ref()?;
    Some((token, syntax, theme))
}

fn highlight_line(highlighter: &mut HighlightLines<'_>, line: &str) -> Result<String, RenderError> {
    let ranges = highlighter
        .highlight_line(line, &SYNTAX_SET)
        .map_err(|error| RenderError::Highlight(error.to_string()))?;
    let escaped = as_24_bit_terminal_escaped(&ranges, false);
    Ok(format!("{}\x1b[0m", escaped.trim_end_matches(['\n', '\r'])))
}

/// Highlights `code` as `lang`.
///
/// Returns `Ok(None)` when the language has no bundled grammar.
pub fn highlight_code(code: &str, lang: Option<&str>) -> Result<Option<Vec<String>>, RenderError> {
    let Some((_, syntax, theme)) = resolve(lang) else {
        return Ok(None);
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();
    for line in LinesWithEndings::from(code) {
        lines.push(highlight_line(&mut highlighter, line)?);
    }
    if code.is_empty() || code.ends_with('\n') {
        lines.push(String::new());
    }
    Ok(Some(lines))
}

/// Highlighter state after the complete lines of the last block highlighted.
///
/// A streamed fence grows a line at a time; resuming from the saved state
/// keeps each redraw proportional to the lines that are new.
#[derive(Default)]
pub struct HighlightCache {
    entry: Option<Resume>,
}

struct Resume {
    lang: String,
    code: String,
    lines: Vec<String>,
    highlight: HighlightState,
    parse: ParseState,
}

impl HighlightCache {
    /// Same output as [`highlight_code`]. Work is resumed when `code` extends
    /// the complete lines of the previous call in the same language.
    pub fn highlight(
        &mut self,
        code: &str,
        lang: Option<&str>,
    ) -> Result<Option<Vec<String>>, RenderError> {
        let Some((token, syntax, theme)) = resolve(lang) else {
            return Ok(None);
        };

        let resume = self
            .entry
            .take()
            .filter(|entry| entry.lang == token && code.starts_with(&entry.code));
        let (mut covered, mut lines, mut highlighter) = match resume {
            Some(entry) => (
                entry.code,
                entry.lines,
                HighlightLines::from_state(theme, entry.highlight, entry.parse),
            ),
            None => (String::new(), Vec::new(), HighlightLines::new(syntax, theme)),
        };

        let rest = &code[covered.len()..];
        let complete = rest.rfind('\n').map_or(0, |newline| newline + 1);
        for line in LinesWithEndings::from(&rest[..complete]) {
            lines.push(highlight_line(&mut highlighter, line)?);
        }
        covered.push_str(&rest[..complete]);
        let (highlight, parse) = highlighter.state();

        let mut result = lines.clone();
        let partial = &rest[complete..];
        if !partial.is_empty() {
            let mut tail = HighlightLines::from_state(theme, highlight.clone(), parse.clone());
            result.push(highlight_line(&mut tail, partial)?);
        }
        if code.is_empty() || code.ends_with('\n') {
            result.push(String::new());
        }

        self.entry = Some(Resume {
            lang: token.to_string(),
            code: covered,
            lines,
            highlight,
            parse,
        });
        Ok(Some(result))
    }
}
