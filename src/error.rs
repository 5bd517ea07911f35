use thiserror::Error;

/// Failure to produce styled lines from streamed markup.
///
/// Callers degrade to plain wrapped text instead of surfacing this to the
/// user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("markdown parse failed: {0}")]
    Markdown(String),
    #[error("syntax highlighting failed: {0}")]
    Highlight(String),
}
