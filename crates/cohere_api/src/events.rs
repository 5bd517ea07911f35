use serde::{Deserialize, Serialize};

/// Stream event emitted by the SSE parser after normalization.
///
/// Tool-call events carry the call `index` so callers can accumulate argument
/// deltas for calls that stream in parallel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CohereStreamEvent {
    #[serde(rename = "message-start")]
    MessageStart { id: Option<String> },
    #[serde(rename = "content-delta")]
    ContentDelta { text: String },
    #[serde(rename = "tool-plan-delta")]
    ToolPlanDelta { text: String },
    #[serde(rename = "tool-call-start")]
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "tool-call-delta")]
    ToolCallDelta { index: usize, arguments: String },
    #[serde(rename = "tool-call-end")]
    ToolCallEnd { index: usize },
    #[serde(rename = "message-end")]
    MessageEnd { finish_reason: Option<String> },
    /// In-stream failure reported by the API.
    #[serde(rename = "error")]
    Error { message: String },
}

impl CohereStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageEnd { .. } | Self::Error { .. })
    }
}
