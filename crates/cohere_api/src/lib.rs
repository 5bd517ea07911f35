//! Transport-only client primitives for the Cohere v2 chat streaming endpoint.
//!
//! This crate owns request building, SSE framing, retry policy, and error
//! parsing. It has no knowledge of conversation state or terminal rendering;
//! adapters translate [`CohereStreamEvent`]s into provider-neutral fragments.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, CohereApiClient};
pub use config::CohereApiConfig;
pub use error::CohereApiError;
pub use events::CohereStreamEvent;
pub use payload::{
    tool_definition, CohereChatRequest, CohereFunctionCall, CohereMessage, CohereToolCall,
};
pub use retry::RetryPolicy;
pub use sse::SseStreamParser;
pub use url::normalize_chat_url;
