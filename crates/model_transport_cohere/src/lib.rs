//! Cohere-backed implementation of the shared `model_transport` contract.
//!
//! This adapter converts conversation history into v2 chat payloads and turns
//! `cohere_api` stream events into ordered `StreamFragment`s. Tool-call
//! argument deltas are accumulated per call index and emitted as one
//! `StreamFragment::ToolCall` when the call closes.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cohere_api::config::DEFAULT_COHERE_MODEL;
use cohere_api::{
    tool_definition, CohereApiClient, CohereApiConfig, CohereApiError, CohereChatRequest,
    CohereMessage, CohereStreamEvent, CohereToolCall,
};
use model_transport::{
    CancelSignal, FinishReason, Message, ModelRequest, ModelTransport, Role, StreamFragment,
    ToolCallRequest, TransportError, TransportInitError, TransportProfile,
};
use serde_json::Value;

/// Stable transport identifier used by startup selection.
pub const COHERE_TRANSPORT_ID: &str = "cohere";

/// Runtime configuration for the Cohere transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohereTransportConfig {
    pub api_key: String,
    pub model_id: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl CohereTransportConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_id: DEFAULT_COHERE_MODEL.to_string(),
            base_url: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        if !model_id.trim().is_empty() {
            self.model_id = model_id.trim().to_string();
        }
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_api_config(self) -> CohereApiConfig {
        let mut config = CohereApiConfig::new(self.api_key)
            .with_user_agent(concat!("workspace-agent/", env!("CARGO_PKG_VERSION")));

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn stream(
        &self,
        request: &CohereChatRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(CohereStreamEvent),
    ) -> Result<Option<String>, CohereApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: CohereApiClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        request: &CohereChatRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(CohereStreamEvent),
    ) -> Result<Option<String>, CohereApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                CohereApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), |event| on_event(event)),
        )
    }
}

/// `ModelTransport` adapter backed by `cohere_api` transport primitives.
pub struct CohereTransport {
    model_id: String,
    stream_client: Arc<dyn StreamClient>,
}

impl CohereTransport {
    /// Creates a transport using the real Cohere API client.
    pub fn new(config: CohereTransportConfig) -> Result<Self, TransportInitError> {
        let model_id = config.model_id.clone();
        let stream_client = Arc::new(DefaultStreamClient {
            client: CohereApiClient::new(config.into_api_config()).map_err(map_init_error)?,
        });

        Ok(Self {
            model_id,
            stream_client,
        })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(model_id: &str, stream_client: Arc<dyn StreamClient>) -> Self {
        Self {
            model_id: model_id.to_string(),
            stream_client,
        }
    }

    fn build_chat_request(&self, request: &ModelRequest) -> CohereChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        let system_prompt = request.system_prompt();
        if !system_prompt.trim().is_empty() {
            messages.push(CohereMessage::system(system_prompt));
        }
        messages.extend(request.messages.iter().map(to_cohere_message));

        let tools = request
            .tools
            .iter()
            .map(|tool| {
                tool_definition(
                    &tool.name,
                    tool.description.as_deref(),
                    &tool.input_schema,
                )
            })
            .collect();

        CohereChatRequest::new(self.model_id.clone(), messages).with_tools(tools)
    }
}

impl ModelTransport for CohereTransport {
    fn profile(&self) -> TransportProfile {
        TransportProfile {
            transport_id: COHERE_TRANSPORT_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn stream(
        &self,
        request: ModelRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamFragment),
    ) -> Result<(), TransportError> {
        if cancel.load(Ordering::Acquire) {
            return Err(TransportError::Cancelled);
        }

        let chat_request = self.build_chat_request(&request);
        tracing::debug!(
            request_id = request.request_id,
            messages = chat_request.messages.len(),
            "starting chat stream"
        );

        let mut pending = PendingToolCalls::default();
        let finish_reason = self
            .stream_client
            .stream(&chat_request, &cancel, &mut |event| {
                pending.apply(event, emit);
            })
            .map_err(map_stream_error)?;

        let Some(finish_reason) = finish_reason else {
            return Err(TransportError::Protocol(
                "stream ended without message-end".to_string(),
            ));
        };

        pending.flush(emit);
        emit(StreamFragment::EndOfTurn {
            finish_reason: FinishReason::parse(&finish_reason),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn into_request(self) -> ToolCallRequest {
        ToolCallRequest::new(self.id, self.name, parse_arguments(&self.arguments))
    }
}

/// Tool calls whose argument deltas are still streaming, keyed by index.
#[derive(Debug, Default)]
struct PendingToolCalls {
    calls: BTreeMap<usize, PendingToolCall>,
}

impl PendingToolCalls {
    fn apply(&mut self, event: CohereStreamEvent, emit: &mut dyn FnMut(StreamFragment)) {
        match event {
            CohereStreamEvent::ContentDelta { text } | CohereStreamEvent::ToolPlanDelta { text } => {
                if !text.is_empty() {
                    emit(StreamFragment::Text(text));
                }
            }
            CohereStreamEvent::ToolCallStart {
                index,
                id,
                name,
                arguments,
            } => {
                self.calls.insert(
                    index,
                    PendingToolCall {
                        id,
                        name,
                        arguments,
                    },
                );
            }
            CohereStreamEvent::ToolCallDelta { index, arguments } => {
                self.calls
                    .entry(index)
                    .or_default()
                    .arguments
                    .push_str(&arguments);
            }
            CohereStreamEvent::ToolCallEnd { index } => {
                if let Some(call) = self.calls.remove(&index) {
                    emit(StreamFragment::ToolCall(call.into_request()));
                }
            }
            CohereStreamEvent::MessageStart { .. }
            | CohereStreamEvent::MessageEnd { .. }
            | CohereStreamEvent::Error { .. } => {}
        }
    }

    /// Emits calls the stream never closed explicitly, in index order.
    fn flush(&mut self, emit: &mut dyn FnMut(StreamFragment)) {
        for (_, call) in std::mem::take(&mut self.calls) {
            emit(StreamFragment::ToolCall(call.into_request()));
        }
    }
}

/// Unparseable argument text is kept verbatim so the tool can report it.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn encode_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn to_cohere_message(message: &Message) -> CohereMessage {
    match message.role {
        Role::User => CohereMessage::user(message.content.clone()),
        Role::Assistant => CohereMessage::assistant(
            message.content.clone(),
            message
                .tool_calls
                .iter()
                .map(|call| {
                    CohereToolCall::function(
                        call.id.clone(),
                        call.tool_name.clone(),
                        encode_arguments(&call.arguments),
                    )
                })
                .collect(),
        ),
        Role::Tool => CohereMessage::tool_result(
            message.tool_call_id.clone().unwrap_or_default(),
            message.content.clone(),
        ),
    }
}

fn map_stream_error(error: CohereApiError) -> TransportError {
    match error {
        CohereApiError::Cancelled => TransportError::Cancelled,
        CohereApiError::Status(status, message) => TransportError::Status {
            status: status.as_u16(),
            message,
        },
        CohereApiError::StreamFailed { message } => TransportError::Stream(message),
        CohereApiError::Serde(error) => TransportError::Protocol(error.to_string()),
        other => TransportError::Request(other.to_string()),
    }
}

fn map_init_error(error: CohereApiError) -> TransportInitError {
    TransportInitError::new(format!("Failed to initialize cohere transport: {error}"))
}
