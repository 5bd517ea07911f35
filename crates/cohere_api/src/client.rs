use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};

use crate::config::CohereApiConfig;
use crate::error::{parse_error_message, CohereApiError};
use crate::events::CohereStreamEvent;
use crate::payload::CohereChatRequest;
use crate::sse::SseStreamParser;
use crate::url::normalize_chat_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct CohereApiClient {
    http: Client,
    config: CohereApiConfig,
}

impl CohereApiClient {
    pub fn new(config: CohereApiConfig) -> Result<Self, CohereApiError> {
        if config.api_key.trim().is_empty() {
            return Err(CohereApiError::MissingApiKey);
        }
        let endpoint = normalize_chat_url(&config.base_url);
        url::Url::parse(&endpoint)
            .map_err(|error| CohereApiError::InvalidBaseUrl(format!("{endpoint}: {error}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(CohereApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CohereApiConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        normalize_chat_url(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, CohereApiError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", self.config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|_| CohereApiError::InvalidRequestPayload("invalid API key".into()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            HeaderName::from_static("x-client-name"),
            HeaderValue::from_str(&self.config.client_name).map_err(|_| {
                CohereApiError::InvalidRequestPayload("invalid header value for X-Client-Name".into())
            })?,
        );
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            headers.insert(
                USER_AGENT,
                HeaderValue::from_str(user_agent).map_err(|_| {
                    CohereApiError::InvalidRequestPayload("invalid header value for User-Agent".into())
                })?,
            );
        }
        Ok(headers)
    }

    pub fn build_request(
        &self,
        request: &CohereChatRequest,
    ) -> Result<reqwest::RequestBuilder, CohereApiError> {
        if request.messages.is_empty() {
            return Err(CohereApiError::InvalidRequestPayload(
                "'messages' must not be empty".to_owned(),
            ));
        }

        let mut payload = request.clone();
        payload.stream = true;
        Ok(self
            .http
            .post(self.endpoint())
            .headers(self.build_headers()?)
            .json(&payload))
    }

    pub async fn send_with_retry(
        &self,
        request: &CohereChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, CohereApiError> {
        let policy = self.config.retry;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=policy.max_retries {
            if is_cancelled(cancellation) {
                return Err(CohereApiError::Cancelled);
            }

            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(CohereApiError::from);

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < policy.max_retries
                        && policy.should_retry_status(status.as_u16(), &body)
                    {
                        tracing::warn!(
                            status = status.as_u16(),
                            attempt,
                            "retrying chat request after HTTP error"
                        );
                        await_or_cancel(tokio::time::sleep(policy.delay_for(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(CohereApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message);
                    if attempt < policy.max_retries {
                        tracing::warn!(attempt, "retrying chat request after connection error");
                        await_or_cancel(tokio::time::sleep(policy.delay_for(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(CohereApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(CohereApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Stream one chat request, forwarding each parsed event to `on_event`.
    ///
    /// Returns the `finish_reason` from the terminal `message-end` event, or
    /// `None` when the stream closed without one.
    pub async fn stream_with_handler<F>(
        &self,
        request: &CohereChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<Option<String>, CohereApiError>
    where
        F: FnMut(CohereStreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut finish_reason = None;

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(CohereApiError::Cancelled);
            }
            let chunk = chunk.map_err(CohereApiError::from)?;
            for event in parser.feed(&chunk) {
                process_stream_event(event, &mut finish_reason, &mut on_event)?;
            }
        }

        if is_cancelled(cancellation) {
            return Err(CohereApiError::Cancelled);
        }

        Ok(finish_reason.flatten())
    }

    /// Collect every event of one streamed request.
    pub async fn stream(
        &self,
        request: &CohereChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<CohereStreamEvent>, CohereApiError> {
        let mut events = Vec::new();
        self.stream_with_handler(request, cancellation, |event| events.push(event))
            .await?;
        Ok(events)
    }
}

fn process_stream_event<F>(
    event: CohereStreamEvent,
    finish_reason: &mut Option<Option<String>>,
    on_event: &mut F,
) -> Result<(), CohereApiError>
where
    F: FnMut(CohereStreamEvent),
{
    match &event {
        CohereStreamEvent::Error { message } => {
            return Err(CohereApiError::StreamFailed {
                message: message.clone(),
            });
        }
        CohereStreamEvent::MessageEnd {
            finish_reason: reason,
        } => {
            *finish_reason = Some(reason.clone());
        }
        _ => {}
    }

    on_event(event);
    Ok(())
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, CohereApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(CohereApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(CohereApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
