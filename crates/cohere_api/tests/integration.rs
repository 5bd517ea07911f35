use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use cohere_api::{
    CohereApiClient, CohereApiConfig, CohereApiError, CohereChatRequest, CohereMessage,
    CohereStreamEvent, RetryPolicy,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
enum ScriptedResponse {
    Respond {
        status: u16,
        content_type: &'static str,
        chunks: Vec<ResponseChunk>,
    },
    Reset,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn client(&self) -> CohereApiClient {
        let retry = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
        };
        let config = CohereApiConfig::new("test-key")
            .with_base_url(&self.base_url)
            .with_retry(retry);
        CohereApiClient::new(config).expect("client")
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_sse(status: u16, frames: &[&str]) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "text/event-stream",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: sse_frames(frames),
        }],
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn sse_frames(frames: &[&str]) -> Vec<u8> {
    let mut body = String::new();

    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }

    body.into_bytes()
}

fn chat_request() -> CohereChatRequest {
    CohereChatRequest::new("command-a-03-2025", vec![CohereMessage::user("hi")])
}

const TEXT_DELTA: &str =
    r#"{"type":"content-delta","index":0,"delta":{"message":{"content":{"text":"hello"}}}}"#;
const MESSAGE_END: &str = r#"{"type":"message-end","delta":{"finish_reason":"COMPLETE"}}"#;

#[tokio::test]
async fn stream_integration_successful_completion() {
    let server = ScriptedServer::new(vec![response_sse(200, &[TEXT_DELTA, MESSAGE_END])]).await;
    let client = server.client();

    let mut events = Vec::new();
    let finish_reason = client
        .stream_with_handler(&chat_request(), None, |event| events.push(event))
        .await
        .expect("stream should succeed");

    assert_eq!(finish_reason.as_deref(), Some("COMPLETE"));
    assert_eq!(
        events[0],
        CohereStreamEvent::ContentDelta {
            text: "hello".to_string()
        }
    );
    assert_eq!(events.len(), 2);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_missing_message_end_reports_no_finish_reason() {
    let server = ScriptedServer::new(vec![response_sse(200, &[TEXT_DELTA])]).await;
    let client = server.client();

    let finish_reason = client
        .stream_with_handler(&chat_request(), None, |_| {})
        .await
        .expect("stream should succeed");

    assert_eq!(finish_reason, None);
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_error_event_fails_stream() {
    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[TEXT_DELTA, r#"{"type":"error","message":"boom"}"#],
    )])
    .await;
    let client = server.client();

    let error = client
        .stream(&chat_request(), None)
        .await
        .expect_err("error frame should fail the stream");

    assert!(matches!(error, CohereApiError::StreamFailed { ref message } if message == "boom"));
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_retryable_then_success() {
    let server = ScriptedServer::new(vec![
        response_json(503, r#"{"message":"overloaded"}"#),
        response_sse(200, &[MESSAGE_END]),
    ])
    .await;
    let client = server.client();

    let events = timeout(Duration::from_secs(10), client.stream(&chat_request(), None))
        .await
        .expect("retry path should be bounded")
        .expect("stream should eventually succeed");

    assert_eq!(
        events,
        vec![CohereStreamEvent::MessageEnd {
            finish_reason: Some("COMPLETE".to_string())
        }]
    );
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_non_retryable_status_fails_explicitly() {
    let server =
        ScriptedServer::new(vec![response_json(400, r#"{"message":"invalid request"}"#)]).await;
    let client = server.client();

    let error = client
        .stream(&chat_request(), None)
        .await
        .expect_err("stream should fail");
    assert!(matches!(
        error,
        CohereApiError::Status(code, ref message) if code.as_u16() == 400 && message == "invalid request"
    ));
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_cancellation_during_stream() {
    let server = ScriptedServer::new(vec![ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: sse_frames(&[TEXT_DELTA]),
            },
            ResponseChunk {
                delay_ms: 2_000,
                bytes: sse_frames(&[MESSAGE_END]),
            },
        ],
    }])
    .await;
    let client = Arc::new(server.client());

    let cancellation = Arc::new(AtomicBool::new(false));
    let stream_task = tokio::spawn({
        let client = Arc::clone(&client);
        let cancellation = Arc::clone(&cancellation);
        async move { client.stream(&chat_request(), Some(&cancellation)).await }
    });

    sleep(Duration::from_millis(120)).await;
    cancellation.store(true, Ordering::Release);

    let error = timeout(Duration::from_secs(1), stream_task)
        .await
        .expect("stream task should resolve promptly")
        .expect("join handle should resolve")
        .expect_err("cancellation should abort stream");

    assert!(matches!(error, CohereApiError::Cancelled));
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_connection_reset_then_retry_exhausted() {
    let server = ScriptedServer::new(vec![
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
    ])
    .await;
    let client = server.client();

    let error = timeout(Duration::from_secs(10), client.stream(&chat_request(), None))
        .await
        .expect("retry path should resolve")
        .expect_err("connection reset should surface as failure");

    assert!(matches!(
        error,
        CohereApiError::RetryExhausted { status: None, .. }
    ));
    assert!(server.request_count() >= 4);

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
) {
    if read_request_headers(&mut socket).await.is_err() {
        return;
    }

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r#"{"message":"unexpected request"}"#));

    match response {
        ScriptedResponse::Reset => {}
        ScriptedResponse::Respond {
            status,
            content_type,
            chunks,
        } => {
            let headers = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                status_reason(status),
                content_type,
            );

            if socket.write_all(headers.as_bytes()).await.is_err() {
                return;
            }

            for chunk in chunks {
                if chunk.delay_ms > 0 {
                    sleep(Duration::from_millis(chunk.delay_ms)).await;
                }
                let prefix = format!("{:X}\r\n", chunk.bytes.len());
                if socket.write_all(prefix.as_bytes()).await.is_err() {
                    return;
                }
                if socket.write_all(&chunk.bytes).await.is_err() {
                    return;
                }
                if socket.write_all(b"\r\n").await.is_err() {
                    return;
                }
            }

            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.shutdown().await;
        }
    }
}

async fn read_request_headers(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buffer[..n]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            return Ok(());
        }
    }
}
