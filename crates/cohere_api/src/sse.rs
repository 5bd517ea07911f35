use serde_json::Value;

use crate::events::CohereStreamEvent;

/// Incremental parser for SSE text streams.
///
/// Frames are separated by a blank line. The event kind comes from the JSON
/// `type` field, falling back to the `event:` line.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    /// Undecoded bytes of the frame still in flight. Kept as bytes so a
    /// multi-byte character split across network chunks decodes intact.
    buffer: Vec<u8>,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<CohereStreamEvent> {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.contains(&b'\r') {
            self.buffer = strip_carriage_returns(&self.buffer);
        }
        let mut events = Vec::new();

        while let Some(split) = frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..split + 2).collect();
            let frame = String::from_utf8_lossy(&frame[..split]);

            let (event_name, payload) = split_frame(&frame);
            let Some(payload) = payload else {
                continue;
            };
            if payload == "[DONE]" {
                continue;
            }

            if let Ok(value) = serde_json::from_str::<Value>(&payload) {
                if let Some(event) = map_event(event_name.as_deref(), &value) {
                    events.push(event);
                }
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<CohereStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

/// Drops the `\r` of every `\r\n`. A trailing `\r` waits for the next chunk.
fn strip_carriage_returns(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        if byte == b'\r' && iter.peek() == Some(&b'\n') {
            continue;
        }
        out.push(byte);
    }
    out
}

fn split_frame(frame: &str) -> (Option<String>, Option<String>) {
    let mut event_name = None;
    let mut data_lines = Vec::new();

    for line in frame.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event_name = Some(name.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if !data.is_empty() {
                data_lines.push(data);
            }
        }
    }

    let payload = (!data_lines.is_empty()).then(|| data_lines.join("\n"));
    (event_name, payload)
}

fn map_event(event_name: Option<&str>, value: &Value) -> Option<CohereStreamEvent> {
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .or(event_name)?;
    let message = value.pointer("/delta/message");

    match event_type {
        "message-start" => Some(CohereStreamEvent::MessageStart {
            id: value.get("id").and_then(Value::as_str).map(ToString::to_string),
        }),
        "content-delta" => {
            let text = message
                .and_then(|message| message.pointer("/content/text"))
                .and_then(Value::as_str)
                .unwrap_or("");
            Some(CohereStreamEvent::ContentDelta {
                text: text.to_owned(),
            })
        }
        "tool-plan-delta" => {
            let text = message
                .and_then(|message| message.get("tool_plan"))
                .and_then(Value::as_str)
                .unwrap_or("");
            Some(CohereStreamEvent::ToolPlanDelta {
                text: text.to_owned(),
            })
        }
        "tool-call-start" => {
            let call = message.and_then(|message| message.get("tool_calls"))?;
            let id = call.get("id").and_then(Value::as_str)?;
            let name = call
                .pointer("/function/name")
                .and_then(Value::as_str)
                .unwrap_or("");
            let arguments = call
                .pointer("/function/arguments")
                .and_then(Value::as_str)
                .unwrap_or("");
            Some(CohereStreamEvent::ToolCallStart {
                index: event_index(value),
                id: id.to_owned(),
                name: name.to_owned(),
                arguments: arguments.to_owned(),
            })
        }
        "tool-call-delta" => {
            let arguments = message
                .and_then(|message| message.pointer("/tool_calls/function/arguments"))
                .and_then(Value::as_str)
                .unwrap_or("");
            Some(CohereStreamEvent::ToolCallDelta {
                index: event_index(value),
                arguments: arguments.to_owned(),
            })
        }
        "tool-call-end" => Some(CohereStreamEvent::ToolCallEnd {
            index: event_index(value),
        }),
        "message-end" => {
            let finish_reason = value
                .pointer("/delta/finish_reason")
                .and_then(Value::as_str)
                .map(ToString::to_string);
            Some(CohereStreamEvent::MessageEnd { finish_reason })
        }
        "error" => {
            let message = value
                .get("message")
                .or_else(|| value.pointer("/error/message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error");
            Some(CohereStreamEvent::Error {
                message: message.to_owned(),
            })
        }
        _ => None,
    }
}

fn event_index(value: &Value) -> usize {
    value
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|index| usize::try_from(index).ok())
        .unwrap_or(0)
}
