use serde_json::Value;

use crate::events::ProgressEvent;

/// Normalized frame of a stage progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Intermediate progress unit forwarded to the caller's log sink.
    Progress(ProgressEvent),
    /// Remote-side completion, optionally carrying the terminal result.
    Complete { result: Option<Value> },
    /// Remote-side failure of the stage.
    Failed { message: String },
}

/// Incremental parser for SSE text streams.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut frames = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(payload) = extract_data_payload(&frame) {
                if payload == "[DONE]" || payload.is_empty() {
                    continue;
                }

                match serde_json::from_str::<Value>(&payload) {
                    Ok(value) => {
                        if let Some(frame) = map_frame(value) {
                            frames.push(frame);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "dropping malformed progress frame");
                    }
                }
            }
        }

        frames
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<StreamFrame> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_frame(value: Value) -> Option<StreamFrame> {
    let frame_type = value.get("type")?.as_str()?;

    match frame_type {
        "complete" | "completed" | "done" => {
            let result = value.get("result").filter(|value| !value.is_null()).cloned();
            Some(StreamFrame::Complete { result })
        }
        "error" | "failed" => {
            let message = value
                .get("message")
                .or_else(|| value.get("content"))
                .and_then(|value| value.as_str())
                .unwrap_or("stage reported an error")
                .to_owned();
            Some(StreamFrame::Failed { message })
        }
        other => {
            let content = match value.get("content") {
                None | Some(Value::Null) => None,
                Some(Value::String(text)) => Some(text.clone()),
                Some(other) => Some(other.to_string()),
            };
            Some(StreamFrame::Progress(ProgressEvent::new(other, content)))
        }
    }
}
