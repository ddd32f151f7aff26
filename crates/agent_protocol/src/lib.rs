//! Wire contract for the live agent channel.
//!
//! This crate defines only the JSON frame shapes exchanged over one session
//! connection: the inbound event union streamed by the remote agent and the
//! outbound command frames a client may transmit. It excludes transport,
//! keepalive scheduling, and transcript state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Discriminant of an inbound event (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Thinking,
    ToolCall,
    ToolResult,
    Code,
    Text,
    TextDelta,
    Result,
    Chart,
    Table,
    Error,
    Done,
    Raw,
    Pong,
    InputDelta,
}

impl EventKind {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "thinking" => Self::Thinking,
            "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "code" => Self::Code,
            "text" => Self::Text,
            "text_delta" => Self::TextDelta,
            "result" => Self::Result,
            "chart" => Self::Chart,
            "table" => Self::Table,
            "error" => Self::Error,
            "done" => Self::Done,
            "raw" => Self::Raw,
            "pong" => Self::Pong,
            "input_delta" => Self::InputDelta,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Code => "code",
            Self::Text => "text",
            Self::TextDelta => "text_delta",
            Self::Result => "result",
            Self::Chart => "chart",
            Self::Table => "table",
            Self::Error => "error",
            Self::Done => "done",
            Self::Raw => "raw",
            Self::Pong => "pong",
            Self::InputDelta => "input_delta",
        }
    }

    /// Returns true for kinds whose `content` belongs to a turn's text buffer.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text | Self::TextDelta | Self::Result)
    }
}

/// One inbound event as delivered by the remote agent.
///
/// Every payload field is optional; which ones are populated depends on
/// `kind`. Events are kept verbatim once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_after: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

impl InboundEvent {
    /// Creates an event of `kind` with every payload field unset.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            content: None,
            tool: None,
            input: None,
            output: None,
            status: None,
            language: None,
            data: None,
            message: None,
            id: None,
            context_before: None,
            context_after: None,
            truncated: None,
        }
    }

    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(EventKind::Text).with_content(content)
    }

    #[must_use]
    pub fn text_delta(content: impl Into<String>) -> Self {
        Self::new(EventKind::TextDelta).with_content(content)
    }

    #[must_use]
    pub fn done() -> Self {
        Self::new(EventKind::Done)
    }

    #[must_use]
    pub fn pong() -> Self {
        Self::new(EventKind::Pong)
    }

    #[must_use]
    pub fn tool_call(tool: impl Into<String>, input: impl Into<Value>) -> Self {
        let mut event = Self::new(EventKind::ToolCall);
        event.tool = Some(tool.into());
        event.input = Some(input.into());
        event
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Returns `content`, or the empty string when absent.
    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Command frame transmitted from client to agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Message { content: String },
    RunCode { code: String },
    Resize { rows: u16, cols: u16 },
    Ping,
}

impl OutboundFrame {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::RunCode { .. } => "run_code",
            Self::Resize { .. } => "resize",
            Self::Ping => "ping",
        }
    }

    /// Serializes the frame into the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Json)
    }
}

/// Reasons an inbound frame could not be turned into an [`InboundEvent`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame is missing a string `type` field")]
    MissingType,

    #[error("unknown event type '{0}'")]
    UnknownKind(String),

    #[error("field '{field}' has an unexpected shape")]
    InvalidField { field: &'static str },

    #[error("binary frames are not part of the channel protocol")]
    BinaryFrame,
}

/// Parses one inbound text frame.
///
/// Scalar `content`/`message`/`status` values that are not strings are
/// rendered to text rather than rejected; `truncated` must be a boolean.
pub fn parse_inbound_frame(raw: &str) -> Result<InboundEvent, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(ProtocolError::Json)?;
    let Value::Object(object) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let kind_name = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    let kind =
        EventKind::parse(kind_name).ok_or_else(|| ProtocolError::UnknownKind(kind_name.to_owned()))?;

    let truncated = match object.get("truncated") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(_) => return Err(ProtocolError::InvalidField { field: "truncated" }),
    };

    Ok(InboundEvent {
        kind,
        content: text_field(&object, "content"),
        tool: text_field(&object, "tool"),
        input: value_field(&object, "input"),
        output: value_field(&object, "output"),
        status: text_field(&object, "status"),
        language: text_field(&object, "language"),
        data: value_field(&object, "data"),
        message: text_field(&object, "message"),
        id: text_field(&object, "id"),
        context_before: value_field(&object, "context_before"),
        context_after: value_field(&object, "context_after"),
        truncated,
    })
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

fn value_field(object: &Map<String, Value>, key: &str) -> Option<Value> {
    object.get(key).filter(|value| !value.is_null()).cloned()
}
