use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One progress unit streamed by a pipeline stage while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ProgressEvent {
    pub fn new(kind: impl Into<String>, content: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            content,
        }
    }

    /// Renders the unit as a single log line.
    pub fn log_line(&self) -> String {
        match self.content.as_deref() {
            Some(content) if !content.is_empty() => format!("{}: {content}", self.kind),
            _ => self.kind.clone(),
        }
    }
}

/// Terminal result of a stage call, returned once the remote side finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl StageOutcome {
    pub fn new(result: Option<Value>) -> Self {
        Self { result }
    }

    /// Dashboard identifier announced by the stage result, if any.
    pub fn dashboard_id(&self) -> Option<&str> {
        let result = self.result.as_ref()?;
        result
            .get("dashboard_id")
            .or_else(|| result.get("dashboardId"))
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

/// Response of `create_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(default, alias = "dataFiles")]
    pub data_files: Vec<String>,
}

/// Project metadata produced by the analyze stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dashboards: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Dashboard document produced by the generate-dashboard stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
