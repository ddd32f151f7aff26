//! Scripted in-memory implementation of the `workbench_api` backend contract.
//!
//! Stage calls replay configured progress and sleep on the tokio clock, and
//! the read paths can be told to lag behind by failing a fixed number of
//! times. Every call is recorded with its start and return instants so tests
//! can assert on sequencing under a paused clock.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;
use workbench_api::backend::ProgressSink;
use workbench_api::{
    Dashboard, Metadata, ProgressEvent, SessionInfo, StageOptions, StageOutcome, StatusCode,
    WorkbenchApiError, WorkbenchBackend,
};

/// Scripted behavior of one stage call.
#[derive(Debug, Clone, PartialEq)]
pub struct StageScript {
    pub progress: Vec<ProgressEvent>,
    /// Time the call stays in flight, split evenly across progress units.
    pub duration: Duration,
    pub result: Option<Value>,
    pub failure: Option<String>,
}

impl Default for StageScript {
    fn default() -> Self {
        Self {
            progress: vec![ProgressEvent::new("step", Some("working".to_string()))],
            duration: Duration::from_millis(100),
            result: None,
            failure: None,
        }
    }
}

impl StageScript {
    #[must_use]
    pub fn with_progress(mut self, progress: Vec<ProgressEvent>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Makes the stage fail with `message` after replaying its progress.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateSession { project: String },
    CloseSession { session_id: String },
    Analyze { project: String },
    GenerateDashboard { project: String },
    GetMetadata { project: String },
    GetDashboard { project: String, dashboard_id: String },
}

/// One completed call against the scripted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call: BackendCall,
    pub started_at: Instant,
    pub returned_at: Instant,
    pub ok: bool,
}

#[derive(Debug, Default)]
struct ScriptState {
    metadata_failures_left: u32,
    dashboard_failures_left: u32,
    sessions_opened: u64,
    calls: Vec<CallRecord>,
}

/// Deterministic [`WorkbenchBackend`] used by pipeline and session tests.
#[derive(Debug)]
pub struct ScriptedBackend {
    analyze: StageScript,
    dashboard: StageScript,
    metadata: Metadata,
    dashboard_doc: Dashboard,
    session_failure: Option<String>,
    data_files: Vec<String>,
    state: Mutex<ScriptState>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            analyze: StageScript::default(),
            dashboard: StageScript::default().with_result(json!({ "dashboard_id": "default" })),
            metadata: Metadata::default(),
            dashboard_doc: Dashboard {
                id: "default".to_string(),
                ..Dashboard::default()
            },
            session_failure: None,
            data_files: Vec::new(),
            state: Mutex::new(ScriptState::default()),
        }
    }

    #[must_use]
    pub fn with_analyze(mut self, script: StageScript) -> Self {
        self.analyze = script;
        self
    }

    #[must_use]
    pub fn with_generate_dashboard(mut self, script: StageScript) -> Self {
        self.dashboard = script;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_dashboard(mut self, dashboard: Dashboard) -> Self {
        self.dashboard_doc = dashboard;
        self
    }

    /// Number of `get_metadata` calls that report "not ready" before the
    /// metadata becomes visible.
    #[must_use]
    pub fn with_metadata_failures(self, failures: u32) -> Self {
        lock_unpoisoned(&self.state).metadata_failures_left = failures;
        self
    }

    #[must_use]
    pub fn with_dashboard_failures(self, failures: u32) -> Self {
        lock_unpoisoned(&self.state).dashboard_failures_left = failures;
        self
    }

    #[must_use]
    pub fn with_session_failure(mut self, message: impl Into<String>) -> Self {
        self.session_failure = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_data_files(mut self, data_files: Vec<String>) -> Self {
        self.data_files = data_files;
        self
    }

    /// Snapshot of every call that has returned so far, in return order.
    pub fn calls(&self) -> Vec<CallRecord> {
        lock_unpoisoned(&self.state).calls.clone()
    }

    /// Returned calls whose kind matches `predicate`.
    pub fn calls_matching(&self, predicate: impl Fn(&BackendCall) -> bool) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|record| predicate(&record.call))
            .collect()
    }

    fn record(&self, call: BackendCall, started_at: Instant, ok: bool) {
        lock_unpoisoned(&self.state).calls.push(CallRecord {
            call,
            started_at,
            returned_at: Instant::now(),
            ok,
        });
    }

    async fn replay_stage(
        &self,
        script: &StageScript,
        call: BackendCall,
        on_progress: ProgressSink<'_>,
    ) -> Result<StageOutcome, WorkbenchApiError> {
        let started_at = Instant::now();
        let units = u32::try_from(script.progress.len().max(1)).unwrap_or(u32::MAX);
        let slice = script.duration / units;

        for event in &script.progress {
            tokio::time::sleep(slice).await;
            on_progress(event.clone());
        }
        if script.progress.is_empty() {
            tokio::time::sleep(script.duration).await;
        }

        let outcome = match &script.failure {
            Some(message) => Err(WorkbenchApiError::StageFailed {
                message: message.clone(),
            }),
            None => Ok(StageOutcome::new(script.result.clone())),
        };
        self.record(call, started_at, outcome.is_ok());
        outcome
    }
}

#[async_trait]
impl WorkbenchBackend for ScriptedBackend {
    async fn create_session(&self, project_name: &str) -> Result<SessionInfo, WorkbenchApiError> {
        let started_at = Instant::now();
        let call = BackendCall::CreateSession {
            project: project_name.to_string(),
        };

        if let Some(message) = &self.session_failure {
            self.record(call, started_at, false);
            return Err(WorkbenchApiError::Status(
                StatusCode::SERVICE_UNAVAILABLE,
                message.clone(),
            ));
        }

        let session_number = {
            let mut state = lock_unpoisoned(&self.state);
            state.sessions_opened += 1;
            state.sessions_opened
        };
        self.record(call, started_at, true);
        Ok(SessionInfo {
            session_id: format!("session-{session_number}"),
            data_files: self.data_files.clone(),
        })
    }

    async fn close_session(&self, session_id: &str) -> Result<(), WorkbenchApiError> {
        let started_at = Instant::now();
        self.record(
            BackendCall::CloseSession {
                session_id: session_id.to_string(),
            },
            started_at,
            true,
        );
        Ok(())
    }

    async fn analyze(
        &self,
        project: &str,
        _options: &StageOptions,
        on_progress: ProgressSink<'_>,
    ) -> Result<StageOutcome, WorkbenchApiError> {
        let call = BackendCall::Analyze {
            project: project.to_string(),
        };
        self.replay_stage(&self.analyze, call, on_progress).await
    }

    async fn generate_dashboard(
        &self,
        project: &str,
        _options: &StageOptions,
        on_progress: ProgressSink<'_>,
    ) -> Result<StageOutcome, WorkbenchApiError> {
        let call = BackendCall::GenerateDashboard {
            project: project.to_string(),
        };
        self.replay_stage(&self.dashboard, call, on_progress).await
    }

    async fn get_metadata(&self, project: &str) -> Result<Metadata, WorkbenchApiError> {
        let started_at = Instant::now();
        let lagging = take_failure(&mut lock_unpoisoned(&self.state).metadata_failures_left);
        self.record(
            BackendCall::GetMetadata {
                project: project.to_string(),
            },
            started_at,
            !lagging,
        );

        if lagging {
            return Err(not_ready("metadata"));
        }
        Ok(self.metadata.clone())
    }

    async fn get_dashboard(
        &self,
        project: &str,
        dashboard_id: &str,
    ) -> Result<Dashboard, WorkbenchApiError> {
        let started_at = Instant::now();
        let lagging = take_failure(&mut lock_unpoisoned(&self.state).dashboard_failures_left);
        let known = dashboard_id == self.dashboard_doc.id;
        self.record(
            BackendCall::GetDashboard {
                project: project.to_string(),
                dashboard_id: dashboard_id.to_string(),
            },
            started_at,
            !lagging && known,
        );

        if lagging || !known {
            return Err(not_ready("dashboard"));
        }
        Ok(self.dashboard_doc.clone())
    }
}

fn take_failure(remaining: &mut u32) -> bool {
    if *remaining == 0 {
        return false;
    }
    *remaining -= 1;
    true
}

fn not_ready(what: &str) -> WorkbenchApiError {
    WorkbenchApiError::Status(StatusCode::NOT_FOUND, format!("{what} not ready"))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stage_replays_progress_over_its_duration() {
        let backend = ScriptedBackend::new().with_analyze(
            StageScript::default()
                .with_progress(vec![
                    ProgressEvent::new("step", Some("a".to_string())),
                    ProgressEvent::new("step", Some("b".to_string())),
                ])
                .with_duration(Duration::from_millis(400)),
        );

        let mut seen = Vec::new();
        let started = Instant::now();
        let outcome = backend
            .analyze("p", &json!({}), &mut |event: ProgressEvent| {
                seen.push(event.content.unwrap_or_default())
            })
            .await
            .expect("scripted stage succeeds");

        assert_eq!(outcome, StageOutcome::default());
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_lags_for_configured_attempts() {
        let backend = ScriptedBackend::new().with_metadata_failures(2);

        assert!(backend.get_metadata("p").await.is_err());
        assert!(backend.get_metadata("p").await.is_err());
        assert!(backend.get_metadata("p").await.is_ok());

        let oks: Vec<bool> = backend.calls().iter().map(|record| record.ok).collect();
        assert_eq!(oks, vec![false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_dashboard_id_is_not_found() {
        let backend = ScriptedBackend::new();
        let error = backend
            .get_dashboard("p", "other")
            .await
            .expect_err("unknown id");
        assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_get_sequential_ids() {
        let backend = ScriptedBackend::new();
        let first = backend.create_session("p").await.expect("session");
        let second = backend.create_session("p").await.expect("session");
        assert_eq!(first.session_id, "session-1");
        assert_eq!(second.session_id, "session-2");
    }
}
