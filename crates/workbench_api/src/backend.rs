//! Collaborator contract consumed by sessions and the [`JobPoller`](crate::JobPoller).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::WorkbenchApiError;
use crate::events::{Dashboard, Metadata, ProgressEvent, SessionInfo, StageOutcome};

/// Free-form options object forwarded verbatim to a stage call.
pub type StageOptions = Value;

/// Progress sink handed to stage calls.
pub type ProgressSink<'a> = &'a mut (dyn FnMut(ProgressEvent) + Send);

/// The REST surface of the workbench backend.
///
/// Stage calls stream progress units to `on_progress` and return only once
/// the remote side reports completion. Their written outputs may become
/// visible to the read paths (`get_metadata`, `get_dashboard`) later than
/// the stage call returns.
#[async_trait]
pub trait WorkbenchBackend: Send + Sync {
    /// Opens a live session for `project_name`; the returned id addresses
    /// the session's live channel.
    async fn create_session(&self, project_name: &str) -> Result<SessionInfo, WorkbenchApiError>;

    async fn close_session(&self, session_id: &str) -> Result<(), WorkbenchApiError>;

    async fn analyze(
        &self,
        project: &str,
        options: &StageOptions,
        on_progress: ProgressSink<'_>,
    ) -> Result<StageOutcome, WorkbenchApiError>;

    async fn generate_dashboard(
        &self,
        project: &str,
        options: &StageOptions,
        on_progress: ProgressSink<'_>,
    ) -> Result<StageOutcome, WorkbenchApiError>;

    async fn get_metadata(&self, project: &str) -> Result<Metadata, WorkbenchApiError>;

    async fn get_dashboard(
        &self,
        project: &str,
        dashboard_id: &str,
    ) -> Result<Dashboard, WorkbenchApiError>;
}
