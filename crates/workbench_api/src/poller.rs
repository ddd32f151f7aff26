//! Sequenced analyze → dashboard pipeline with lag-tolerant retrieval.
//!
//! A stage call returning does not mean its output is readable yet: the
//! backend writes results to a shared store asynchronously. The poller
//! therefore sleeps a settle delay after each stage and then re-verifies
//! completion through the read endpoints with exponential backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::backend::WorkbenchBackend;
use crate::error::WorkbenchApiError;
use crate::events::{Dashboard, Metadata, ProgressEvent, StageOutcome};
use crate::retry::{fetch_with_retry_observed, RetrievalAttempt, RetryExhausted, RetryPolicy};

/// Default sleep after each stage before its output is read.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2000);
/// Dashboard id used when the generation stage does not announce one.
pub const DEFAULT_DASHBOARD_ID: &str = "default";

pub const METADATA_LABEL: &str = "metadata";
pub const DASHBOARD_LABEL: &str = "dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Analyze,
    GenerateDashboard,
}

impl PipelineStage {
    pub const ORDER: [PipelineStage; 2] = [PipelineStage::Analyze, PipelineStage::GenerateDashboard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::GenerateDashboard => "generate_dashboard",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Observable state of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub target: String,
    pub stages: Vec<PipelineStage>,
    /// Index into `stages` of the stage in flight; equals `stages.len()`
    /// once both stages returned and retrieval is under way.
    pub current_stage_index: usize,
    pub state: PipelineState,
    pub log: Vec<String>,
}

impl PipelineRun {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_owned(),
            stages: PipelineStage::ORDER.to_vec(),
            current_stage_index: 0,
            state: PipelineState::Pending,
            log: Vec::new(),
        }
    }

    pub fn current_stage(&self) -> Option<PipelineStage> {
        self.stages.get(self.current_stage_index).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub analyze: Value,
    pub dashboard: Value,
    pub first_settle_delay: Duration,
    pub second_settle_delay: Duration,
    pub retry: RetryPolicy,
    pub default_dashboard_id: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            analyze: json!({}),
            dashboard: json!({}),
            first_settle_delay: DEFAULT_SETTLE_DELAY,
            second_settle_delay: DEFAULT_SETTLE_DELAY,
            retry: RetryPolicy::default(),
            default_dashboard_id: DEFAULT_DASHBOARD_ID.to_string(),
        }
    }
}

impl PipelineOptions {
    pub fn with_settle_delays(mut self, first: Duration, second: Duration) -> Self {
        self.first_settle_delay = first;
        self.second_settle_delay = second;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stage_options(mut self, analyze: Value, dashboard: Value) -> Self {
        self.analyze = analyze;
        self.dashboard = dashboard;
        self
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub run: PipelineRun,
    pub analysis: StageOutcome,
    pub generation: StageOutcome,
    pub metadata: Metadata,
    pub dashboard: Dashboard,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline stage '{stage}' failed: {source}")]
    StageFailure {
        stage: PipelineStage,
        #[source]
        source: WorkbenchApiError,
    },

    #[error("{label} was not available after {attempts} attempts: {source}")]
    RetrievalExhausted {
        label: String,
        attempts: u32,
        #[source]
        source: WorkbenchApiError,
    },
}

impl PipelineError {
    /// Label of the failed stage or retrieval.
    pub fn label(&self) -> &str {
        match self {
            Self::StageFailure { stage, .. } => stage.as_str(),
            Self::RetrievalExhausted { label, .. } => label,
        }
    }
}

impl From<RetryExhausted<WorkbenchApiError>> for PipelineError {
    fn from(exhausted: RetryExhausted<WorkbenchApiError>) -> Self {
        Self::RetrievalExhausted {
            label: exhausted.label,
            attempts: exhausted.attempts,
            source: exhausted.last_error,
        }
    }
}

/// Drives the two-stage pipeline against a [`WorkbenchBackend`].
///
/// Runs are strictly sequential and not cancellable once started; a failure
/// at any point aborts the run and the caller restarts from scratch.
pub struct JobPoller {
    backend: Arc<dyn WorkbenchBackend>,
    options: PipelineOptions,
}

impl JobPoller {
    pub fn new(backend: Arc<dyn WorkbenchBackend>) -> Self {
        Self::with_options(backend, PipelineOptions::default())
    }

    pub fn with_options(backend: Arc<dyn WorkbenchBackend>, options: PipelineOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn run_pipeline(&self, target: &str) -> Result<PipelineReport, PipelineError> {
        self.run_pipeline_observed(target, &mut |_| {}).await
    }

    /// Runs the pipeline, reporting every state transition and log line to
    /// `observer`.
    pub async fn run_pipeline_observed(
        &self,
        target: &str,
        observer: &mut (dyn FnMut(&PipelineRun) + Send),
    ) -> Result<PipelineReport, PipelineError> {
        let mut run = PipelineRun::new(target);
        observer(&run);

        run.state = PipelineState::Running;
        tracing::info!(project = %target, "pipeline run started");

        let analysis = match self
            .run_stage(PipelineStage::Analyze, &mut run, observer)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => return Err(fail(&mut run, observer, error)),
        };

        run.current_stage_index = 1;
        self.settle(&mut run, observer, self.options.first_settle_delay)
            .await;

        let generation = match self
            .run_stage(PipelineStage::GenerateDashboard, &mut run, observer)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => return Err(fail(&mut run, observer, error)),
        };

        run.current_stage_index = run.stages.len();
        self.settle(&mut run, observer, self.options.second_settle_delay)
            .await;

        let metadata = match self.retrieve_metadata(target, &mut run, observer).await {
            Ok(metadata) => metadata,
            Err(error) => return Err(fail(&mut run, observer, error)),
        };

        let dashboard_id = generation
            .dashboard_id()
            .unwrap_or(&self.options.default_dashboard_id)
            .to_owned();
        let dashboard = match self
            .retrieve_dashboard(target, &dashboard_id, &mut run, observer)
            .await
        {
            Ok(dashboard) => dashboard,
            Err(error) => return Err(fail(&mut run, observer, error)),
        };

        run.state = PipelineState::Succeeded;
        push_log(&mut run, observer, "pipeline complete".to_string());
        tracing::info!(project = %target, dashboard_id = %dashboard_id, "pipeline run succeeded");

        Ok(PipelineReport {
            run,
            analysis,
            generation,
            metadata,
            dashboard,
        })
    }

    async fn run_stage(
        &self,
        stage: PipelineStage,
        run: &mut PipelineRun,
        observer: &mut (dyn FnMut(&PipelineRun) + Send),
    ) -> Result<StageOutcome, PipelineError> {
        push_log(run, observer, format!("[{stage}] started"));
        tracing::debug!(stage = stage.as_str(), project = %run.target, "stage call started");

        let target = run.target.clone();
        let outcome = {
            let mut on_progress = |event: ProgressEvent| {
                push_log(run, observer, format!("[{stage}] {}", event.log_line()));
            };
            match stage {
                PipelineStage::Analyze => {
                    self.backend
                        .analyze(&target, &self.options.analyze, &mut on_progress)
                        .await
                }
                PipelineStage::GenerateDashboard => {
                    self.backend
                        .generate_dashboard(&target, &self.options.dashboard, &mut on_progress)
                        .await
                }
            }
        };

        match outcome {
            Ok(outcome) => {
                push_log(run, observer, format!("[{stage}] finished"));
                Ok(outcome)
            }
            Err(source) => Err(PipelineError::StageFailure { stage, source }),
        }
    }

    async fn settle(
        &self,
        run: &mut PipelineRun,
        observer: &mut (dyn FnMut(&PipelineRun) + Send),
        delay: Duration,
    ) {
        if delay.is_zero() {
            return;
        }
        push_log(
            run,
            observer,
            format!("waiting {}ms for results to settle", delay.as_millis()),
        );
        tokio::time::sleep(delay).await;
    }

    async fn retrieve_metadata(
        &self,
        target: &str,
        run: &mut PipelineRun,
        observer: &mut (dyn FnMut(&PipelineRun) + Send),
    ) -> Result<Metadata, PipelineError> {
        let backend = Arc::clone(&self.backend);
        let metadata = fetch_with_retry_observed(
            || {
                let backend = Arc::clone(&backend);
                let target = target.to_owned();
                async move { backend.get_metadata(&target).await }
            },
            METADATA_LABEL,
            self.options.retry,
            |attempt| push_log(run, observer, attempt_log_line(attempt)),
        )
        .await?;
        push_log(run, observer, format!("[retrieve] {METADATA_LABEL} available"));
        Ok(metadata)
    }

    async fn retrieve_dashboard(
        &self,
        target: &str,
        dashboard_id: &str,
        run: &mut PipelineRun,
        observer: &mut (dyn FnMut(&PipelineRun) + Send),
    ) -> Result<Dashboard, PipelineError> {
        let backend = Arc::clone(&self.backend);
        let dashboard = fetch_with_retry_observed(
            || {
                let backend = Arc::clone(&backend);
                let target = target.to_owned();
                let dashboard_id = dashboard_id.to_owned();
                async move { backend.get_dashboard(&target, &dashboard_id).await }
            },
            DASHBOARD_LABEL,
            self.options.retry,
            |attempt| push_log(run, observer, attempt_log_line(attempt)),
        )
        .await?;
        push_log(
            run,
            observer,
            format!("[retrieve] {DASHBOARD_LABEL} '{dashboard_id}' available"),
        );
        Ok(dashboard)
    }
}

fn push_log(
    run: &mut PipelineRun,
    observer: &mut (dyn FnMut(&PipelineRun) + Send),
    line: String,
) {
    run.log.push(line);
    observer(run);
}

fn fail(
    run: &mut PipelineRun,
    observer: &mut (dyn FnMut(&PipelineRun) + Send),
    error: PipelineError,
) -> PipelineError {
    run.state = PipelineState::Failed;
    tracing::warn!(project = %run.target, %error, "pipeline run failed");
    push_log(run, observer, format!("pipeline failed: {error}"));
    error
}

fn attempt_log_line(attempt: &RetrievalAttempt) -> String {
    match attempt.backoff {
        Some(backoff) => format!(
            "[retrieve] {} attempt {}/{} failed: {}; retrying in {}ms",
            attempt.label,
            attempt.attempt_number,
            attempt.max_attempts,
            attempt.error,
            backoff.as_millis()
        ),
        None => format!(
            "[retrieve] {} attempt {}/{} failed: {}; giving up",
            attempt.label, attempt.attempt_number, attempt.max_attempts, attempt.error
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{attempt_log_line, PipelineRun, PipelineStage, PipelineState};
    use crate::retry::RetrievalAttempt;
    use std::time::Duration;

    #[test]
    fn new_run_is_pending_at_first_stage() {
        let run = PipelineRun::new("sales");
        assert_eq!(run.state, PipelineState::Pending);
        assert_eq!(run.current_stage(), Some(PipelineStage::Analyze));
        assert_eq!(
            run.stages,
            vec![PipelineStage::Analyze, PipelineStage::GenerateDashboard]
        );
    }

    #[test]
    fn attempt_log_line_mentions_backoff_or_give_up() {
        let mut attempt = RetrievalAttempt {
            label: "metadata".to_string(),
            attempt_number: 2,
            max_attempts: 5,
            backoff: Some(Duration::from_millis(2000)),
            error: "HTTP 404 not ready".to_string(),
        };
        assert_eq!(
            attempt_log_line(&attempt),
            "[retrieve] metadata attempt 2/5 failed: HTTP 404 not ready; retrying in 2000ms"
        );

        attempt.backoff = None;
        assert!(attempt_log_line(&attempt).ends_with("giving up"));
    }
}
