//! Client primitives for the workbench REST collaborators.
//!
//! This crate owns the request/response contracts of the session and
//! pipeline endpoints, the SSE progress parser used by the long-running
//! stage calls, the retry-with-backoff helper for lag-prone read paths, and
//! the [`JobPoller`] that sequences a full analyze → dashboard run.
//!
//! It contains no live-channel or transcript logic.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod poller;
pub mod retry;
pub mod sse;
pub mod url;

pub use backend::{StageOptions, WorkbenchBackend};
pub use client::WorkbenchApiClient;
pub use config::WorkbenchApiConfig;
pub use error::WorkbenchApiError;
pub use events::{Dashboard, Metadata, ProgressEvent, SessionInfo, StageOutcome};
pub use poller::{
    JobPoller, PipelineError, PipelineOptions, PipelineReport, PipelineRun, PipelineStage,
    PipelineState,
};
pub use reqwest::StatusCode;
pub use retry::{
    fetch_with_retry, fetch_with_retry_observed, RetrievalAttempt, RetryExhausted, RetryPolicy,
};
pub use sse::{SseStreamParser, StreamFrame};
pub use crate::url::normalize_base_url;
