use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::backend::{ProgressSink, StageOptions, WorkbenchBackend};
use crate::config::WorkbenchApiConfig;
use crate::error::{parse_error_message, WorkbenchApiError};
use crate::events::{Dashboard, Metadata, SessionInfo, StageOutcome};
use crate::headers::{build_headers, ACCEPT_EVENT_STREAM, ACCEPT_JSON};
use crate::sse::{SseStreamParser, StreamFrame};
use crate::url::endpoint;

/// HTTP implementation of [`WorkbenchBackend`].
#[derive(Debug)]
pub struct WorkbenchApiClient {
    http: Client,
    config: WorkbenchApiConfig,
}

impl WorkbenchApiClient {
    pub fn new(config: WorkbenchApiConfig) -> Result<Self, WorkbenchApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(WorkbenchApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &WorkbenchApiConfig {
        &self.config
    }

    pub fn build_headers(&self, accept: &str) -> Result<HeaderMap, WorkbenchApiError> {
        let headers = build_headers(&self.config, accept);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    WorkbenchApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    WorkbenchApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        method: Method,
        segments: &[&str],
        accept: &str,
    ) -> Result<reqwest::RequestBuilder, WorkbenchApiError> {
        let url = endpoint(&self.config.base_url, segments)?;
        let headers = self.build_headers(accept)?;
        Ok(self.http.request(method, url).headers(headers))
    }

    async fn send_checked(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, WorkbenchApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        Err(WorkbenchApiError::Status(
            status,
            parse_error_message(status, &body),
        ))
    }

    async fn get_json<T>(&self, segments: &[&str]) -> Result<T, WorkbenchApiError>
    where
        T: DeserializeOwned,
    {
        let request = self.build_request(Method::GET, segments, ACCEPT_JSON)?;
        let response = self.send_checked(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(WorkbenchApiError::from)
    }

    /// Posts a stage request and drains its progress stream until the remote
    /// side completes, fails, or closes the stream.
    pub async fn stream_stage(
        &self,
        segments: &[&str],
        options: &StageOptions,
        on_progress: ProgressSink<'_>,
    ) -> Result<StageOutcome, WorkbenchApiError> {
        let request = self
            .build_request(Method::POST, segments, ACCEPT_EVENT_STREAM)?
            .json(options);
        let response = self.send_checked(request).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(WorkbenchApiError::from)?;
            for frame in parser.feed(&chunk) {
                match frame {
                    StreamFrame::Progress(event) => on_progress(event),
                    StreamFrame::Complete { result } => return Ok(StageOutcome::new(result)),
                    StreamFrame::Failed { message } => {
                        return Err(WorkbenchApiError::StageFailed { message })
                    }
                }
            }
        }

        if !parser.is_empty_buffer() {
            tracing::warn!("stage stream ended with an incomplete trailing frame");
        }

        Ok(StageOutcome::default())
    }
}

#[async_trait]
impl WorkbenchBackend for WorkbenchApiClient {
    async fn create_session(&self, project_name: &str) -> Result<SessionInfo, WorkbenchApiError> {
        let request = self
            .build_request(Method::POST, &["sessions"], ACCEPT_JSON)?
            .json(&json!({ "project_name": project_name }));
        let response = self.send_checked(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(WorkbenchApiError::from)
    }

    async fn close_session(&self, session_id: &str) -> Result<(), WorkbenchApiError> {
        let request = self.build_request(Method::DELETE, &["sessions", session_id], ACCEPT_JSON)?;
        self.send_checked(request).await?;
        Ok(())
    }

    async fn analyze(
        &self,
        project: &str,
        options: &StageOptions,
        on_progress: ProgressSink<'_>,
    ) -> Result<StageOutcome, WorkbenchApiError> {
        self.stream_stage(&["projects", project, "analyze"], options, on_progress)
            .await
    }

    async fn generate_dashboard(
        &self,
        project: &str,
        options: &StageOptions,
        on_progress: ProgressSink<'_>,
    ) -> Result<StageOutcome, WorkbenchApiError> {
        self.stream_stage(&["projects", project, "dashboard"], options, on_progress)
            .await
    }

    async fn get_metadata(&self, project: &str) -> Result<Metadata, WorkbenchApiError> {
        self.get_json(&["projects", project, "metadata"]).await
    }

    async fn get_dashboard(
        &self,
        project: &str,
        dashboard_id: &str,
    ) -> Result<Dashboard, WorkbenchApiError> {
        self.get_json(&["projects", project, "dashboards", dashboard_id])
            .await
    }
}
