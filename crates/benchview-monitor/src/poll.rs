use async_trait::async_trait;
use benchview_core::{normalize_snapshot, JobStatus, NormalizeError, NormalizeReport};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http client setup failed: {0}")]
    Client(String),
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("unexpected status {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },
    #[error("malformed response body: {0}")]
    Body(String),
    #[error("malformed timeline snapshot: {0}")]
    Snapshot(#[from] NormalizeError),
}

#[async_trait]
pub trait TimelineSource: Send + Sync {
    async fn fetch_timeline(&self, job_id: &str) -> Result<NormalizeReport, TransportError>;

    async fn fetch_job_status(&self, job_id: &str) -> Result<JobStatus, TransportError>;
}

#[derive(Debug, Deserialize)]
struct JobStatusBody {
    status: JobStatus,
}

#[derive(Debug, Clone)]
pub struct HttpTimelineSource {
    http: reqwest::Client,
    api_base: String,
}

impl HttpTimelineSource {
    pub fn new(api_base: &str, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn timeline_url(&self, job_id: &str) -> String {
        format!("{}/runs/{}/timeline", self.api_base, job_id.trim())
    }

    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}/runs/{}", self.api_base, job_id.trim())
    }

    async fn get_json(&self, url: String) -> Result<Value, TransportError> {
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| TransportError::Request {
                url: url.clone(),
                reason: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
                body: truncate_body(&body),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))
    }
}

#[async_trait]
impl TimelineSource for HttpTimelineSource {
    async fn fetch_timeline(&self, job_id: &str) -> Result<NormalizeReport, TransportError> {
        let body = self.get_json(self.timeline_url(job_id)).await?;
        Ok(normalize_snapshot(&body)?)
    }

    async fn fetch_job_status(&self, job_id: &str) -> Result<JobStatus, TransportError> {
        let body = self.get_json(self.job_url(job_id)).await?;
        let parsed: JobStatusBody =
            serde_json::from_value(body).map_err(|err| TransportError::Body(err.to_string()))?;
        Ok(parsed.status)
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push_str("...");
    out
}
