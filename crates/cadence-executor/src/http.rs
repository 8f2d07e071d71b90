use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cadence_core::{AuthType, HttpJob, Job, JobType};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, StatusCode, Url};
use tracing::debug;

use crate::error::ExecutorError;
use crate::executor::Executor;

/// Transport seam for [`HttpExecutor`]. Implemented for `reqwest::Client`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: Request) -> Result<StatusCode, reqwest::Error>;
}

#[async_trait]
impl HttpClient for reqwest::Client {
    async fn send(&self, request: Request) -> Result<StatusCode, reqwest::Error> {
        self.execute(request).await.map(|response| response.status())
    }
}

pub struct HttpExecutor {
    client: Arc<dyn HttpClient>,
}

impl HttpExecutor {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, job: &Job) -> Result<(), ExecutorError> {
        let http_job = job
            .http_job
            .as_ref()
            .ok_or(ExecutorError::UnsupportedJobType(JobType::Http))?;
        let request = build_request(http_job)?;
        debug!(
            job_id = %job.id,
            method = %request.method(),
            url = %request.url(),
            "sending request"
        );

        let status = self.client.send(request).await?;
        if http_job.accepts_status(status.as_u16()) {
            Ok(())
        } else {
            Err(ExecutorError::InvalidResponseCode {
                status: status.as_u16(),
            })
        }
    }
}

/// Schemeless URLs default to HTTPS.
fn normalize_url(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

fn build_request(http_job: &HttpJob) -> Result<Request, ExecutorError> {
    let method = Method::from_bytes(http_job.method.to_uppercase().as_bytes())
        .map_err(|e| ExecutorError::InvalidRequest(format!("method {:?}: {e}", http_job.method)))?;
    let url = Url::parse(&normalize_url(&http_job.url))
        .map_err(|e| ExecutorError::InvalidRequest(format!("url {:?}: {e}", http_job.url)))?;

    let mut request = Request::new(method, url);
    let headers = request.headers_mut();
    for (name, value) in &http_job.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ExecutorError::InvalidRequest(format!("header {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ExecutorError::InvalidRequest(format!("header value: {e}")))?;
        headers.insert(name, value);
    }
    if let Some(value) = authorization(http_job)? {
        headers.insert(AUTHORIZATION, value);
    }

    if let Some(body) = http_job.body.as_ref().filter(|body| !body.is_empty()) {
        *request.body_mut() = Some(body.clone().into());
    }
    Ok(request)
}

fn authorization(http_job: &HttpJob) -> Result<Option<HeaderValue>, ExecutorError> {
    let auth = &http_job.auth;
    let raw = match auth.auth_type {
        AuthType::None => return Ok(None),
        AuthType::Basic => {
            let credentials = format!(
                "{}:{}",
                auth.username.as_deref().unwrap_or_default(),
                auth.password.as_deref().unwrap_or_default()
            );
            format!("Basic {}", STANDARD.encode(credentials))
        }
        AuthType::Bearer => format!("Bearer {}", auth.bearer_token.as_deref().unwrap_or_default()),
    };
    let mut value = HeaderValue::from_str(&raw)
        .map_err(|e| ExecutorError::InvalidRequest(format!("authorization header: {e}")))?;
    value.set_sensitive(true);
    Ok(Some(value))
}
