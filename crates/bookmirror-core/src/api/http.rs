//! JSON over HTTP client for the remote API
//!
//! Endpoints:
//! - `POST /api/sync/{kind}` -> `{"job_id": "..."}`
//! - `GET  /api/jobs/{id}` -> `Job`
//! - `GET  /api/structure/flat` -> `{"folders": [...], "notes": [...]}`
//! - `GET  /api/structure/nested` -> `[NestedSourceNode, ...]`
//! - `POST /api/search` -> `SearchResult`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Credentials, SearchApi, StructureApi, SyncApi, SyncParams};
use crate::error::{MirrorError, MirrorResult};
use crate::models::{Job, JobId, JobKind, SearchRequest, SearchResult};
use crate::structure::{FlatStructure, NestedStructure};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT: u64 = 30;

#[derive(Deserialize)]
struct IssueResponse {
    #[serde(alias = "jobId", alias = "id")]
    job_id: serde_json::Value,
}

/// HTTP implementation of the remote API traits
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    /// Token sent on read calls; job-issuing calls use explicit credentials
    read_token: Option<String>,
}

impl HttpApi {
    /// Create a client for the API at `base_url`
    pub fn new(base_url: &str) -> MirrorResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> MirrorResult<Self> {
        if base_url.trim().is_empty() {
            return Err(MirrorError::Validation("api_url".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bookmirror/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            read_token: None,
        })
    }

    /// Send `token` as bearer auth on read calls as well
    pub fn with_read_token(mut self, token: Option<String>) -> Self {
        self.read_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize_read(&self, request: RequestBuilder) -> RequestBuilder {
        match self.read_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> MirrorResult<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self
            .authorize_read(self.client.get(&url))
            .send()
            .await?;
        decode(check_status(response).await?).await
    }
}

/// Turn non-success responses into errors
async fn check_status(response: Response) -> MirrorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> MirrorResult<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Map an HTTP error status to the error taxonomy
fn status_error(status: StatusCode, body: String) -> MirrorError {
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MirrorError::Auth(message),
        _ => MirrorError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl SyncApi for HttpApi {
    async fn issue_sync_job(
        &self,
        kind: JobKind,
        credentials: &Credentials,
        params: &SyncParams,
    ) -> MirrorResult<JobId> {
        let url = self.url(&format!("sync/{}", kind.as_str()));
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(params)
            .send()
            .await?;

        let issued: IssueResponse = decode(check_status(response).await?).await?;
        match issued.job_id {
            serde_json::Value::String(id) if !id.is_empty() => Ok(id),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(MirrorError::Decode(format!(
                "Unexpected job id in response: {}",
                other
            ))),
        }
    }

    async fn get_job(&self, job_id: &str) -> MirrorResult<Job> {
        self.get_json(&format!("jobs/{}", job_id)).await
    }
}

#[async_trait]
impl StructureApi for HttpApi {
    async fn get_flat_structure(&self) -> MirrorResult<FlatStructure> {
        self.get_json("structure/flat").await
    }

    async fn get_nested_structure(&self) -> MirrorResult<NestedStructure> {
        self.get_json("structure/nested").await
    }
}

#[async_trait]
impl SearchApi for HttpApi {
    async fn execute_search(&self, request: &SearchRequest) -> MirrorResult<SearchResult> {
        let url = self.url("search");
        debug!("POST {} ({})", url, request.query());

        let response = self
            .authorize_read(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        decode(check_status(response).await?).await
    }
}
