//! HTTP job gateway: the submit and status-query boundaries over one API.
//!
//! Every response is an envelope: `{"code": 1, "data": {...}}` on success,
//! `{"code": 0, "error_code": .., "message": .., "failure_code": ..}` on
//! failure.

use async_trait::async_trait;
use genroute_core::error::{ErrorCode, GenError};
use genroute_core::provider::Provider;
use genroute_core::task::{JobBoard, StatusQuery, Task, TaskId};
use genroute_core::types::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    failure_code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    task_ids: Vec<TaskId>,
}

#[derive(Debug, Deserialize)]
struct TasksData {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Unwrap an envelope into its data or the error it carries.
///
/// Generic failures become provider errors so fallback predicates can see
/// the provider's failure code; every other code is kept as an envelope error.
fn open_envelope<T>(envelope: Envelope<T>) -> Result<T, GenError> {
    if envelope.code != 0 {
        return envelope
            .data
            .ok_or_else(|| GenError::provider("gateway response has no data"));
    }

    let message = envelope
        .message
        .unwrap_or_else(|| "generation failed".to_string());
    let code = envelope
        .error_code
        .map_or(ErrorCode::GenerationFailed, ErrorCode::from_wire);

    if code != ErrorCode::GenerationFailed {
        return Err(GenError::envelope(code, message));
    }

    match envelope.failure_code {
        Some(serde_json::Value::String(s)) if !s.is_empty() => {
            Err(GenError::provider_with_code(message, s))
        }
        Some(serde_json::Value::Number(n)) => {
            Err(GenError::provider_with_code(message, n.to_string()))
        }
        _ => Err(GenError::envelope(code, message)),
    }
}

/// HTTP client for the job gateway
#[derive(Clone)]
pub struct HttpGateway {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    info: Arc<ProviderInfo>,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("info", &self.info)
            .finish()
    }
}

impl HttpGateway {
    /// Create a builder for the gateway
    pub fn builder() -> HttpGatewayBuilder {
        HttpGatewayBuilder::default()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GenError> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenError::provider_with_code(
                format!("gateway returned {}: {}", status, body),
                status.as_u16().to_string(),
            ));
        }

        let envelope: Envelope<T> = response.json().await?;
        open_envelope(envelope)
    }
}

#[async_trait]
impl Provider for HttpGateway {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    async fn submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        debug!(request_id = %call.request_id, model = %call.model, "submitting to gateway");
        let request = self.http.post(self.url("submit")).json(&call);
        let data: SubmitData = self.send(request).await?;
        if data.task_ids.is_empty() {
            return Err(GenError::provider("gateway returned no task ids"));
        }
        Ok(SubmitResponse {
            task_ids: data.task_ids,
        })
    }
}

#[async_trait]
impl JobBoard for HttpGateway {
    async fn query(&self, query: StatusQuery) -> Result<Vec<Task>, GenError> {
        debug!(tasks = query.task_ids.len(), tool = ?query.tool, "querying task status");
        let request = self.http.post(self.url("query")).json(&query);
        let data: TasksData = self.send(request).await?;
        Ok(data.tasks)
    }

    async fn load_results(&self, tool: &str) -> Result<Vec<Task>, GenError> {
        let request = self.http.get(self.url("results")).query(&[("tool", tool)]);
        let data: TasksData = self.send(request).await?;
        Ok(data.tasks)
    }
}

/// Builder for [`HttpGateway`]
#[derive(Default)]
pub struct HttpGatewayBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl HttpGatewayBuilder {
    /// Gateway base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Bearer token sent with every request
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the gateway client
    pub fn build(self) -> Result<HttpGateway, GenError> {
        let base_url = self
            .base_url
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
            .ok_or_else(|| GenError::configuration("gateway base URL must be http(s)"))?;

        let mut http = Client::builder();
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| GenError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpGateway {
            http,
            base_url,
            api_key: self.api_key,
            info: Arc::new(ProviderInfo {
                id: "gateway".to_string(),
                name: "Job Gateway".to_string(),
            }),
        })
    }
}
