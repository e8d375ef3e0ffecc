use crate::error::{RemoteError, RemoteErrorKind};
use crate::{Error, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Lightweight Gemini REST client shared by the generation, file and video clients.
#[derive(Clone)]
pub struct GeminiHttpClient {
    pub(crate) client: Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

/// Strip a leading `models/` so callers may pass either form.
pub fn normalize_model_id(model: &str) -> &str {
    let model = model.trim().trim_matches('/');
    model.strip_prefix("models/").unwrap_or(model)
}

/// Classify a non-success response by HTTP status and the structured error body.
pub(crate) fn classify_error(status: StatusCode, body: &str) -> RemoteError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();

    let rpc_status = parsed.as_ref().and_then(|e| e.error.status.as_deref());
    let credential_reason = parsed.as_ref().is_some_and(|e| {
        e.error.details.iter().any(|d| {
            matches!(
                d.reason.as_deref(),
                Some("API_KEY_INVALID" | "API_KEY_SERVICE_BLOCKED" | "API_KEY_HTTP_REFERRER_BLOCKED")
            )
        })
    });

    let kind = if status == StatusCode::TOO_MANY_REQUESTS || rpc_status == Some("RESOURCE_EXHAUSTED")
    {
        RemoteErrorKind::QuotaExceeded
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || matches!(rpc_status, Some("UNAUTHENTICATED" | "PERMISSION_DENIED"))
        || credential_reason
    {
        RemoteErrorKind::InvalidCredential
    } else {
        RemoteErrorKind::Service
    };

    let message = parsed
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    RemoteError::new(kind, message).with_status(status.as_u16())
}

impl GeminiHttpClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, timeout, Client::new())
    }

    pub fn new_with_client(api_key: String, timeout: Duration, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
    }

    /// Send a request and turn non-success statuses into typed remote errors.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await.map_err(|e| {
            tracing::error!("Failed to send request to Gemini: {}", e);
            Error::Remote(RemoteError::new(RemoteErrorKind::Network, e.to_string()))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            return Err(Error::Remote(classify_error(status, &error_text)));
        }

        Ok(response)
    }

    pub(crate) async fn decode<Resp: DeserializeOwned>(response: Response) -> Result<Resp> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            Error::Remote(RemoteError::new(
                RemoteErrorKind::Service,
                format!("Failed to parse Gemini response: {}", e),
            ))
        })
    }

    pub(crate) async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: String,
        request: &Req,
    ) -> Result<Resp> {
        let response = self
            .send(
                self.client
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .json(request),
            )
            .await?;
        Self::decode(response).await
    }

    pub(crate) async fn get_json<Resp: DeserializeOwned>(&self, url: String) -> Result<Resp> {
        let response = self.send(self.client.get(&url)).await?;
        Self::decode(response).await
    }

    /// Calls Gemini's `generateContent` endpoint.
    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        model: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = self.api_url(&format!(
            "models/{}:generateContent",
            normalize_model_id(model)
        ));
        self.post_json(url, request).await
    }

    /// Calls Gemini's `predictLongRunning` endpoint, returning an operation.
    pub async fn predict_long_running<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        model: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = self.api_url(&format!(
            "models/{}:predictLongRunning",
            normalize_model_id(model)
        ));
        self.post_json(url, request).await
    }

    /// Fetch a named resource such as `files/abc` or `operations/xyz`.
    pub async fn get_resource<Resp: DeserializeOwned>(&self, name: &str) -> Result<Resp> {
        self.get_json(self.api_url(name)).await
    }
}
