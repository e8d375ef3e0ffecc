//! Gemini video generation (Veo).
//!
//! `models/{model}:predictLongRunning` returns an operation name that is
//! polled via `GET /v1beta/{name}` until `done` is true.

use super::client::GeminiHttpClient;
use crate::ai::{VideoOperation, VideoRequest, VideoService};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<VideoInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<VideoParameters>,
}

#[derive(Debug, Serialize)]
struct VideoInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LongRunningOperation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<OperationError>,
}

fn extract_video_uri(response: &serde_json::Value) -> Option<String> {
    [
        "/generateVideoResponse/generatedSamples/0/video/uri",
        "/generateVideoResponse/generatedSamples/0/videoUri",
        "/generatedVideos/0/video/uri",
    ]
    .iter()
    .find_map(|pointer| response.pointer(pointer).and_then(|v| v.as_str()))
    .map(str::to_string)
}

impl From<LongRunningOperation> for VideoOperation {
    fn from(op: LongRunningOperation) -> Self {
        let video_uri = op.response.as_ref().and_then(extract_video_uri);
        let error = op.error.map(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => format!("{} (code {})", message, code),
            (None, Some(message)) => message,
            (Some(code), None) => format!("Video generation failed (code {})", code),
            (None, None) => "Video generation failed".to_string(),
        });
        VideoOperation {
            name: op.name,
            done: op.done,
            video_uri,
            error,
        }
    }
}

/// Gemini implementation of [`VideoService`].
pub struct GeminiVideoClient {
    http: GeminiHttpClient,
}

impl GeminiVideoClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_client(api_key, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(api_key, Duration::from_secs(60), client),
        }
    }
}

super::impl_with_gemini_base_url!(GeminiVideoClient);

#[async_trait]
impl VideoService for GeminiVideoClient {
    async fn submit_video(&self, request: &VideoRequest) -> Result<String> {
        let parameters = (request.aspect_ratio.is_some() || request.negative_prompt.is_some())
            .then(|| VideoParameters {
                aspect_ratio: request.aspect_ratio.clone(),
                negative_prompt: request.negative_prompt.clone(),
            });
        let body = PredictRequest {
            instances: vec![VideoInstance {
                prompt: request.prompt.clone(),
            }],
            parameters,
        };

        let operation: LongRunningOperation = self
            .http
            .predict_long_running(&request.model, &body)
            .await?;
        tracing::info!("Video operation started: {}", operation.name);
        Ok(operation.name)
    }

    async fn get_operation(&self, name: &str) -> Result<VideoOperation> {
        let operation: LongRunningOperation = self.http.get_resource(name).await?;
        Ok(operation.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(server: &MockServer) -> GeminiVideoClient {
        GeminiVideoClient::new("key".to_string()).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_submit_returns_operation_name() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/veo-3.0-generate-001:predictLongRunning"))
            .and(body_partial_json(serde_json::json!({
                "instances": [{ "prompt": "a lighthouse at dawn" }],
                "parameters": { "aspectRatio": "16:9" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "models/veo-3.0-generate-001/operations/op123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let name = make_client(&server)
            .submit_video(&VideoRequest {
                model: "veo-3.0-generate-001".to_string(),
                prompt: "a lighthouse at dawn".to_string(),
                aspect_ratio: Some("16:9".to_string()),
                negative_prompt: None,
            })
            .await
            .unwrap();
        assert_eq!(name, "models/veo-3.0-generate-001/operations/op123");
    }

    #[tokio::test]
    async fn test_get_operation_done_with_uri() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta/operations/op123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operations/op123",
                "done": true,
                "response": {
                    "generateVideoResponse": {
                        "generatedSamples": [{ "video": { "uri": "https://files/video.mp4" } }]
                    }
                }
            })))
            .mount(&server)
            .await;

        let op = make_client(&server)
            .get_operation("operations/op123")
            .await
            .unwrap();
        assert!(op.done);
        assert_eq!(op.video_uri.as_deref(), Some("https://files/video.mp4"));
        assert!(op.error.is_none());
    }

    #[tokio::test]
    async fn test_get_operation_pending_and_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta/operations/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operations/pending"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/operations/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operations/broken",
                "done": true,
                "error": { "code": 3, "message": "prompt rejected" }
            })))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let pending = client.get_operation("operations/pending").await.unwrap();
        assert!(!pending.done);
        assert!(pending.video_uri.is_none());

        let broken = client.get_operation("operations/broken").await.unwrap();
        assert!(broken.done);
        assert_eq!(broken.error.as_deref(), Some("prompt rejected (code 3)"));
    }
}
