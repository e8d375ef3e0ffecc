//! Gemini Files API: resumable upload plus status lookup.
//!
//! Uploaded media is not usable until its state leaves `PROCESSING`; the
//! pipeline polls [`FileService::get_file`] for that.

use super::client::GeminiHttpClient;
use crate::ai::{FileService, FileState, RemoteFile};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct StartUploadRequest<'a> {
    file: StartUploadFile<'a>,
}

#[derive(Debug, Serialize)]
struct StartUploadFile<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: WireFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    name: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    state: Option<String>,
}

impl From<WireFile> for RemoteFile {
    fn from(file: WireFile) -> Self {
        let state = match file.state.as_deref() {
            Some("PROCESSING") => FileState::Processing,
            Some("ACTIVE") => FileState::Active,
            Some("FAILED") => FileState::Failed,
            _ => FileState::Unspecified,
        };
        RemoteFile {
            name: file.name,
            uri: file.uri,
            mime_type: file.mime_type,
            state,
        }
    }
}

/// Gemini implementation of [`FileService`].
pub struct GeminiFileClient {
    http: GeminiHttpClient,
}

impl GeminiFileClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_client(api_key, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(api_key, Duration::from_secs(600), client),
        }
    }

    async fn start_upload(&self, size: usize, mime_type: &str, display_name: &str) -> Result<String> {
        let url = format!("{}/upload/v1beta/files", self.http.base_url);
        let response = self
            .http
            .send(
                self.http
                    .client
                    .post(&url)
                    .header("X-Goog-Upload-Protocol", "resumable")
                    .header("X-Goog-Upload-Command", "start")
                    .header("X-Goog-Upload-Header-Content-Length", size.to_string())
                    .header("X-Goog-Upload-Header-Content-Type", mime_type)
                    .json(&StartUploadRequest {
                        file: StartUploadFile { display_name },
                    }),
            )
            .await?;

        response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Remote(RemoteError::new(
                    RemoteErrorKind::Service,
                    "Upload session response has no upload URL",
                ))
            })
    }
}

super::impl_with_gemini_base_url!(GeminiFileClient);

#[async_trait]
impl FileService for GeminiFileClient {
    async fn upload(
        &self,
        bytes: &[u8],
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile> {
        tracing::info!(
            "Uploading {} ({} bytes, {}) to Gemini Files",
            display_name,
            bytes.len(),
            mime_type
        );

        let upload_url = self.start_upload(bytes.len(), mime_type, display_name).await?;

        let response = self
            .http
            .send(
                self.http
                    .client
                    .post(&upload_url)
                    .header("X-Goog-Upload-Offset", "0")
                    .header("X-Goog-Upload-Command", "upload, finalize")
                    .body(bytes.to_vec()),
            )
            .await?;

        let uploaded: UploadResponse = GeminiHttpClient::decode(response).await?;
        Ok(uploaded.file.into())
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile> {
        let file: WireFile = self.http.get_resource(name).await?;
        Ok(file.into())
    }
}
