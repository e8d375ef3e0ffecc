//! Generation service integration
//!
//! Traits for the three remote capabilities the pipeline needs: one-shot
//! content generation, the file-upload sub-protocol used for large audio, and
//! long-running video operations. Gemini implements all three; the mocks
//! script them for tests.

pub mod gemini;
pub mod mock;

pub use gemini::{GeminiFileClient, GeminiGenerationClient, GeminiHttpClient, GeminiVideoClient};
pub use mock::{MockFileClient, MockGenerationClient, MockVideoClient};

use crate::models::{GenerationConfig, RawResponse, RequestPayload};
use crate::Result;
use async_trait::async_trait;

/// One network round-trip to the generation service. Never retries.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn invoke(
        &self,
        payload: &RequestPayload,
        config: &GenerationConfig,
    ) -> Result<RawResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed,
    Unspecified,
}

/// A file stored on the service side.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub name: String,
    pub uri: Option<String>,
    pub mime_type: String,
    pub state: FileState,
}

#[async_trait]
pub trait FileService: Send + Sync {
    async fn upload(&self, bytes: &[u8], mime_type: &str, display_name: &str)
        -> Result<RemoteFile>;

    async fn get_file(&self, name: &str) -> Result<RemoteFile>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: Option<String>,
    pub negative_prompt: Option<String>,
}

/// Snapshot of a long-running video operation.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOperation {
    pub name: String,
    pub done: bool,
    pub video_uri: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait VideoService: Send + Sync {
    /// Start synthesis, returning the operation name to poll.
    async fn submit_video(&self, request: &VideoRequest) -> Result<String>;

    async fn get_operation(&self, name: &str) -> Result<VideoOperation>;
}
