use super::{
    FileService, FileState, GenerationService, RemoteFile, VideoOperation, VideoRequest,
    VideoService,
};
use crate::error::RemoteError;
use crate::models::{GenerationConfig, RawResponse, RequestPayload};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Scripted [`GenerationService`]. Replies are consumed in order; once they
/// run out every call returns a fixed text response.
#[derive(Clone)]
pub struct MockGenerationClient {
    replies: Arc<Mutex<VecDeque<std::result::Result<RawResponse, RemoteError>>>>,
    calls: Arc<Mutex<Vec<(RequestPayload, GenerationConfig)>>>,
    delay: Option<Duration>,
}

impl MockGenerationClient {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub fn with_text_response(self, text: impl Into<String>) -> Self {
        self.with_response(RawResponse::from_text(text))
    }

    pub fn with_response(self, response: RawResponse) -> Self {
        self.replies.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn with_error(self, error: RemoteError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<RequestPayload> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(payload, _)| payload.clone())
            .collect()
    }

    pub fn configs(&self) -> Vec<GenerationConfig> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, config)| config.clone())
            .collect()
    }
}

impl Default for MockGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationService for MockGenerationClient {
    async fn invoke(
        &self,
        payload: &RequestPayload,
        config: &GenerationConfig,
    ) -> Result<RawResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((payload.clone(), config.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(Error::Remote(error)),
            None => Ok(RawResponse::from_text("mock response")),
        }
    }
}

/// Scripted [`FileService`]. Each `get_file` pops the next state; the last
/// state repeats.
#[derive(Clone)]
pub struct MockFileClient {
    states: Arc<Mutex<VecDeque<FileState>>>,
    uploaded: Arc<Mutex<Vec<(usize, String)>>>,
    get_count: Arc<Mutex<usize>>,
    upload_error: Option<RemoteError>,
}

impl MockFileClient {
    pub fn new() -> Self {
        Self {
            states: Arc::new(Mutex::new(VecDeque::new())),
            uploaded: Arc::new(Mutex::new(Vec::new())),
            get_count: Arc::new(Mutex::new(0)),
            upload_error: None,
        }
    }

    pub fn with_states(self, states: Vec<FileState>) -> Self {
        self.states.lock().unwrap().extend(states);
        self
    }

    pub fn with_upload_error(mut self, error: RemoteError) -> Self {
        self.upload_error = Some(error);
        self
    }

    pub fn get_upload_count(&self) -> usize {
        self.uploaded.lock().unwrap().len()
    }

    pub fn get_poll_count(&self) -> usize {
        *self.get_count.lock().unwrap()
    }

    /// `(byte length, mime type)` of every upload.
    pub fn uploads(&self) -> Vec<(usize, String)> {
        self.uploaded.lock().unwrap().clone()
    }

    fn file(name: &str, mime_type: &str, state: FileState) -> RemoteFile {
        RemoteFile {
            name: name.to_string(),
            uri: Some(format!("https://mock.files/{}", name)),
            mime_type: mime_type.to_string(),
            state,
        }
    }
}

impl Default for MockFileClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileService for MockFileClient {
    async fn upload(
        &self,
        bytes: &[u8],
        mime_type: &str,
        _display_name: &str,
    ) -> Result<RemoteFile> {
        if let Some(error) = &self.upload_error {
            return Err(Error::Remote(error.clone()));
        }
        self.uploaded
            .lock()
            .unwrap()
            .push((bytes.len(), mime_type.to_string()));

        let name = format!("files/{}", Uuid::new_v4().simple());
        Ok(Self::file(&name, mime_type, FileState::Processing))
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile> {
        *self.get_count.lock().unwrap() += 1;

        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front().unwrap_or(FileState::Active)
        } else {
            states.front().copied().unwrap_or(FileState::Active)
        };
        Ok(Self::file(name, "application/octet-stream", state))
    }
}

/// Scripted [`VideoService`]: reports `pending_polls` unfinished snapshots,
/// then either a video URI or a failure.
#[derive(Clone)]
pub struct MockVideoClient {
    pending_polls: usize,
    video_uri: String,
    failure: Option<String>,
    requests: Arc<Mutex<Vec<VideoRequest>>>,
    poll_count: Arc<Mutex<usize>>,
}

impl MockVideoClient {
    pub fn new() -> Self {
        Self {
            pending_polls: 0,
            video_uri: "https://mock.files/video.mp4".to_string(),
            failure: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            poll_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn with_video_uri(mut self, uri: impl Into<String>) -> Self {
        self.video_uri = uri.into();
        self
    }

    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn requests(&self) -> Vec<VideoRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn get_poll_count(&self) -> usize {
        *self.poll_count.lock().unwrap()
    }
}

impl Default for MockVideoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoService for MockVideoClient {
    async fn submit_video(&self, request: &VideoRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(format!("operations/{}", Uuid::new_v4().simple()))
    }

    async fn get_operation(&self, name: &str) -> Result<VideoOperation> {
        let mut count = self.poll_count.lock().unwrap();
        *count += 1;

        if *count <= self.pending_polls {
            return Ok(VideoOperation {
                name: name.to_string(),
                done: false,
                video_uri: None,
                error: None,
            });
        }

        Ok(VideoOperation {
            name: name.to_string(),
            done: true,
            video_uri: self.failure.is_none().then(|| self.video_uri.clone()),
            error: self.failure.clone(),
        })
    }
}
