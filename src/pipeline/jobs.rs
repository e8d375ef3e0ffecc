//! Long-running remote jobs driven by the poller.

use crate::ai::{FileService, FileState, RemoteFile, VideoRequest, VideoService};
use crate::poller::{JobDriver, JobHandle, JobStatus};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Upload media and wait until the service has finished processing it.
pub struct FileActivation {
    files: Arc<dyn FileService>,
    bytes: Vec<u8>,
    mime_type: String,
    display_name: String,
}

impl FileActivation {
    pub fn new(
        files: Arc<dyn FileService>,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            files,
            bytes,
            mime_type: mime_type.into(),
            display_name: display_name.into(),
        }
    }
}

#[async_trait]
impl JobDriver for FileActivation {
    type Output = RemoteFile;

    fn label(&self) -> &str {
        "file-upload"
    }

    async fn submit(&self) -> Result<JobHandle> {
        let file = self
            .files
            .upload(&self.bytes, &self.mime_type, &self.display_name)
            .await?;
        Ok(JobHandle::new(file.name))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus<RemoteFile>> {
        let file = self.files.get_file(&handle.id).await?;
        Ok(match file.state {
            FileState::Active if file.uri.is_some() => JobStatus::Done(file),
            FileState::Active => JobStatus::Failed("File is active but has no URI".to_string()),
            FileState::Failed => JobStatus::Failed("File processing failed".to_string()),
            FileState::Processing | FileState::Unspecified => JobStatus::Processing,
        })
    }
}

/// Start a video operation and wait for its output URI.
pub struct VideoSynthesis {
    video: Arc<dyn VideoService>,
    request: VideoRequest,
}

impl VideoSynthesis {
    pub fn new(video: Arc<dyn VideoService>, request: VideoRequest) -> Self {
        Self { video, request }
    }
}

#[async_trait]
impl JobDriver for VideoSynthesis {
    type Output = String;

    fn label(&self) -> &str {
        "video"
    }

    async fn submit(&self) -> Result<JobHandle> {
        let name = self.video.submit_video(&self.request).await?;
        Ok(JobHandle::new(name))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus<String>> {
        let operation = self.video.get_operation(&handle.id).await?;
        if !operation.done {
            return Ok(JobStatus::Processing);
        }
        Ok(match (operation.error, operation.video_uri) {
            (Some(error), _) => JobStatus::Failed(error),
            (None, Some(uri)) => JobStatus::Done(uri),
            (None, None) => JobStatus::Failed("Operation finished without a video".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockFileClient, MockVideoClient};
    use crate::poller::{run_to_completion, JobState, PollPolicy};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_file_activation_waits_for_active() {
        let files = MockFileClient::new().with_states(vec![
            FileState::Processing,
            FileState::Processing,
            FileState::Active,
        ]);
        let driver = FileActivation::new(Arc::new(files.clone()), vec![0; 16], "audio/mpeg", "a");

        let job = run_to_completion(&driver, fast_policy(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.state(), JobState::Done);
        assert_eq!(job.attempts(), 3);
        assert_eq!(files.get_upload_count(), 1);
        let file = job.into_result().unwrap();
        assert!(file.uri.is_some());
    }

    #[tokio::test]
    async fn test_file_activation_failed_state() {
        let files = MockFileClient::new().with_states(vec![FileState::Failed]);
        let driver = FileActivation::new(Arc::new(files), vec![0; 4], "audio/wav", "a");

        let job = run_to_completion(&driver, fast_policy(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(job.state(), JobState::Failed);
        assert!(matches!(
            job.into_result(),
            Err(crate::Error::JobFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_video_synthesis_times_out_when_never_done() {
        let video = MockVideoClient::new().with_pending_polls(100);
        let driver = VideoSynthesis::new(
            Arc::new(video.clone()),
            VideoRequest {
                model: "veo".to_string(),
                prompt: "tide pools".to_string(),
                aspect_ratio: None,
                negative_prompt: None,
            },
        );

        let job = run_to_completion(&driver, fast_policy(4), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(job.state(), JobState::TimedOut);
        assert_eq!(video.get_poll_count(), 4);
    }

    #[tokio::test]
    async fn test_video_synthesis_reports_operation_error() {
        let video = MockVideoClient::new().with_failure("safety filter");
        let driver = VideoSynthesis::new(
            Arc::new(video),
            VideoRequest {
                model: "veo".to_string(),
                prompt: "x".to_string(),
                aspect_ratio: None,
                negative_prompt: None,
            },
        );

        let err = run_to_completion(&driver, fast_policy(3), &CancellationToken::new())
            .await
            .unwrap()
            .into_result()
            .unwrap_err();
        match err {
            crate::Error::JobFailed { reason, .. } => assert_eq!(reason, "safety filter"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
