//! Error handling and custom error types
//!
//! Provides unified error handling across the generation pipeline using thiserror.
//! Remote failures carry a typed [`RemoteErrorKind`] so callers classify them with
//! a pattern match instead of inspecting message text.

use std::fmt;
use thiserror::Error;

/// Classification of a failed call to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Rate limit or quota exhausted on the service side.
    QuotaExceeded,
    /// API key missing, invalid or lacking permission.
    InvalidCredential,
    /// The request never produced an HTTP response.
    Network,
    /// The service answered with an error or an unusable body.
    Service,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorKind::QuotaExceeded => "quota exceeded",
            RemoteErrorKind::InvalidCredential => "invalid credential",
            RemoteErrorKind::Network => "network error",
            RemoteErrorKind::Service => "service error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Output of a workflow phase that finished before a later phase failed.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletedPhase {
    Knowledge(crate::models::KnowledgeBase),
    Draft(crate::models::ContentBundle),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Input rejected: {0}")]
    InputRejected(String),

    #[error("Payload too large: {size} bytes exceeds the {limit} byte ceiling")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Remote call failed: {0}")]
    Remote(RemoteError),

    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("Job {job_id} timed out after {attempts} polls")]
    JobTimedOut { job_id: String, attempts: u32 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Phase failed after earlier phases completed: {source}")]
    PhaseFailed {
        completed: Box<CompletedPhase>,
        #[source]
        source: Box<Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_decode() {
            RemoteErrorKind::Service
        } else {
            RemoteErrorKind::Network
        };
        let remote = RemoteError::new(kind, err.to_string());
        match err.status() {
            Some(status) => Error::Remote(remote.with_status(status.as_u16())),
            None => Error::Remote(remote),
        }
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::Remote(err)
    }
}

impl Error {
    /// Remote error kind, if this error came from the generation service.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Error::Remote(remote) => Some(remote.kind),
            Error::PhaseFailed { source, .. } => source.remote_kind(),
            _ => None,
        }
    }

    /// Whether a single orchestrator-level retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.remote_kind(),
            Some(RemoteErrorKind::Network | RemoteErrorKind::Service)
        )
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::InputRejected(_) => "This input type is not supported.",
            Error::PayloadTooLarge { .. } => "The file is too large for this workflow.",
            Error::Extraction(_) => {
                "The document could not be read. It may be empty or password-protected."
            }
            Error::Remote(remote) => match remote.kind {
                RemoteErrorKind::QuotaExceeded => {
                    "The generation quota is exhausted. Please try again later."
                }
                RemoteErrorKind::InvalidCredential => {
                    "The API key is missing or invalid. Check your settings."
                }
                RemoteErrorKind::Network => {
                    "Could not reach the generation service. Check your connection."
                }
                RemoteErrorKind::Service => "The generation service returned an error.",
            },
            Error::JobFailed { .. } => "The remote job failed.",
            Error::JobTimedOut { .. } => "The remote job took too long and was stopped.",
            Error::Parse(_) => "The response could not be understood. Please retry.",
            Error::AudioGenerationFailed(_) => "No audio was produced. Please retry.",
            Error::Cancelled => "The operation was cancelled.",
            Error::PhaseFailed { source, .. } => source.user_message(),
            Error::Config(_) => "The application is not configured correctly.",
            Error::Io(_) | Error::Serialization(_) => "Something went wrong. Please retry.",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
