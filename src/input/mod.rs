//! Input normalization
//!
//! Turns a heterogeneous [`SourceInput`] into a canonical [`RequestPayload`].
//! Size and type checks run before anything else so oversize or unsupported
//! inputs never reach the network. No URL is ever fetched here; URL inputs
//! enable web search so the remote model fetches the content itself.

pub mod document;
pub mod mime;
pub mod pdf;

pub use document::{PageExtractor, PlainTextPages};
pub use pdf::PdfPages;

use crate::models::{ContentPart, RequestPayload, Tool};
use crate::{Error, Result};
use base64::Engine as _;
use std::path::Path;
use std::sync::Arc;

const MB: usize = 1024 * 1024;

/// Raw material supplied by the user. Exactly one kind per request.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceInput {
    Text(String),
    Url(String),
    Document { bytes: Vec<u8>, mime_type: String },
    Audio { bytes: Vec<u8>, mime_type: String },
    Image { bytes: Vec<u8>, mime_type: String },
}

impl SourceInput {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceInput::Text(_) => "text",
            SourceInput::Url(_) => "url",
            SourceInput::Document { .. } => "document",
            SourceInput::Audio { .. } => "audio",
            SourceInput::Image { .. } => "image",
        }
    }

    /// Size of the raw payload in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            SourceInput::Text(text) | SourceInput::Url(text) => text.len(),
            SourceInput::Document { bytes, .. }
            | SourceInput::Audio { bytes, .. }
            | SourceInput::Image { bytes, .. } => bytes.len(),
        }
    }

    /// Read a file and classify it by extension, falling back to its signature.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;

        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .map(str::to_string)
            .or_else(|| mime::sniff_mime(&bytes).map(str::to_string))
            .ok_or_else(|| {
                Error::InputRejected(format!("Cannot determine file type of {}", path.display()))
            })?;

        tracing::debug!(
            "Read {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            mime_type
        );

        Self::from_bytes(bytes, mime_type)
    }

    /// Classify raw bytes by MIME type.
    pub fn from_bytes(bytes: Vec<u8>, mime_type: String) -> Result<Self> {
        let essence = mime::essence(&mime_type);
        if essence.starts_with("audio/") {
            Ok(SourceInput::Audio { bytes, mime_type })
        } else if essence.starts_with("image/") {
            Ok(SourceInput::Image { bytes, mime_type })
        } else if mime::is_allowed(&essence, mime::DOCUMENT_MIME_TYPES) {
            Ok(SourceInput::Document { bytes, mime_type })
        } else {
            Err(Error::InputRejected(format!(
                "Unsupported file type: {}",
                mime_type
            )))
        }
    }
}

/// Byte-size ceilings and page caps applied before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    pub max_text_chars: usize,
    pub max_document_bytes: usize,
    pub max_image_bytes: usize,
    pub max_audio_bytes: usize,
    /// Audio above this size must go through the file-upload path.
    pub inline_audio_bytes: usize,
    pub default_max_pages: usize,
    pub page_cap: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_text_chars: 1_000_000,
            max_document_bytes: 20 * MB,
            max_image_bytes: 20 * MB,
            max_audio_bytes: 200 * MB,
            inline_audio_bytes: 20 * MB,
            default_max_pages: 20,
            page_cap: 300,
        }
    }
}

impl InputLimits {
    pub fn with_max_audio_bytes(mut self, limit: usize) -> Self {
        self.max_audio_bytes = limit;
        self
    }

    pub fn with_inline_audio_bytes(mut self, limit: usize) -> Self {
        self.inline_audio_bytes = limit;
        self
    }

    pub fn with_default_max_pages(mut self, pages: usize) -> Self {
        self.default_max_pages = pages;
        self
    }
}

fn check_size(size: usize, limit: usize) -> Result<()> {
    if size > limit {
        Err(Error::PayloadTooLarge { size, limit })
    } else {
        Ok(())
    }
}

fn check_mime(kind: &str, mime_type: &str, allowed: &[&str]) -> Result<()> {
    if mime::is_allowed(mime_type, allowed) {
        Ok(())
    } else {
        Err(Error::InputRejected(format!(
            "Unsupported {} type: {}",
            kind, mime_type
        )))
    }
}

pub struct InputNormalizer {
    limits: InputLimits,
    extractors: Vec<Arc<dyn PageExtractor>>,
}

impl Default for InputNormalizer {
    fn default() -> Self {
        Self::new(InputLimits::default())
    }
}

impl InputNormalizer {
    /// Normalizer with the built-in plain-text and PDF extractors.
    pub fn new(limits: InputLimits) -> Self {
        Self {
            limits,
            extractors: vec![Arc::new(PlainTextPages), Arc::new(PdfPages)],
        }
    }

    /// Register an additional extractor. It takes precedence over the built-in ones.
    pub fn with_extractor(mut self, extractor: Arc<dyn PageExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn limits(&self) -> &InputLimits {
        &self.limits
    }

    fn extractor_for(&self, mime_type: &str) -> Option<&Arc<dyn PageExtractor>> {
        // Later registrations win so callers can override the built-in one.
        self.extractors.iter().rev().find(|e| e.supports(mime_type))
    }

    /// Reject unsupported or oversize input without touching its contents.
    pub fn validate(&self, input: &SourceInput) -> Result<()> {
        match input {
            SourceInput::Text(text) => {
                if text.trim().is_empty() {
                    return Err(Error::InputRejected("Text input is empty".to_string()));
                }
                let chars = text.chars().count();
                if chars > self.limits.max_text_chars {
                    return Err(Error::InputRejected(format!(
                        "Text input has {} characters, limit is {}",
                        chars, self.limits.max_text_chars
                    )));
                }
                Ok(())
            }
            SourceInput::Url(raw) => {
                let url = reqwest::Url::parse(raw.trim())
                    .map_err(|e| Error::InputRejected(format!("Invalid URL '{}': {}", raw, e)))?;
                match url.scheme() {
                    "http" | "https" => Ok(()),
                    scheme => Err(Error::InputRejected(format!(
                        "Unsupported URL scheme: {}",
                        scheme
                    ))),
                }
            }
            SourceInput::Document { bytes, mime_type } => {
                check_mime("document", mime_type, mime::DOCUMENT_MIME_TYPES)?;
                check_size(bytes.len(), self.limits.max_document_bytes)?;
                if self.extractor_for(mime_type).is_none() {
                    return Err(Error::InputRejected(format!(
                        "No text extractor available for {}",
                        mime_type
                    )));
                }
                Ok(())
            }
            SourceInput::Audio { bytes, mime_type } => {
                check_mime("audio", mime_type, mime::AUDIO_MIME_TYPES)?;
                check_size(bytes.len(), self.limits.max_audio_bytes)
            }
            SourceInput::Image { bytes, mime_type } => {
                check_mime("image", mime_type, mime::IMAGE_MIME_TYPES)?;
                check_size(bytes.len(), self.limits.max_image_bytes)
            }
        }
    }

    /// Whether audio input must be uploaded instead of sent inline.
    pub fn requires_upload(&self, input: &SourceInput) -> bool {
        matches!(input, SourceInput::Audio { bytes, .. } if bytes.len() > self.limits.inline_audio_bytes)
    }

    /// Build the canonical request payload for `input`.
    ///
    /// `max_pages` bounds document extraction; it defaults to the configured
    /// page count and is clamped to the hard page cap.
    pub async fn normalize(
        &self,
        input: &SourceInput,
        max_pages: Option<usize>,
    ) -> Result<RequestPayload> {
        self.validate(input)?;

        match input {
            SourceInput::Text(text) => Ok(RequestPayload::from_text(text.clone())),
            SourceInput::Url(url) => {
                Ok(RequestPayload::from_text(url.trim().to_string()).with_tool(Tool::WebSearch))
            }
            SourceInput::Document { bytes, mime_type } => {
                let extractor = self.extractor_for(mime_type).ok_or_else(|| {
                    Error::InputRejected(format!("No text extractor available for {}", mime_type))
                })?;
                let pages = max_pages
                    .unwrap_or(self.limits.default_max_pages)
                    .clamp(1, self.limits.page_cap);

                let text = document::extract_pages(extractor.as_ref(), bytes, pages).await?;
                tracing::debug!("Extracted {} chars from {}", text.len(), mime_type);
                Ok(RequestPayload::from_text(text))
            }
            SourceInput::Audio { bytes, mime_type } | SourceInput::Image { bytes, mime_type } => {
                if self.requires_upload(input) {
                    return Err(Error::PayloadTooLarge {
                        size: bytes.len(),
                        limit: self.limits.inline_audio_bytes,
                    });
                }
                let data = encode_inline(bytes.clone()).await?;
                Ok(RequestPayload::new(vec![ContentPart::InlineBinary {
                    mime_type: mime::essence(mime_type),
                    data,
                }]))
            }
        }
    }
}

/// Base64-encode off the async executor; large media would stall it otherwise.
async fn encode_inline(bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || base64::engine::general_purpose::STANDARD.encode(bytes))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))
}
