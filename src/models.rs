//! Data models and structures
//!
//! Defines the request payload handed to the generation service, the explicit
//! generation configuration, the raw response envelope, the JSON shapes each
//! workflow expects back, and the environment-driven application config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Documented base temperature used when no workflow overrides it.
pub const BASE_TEMPERATURE: f32 = 0.7;

/// A single content part of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContentPart {
    Text {
        data: String,
    },
    /// Base64-encoded binary sent inline with the request.
    InlineBinary {
        mime_type: String,
        data: String,
    },
    /// Reference to a file previously uploaded to the service.
    FileRef {
        mime_type: String,
        uri: String,
    },
}

impl ContentPart {
    pub fn text(data: impl Into<String>) -> Self {
        ContentPart::Text { data: data.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { data } => Some(data),
            _ => None,
        }
    }
}

/// Augmentation tools the remote model may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    WebSearch,
}

/// Canonical request built fresh for every call.
///
/// Fields are private; once built a payload cannot be changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestPayload {
    parts: Vec<ContentPart>,
    tools: Vec<Tool>,
    model: Option<String>,
}

impl RequestPayload {
    pub fn new(parts: Vec<ContentPart>) -> Self {
        Self {
            parts,
            tools: Vec::new(),
            model: None,
        }
    }

    /// Payload consisting of exactly one text part.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentPart::text(text)])
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        if !self.tools.contains(&tool) {
            self.tools.push(tool);
        }
        self
    }

    /// Target a specific model; takes precedence over [`GenerationConfig::model`].
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// The text of the payload when it consists of a single text part.
    pub fn sole_text(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [part] => part.as_text(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modality {
    #[default]
    Text,
    Image,
    Audio,
}

/// Explicit per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub output_format: OutputFormat,
    pub tools: Vec<Tool>,
    pub system_instruction: Option<String>,
    pub modality: Modality,
    /// Prebuilt voice name, only used with [`Modality::Audio`].
    pub voice: Option<String>,
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: BASE_TEMPERATURE,
            output_format: OutputFormat::Text,
            tools: Vec::new(),
            system_instruction: None,
            modality: Modality::Text,
            voice: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        if !self.tools.contains(&tool) {
            self.tools.push(tool);
        }
        self
    }

    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

/// Inline binary returned by the service (base64 data).
#[derive(Debug, Clone, PartialEq)]
pub struct InlineBlob {
    pub mime_type: String,
    pub data: String,
}

/// Unprocessed result of a single generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub text: Option<String>,
    pub inline: Vec<InlineBlob>,
    pub finish_reason: Option<String>,
}

impl RawResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// First inline blob whose MIME type starts with `prefix`.
    pub fn inline_with_prefix(&self, prefix: &str) -> Option<&InlineBlob> {
        self.inline
            .iter()
            .find(|blob| blob.mime_type.starts_with(prefix))
    }
}

/// Free-text knowledge base produced by the refine phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub title: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lessons: Vec<Lesson>,
}

/// Structured course outline produced by the architect phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_audience: Option<String>,
    pub modules: Vec<CourseModule>,
    #[serde(default)]
    pub suggested_price: Option<f64>,
}

/// Article/podcast bundle produced by the analyze and polish phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBundle {
    #[serde(rename = "thinking_process", default)]
    pub thinking_process: Option<String>,
    pub summary: String,
    pub article: String,
    pub podcast_script: String,
    #[serde(default)]
    pub course_structure: Option<serde_json::Value>,
}

/// Which refund decision applies when a paid workflow fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefundPolicy {
    #[default]
    OnFailure,
    Never,
}

/// Poll cadence for a long-running job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_base_url: Option<String>,
    pub text_model: String,
    pub image_model: String,
    pub tts_model: String,
    pub video_model: String,
    pub tts_voice: String,
    pub base_temperature: f32,
    pub max_pages: usize,
    pub file_poll: PollSettings,
    pub video_poll: PollSettings,
    pub refund_policy: RefundPolicy,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> crate::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| crate::Error::Config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| crate::Error::Config("GEMINI_API_KEY not set".to_string()))?;

        let refund_policy = if env_parse("REFUND_ON_FAILURE", true)? {
            RefundPolicy::OnFailure
        } else {
            RefundPolicy::Never
        };

        Ok(Self {
            gemini_api_key,
            gemini_base_url: std::env::var("GEMINI_BASE_URL").ok(),
            text_model: env_or("TEXT_MODEL", "gemini-2.5-flash"),
            image_model: env_or("IMAGE_MODEL", "gemini-2.5-flash-image"),
            tts_model: env_or("TTS_MODEL", "gemini-2.5-flash-preview-tts"),
            video_model: env_or("VIDEO_MODEL", "veo-3.0-generate-001"),
            tts_voice: env_or("TTS_VOICE", "Kore"),
            base_temperature: env_parse("BASE_TEMPERATURE", BASE_TEMPERATURE)?,
            max_pages: env_parse("MAX_PAGES", 20)?,
            file_poll: PollSettings {
                interval: Duration::from_millis(env_parse("FILE_POLL_INTERVAL_MS", 2000)?),
                max_attempts: env_parse("FILE_MAX_POLLS", 60)?,
            },
            video_poll: PollSettings {
                interval: Duration::from_millis(env_parse("VIDEO_POLL_INTERVAL_MS", 10_000)?),
                max_attempts: env_parse("VIDEO_MAX_POLLS", 60)?,
            },
            refund_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_sole_text() {
        let payload = RequestPayload::from_text("knowledge-base-text");
        assert_eq!(payload.sole_text(), Some("knowledge-base-text"));

        let two = RequestPayload::new(vec![ContentPart::text("a"), ContentPart::text("b")]);
        assert_eq!(two.sole_text(), None);
    }

    #[test]
    fn test_payload_tools_are_deduplicated() {
        let payload = RequestPayload::from_text("https://example.com")
            .with_tool(Tool::WebSearch)
            .with_tool(Tool::WebSearch);
        assert_eq!(payload.tools(), &[Tool::WebSearch]);
    }

    #[test]
    fn test_generation_config_defaults_to_base_temperature() {
        let config = GenerationConfig::new("gemini-2.5-flash");
        assert_eq!(config.temperature, BASE_TEMPERATURE);
        assert_eq!(config.output_format, OutputFormat::Text);
        assert!(config.tools.is_empty());
    }

    #[test]
    fn test_content_bundle_uses_workflow_field_names() {
        let json = serde_json::json!({
            "thinking_process": "steps",
            "summary": "short",
            "article": "long",
            "podcastScript": "HOST: hi",
            "courseStructure": {"modules": []}
        });

        let bundle: ContentBundle = serde_json::from_value(json).unwrap();
        assert_eq!(bundle.thinking_process.as_deref(), Some("steps"));
        assert_eq!(bundle.podcast_script, "HOST: hi");
        assert!(bundle.course_structure.is_some());
    }

    #[test]
    fn test_course_outline_requires_modules() {
        let json = serde_json::json!({ "title": "Rust" });
        assert!(serde_json::from_value::<CourseOutline>(json).is_err());
    }

    #[test]
    fn test_content_part_serializes_with_kind_tag() {
        let json = serde_json::to_value(ContentPart::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "text", "data": "hi"}));
    }
}
