use super::client::GeminiHttpClient;
use super::types::{Content, FileData, GenerateContentResponse, InlineData, Part};
use crate::ai::GenerationService;
use crate::error::{RemoteError, RemoteErrorKind};
use crate::models::{
    ContentPart, GenerationConfig, InlineBlob, Modality, OutputFormat, RawResponse,
    RequestPayload, Tool,
};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: WireGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    google_search: GoogleSearch,
}

fn to_wire_part(part: &ContentPart) -> Part {
    match part {
        ContentPart::Text { data } => Part::Text { text: data.clone() },
        ContentPart::InlineBinary { mime_type, data } => Part::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.clone(),
                data: data.clone(),
            },
        },
        ContentPart::FileRef { mime_type, uri } => Part::FileData {
            file_data: FileData {
                mime_type: mime_type.clone(),
                file_uri: uri.clone(),
            },
        },
    }
}

fn build_request(payload: &RequestPayload, config: &GenerationConfig) -> GenerateRequest {
    let mut tools: Vec<Tool> = config.tools.clone();
    for tool in payload.tools() {
        if !tools.contains(tool) {
            tools.push(*tool);
        }
    }

    // The service rejects a JSON response type combined with search grounding;
    // the sanitizer handles fenced JSON in that case.
    let response_mime_type = match config.output_format {
        OutputFormat::Json if tools.is_empty() => Some("application/json".to_string()),
        OutputFormat::Json => {
            tracing::debug!("Search tools enabled, requesting JSON through the prompt only");
            None
        }
        OutputFormat::Text => None,
    };

    let response_modalities = match config.modality {
        Modality::Text => None,
        Modality::Image => Some(vec!["IMAGE".to_string()]),
        Modality::Audio => Some(vec!["AUDIO".to_string()]),
    };

    let speech_config = match (config.modality, &config.voice) {
        (Modality::Audio, Some(voice)) => Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice.clone(),
                },
            },
        }),
        _ => None,
    };

    GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: payload.parts().iter().map(to_wire_part).collect(),
        }],
        system_instruction: config.system_instruction.as_ref().map(|text| Content {
            role: None,
            parts: vec![Part::Text { text: text.clone() }],
        }),
        generation_config: WireGenerationConfig {
            temperature: config.temperature,
            response_mime_type,
            response_modalities,
            speech_config,
        },
        tools: tools
            .iter()
            .map(|tool| match tool {
                Tool::WebSearch => WireTool {
                    google_search: GoogleSearch {},
                },
            })
            .collect(),
    }
}

fn into_raw_response(response: GenerateContentResponse) -> Result<RawResponse> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!("Prompt blocked: {}", r))
            .unwrap_or_else(|| "No candidates in Gemini response".to_string());
        return Err(Error::Remote(RemoteError::new(
            RemoteErrorKind::Service,
            reason,
        )));
    };

    let mut text = String::new();
    let mut inline = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        match part {
            Part::Text { text: chunk } => text.push_str(&chunk),
            Part::InlineData { inline_data } => inline.push(InlineBlob {
                mime_type: inline_data.mime_type,
                data: inline_data.data,
            }),
            Part::FileData { .. } | Part::Other(_) => {}
        }
    }

    Ok(RawResponse {
        text: (!text.is_empty()).then_some(text),
        inline,
        finish_reason: candidate.finish_reason,
    })
}

/// Gemini implementation of [`GenerationService`].
pub struct GeminiGenerationClient {
    http: GeminiHttpClient,
}

impl GeminiGenerationClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_client(api_key, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(api_key, Duration::from_secs(180), client),
        }
    }
}

super::impl_with_gemini_base_url!(GeminiGenerationClient);

#[async_trait]
impl GenerationService for GeminiGenerationClient {
    async fn invoke(
        &self,
        payload: &RequestPayload,
        config: &GenerationConfig,
    ) -> Result<RawResponse> {
        let model = payload.model().unwrap_or(&config.model);
        tracing::debug!(
            "Sending generateContent to {} ({} parts)",
            model,
            payload.parts().len()
        );

        let request = build_request(payload, config);
        let response: GenerateContentResponse = self.http.generate_content(model, &request).await?;
        into_raw_response(response)
    }
}
