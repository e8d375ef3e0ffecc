//! Pipeline orchestration
//!
//! A [`Workflow`] is a short, fixed sequence of generation calls. [`Pipeline::run`]
//! validates the input, charges the workflow's cost, runs the phases strictly in
//! order and hands the artifact to the [`ArtifactSink`]. On failure the cost is
//! refunded according to the configured [`RefundPolicy`].
//!
//! Two-phase workflows keep the first phase's output when the second phase
//! fails ([`Error::PhaseFailed`]); [`Pipeline::resume`] continues from it
//! without repeating the first call.

pub mod jobs;
pub mod sink;

pub use jobs::{FileActivation, VideoSynthesis};
pub use sink::{ArtifactSink, LoggingSink, RecordingSink, SinkEvent};

use crate::ai::{
    FileService, GeminiFileClient, GeminiGenerationClient, GeminiVideoClient, GenerationService,
    RemoteFile, VideoRequest, VideoService,
};
use crate::audio::{self, AudioArtifact};
use crate::error::{CompletedPhase, RemoteError, RemoteErrorKind};
use crate::input::{mime, InputLimits, InputNormalizer, SourceInput};
use crate::models::{
    Config, ContentBundle, ContentPart, CourseOutline, GenerationConfig, KnowledgeBase, Modality,
    OutputFormat, RawResponse, RefundPolicy, RequestPayload, BASE_TEMPERATURE,
};
use crate::poller::{PollPolicy, PollTask};
use crate::{prompts, sanitize, Error, Result};
use base64::Engine as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MIN_COURSE_MODULES: &str = "3";
const MAX_COURSE_MODULES: &str = "8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    /// Source material → knowledge base → course outline.
    RefineThenArchitect,
    /// Source material → content bundle, optionally polished by a second call.
    AnalyzeThenRefine { polish: bool },
    Transcribe,
    Narrate,
    GenerateImage,
    GenerateVideo,
}

impl Workflow {
    pub fn name(&self) -> &'static str {
        match self {
            Workflow::RefineThenArchitect => "course",
            Workflow::AnalyzeThenRefine { .. } => "content",
            Workflow::Transcribe => "transcribe",
            Workflow::Narrate => "narrate",
            Workflow::GenerateImage => "image",
            Workflow::GenerateVideo => "video",
        }
    }

    fn check_input(&self, input: &SourceInput) -> Result<()> {
        let accepted = match self {
            Workflow::RefineThenArchitect | Workflow::AnalyzeThenRefine { .. } => true,
            Workflow::Transcribe => matches!(input, SourceInput::Audio { .. }),
            Workflow::Narrate | Workflow::GenerateImage | Workflow::GenerateVideo => {
                matches!(input, SourceInput::Text(_))
            }
        };
        if accepted {
            Ok(())
        } else {
            Err(Error::InputRejected(format!(
                "The {} workflow does not accept {} input",
                self.name(),
                input.kind()
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// The user-facing artifact of a workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowResult {
    Course {
        knowledge: KnowledgeBase,
        outline: CourseOutline,
    },
    Content {
        draft: ContentBundle,
        polished: Option<ContentBundle>,
    },
    Transcript(String),
    Audio(AudioArtifact),
    Image(GeneratedImage),
    Video {
        uri: String,
    },
}

impl WorkflowResult {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowResult::Course { .. } => "course",
            WorkflowResult::Content { .. } => "content",
            WorkflowResult::Transcript(_) => "transcript",
            WorkflowResult::Audio(_) => "audio",
            WorkflowResult::Image(_) => "image",
            WorkflowResult::Video { .. } => "video",
        }
    }
}

/// Credits charged per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostSchedule {
    pub refine: u32,
    pub architect: u32,
    pub analyze: u32,
    pub polish: u32,
    pub transcribe: u32,
    pub narrate: u32,
    pub image: u32,
    pub video: u32,
}

impl Default for CostSchedule {
    fn default() -> Self {
        Self {
            refine: 1,
            architect: 2,
            analyze: 2,
            polish: 1,
            transcribe: 1,
            narrate: 2,
            image: 1,
            video: 10,
        }
    }
}

impl CostSchedule {
    pub fn cost_of(&self, workflow: Workflow) -> u32 {
        match workflow {
            Workflow::RefineThenArchitect => self.refine + self.architect,
            Workflow::AnalyzeThenRefine { polish: true } => self.analyze + self.polish,
            Workflow::AnalyzeThenRefine { polish: false } => self.analyze,
            Workflow::Transcribe => self.transcribe,
            Workflow::Narrate => self.narrate,
            Workflow::GenerateImage => self.image,
            Workflow::GenerateVideo => self.video,
        }
    }
}

/// Models, temperatures and timing used by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub text_model: String,
    pub image_model: String,
    pub tts_model: String,
    pub video_model: String,
    pub voice: String,
    pub temperature: f32,
    pub max_pages: usize,
    pub file_poll: PollPolicy,
    pub video_poll: PollPolicy,
    pub refund_policy: RefundPolicy,
    /// Pause before the single retry of a failed phase.
    pub retry_delay: Duration,
    pub video_aspect_ratio: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            text_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            video_model: "veo-3.0-generate-001".to_string(),
            voice: "Kore".to_string(),
            temperature: BASE_TEMPERATURE,
            max_pages: 20,
            file_poll: PollPolicy {
                interval: Duration::from_secs(2),
                max_attempts: 60,
            },
            video_poll: PollPolicy {
                interval: Duration::from_secs(10),
                max_attempts: 60,
            },
            refund_policy: RefundPolicy::OnFailure,
            retry_delay: Duration::from_millis(2000),
            video_aspect_ratio: Some("16:9".to_string()),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            tts_model: config.tts_model.clone(),
            video_model: config.video_model.clone(),
            voice: config.tts_voice.clone(),
            temperature: config.base_temperature,
            max_pages: config.max_pages,
            file_poll: config.file_poll.into(),
            video_poll: config.video_poll.into(),
            refund_policy: config.refund_policy,
            ..Self::default()
        }
    }
}

/// Injectable service bundle used to construct a [`Pipeline`].
#[derive(Clone)]
pub struct PipelineServices {
    pub generation: Arc<dyn GenerationService>,
    pub files: Arc<dyn FileService>,
    pub video: Arc<dyn VideoService>,
}

/// Runs workflows against the generation service.
///
/// Cancelling a pipeline stops its outstanding polls and discards results of
/// calls that finish afterwards. A cancelled pipeline stays cancelled.
pub struct Pipeline {
    services: PipelineServices,
    normalizer: InputNormalizer,
    settings: PipelineSettings,
    costs: CostSchedule,
    sink: Arc<dyn ArtifactSink>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Build a pipeline from concrete service dependencies.
    pub fn with_services(services: PipelineServices, settings: PipelineSettings) -> Self {
        let normalizer = InputNormalizer::new(
            InputLimits::default().with_default_max_pages(settings.max_pages),
        );
        Self {
            services,
            normalizer,
            settings,
            costs: CostSchedule::default(),
            sink: Arc::new(LoggingSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Gemini-backed pipeline from environment configuration.
    pub fn from_config(config: &Config) -> Self {
        // Reuse one HTTP connection pool across the service clients.
        let http_client = reqwest::Client::new();
        let api_key = config.gemini_api_key.clone();

        let mut generation =
            GeminiGenerationClient::new_with_client(api_key.clone(), http_client.clone());
        let mut files = GeminiFileClient::new_with_client(api_key.clone(), http_client.clone());
        let mut video = GeminiVideoClient::new_with_client(api_key, http_client);
        if let Some(base_url) = &config.gemini_base_url {
            info!("Using Gemini base URL {}", base_url);
            generation = generation.with_base_url(base_url.clone());
            files = files.with_base_url(base_url.clone());
            video = video.with_base_url(base_url.clone());
        }

        info!(
            "Models: text={}, image={}, speech={}, video={}",
            config.text_model, config.image_model, config.tts_model, config.video_model
        );

        Self::with_services(
            PipelineServices {
                generation: Arc::new(generation),
                files: Arc::new(files),
                video: Arc::new(video),
            },
            PipelineSettings::from(config),
        )
    }

    pub fn with_normalizer(mut self, normalizer: InputNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_costs(mut self, costs: CostSchedule) -> Self {
        self.costs = costs;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn normalizer(&self) -> &InputNormalizer {
        &self.normalizer
    }

    /// Stop outstanding polls and discard late results.
    pub fn cancel(&self) {
        info!("Pipeline cancelled");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `workflow` on `input`.
    ///
    /// Input is validated before anything is charged or sent.
    pub async fn run(&self, workflow: Workflow, input: &SourceInput) -> Result<WorkflowResult> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        workflow.check_input(input)?;
        self.normalizer.validate(input)?;

        info!(
            "[{}] Starting workflow with {} input ({} bytes)",
            workflow.name(),
            input.kind(),
            input.byte_len()
        );
        let cost = self.costs.cost_of(workflow);
        self.charged(workflow, cost, self.execute(workflow, input))
            .await
    }

    /// Finish a two-phase workflow whose first phase already completed.
    ///
    /// Only the remaining phase is charged.
    pub async fn resume(&self, completed: CompletedPhase) -> Result<WorkflowResult> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match completed {
            CompletedPhase::Knowledge(knowledge) => {
                self.charged(
                    Workflow::RefineThenArchitect,
                    self.costs.architect,
                    self.finish_course(knowledge),
                )
                .await
            }
            CompletedPhase::Draft(draft) => {
                self.charged(
                    Workflow::AnalyzeThenRefine { polish: true },
                    self.costs.polish,
                    self.finish_content(draft),
                )
                .await
            }
        }
    }

    async fn charged<F>(&self, workflow: Workflow, cost: u32, work: F) -> Result<WorkflowResult>
    where
        F: Future<Output = Result<WorkflowResult>>,
    {
        if cost > 0 {
            self.sink.on_cost_incurred(workflow, cost);
        }

        let outcome = match work.await {
            Ok(_) if self.cancel.is_cancelled() => Err(Error::Cancelled),
            other => other,
        };

        match &outcome {
            Ok(artifact) => {
                info!("[{}] Workflow complete: {}", workflow.name(), artifact.kind());
                self.sink.on_artifact_ready(workflow, artifact);
            }
            Err(e) => {
                error!("[{}] Workflow failed: {}", workflow.name(), e);
                if cost > 0 && self.settings.refund_policy == RefundPolicy::OnFailure {
                    self.sink.on_cost_refunded(workflow, cost);
                }
            }
        }
        outcome
    }

    async fn execute(&self, workflow: Workflow, input: &SourceInput) -> Result<WorkflowResult> {
        match workflow {
            Workflow::RefineThenArchitect => {
                let knowledge = self.refine_knowledge(input).await?;
                self.finish_course(knowledge).await
            }
            Workflow::AnalyzeThenRefine { polish } => {
                let draft = self.analyze(input).await?;
                if polish {
                    self.finish_content(draft).await
                } else {
                    Ok(WorkflowResult::Content {
                        draft,
                        polished: None,
                    })
                }
            }
            Workflow::Transcribe => self.transcribe(input).await.map(WorkflowResult::Transcript),
            Workflow::Narrate => self
                .narrate(prompt_text(input)?)
                .await
                .map(WorkflowResult::Audio),
            Workflow::GenerateImage => self
                .generate_image(prompt_text(input)?)
                .await
                .map(WorkflowResult::Image),
            Workflow::GenerateVideo => self
                .generate_video(prompt_text(input)?)
                .await
                .map(|uri| WorkflowResult::Video { uri }),
        }
    }

    async fn finish_course(&self, knowledge: KnowledgeBase) -> Result<WorkflowResult> {
        match self.architect_course(&knowledge).await {
            Ok(outline) => Ok(WorkflowResult::Course { knowledge, outline }),
            Err(source) => Err(phase_failed(CompletedPhase::Knowledge(knowledge), source)),
        }
    }

    async fn finish_content(&self, draft: ContentBundle) -> Result<WorkflowResult> {
        match self.polish(&draft).await {
            Ok(polished) => Ok(WorkflowResult::Content {
                draft,
                polished: Some(polished),
            }),
            Err(source) => Err(phase_failed(CompletedPhase::Draft(draft), source)),
        }
    }

    /// Phase 1 of the course workflow: condense the source into a knowledge base.
    pub async fn refine_knowledge(&self, input: &SourceInput) -> Result<KnowledgeBase> {
        let payload = self.prepare_payload(input).await?;
        let config = self
            .text_config()
            .with_system_instruction(prompts::REFINE_SYSTEM);

        let raw = self.call_phase("refine", &payload, &config).await?;
        let text = response_text("refine", raw)?;
        info!("[refine] Knowledge base has {} chars", text.len());
        Ok(KnowledgeBase { text })
    }

    /// Phase 2 of the course workflow. The knowledge base is the only input.
    pub async fn architect_course(&self, knowledge: &KnowledgeBase) -> Result<CourseOutline> {
        let payload = RequestPayload::from_text(knowledge.text.clone());
        let config = self
            .text_config()
            .with_output_format(OutputFormat::Json)
            .with_system_instruction(prompts::render(
                prompts::ARCHITECT_SYSTEM,
                &[
                    ("min_modules", MIN_COURSE_MODULES),
                    ("max_modules", MAX_COURSE_MODULES),
                ],
            ));

        let raw = self.call_phase("architect", &payload, &config).await?;
        let outline: CourseOutline = sanitize::parse_typed(&response_text("architect", raw)?)?;
        info!(
            "[architect] Outline '{}' with {} modules",
            outline.title,
            outline.modules.len()
        );
        Ok(outline)
    }

    /// Phase 1 of the content workflow: produce a first draft.
    pub async fn analyze(&self, input: &SourceInput) -> Result<ContentBundle> {
        let payload = self.prepare_payload(input).await?;
        let config = self
            .text_config()
            .with_output_format(OutputFormat::Json)
            .with_system_instruction(prompts::ANALYZE_SYSTEM);

        let raw = self.call_phase("analyze", &payload, &config).await?;
        sanitize::parse_typed(&response_text("analyze", raw)?)
    }

    /// Phase 2 of the content workflow: improve a draft, keeping its shape.
    pub async fn polish(&self, draft: &ContentBundle) -> Result<ContentBundle> {
        let payload = RequestPayload::from_text(serde_json::to_string_pretty(draft)?);
        let config = self
            .text_config()
            .with_output_format(OutputFormat::Json)
            .with_system_instruction(prompts::POLISH_SYSTEM);

        let raw = self.call_phase("polish", &payload, &config).await?;
        sanitize::parse_typed(&response_text("polish", raw)?)
    }

    pub async fn transcribe(&self, input: &SourceInput) -> Result<String> {
        Workflow::Transcribe.check_input(input)?;

        let media = self.prepare_payload(input).await?;
        let mut parts = media.parts().to_vec();
        parts.push(ContentPart::text(prompts::TRANSCRIBE));
        let payload = RequestPayload::new(parts);

        let raw = self
            .call_phase("transcribe", &payload, &self.text_config())
            .await?;
        Ok(response_text("transcribe", raw)?.trim().to_string())
    }

    /// Synthesize speech for `script` as mono PCM16.
    pub async fn narrate(&self, script: &str) -> Result<AudioArtifact> {
        let payload =
            RequestPayload::from_text(prompts::render(prompts::NARRATE, &[("script", script)]));
        let config = GenerationConfig::new(&self.settings.tts_model)
            .with_temperature(self.settings.temperature)
            .with_modality(Modality::Audio)
            .with_voice(&self.settings.voice);

        let raw = self.call_phase("narrate", &payload, &config).await?;
        let blob = raw.inline_with_prefix("audio/").ok_or_else(|| {
            Error::AudioGenerationFailed("The response contained no audio".to_string())
        })?;

        let artifact = audio::decode_base64_pcm16(&blob.data, &blob.mime_type, 1)?;
        info!(
            "[narrate] {:.1}s of audio at {} Hz",
            artifact.playable.duration().as_secs_f32(),
            artifact.playable.sample_rate
        );
        Ok(artifact)
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage> {
        let payload =
            RequestPayload::from_text(prompts::render(prompts::IMAGE, &[("prompt", prompt)]));
        let config = GenerationConfig::new(&self.settings.image_model)
            .with_temperature(self.settings.temperature)
            .with_modality(Modality::Image);

        let raw = self.call_phase("image", &payload, &config).await?;
        let blob = raw.inline_with_prefix("image/").ok_or_else(|| {
            Error::Remote(RemoteError::new(
                RemoteErrorKind::Service,
                "The response contained no image",
            ))
        })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(blob.data.trim())
            .map_err(|e| Error::Parse(format!("Invalid base64 image data: {}", e)))?;

        Ok(GeneratedImage {
            mime_type: blob.mime_type.clone(),
            bytes,
        })
    }

    /// Start a video operation and poll it until it yields a URI.
    pub async fn generate_video(&self, prompt: &str) -> Result<String> {
        let request = VideoRequest {
            model: self.settings.video_model.clone(),
            prompt: prompts::render(prompts::VIDEO, &[("prompt", prompt)]),
            aspect_ratio: self.settings.video_aspect_ratio.clone(),
            negative_prompt: None,
        };
        let driver = VideoSynthesis::new(self.services.video.clone(), request);

        let task = PollTask::spawn(
            Arc::new(driver),
            self.settings.video_poll,
            self.cancel.child_token(),
        );
        task.join().await?.into_result()
    }

    /// Payload for source material; large audio goes through the file service.
    async fn prepare_payload(&self, input: &SourceInput) -> Result<RequestPayload> {
        match input {
            SourceInput::Audio { bytes, mime_type } if self.normalizer.requires_upload(input) => {
                self.normalizer.validate(input)?;
                let file = self.upload_and_activate(bytes, mime_type).await?;
                let uri = file.uri.ok_or_else(|| Error::JobFailed {
                    job_id: file.name.clone(),
                    reason: "Uploaded file has no URI".to_string(),
                })?;
                Ok(RequestPayload::new(vec![ContentPart::FileRef {
                    mime_type: mime::essence(mime_type),
                    uri,
                }]))
            }
            _ => {
                self.normalizer
                    .normalize(input, Some(self.settings.max_pages))
                    .await
            }
        }
    }

    async fn upload_and_activate(&self, bytes: &[u8], mime_type: &str) -> Result<RemoteFile> {
        info!(
            "Audio is {} bytes, uploading instead of sending inline",
            bytes.len()
        );
        let driver = FileActivation::new(
            self.services.files.clone(),
            bytes.to_vec(),
            mime::essence(mime_type),
            "source-audio",
        );

        let task = PollTask::spawn(
            Arc::new(driver),
            self.settings.file_poll,
            self.cancel.child_token(),
        );
        task.join().await?.into_result()
    }

    fn text_config(&self) -> GenerationConfig {
        GenerationConfig::new(&self.settings.text_model).with_temperature(self.settings.temperature)
    }

    /// One generation call, retried once on a retryable error.
    async fn call_phase(
        &self,
        phase: &str,
        payload: &RequestPayload,
        config: &GenerationConfig,
    ) -> Result<RawResponse> {
        let generation = &self.services.generation;
        let strategy = FixedInterval::new(self.settings.retry_delay).take(1);

        let call = RetryIf::start(
            strategy,
            || async move {
                debug!("[{}] Invoking {}", phase, config.model);
                generation.invoke(payload, config).await
            },
            |e: &Error| {
                let retry = e.is_retryable();
                if retry {
                    warn!("[{}] Call failed, retrying once: {}", phase, e);
                }
                retry
            },
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("[{}] Cancelled, discarding in-flight call", phase);
                Err(Error::Cancelled)
            }
            result = call => result,
        }
    }
}

fn phase_failed(completed: CompletedPhase, source: Error) -> Error {
    match source {
        Error::Cancelled => Error::Cancelled,
        source => Error::PhaseFailed {
            completed: Box::new(completed),
            source: Box::new(source),
        },
    }
}

fn prompt_text(input: &SourceInput) -> Result<&str> {
    match input {
        SourceInput::Text(text) => Ok(text),
        other => Err(Error::InputRejected(format!(
            "Expected a text prompt, got {} input",
            other.kind()
        ))),
    }
}

fn response_text(phase: &str, raw: RawResponse) -> Result<String> {
    raw.text
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| Error::Parse(format!("The {} phase returned no text", phase)))
}
