use base64::Engine as _;
use knowledge_forge::{
    ai::{
        GeminiFileClient, GeminiGenerationClient, GeminiVideoClient, GenerationService,
        MockFileClient, MockGenerationClient, MockVideoClient,
    },
    error::RemoteErrorKind,
    input::{document, InputLimits, InputNormalizer, SourceInput},
    models::{InlineBlob, RawResponse},
    pipeline::{
        Pipeline, PipelineServices, PipelineSettings, RecordingSink, SinkEvent, Workflow,
        WorkflowResult,
    },
    poller::PollPolicy,
    sanitize::{sanitize_and_parse, SanitizedResponse},
    Error,
};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        file_poll: PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 5,
        },
        video_poll: PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 5,
        },
        retry_delay: Duration::from_millis(1),
        ..PipelineSettings::default()
    }
}

fn mock_pipeline(generation: &MockGenerationClient, settings: PipelineSettings) -> Pipeline {
    Pipeline::with_services(
        PipelineServices {
            generation: Arc::new(generation.clone()),
            files: Arc::new(MockFileClient::new()),
            video: Arc::new(MockVideoClient::new()),
        },
        settings,
    )
}

fn gemini_text(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_course_workflow_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(body_partial_json(serde_json::json!({
            "contents": [{ "parts": [{ "text": "knowledge-base-text" }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text(
            "```json\n{\"title\":\"Rust\",\"modules\":[{\"title\":\"Basics\",\"lessons\":[]}]}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(body_partial_json(serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": "my raw lecture notes" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("knowledge-base-text")))
        .expect(1)
        .mount(&server)
        .await;

    let sink = RecordingSink::new();
    let pipeline = Pipeline::with_services(
        PipelineServices {
            generation: Arc::new(
                GeminiGenerationClient::new("test-key".to_string()).with_base_url(server.uri()),
            ),
            files: Arc::new(GeminiFileClient::new("test-key".to_string()).with_base_url(server.uri())),
            video: Arc::new(GeminiVideoClient::new("test-key".to_string()).with_base_url(server.uri())),
        },
        fast_settings(),
    )
    .with_sink(Arc::new(sink.clone()));

    let result = pipeline
        .run(
            Workflow::RefineThenArchitect,
            &SourceInput::Text("my raw lecture notes".to_string()),
        )
        .await
        .unwrap();

    match result {
        WorkflowResult::Course { knowledge, outline } => {
            assert_eq!(knowledge.text, "knowledge-base-text");
            assert_eq!(outline.title, "Rust");
            assert_eq!(outline.modules[0].title, "Basics");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::CostIncurred(Workflow::RefineThenArchitect, 3),
            SinkEvent::ArtifactReady(Workflow::RefineThenArchitect),
        ]
    );
}

#[tokio::test]
async fn test_quota_error_over_http_is_typed_and_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = Pipeline::with_services(
        PipelineServices {
            generation: Arc::new(
                GeminiGenerationClient::new("test-key".to_string()).with_base_url(server.uri()),
            ),
            files: Arc::new(MockFileClient::new()),
            video: Arc::new(MockVideoClient::new()),
        },
        fast_settings(),
    );

    let err = pipeline
        .run(
            Workflow::AnalyzeThenRefine { polish: false },
            &SourceInput::Text("notes".to_string()),
        )
        .await
        .unwrap_err();

    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::QuotaExceeded));
    assert_eq!(
        err.user_message(),
        "The generation quota is exhausted. Please try again later."
    );
}

#[tokio::test]
async fn test_oversize_input_never_reaches_service() {
    let generation = MockGenerationClient::new();
    let pipeline = mock_pipeline(&generation, fast_settings()).with_normalizer(
        InputNormalizer::new(InputLimits::default().with_max_audio_bytes(1024)),
    );

    let err = pipeline
        .run(
            Workflow::Transcribe,
            &SourceInput::Audio {
                bytes: vec![0; 2048],
                mime_type: "audio/mpeg".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::PayloadTooLarge {
            size: 2048,
            limit: 1024
        }
    ));
    assert_eq!(generation.get_call_count(), 0);
}

#[tokio::test]
async fn test_ten_page_document_is_capped_at_five_pages() {
    let pages: Vec<String> = (1..=10).map(|n| format!("content of page {}", n)).collect();
    let text = pages.join("\x0C");

    let generation = MockGenerationClient::new().with_text_response("knowledge");
    let settings = PipelineSettings {
        max_pages: 5,
        ..fast_settings()
    };
    let pipeline = mock_pipeline(&generation, settings);

    pipeline
        .refine_knowledge(&SourceInput::Document {
            bytes: text.into_bytes(),
            mime_type: "text/plain".to_string(),
        })
        .await
        .unwrap();

    let payloads = generation.payloads();
    let sent = payloads[0].sole_text().unwrap();
    let expected = (1..=5)
        .map(|n| format!("{}\ncontent of page {}", document::page_marker(n), n))
        .collect::<Vec<_>>()
        .join("\n");
    assert_eq!(sent, expected);
    assert!(!sent.contains("--- Page 6 ---"));
}

fn ten_page_pdf() -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for n in 1..=10 {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Lesson{}", n))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 10,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[tokio::test]
async fn test_ten_page_pdf_file_is_capped_at_five_pages() {
    let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    file.write_all(&ten_page_pdf()).unwrap();

    let input = SourceInput::from_path(file.path()).await.unwrap();
    assert!(matches!(
        &input,
        SourceInput::Document { mime_type, .. } if mime_type == "application/pdf"
    ));

    let generation = MockGenerationClient::new().with_text_response("knowledge");
    let settings = PipelineSettings {
        max_pages: 5,
        ..fast_settings()
    };
    let pipeline = mock_pipeline(&generation, settings);
    pipeline.refine_knowledge(&input).await.unwrap();

    let payloads = generation.payloads();
    let sent = payloads[0].sole_text().unwrap();
    for n in 1..=5 {
        assert!(sent.contains(&format!("{}\nLesson{}", document::page_marker(n), n)));
    }
    assert!(!sent.contains("--- Page 6 ---"));
    assert!(!sent.contains("Lesson6"));
}

#[tokio::test]
async fn test_file_input_from_path() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    write!(file, "# Notes\nOwnership and borrowing").unwrap();

    let input = SourceInput::from_path(file.path()).await.unwrap();
    assert!(matches!(
        &input,
        SourceInput::Document { mime_type, .. } if mime_type == "text/plain"
    ));

    let generation = MockGenerationClient::new();
    let pipeline = mock_pipeline(&generation, fast_settings());
    pipeline.refine_knowledge(&input).await.unwrap();

    let payloads = generation.payloads();
    let sent = payloads[0].sole_text().unwrap();
    assert!(sent.starts_with("--- Page 1 ---\n# Notes"));
}

#[tokio::test]
async fn test_narration_produces_playable_wav() {
    let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN, 42];
    let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    let generation = MockGenerationClient::new().with_response(RawResponse {
        text: None,
        inline: vec![InlineBlob {
            mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&pcm),
        }],
        finish_reason: Some("STOP".to_string()),
    });
    let pipeline = mock_pipeline(&generation, fast_settings());

    let result = pipeline
        .run(
            Workflow::Narrate,
            &SourceInput::Text("Welcome to the course.".to_string()),
        )
        .await
        .unwrap();

    let artifact = match result {
        WorkflowResult::Audio(artifact) => artifact,
        other => panic!("unexpected result: {other:?}"),
    };

    let reader = hound::WavReader::new(std::io::Cursor::new(artifact.container_bytes.clone())).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 24_000);
    assert_eq!(spec.bits_per_sample, 16);
    let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded, samples);

    assert_eq!(artifact.playable.frames(), samples.len());
    assert_eq!(artifact.playable.channels[0][3], f32::from(i16::MAX) / 32768.0);
}

#[tokio::test]
async fn test_cancel_stops_video_polling() {
    let video = MockVideoClient::new().with_pending_polls(usize::MAX);
    let settings = PipelineSettings {
        video_poll: PollPolicy {
            interval: Duration::from_millis(10),
            max_attempts: 10_000,
        },
        ..fast_settings()
    };
    let sink = RecordingSink::new();
    let pipeline = Pipeline::with_services(
        PipelineServices {
            generation: Arc::new(MockGenerationClient::new()),
            files: Arc::new(MockFileClient::new()),
            video: Arc::new(video.clone()),
        },
        settings,
    )
    .with_sink(Arc::new(sink.clone()));

    let input = SourceInput::Text("a time-lapse of a city".to_string());
    let (result, _) = tokio::join!(
        pipeline.run(Workflow::GenerateVideo, &input),
        async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            pipeline.cancel();
        }
    );

    assert!(matches!(result, Err(Error::Cancelled)));
    let polls_at_cancel = video.get_poll_count();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(video.get_poll_count(), polls_at_cancel);
    assert_eq!(sink.net_cost(), 0);
}

#[tokio::test]
async fn test_mock_service_usable_as_trait_object() {
    let generation: Arc<dyn GenerationService> =
        Arc::new(MockGenerationClient::new().with_text_response("hello"));
    let response = generation
        .invoke(
            &knowledge_forge::models::RequestPayload::from_text("hi"),
            &knowledge_forge::models::GenerationConfig::new("gemini-2.5-flash"),
        )
        .await
        .unwrap();
    assert_eq!(response.text.as_deref(), Some("hello"));
}

#[test]
fn test_sanitizer_scenarios() {
    let fenced = sanitize_and_parse("```json\n{\"a\":1}\n```");
    assert_eq!(fenced, SanitizedResponse::Parsed(serde_json::json!({ "a": 1 })));

    let raw = sanitize_and_parse("not json at all");
    assert_eq!(
        serde_json::to_value(&raw).unwrap(),
        serde_json::json!({ "parseFailed": true, "raw": "not json at all" })
    );
}
