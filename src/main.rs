use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use knowledge_forge::input::SourceInput;
use knowledge_forge::models::Config;
use knowledge_forge::pipeline::{Pipeline, Workflow, WorkflowResult};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WorkflowArg {
    Course,
    Content,
    Transcribe,
    Narrate,
    Image,
    Video,
}

#[derive(Debug, Parser)]
#[command(name = "knowledge-forge")]
#[command(about = "Turn raw material into courses, articles, audio and media")]
struct CliArgs {
    #[arg(value_enum)]
    workflow: WorkflowArg,

    /// Inline text (or the prompt for narrate/image/video).
    #[arg(long, group = "source")]
    text: Option<String>,

    /// Web page to research.
    #[arg(long, group = "source")]
    url: Option<String>,

    /// Document, audio or image file.
    #[arg(long, group = "source")]
    file: Option<PathBuf>,

    /// Run the polish pass after the content draft.
    #[arg(long)]
    polish: bool,

    /// Maximum number of document pages to extract.
    #[arg(long, value_parser = parse_max_pages)]
    max_pages: Option<usize>,

    /// Write audio, image or JSON output here.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn parse_max_pages(input: &str) -> std::result::Result<usize, String> {
    match input.parse::<usize>() {
        Ok(pages) if pages > 0 => Ok(pages),
        _ => Err(format!(
            "Invalid page count '{}'. Expected a positive integer",
            input
        )),
    }
}

impl CliArgs {
    fn workflow(&self) -> Workflow {
        match self.workflow {
            WorkflowArg::Course => Workflow::RefineThenArchitect,
            WorkflowArg::Content => Workflow::AnalyzeThenRefine {
                polish: self.polish,
            },
            WorkflowArg::Transcribe => Workflow::Transcribe,
            WorkflowArg::Narrate => Workflow::Narrate,
            WorkflowArg::Image => Workflow::GenerateImage,
            WorkflowArg::Video => Workflow::GenerateVideo,
        }
    }

    async fn source(&self) -> Result<SourceInput> {
        if let Some(text) = &self.text {
            return Ok(SourceInput::Text(text.clone()));
        }
        if let Some(url) = &self.url {
            return Ok(SourceInput::Url(url.clone()));
        }
        if let Some(path) = &self.file {
            return SourceInput::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()));
        }
        anyhow::bail!("One of --text, --url or --file is required")
    }
}

/// JSON form of a result, and the binary form when it has one.
fn render_result(result: &WorkflowResult) -> (serde_json::Value, Option<Vec<u8>>) {
    match result {
        WorkflowResult::Course { knowledge, outline } => (
            serde_json::json!({ "knowledgeBase": knowledge.text, "outline": outline }),
            None,
        ),
        WorkflowResult::Content { draft, polished } => (
            serde_json::json!({ "draft": draft, "polished": polished }),
            None,
        ),
        WorkflowResult::Transcript(text) => (serde_json::json!({ "transcript": text }), None),
        WorkflowResult::Audio(artifact) => (
            serde_json::json!({
                "sampleRate": artifact.playable.sample_rate,
                "channels": artifact.playable.channel_count,
                "durationSecs": artifact.playable.duration().as_secs_f64(),
                "wavBytes": artifact.container_bytes.len(),
            }),
            Some(artifact.container_bytes.clone()),
        ),
        WorkflowResult::Image(image) => (
            serde_json::json!({ "mimeType": image.mime_type, "bytes": image.bytes.len() }),
            Some(image.bytes.clone()),
        ),
        WorkflowResult::Video { uri } => (serde_json::json!({ "videoUri": uri }), None),
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(pages) = args.max_pages {
        config.max_pages = pages;
    }

    let pipeline = Pipeline::from_config(&config);
    let input = args.source().await?;
    let workflow = args.workflow();

    let result = tokio::select! {
        result = pipeline.run(workflow, &input) => result,
        _ = tokio::signal::ctrl_c() => {
            pipeline.cancel();
            anyhow::bail!("Interrupted");
        }
    };

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            error!("{}", e);
            anyhow::bail!("{}", e.user_message());
        }
    };

    let (json, binary) = render_result(&result);
    match (&args.out, binary) {
        (Some(path), Some(bytes)) => {
            tokio::fs::write(path, &bytes).await?;
            info!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        (Some(path), None) => {
            tokio::fs::write(path, serde_json::to_vec_pretty(&json)?).await?;
            info!("Wrote result to {}", path.display());
        }
        (None, _) => {}
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "knowledge_forge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting knowledge-forge");

    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        error!("Workflow failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_pages_valid() {
        assert_eq!(parse_max_pages("5").unwrap(), 5);
    }

    #[test]
    fn test_parse_max_pages_invalid() {
        assert!(parse_max_pages("0").unwrap_err().contains("positive"));
        assert!(parse_max_pages("ten").is_err());
    }

    #[test]
    fn test_content_workflow_carries_polish_flag() {
        let args =
            CliArgs::parse_from(["knowledge-forge", "content", "--text", "notes", "--polish"]);
        assert_eq!(args.workflow(), Workflow::AnalyzeThenRefine { polish: true });
    }

    #[test]
    fn test_sources_are_mutually_exclusive() {
        let parsed = CliArgs::try_parse_from([
            "knowledge-forge",
            "course",
            "--text",
            "a",
            "--url",
            "https://example.com",
        ]);
        assert!(parsed.is_err());
    }
}
