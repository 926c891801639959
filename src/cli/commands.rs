//! CLI command definitions and service wiring.
//!
//! Service clients are constructed once here and passed by `Arc` into the
//! orchestrator — the process composition root, no module-level globals.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::agents::{
    CodeGenerationAgent, CodeGeneratorConfig, GenerativeImageAgent, GenerativeReviewAgent,
    ImageAgentConfig, MarkupGenerationAgent, MarkupGeneratorConfig, ProceduralReviewAgent,
    ReviewConfig,
};
use crate::classify::{ClassifierConfig, DomainClassifier};
use crate::llm::{
    CircuitBreaker, GuardedImage, GuardedText, GuardedVision, ImageModel, OpenRouterClient,
    TextModel, VisionModel,
};
use crate::pipeline::{
    BatchCoordinator, DiagramRequest, PipelineConfig, PipelineOrchestrator,
};
use crate::render::{BackendSet, CodeSandbox, RasterConverter, SandboxConfig};
use crate::route::BackendRouter;
use crate::storage::LocalStorageUploader;

/// diagramforge: generate and review assignment diagrams.
#[derive(Debug, Parser)]
#[command(name = "diagramforge", version, about)]
pub struct Cli {
    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a diagram for a single question.
    Render {
        /// The question text the diagram accompanies.
        #[arg(long)]
        question: String,

        /// Course-level subject hint.
        #[arg(long, default_value = "")]
        hint: String,

        /// Where to write the accepted image.
        #[arg(long, default_value = "diagram.png")]
        output: PathBuf,
    },

    /// Run a batch of questions from a JSON file of requests.
    Batch {
        /// JSON file containing an array of diagram requests.
        #[arg(long)]
        input: PathBuf,

        /// Directory for outcome records and accepted images.
        #[arg(long, default_value = "./diagrams")]
        output_dir: PathBuf,

        /// Concurrency limit override.
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the parsed CLI command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;

    match cli.command {
        Command::Render { question, hint, output } => render_one(config, question, hint, output).await,
        Command::Batch { input, output_dir, concurrency } => {
            run_batch(config, input, output_dir, concurrency).await
        }
    }
}

async fn render_one(
    config: PipelineConfig,
    question: String,
    hint: String,
    output: PathBuf,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(&config, None).await?;
    let request = DiagramRequest::new(question, hint, "cli", 0);

    let outcome = orchestrator.run(&request).await.context("pipeline failed")?;

    match outcome.final_image {
        Some(image) => {
            tokio::fs::write(&output, &image)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(path = %output.display(), attempts = outcome.attempts.len(), "Diagram accepted");
        }
        None => {
            info!(status = ?outcome.status, "No diagram produced");
        }
    }
    Ok(())
}

async fn run_batch(
    config: PipelineConfig,
    input: PathBuf,
    output_dir: PathBuf,
    concurrency: Option<usize>,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;
    let requests: Vec<DiagramRequest> =
        serde_json::from_str(&raw).context("invalid batch input JSON")?;

    tokio::fs::create_dir_all(&output_dir).await?;

    let limit = concurrency.unwrap_or(config.batch_concurrency);
    let uploader = Arc::new(LocalStorageUploader::new(output_dir.join("images")));
    let orchestrator = build_orchestrator(&config, Some(uploader)).await?;
    let coordinator = BatchCoordinator::new(Arc::new(orchestrator), limit);

    let (results, stats) = coordinator.run_batch(requests).await;

    for result in &results {
        let path = output_dir.join(format!("question_{}.json", result.question_index));
        let record = serde_json::to_string_pretty(result)?;
        tokio::fs::write(&path, record).await?;
    }

    info!(
        accepted = stats.accepted,
        exhausted = stats.exhausted,
        failed = stats.failed,
        out = %output_dir.display(),
        "Batch results written"
    );
    Ok(())
}

/// Builds the full production orchestrator: one HTTP client behind per-role
/// circuit breakers, introspected symbol catalogs, the shared sandbox and
/// the raster converter.
async fn build_orchestrator(
    config: &PipelineConfig,
    uploader: Option<Arc<LocalStorageUploader>>,
) -> anyhow::Result<PipelineOrchestrator> {
    let client = Arc::new(
        OpenRouterClient::from_env(config.generation_model.clone())
            .context("model service credentials missing")?,
    );

    let text: Arc<dyn TextModel> = Arc::new(GuardedText::new(
        Arc::clone(&client) as Arc<dyn TextModel>,
        Arc::new(CircuitBreaker::with_defaults("chat")),
    ));
    let vision: Arc<dyn VisionModel> = Arc::new(GuardedVision::new(
        Arc::clone(&client) as Arc<dyn VisionModel>,
        Arc::new(CircuitBreaker::with_defaults("vision")),
    ));
    let image: Arc<dyn ImageModel> = Arc::new(GuardedImage::new(
        client as Arc<dyn ImageModel>,
        Arc::new(CircuitBreaker::with_defaults("image")),
    ));

    let classifier = Arc::new(DomainClassifier::new(
        Arc::clone(&text),
        ClassifierConfig { model: config.classifier_model.clone(), ..Default::default() },
    ));

    let code_agent = Arc::new(
        CodeGenerationAgent::with_introspection(
            Arc::clone(&text),
            CodeGeneratorConfig { model: config.generation_model.clone(), ..Default::default() },
            &config.python_bin,
        )
        .await,
    );
    let markup_agent = Arc::new(MarkupGenerationAgent::new(
        text,
        MarkupGeneratorConfig { model: config.generation_model.clone(), ..Default::default() },
    ));

    let image_agent = Arc::new(GenerativeImageAgent::new(
        image,
        ImageAgentConfig { model: config.image_model.clone() },
    ));

    let sandbox = Arc::new(CodeSandbox::new(
        SandboxConfig::new()
            .with_python_bin(config.python_bin.clone())
            .with_timeout(config.sandbox_timeout)
            .with_dpi_floor(config.dpi_floor),
    ));
    let converter = RasterConverter::new(config.raster_width, config.raster_height);
    let backends = Arc::new(BackendSet::production(sandbox, converter, Arc::clone(&image_agent)));

    let review_config = ReviewConfig { model: config.vision_model.clone(), ..Default::default() };
    let procedural_reviewer = Arc::new(ProceduralReviewAgent::new(
        Arc::clone(&vision),
        review_config.clone(),
    ));
    let generative_reviewer = Arc::new(GenerativeReviewAgent::new(vision, review_config));

    Ok(PipelineOrchestrator::new(
        classifier,
        BackendRouter::new(),
        code_agent,
        markup_agent,
        backends,
        procedural_reviewer,
        generative_reviewer,
        uploader.map(|u| u as Arc<dyn crate::storage::StorageUploader>),
        config.max_attempts,
    ))
}
