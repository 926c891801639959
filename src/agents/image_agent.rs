//! Generative image agent: direct image synthesis and in-place fixing.
//!
//! Two modes share one model role. `generate` produces an image from a text
//! prompt. `fix` sends the existing image back with structured correction
//! instructions; it preserves the diagram's structure and corrects only
//! textual and labeling defects, so the orchestrator must never call it
//! after a non-fixable verdict. Both return `None` when the model yields no
//! image payload — a failed-but-not-crashed attempt, not an error.

use std::sync::Arc;

use tracing::debug;

use crate::agents::GenerationContext;
use crate::error::LlmError;
use crate::llm::{ImageModel, ImageRequest};

/// Prompt prefix for generation mode.
const GENERATE_PREFIX: &str = "\
A clean technical diagram for a STEM assignment, flat illustration style, \
white background, black linework, clear sans-serif labels. The diagram must \
NOT contain the answer to the question: no computed values, no solved \
quantities, only the symbolic names given below.";

/// Prompt prefix for fix mode.
const FIX_PREFIX: &str = "\
Edit the attached diagram. Keep the structure, layout and style exactly as \
they are. Fix ONLY the text and labeling problems listed below. Do not add, \
remove or move any structural element.";

/// Configuration for the generative image agent.
#[derive(Debug, Clone)]
pub struct ImageAgentConfig {
    /// Model id; empty selects the adapter default.
    pub model: String,
}

impl Default for ImageAgentConfig {
    fn default() -> Self {
        Self { model: String::new() }
    }
}

/// Produces and repairs diagram images with an image model.
pub struct GenerativeImageAgent {
    model: Arc<dyn ImageModel>,
    config: ImageAgentConfig,
}

impl GenerativeImageAgent {
    /// Creates an agent over the given image model.
    pub fn new(model: Arc<dyn ImageModel>, config: ImageAgentConfig) -> Self {
        Self { model, config }
    }

    /// Creates an agent with default configuration.
    pub fn with_defaults(model: Arc<dyn ImageModel>) -> Self {
        Self::new(model, ImageAgentConfig::default())
    }

    /// Generates an image from a prompt. `None` means the model produced no
    /// image payload.
    pub async fn generate(&self, prompt: &str) -> Result<Option<Vec<u8>>, LlmError> {
        let response = self
            .model
            .create_image(ImageRequest {
                model: self.config.model.clone(),
                prompt: prompt.to_string(),
                base_image: None,
            })
            .await?;

        debug!(produced = response.is_some(), "Image generation call completed");
        Ok(response)
    }

    /// Fixes labeling defects in an existing image. `None` means the model
    /// produced no image payload.
    pub async fn fix(
        &self,
        image: &[u8],
        issues: &[String],
        reason: &str,
        original_description: &str,
    ) -> Result<Option<Vec<u8>>, LlmError> {
        let issue_list = issues
            .iter()
            .map(|issue| format!("- {issue}"))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "{FIX_PREFIX}\n\nReviewer verdict: {reason}\n\nProblems to fix:\n{issue_list}\n\n\
             The diagram illustrates:\n{original_description}"
        );

        let response = self
            .model
            .create_image(ImageRequest {
                model: self.config.model.clone(),
                prompt,
                base_image: Some(image.to_vec()),
            })
            .await?;

        debug!(produced = response.is_some(), "Image fix call completed");
        Ok(response)
    }
}

/// Builds the generation prompt for a routed question. Pure; the generate
/// stage of the image backend is a local composition, not a model call.
pub fn build_image_prompt(ctx: &GenerationContext<'_>) -> String {
    let description = ctx.corrected_description.unwrap_or(ctx.question_text);
    format!(
        "{GENERATE_PREFIX}\n\nDiagram type: {} ({}).\n\nStyle guidance: {}\n\n\
         Draw the diagram described by this question:\n{}",
        ctx.diagram_type.wire_name(),
        ctx.subtype,
        ctx.guidance,
        description,
    )
}
