//! Markup generation agent for the vector-markup backend.
//!
//! Same prompt-assembly shape as the code agent, but the output contract is
//! a standalone SVG document instead of renderer source. The response is
//! reduced to the `<svg>...</svg>` element before it reaches the converter.

use std::sync::Arc;

use tracing::debug;

use crate::agents::GenerationContext;
use crate::error::GenerationError;
use crate::llm::{Message, TextModel, TextRequest};
use crate::utils::strip_to_svg;

/// Structural rules for SVG output.
const SVG_RULES: &str = "\
You write a standalone SVG document that draws a single technical diagram \
for an assignment question.

HARD RULES:
1. NEVER reveal the answer to the question. No computed values, no completed \
truth tables, no solved quantities. Use the symbolic names from the question.
2. Label every component, node or quantity the question names.
3. The root element must be <svg> with the xmlns attribute and \
viewBox=\"0 0 1200 900\".
4. White background, black strokes, sans-serif text with font-size 18 or \
larger. No external references, no scripts, no raster images.
5. Respond with ONLY the SVG document. No prose, no markdown fences.";

/// User prompt template.
const USER_TEMPLATE: &str = "\
Question:
{question}

Domain: {domain}
Diagram type: {diagram_type} ({subtype})

Style guidance:
{guidance}
{correction}
Write the SVG document now.";

/// Configuration for the markup generation agent.
#[derive(Debug, Clone)]
pub struct MarkupGeneratorConfig {
    /// Model id; empty selects the adapter default.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Response cap; SVG is verbose.
    pub max_tokens: u32,
}

impl Default for MarkupGeneratorConfig {
    fn default() -> Self {
        Self { model: String::new(), temperature: 0.4, max_tokens: 6000 }
    }
}

/// Generates SVG markup for the markup-to-raster backend.
pub struct MarkupGenerationAgent {
    llm: Arc<dyn TextModel>,
    config: MarkupGeneratorConfig,
}

impl MarkupGenerationAgent {
    /// Creates an agent over the given text model.
    pub fn new(llm: Arc<dyn TextModel>, config: MarkupGeneratorConfig) -> Self {
        Self { llm, config }
    }

    /// Creates an agent with default configuration.
    pub fn with_defaults(llm: Arc<dyn TextModel>) -> Self {
        Self::new(llm, MarkupGeneratorConfig::default())
    }

    /// Generates SVG markup for the given context.
    pub async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<String, GenerationError> {
        let request = TextRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(SVG_RULES),
                Message::user(build_user_prompt(ctx)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.generate(request).await?;

        let markup = strip_to_svg(&response.content).ok_or_else(|| {
            GenerationError::EmptySource("response contained no complete SVG element".to_string())
        })?;

        debug!(
            diagram_type = %ctx.diagram_type,
            bytes = markup.len(),
            "Generated diagram markup"
        );
        Ok(markup)
    }
}

fn build_user_prompt(ctx: &GenerationContext<'_>) -> String {
    let correction = match ctx.corrected_description {
        Some(corrected) => format!(
            "\nA previous attempt was rejected. Follow this corrected description exactly:\n{corrected}\n"
        ),
        None => String::new(),
    };

    USER_TEMPLATE
        .replace("{question}", ctx.question_text)
        .replace("{domain}", ctx.domain.display_name())
        .replace("{diagram_type}", ctx.diagram_type.wire_name())
        .replace("{subtype}", ctx.subtype)
        .replace("{guidance}", ctx.guidance)
        .replace("{correction}", &correction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DiagramType, Domain};
    use crate::error::LlmError;
    use crate::llm::TextResponse;
    use async_trait::async_trait;

    struct MockTextModel {
        response: String,
    }

    #[async_trait]
    impl TextModel for MockTextModel {
        async fn generate(&self, _request: TextRequest) -> Result<TextResponse, LlmError> {
            Ok(TextResponse {
                model: "mock".to_string(),
                content: self.response.clone(),
                usage: Default::default(),
            })
        }
    }

    fn context() -> GenerationContext<'static> {
        GenerationContext {
            question_text: "Show an array of 6 cells with indices 0 through 5.",
            domain: Domain::ComputerScience,
            diagram_type: DiagramType::ArrayLayout,
            subtype: "array",
            guidance: "Nodes are boxes with values centered inside.",
            corrected_description: None,
        }
    }

    #[tokio::test]
    async fn extracts_svg_from_fenced_response() {
        let agent = MarkupGenerationAgent::with_defaults(Arc::new(MockTextModel {
            response: "Here you go:\n```svg\n<svg xmlns=\"http://www.w3.org/2000/svg\" \
                       viewBox=\"0 0 1200 900\"><rect/></svg>\n```"
                .to_string(),
        }));

        let markup = agent.generate(&context()).await.expect("generation succeeds");
        assert!(markup.starts_with("<svg"));
        assert!(markup.ends_with("</svg>"));
    }

    #[tokio::test]
    async fn missing_svg_is_generation_failure() {
        let agent = MarkupGenerationAgent::with_defaults(Arc::new(MockTextModel {
            response: "I cannot draw that.".to_string(),
        }));

        let err = agent.generate(&context()).await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptySource(_)));
    }

    #[test]
    fn prompt_carries_context_fields() {
        let prompt = build_user_prompt(&context());
        assert!(prompt.contains("array-layout"));
        assert!(prompt.contains("indices 0 through 5"));
        assert!(prompt.contains("boxes with values"));
        assert!(!prompt.contains("{guidance}"));
    }
}
