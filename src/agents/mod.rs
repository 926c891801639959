//! Generation and review agents.
//!
//! Agents wrap one model role each: turning a routed question into renderer
//! source or markup, producing/fixing generative images, and grading
//! candidate images. Every agent takes its model by `Arc<dyn ...>` so tests
//! substitute mocks at the provider seam.

pub mod code_agent;
pub mod image_agent;
pub mod markup_agent;
pub mod review;
pub mod symbols;

pub use code_agent::{CodeGenerationAgent, CodeGeneratorConfig};
pub use image_agent::{build_image_prompt, GenerativeImageAgent, ImageAgentConfig};
pub use markup_agent::{MarkupGenerationAgent, MarkupGeneratorConfig};
pub use review::{
    GenerativeReviewAgent, ProceduralReviewAgent, ReviewAgent, ReviewConfig, ReviewVerdict,
};
pub use symbols::SymbolCatalog;

use crate::classify::{DiagramType, Domain};

/// Inputs shared by every generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    /// The assignment question the diagram accompanies.
    pub question_text: &'a str,
    /// Classified domain.
    pub domain: Domain,
    /// Classified diagram type.
    pub diagram_type: DiagramType,
    /// Routed backend subtype.
    pub subtype: &'a str,
    /// Opaque per-domain style guidance from the router.
    pub guidance: &'a str,
    /// Corrected description from a failed review, present on retries after
    /// a non-fixable failure.
    pub corrected_description: Option<&'a str>,
}
