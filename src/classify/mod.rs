//! Question classification: domain, diagram type, complexity and backend.
//!
//! A low-cost model call labels the question against the fixed taxonomy.
//! The call is allowed to fail — malformed output, timeouts, bad keys — and
//! classification never propagates those failures: a deterministic keyword
//! scanner takes over and always produces a usable `Classification`.

pub mod taxonomy;

pub use taxonomy::{Complexity, DiagramType, Domain};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::{Message, TextModel, TextRequest};
use crate::render::BackendKind;
use crate::utils::extract_json_object;

/// System prompt for the classification role. The taxonomy section is
/// appended at call time from the compiled-in enums.
const CLASSIFICATION_SYSTEM_PROMPT: &str = "You classify assignment questions that need a technical diagram.\n\
Pick the single best domain and diagram type from the taxonomy below.\n\
Grade complexity as simple, moderate or complex.\n\
Respond with ONLY a JSON object in this exact format:\n\
{\"domain\": \"<domain>\", \"diagram_type\": \"<type>\", \"complexity\": \"<grade>\"}";

/// Classification of a single question. Produced once per request and
/// read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub domain: Domain,
    pub diagram_type: DiagramType,
    pub complexity: Complexity,
    pub ai_suitable: bool,
    pub preferred_backend: BackendKind,
}

impl Classification {
    /// Builds a classification from a (domain, type) pair, deriving the
    /// backend fields from the taxonomy rather than trusting model output.
    fn from_taxonomy(domain: Domain, diagram_type: DiagramType, complexity: Complexity) -> Self {
        Self {
            domain,
            diagram_type,
            complexity,
            ai_suitable: diagram_type.ai_suitable(),
            preferred_backend: diagram_type.preferred_backend(),
        }
    }
}

/// Wire shape of the model's classification response.
#[derive(Debug, Deserialize)]
struct WireClassification {
    domain: Domain,
    diagram_type: DiagramType,
    #[serde(default)]
    complexity: Complexity,
}

/// Configuration for the classifier.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Model id for the low-latency classification tier; empty selects the
    /// adapter default.
    pub model: String,
    /// Sampling temperature; classification wants determinism.
    pub temperature: f64,
    /// Response cap; the verdict is one small JSON object.
    pub max_tokens: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { model: String::new(), temperature: 0.0, max_tokens: 200 }
    }
}

/// Classifies questions into the diagram taxonomy.
pub struct DomainClassifier {
    llm: Arc<dyn TextModel>,
    config: ClassifierConfig,
}

impl DomainClassifier {
    /// Creates a classifier over the given text model.
    pub fn new(llm: Arc<dyn TextModel>, config: ClassifierConfig) -> Self {
        Self { llm, config }
    }

    /// Creates a classifier with default configuration.
    pub fn with_defaults(llm: Arc<dyn TextModel>) -> Self {
        Self::new(llm, ClassifierConfig::default())
    }

    /// Classifies a question. Never fails: any model-side problem degrades
    /// to the keyword fallback.
    pub async fn classify(&self, question_text: &str, domain_hint: &str) -> Classification {
        match self.classify_with_model(question_text, domain_hint).await {
            Ok(classification) => classification,
            Err(reason) => {
                warn!(%reason, "Classification degraded to keyword fallback");
                keyword_fallback(question_text, domain_hint)
            }
        }
    }

    async fn classify_with_model(
        &self,
        question_text: &str,
        domain_hint: &str,
    ) -> Result<Classification, String> {
        let request = TextRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(format!(
                    "{}\n\nTaxonomy:\n{}",
                    CLASSIFICATION_SYSTEM_PROMPT,
                    taxonomy_listing()
                )),
                Message::user(build_user_prompt(question_text, domain_hint)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.generate(request).await.map_err(|e| e.to_string())?;

        let json = extract_json_object(&response.content)
            .ok_or_else(|| "no JSON object in classification response".to_string())?;
        let wire: WireClassification =
            serde_json::from_str(&json).map_err(|e| format!("invalid classification JSON: {e}"))?;

        // A diagram type outside the claimed domain is replaced with the
        // domain's default rather than trusted.
        let diagram_type = if wire.domain.diagram_types().contains(&wire.diagram_type) {
            wire.diagram_type
        } else {
            debug!(
                domain = %wire.domain,
                diagram_type = %wire.diagram_type,
                "Model picked a diagram type outside its domain, using domain default"
            );
            wire.domain.default_diagram_type()
        };

        Ok(Classification::from_taxonomy(wire.domain, diagram_type, wire.complexity))
    }
}

/// Renders the taxonomy for the classification prompt.
fn taxonomy_listing() -> String {
    Domain::all()
        .iter()
        .map(|domain| {
            let types = domain
                .diagram_types()
                .iter()
                .map(|t| t.wire_name())
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "- {}: {}",
                serde_json::to_string(domain).expect("domain serializes").trim_matches('"'),
                types
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_user_prompt(question_text: &str, domain_hint: &str) -> String {
    if domain_hint.is_empty() {
        format!("Question:\n{question_text}")
    } else {
        format!("Question:\n{question_text}\n\nCourse subject hint: {domain_hint}")
    }
}

/// Deterministic keyword fallback. Always succeeds; unmatched text receives
/// the hard-coded general/data-chart default.
pub fn keyword_fallback(question_text: &str, domain_hint: &str) -> Classification {
    let haystack = format!("{} {}", question_text, domain_hint).to_lowercase();

    let mut best: Option<(Domain, usize)> = None;
    for domain in Domain::all() {
        let hits = domain
            .keywords()
            .iter()
            .filter(|keyword| haystack.contains(**keyword))
            .count();
        if hits > 0 && best.map(|(_, n)| hits > n).unwrap_or(true) {
            best = Some((domain, hits));
        }
    }

    match best {
        Some((domain, hits)) => {
            debug!(%domain, hits, "Keyword fallback classification");
            Classification::from_taxonomy(
                domain,
                domain.default_diagram_type(),
                Complexity::Moderate,
            )
        }
        None => Classification::from_taxonomy(
            Domain::General,
            DiagramType::DataChart,
            Complexity::Moderate,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::TextResponse;
    use async_trait::async_trait;

    struct MockTextModel {
        response: Result<String, ()>,
    }

    #[async_trait]
    impl TextModel for MockTextModel {
        async fn generate(&self, _request: TextRequest) -> Result<TextResponse, LlmError> {
            match &self.response {
                Ok(content) => Ok(TextResponse {
                    model: "mock".to_string(),
                    content: content.clone(),
                    usage: Default::default(),
                }),
                Err(()) => Err(LlmError::RequestFailed("connection refused".to_string())),
            }
        }
    }

    fn classifier_returning(content: &str) -> DomainClassifier {
        DomainClassifier::with_defaults(Arc::new(MockTextModel {
            response: Ok(content.to_string()),
        }))
    }

    #[tokio::test]
    async fn parses_model_classification() {
        let classifier = classifier_returning(
            r#"{"domain": "electrical", "diagram_type": "logic-gate-network", "complexity": "simple"}"#,
        );

        let classification = classifier.classify("Draw a NAND gate network", "").await;
        assert_eq!(classification.domain, Domain::Electrical);
        assert_eq!(classification.diagram_type, DiagramType::LogicGateNetwork);
        assert_eq!(classification.complexity, Complexity::Simple);
        assert_eq!(classification.preferred_backend, BackendKind::CircuitSchematic);
        assert!(!classification.ai_suitable);
    }

    #[tokio::test]
    async fn parses_classification_wrapped_in_prose() {
        let classifier = classifier_returning(
            "Sure! Here is the classification:\n{\"domain\": \"mathematics\", \"diagram_type\": \"function-plot\", \"complexity\": \"moderate\"}",
        );

        let classification = classifier.classify("Plot f(x) = x^2", "").await;
        assert_eq!(classification.domain, Domain::Mathematics);
        assert_eq!(classification.diagram_type, DiagramType::FunctionPlot);
    }

    #[tokio::test]
    async fn cross_domain_type_is_replaced_with_domain_default() {
        let classifier = classifier_returning(
            r#"{"domain": "chemistry", "diagram_type": "binary-tree", "complexity": "simple"}"#,
        );

        let classification = classifier.classify("Draw the molecule", "").await;
        assert_eq!(classification.domain, Domain::Chemistry);
        assert_eq!(classification.diagram_type, Domain::Chemistry.default_diagram_type());
    }

    #[tokio::test]
    async fn call_failure_degrades_to_keyword_fallback() {
        let classifier =
            DomainClassifier::with_defaults(Arc::new(MockTextModel { response: Err(()) }));

        let classification = classifier
            .classify("Sketch a CMOS inverter and label the transistors", "")
            .await;
        assert_eq!(classification.domain, Domain::Electrical);
    }

    #[tokio::test]
    async fn garbage_output_degrades_to_keyword_fallback() {
        let classifier = classifier_returning("I can't help with that.");

        let classification = classifier.classify("Draw the pulley system with two masses", "").await;
        assert_eq!(classification.domain, Domain::Mechanics);
    }

    #[test]
    fn fallback_finds_electrical_for_cmos_inverter() {
        let classification = keyword_fallback("Design a CMOS inverter with matched rise times", "");
        assert_eq!(classification.domain, Domain::Electrical);
        assert_eq!(classification.diagram_type, DiagramType::CircuitSchematic);
    }

    #[test]
    fn fallback_uses_domain_hint() {
        let classification = keyword_fallback("Question 3 from the problem set", "circuit analysis");
        assert_eq!(classification.domain, Domain::Electrical);
    }

    #[test]
    fn fallback_default_is_general_data_chart() {
        let classification = keyword_fallback("Describe the historical context", "");
        assert_eq!(classification.domain, Domain::General);
        assert_eq!(classification.diagram_type, DiagramType::DataChart);
        assert_eq!(classification.preferred_backend, BackendKind::ProceduralPlot);
    }

    #[test]
    fn taxonomy_listing_covers_all_domains() {
        let listing = taxonomy_listing();
        assert!(listing.contains("electrical"));
        assert!(listing.contains("cmos-layout"));
        assert!(listing.contains("general"));
    }
}
