//! Code generation agent for the procedural renderers.
//!
//! Builds a backend-specific prompt from the structural rules, the valid
//! symbol catalog for the target renderer, the routed domain guidance and —
//! on retries after a failed review — the corrected description, then calls
//! the generation model and strips the response down to bare source.
//!
//! Generation is not idempotent: identical inputs may yield different
//! source. A failure here is a distinct condition from a downstream render
//! failure so the orchestrator can retry generation specifically.

use std::sync::Arc;

use tracing::debug;

use crate::agents::{GenerationContext, SymbolCatalog};
use crate::error::GenerationError;
use crate::llm::{Message, TextModel, TextRequest};
use crate::render::sandbox::SandboxRuntime;
use crate::utils::strip_code_fences;

/// Structural rules shared by every procedural backend.
const SHARED_RULES: &str = "\
You write Python that draws a single technical diagram for an assignment question.

HARD RULES:
1. NEVER reveal the answer to the question. No computed values, no completed \
truth tables, no solved quantities. Use the symbolic names from the question \
(R1, F, v0), never their numeric solutions.
2. Label every component, node or quantity the question names. A reader must \
be able to match each label to the question text.
3. All text must be legible: font size 12 or larger.
4. Do not read or write files, do not pick an output path, and do not call \
any display function. The execution environment saves the figure itself.
5. Respond with ONLY Python code. No prose, no markdown fences, no comments \
explaining what you did.";

/// Output contract per renderer runtime.
const MATPLOTLIB_RULES: &str = "\
Use matplotlib.pyplot, already imported as plt. Build exactly one figure. \
Set axis labels and a title where they help, but never a title that states \
the answer. Do not call plt.show() or plt.savefig().";

const SCHEMDRAW_RULES: &str = "\
Use schemdraw. Build a single schemdraw.Drawing assigned to a variable named \
d, add elements only from the valid symbol list, and call d.draw() once at \
the end. Do not call d.save().";

const GRAPHVIZ_RULES: &str = "\
Use graphviz. Build a single graphviz.Digraph or graphviz.Graph assigned to \
a variable named g. Set node and edge labels explicitly. Do not call \
g.render(), g.view() or g.save().";

/// User prompt template.
const USER_TEMPLATE: &str = "\
Question:
{question}

Domain: {domain}
Diagram type: {diagram_type} ({subtype})

Style guidance:
{guidance}

Valid symbols for this renderer:
{symbols}

These names DO NOT EXIST in this renderer, never use them:
{denied}
{correction}
Write the Python code now.";

/// Configuration for the code generation agent.
#[derive(Debug, Clone)]
pub struct CodeGeneratorConfig {
    /// Model id; empty selects the adapter default.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Response cap.
    pub max_tokens: u32,
}

impl Default for CodeGeneratorConfig {
    fn default() -> Self {
        Self { model: String::new(), temperature: 0.4, max_tokens: 4000 }
    }
}

/// Generates renderer source for the sandboxed backends.
pub struct CodeGenerationAgent {
    llm: Arc<dyn TextModel>,
    config: CodeGeneratorConfig,
    catalogs: Vec<SymbolCatalog>,
}

impl CodeGenerationAgent {
    /// Creates an agent with the baked-in symbol catalogs.
    pub fn new(llm: Arc<dyn TextModel>, config: CodeGeneratorConfig) -> Self {
        let catalogs = [
            SandboxRuntime::Matplotlib,
            SandboxRuntime::Schemdraw,
            SandboxRuntime::Graphviz,
        ]
        .into_iter()
        .map(SymbolCatalog::baked_in)
        .collect();

        Self { llm, config, catalogs }
    }

    /// Creates an agent whose catalogs are introspected from the installed
    /// renderers, falling back per-runtime to the baked-in lists.
    pub async fn with_introspection(
        llm: Arc<dyn TextModel>,
        config: CodeGeneratorConfig,
        python_bin: &str,
    ) -> Self {
        let mut catalogs = Vec::with_capacity(3);
        for runtime in [
            SandboxRuntime::Matplotlib,
            SandboxRuntime::Schemdraw,
            SandboxRuntime::Graphviz,
        ] {
            catalogs.push(SymbolCatalog::introspect(runtime, python_bin).await);
        }
        Self { llm, config, catalogs }
    }

    fn catalog(&self, runtime: SandboxRuntime) -> &SymbolCatalog {
        self.catalogs
            .iter()
            .find(|catalog| catalog.runtime() == runtime)
            .expect("catalog exists for every runtime")
    }

    /// Generates renderer source for the given runtime and context.
    pub async fn generate(
        &self,
        runtime: SandboxRuntime,
        ctx: &GenerationContext<'_>,
    ) -> Result<String, GenerationError> {
        let request = TextRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(self.build_system_prompt(runtime)),
                Message::user(build_user_prompt(self.catalog(runtime), ctx)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.generate(request).await?;
        let source = strip_code_fences(&response.content);

        if source.trim().is_empty() {
            return Err(GenerationError::EmptySource(
                "response contained no code".to_string(),
            ));
        }

        debug!(
            runtime = %runtime,
            diagram_type = %ctx.diagram_type,
            bytes = source.len(),
            "Generated renderer source"
        );
        Ok(source)
    }

    fn build_system_prompt(&self, runtime: SandboxRuntime) -> String {
        let runtime_rules = match runtime {
            SandboxRuntime::Matplotlib => MATPLOTLIB_RULES,
            SandboxRuntime::Schemdraw => SCHEMDRAW_RULES,
            SandboxRuntime::Graphviz => GRAPHVIZ_RULES,
        };
        format!("{SHARED_RULES}\n\n{runtime_rules}")
    }
}

fn build_user_prompt(catalog: &SymbolCatalog, ctx: &GenerationContext<'_>) -> String {
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
        .replace("{symbols}", &catalog.symbols_line())
        .replace("{denied}", &catalog.denied_line())
        .replace("{correction}", &correction)
}
