//! Render backends: one uniform contract over five rendering strategies.
//!
//! The router picks a [`BackendKind`]; the orchestrator looks the backend up
//! in a [`BackendSet`] and drives it through the [`Render`] trait without
//! knowing how it renders — sandboxed code execution, markup conversion and
//! direct image synthesis all answer the same `render(spec) -> bytes` call.
//! The only capability the orchestrator may ask about is `supports_fix`.

pub mod raster;
pub mod sandbox;

pub use raster::RasterConverter;
pub use sandbox::{CodeSandbox, SandboxConfig, SandboxRuntime};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agents::{GenerativeImageAgent, ReviewVerdict};
pub use crate::error::RenderError;

/// The five render backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// matplotlib scripts executed in the sandbox.
    ProceduralPlot,
    /// schemdraw scripts executed in the sandbox.
    CircuitSchematic,
    /// graphviz scripts executed in the sandbox.
    GraphLayout,
    /// SVG markup converted by the raster converter.
    MarkupRaster,
    /// Direct synthesis by the image model.
    GenerativeImage,
}

impl BackendKind {
    /// Wire/display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ProceduralPlot => "procedural-plot",
            BackendKind::CircuitSchematic => "circuit-schematic",
            BackendKind::GraphLayout => "graph-layout",
            BackendKind::MarkupRaster => "markup-raster",
            BackendKind::GenerativeImage => "generative-image",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to render: the backend, its subtype, and the generated payload.
///
/// A failed review produces a superseding spec; specs are never mutated in
/// place. For the sandboxed backends `generated_source` is Python, for the
/// markup backend it is SVG, and for the generative backend it is the image
/// prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSpec {
    pub backend: BackendKind,
    pub backend_subtype: String,
    pub generated_source: String,
    pub description: String,
}

impl RenderSpec {
    /// Creates a spec.
    pub fn new(
        backend: BackendKind,
        backend_subtype: impl Into<String>,
        generated_source: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            backend_subtype: backend_subtype.into(),
            generated_source: generated_source.into(),
            description: description.into(),
        }
    }
}

/// The uniform render contract.
#[async_trait]
pub trait Render: Send + Sync {
    /// Which backend this renderer implements.
    fn kind(&self) -> BackendKind;

    /// Whether this backend can fix a candidate in place. Only the
    /// generative image backend can today; a future source-patching backend
    /// flips this instead of teaching the orchestrator a new name.
    fn supports_fix(&self) -> bool {
        false
    }

    /// Renders a spec to raster bytes.
    async fn render(&self, spec: &RenderSpec) -> Result<Vec<u8>, RenderError>;

    /// Fixes a previously rendered candidate in place. Legal only when
    /// `supports_fix()` is true and the verdict was fixable.
    async fn fix(
        &self,
        image: &[u8],
        verdict: &ReviewVerdict,
        description: &str,
    ) -> Result<Vec<u8>, RenderError> {
        let _ = (image, verdict, description);
        Err(RenderError::FixUnsupported)
    }
}

/// Sandbox-executing backend; one instance per procedural backend kind,
/// sharing the sandbox.
pub struct SandboxBackend {
    kind: BackendKind,
    sandbox: Arc<CodeSandbox>,
}

impl SandboxBackend {
    /// Creates a sandbox-backed renderer. Panics if the kind has no sandbox
    /// runtime; construction happens once at startup, not per request.
    pub fn new(kind: BackendKind, sandbox: Arc<CodeSandbox>) -> Self {
        assert!(
            SandboxRuntime::for_backend(kind).is_some(),
            "{kind} is not a sandboxed backend"
        );
        Self { kind, sandbox }
    }
}

#[async_trait]
impl Render for SandboxBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn render(&self, spec: &RenderSpec) -> Result<Vec<u8>, RenderError> {
        let runtime =
            SandboxRuntime::for_backend(self.kind).expect("checked at construction");
        Ok(self.sandbox.execute(&spec.generated_source, runtime).await?)
    }
}

/// Markup-converting backend.
pub struct MarkupBackend {
    converter: RasterConverter,
}

impl MarkupBackend {
    pub fn new(converter: RasterConverter) -> Self {
        Self { converter }
    }
}

#[async_trait]
impl Render for MarkupBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MarkupRaster
    }

    async fn render(&self, spec: &RenderSpec) -> Result<Vec<u8>, RenderError> {
        Ok(self.converter.convert(&spec.generated_source)?)
    }
}

/// Generative image backend. The spec's `generated_source` is the prompt;
/// this is the only backend with an in-place fix path.
pub struct GenerativeImageBackend {
    agent: Arc<GenerativeImageAgent>,
}

impl GenerativeImageBackend {
    pub fn new(agent: Arc<GenerativeImageAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Render for GenerativeImageBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GenerativeImage
    }

    fn supports_fix(&self) -> bool {
        true
    }

    async fn render(&self, spec: &RenderSpec) -> Result<Vec<u8>, RenderError> {
        self.agent
            .generate(&spec.generated_source)
            .await?
            .ok_or(RenderError::NoImagePayload)
    }

    async fn fix(
        &self,
        image: &[u8],
        verdict: &ReviewVerdict,
        description: &str,
    ) -> Result<Vec<u8>, RenderError> {
        self.agent
            .fix(image, &verdict.issues, &verdict.reason, description)
            .await?
            .ok_or(RenderError::NoImagePayload)
    }
}

/// The set of render backends available to a pipeline, keyed by kind.
#[derive(Default)]
pub struct BackendSet {
    backends: HashMap<BackendKind, Arc<dyn Render>>,
}

impl BackendSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under its own kind, replacing any previous one.
    pub fn with_backend(mut self, backend: Arc<dyn Render>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    /// Looks up a backend.
    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn Render>> {
        self.backends.get(&kind)
    }

    /// The full production set: three sandboxed backends over one shared
    /// sandbox, the markup converter and the generative image agent.
    pub fn production(
        sandbox: Arc<CodeSandbox>,
        converter: RasterConverter,
        image_agent: Arc<GenerativeImageAgent>,
    ) -> Self {
        Self::new()
            .with_backend(Arc::new(SandboxBackend::new(
                BackendKind::ProceduralPlot,
                Arc::clone(&sandbox),
            )))
            .with_backend(Arc::new(SandboxBackend::new(
                BackendKind::CircuitSchematic,
                Arc::clone(&sandbox),
            )))
            .with_backend(Arc::new(SandboxBackend::new(BackendKind::GraphLayout, sandbox)))
            .with_backend(Arc::new(MarkupBackend::new(converter)))
            .with_backend(Arc::new(GenerativeImageBackend::new(image_agent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ImageAgentConfig;
    use crate::error::LlmError;
    use crate::llm::{ImageModel, ImageRequest};

    struct NullImageModel;

    #[async_trait]
    impl ImageModel for NullImageModel {
        async fn create_image(&self, _request: ImageRequest) -> Result<Option<Vec<u8>>, LlmError> {
            Ok(None)
        }
    }

    fn image_backend() -> GenerativeImageBackend {
        GenerativeImageBackend::new(Arc::new(GenerativeImageAgent::new(
            Arc::new(NullImageModel),
            ImageAgentConfig::default(),
        )))
    }

    #[test]
    fn production_set_covers_all_kinds() {
        let set = BackendSet::production(
            Arc::new(CodeSandbox::with_defaults()),
            RasterConverter::default(),
            Arc::new(GenerativeImageAgent::new(
                Arc::new(NullImageModel),
                ImageAgentConfig::default(),
            )),
        );

        for kind in [
            BackendKind::ProceduralPlot,
            BackendKind::CircuitSchematic,
            BackendKind::GraphLayout,
            BackendKind::MarkupRaster,
            BackendKind::GenerativeImage,
        ] {
            let backend = set.get(kind).unwrap_or_else(|| panic!("missing backend {kind}"));
            assert_eq!(backend.kind(), kind);
        }
    }

    #[test]
    fn only_the_image_backend_supports_fix() {
        let sandboxed = SandboxBackend::new(
            BackendKind::ProceduralPlot,
            Arc::new(CodeSandbox::with_defaults()),
        );
        let markup = MarkupBackend::new(RasterConverter::default());

        assert!(!sandboxed.supports_fix());
        assert!(!markup.supports_fix());
        assert!(image_backend().supports_fix());
    }

    #[tokio::test]
    async fn fix_is_unsupported_by_default() {
        let markup = MarkupBackend::new(RasterConverter::default());
        let verdict = ReviewVerdict::skipped();

        let err = markup.fix(b"png", &verdict, "description").await.unwrap_err();
        assert!(matches!(err, RenderError::FixUnsupported));
    }

    #[tokio::test]
    async fn missing_image_payload_maps_to_render_error() {
        let backend = image_backend();
        let spec = RenderSpec::new(BackendKind::GenerativeImage, "sketch", "a prompt", "desc");

        let err = backend.render(&spec).await.unwrap_err();
        assert!(matches!(err, RenderError::NoImagePayload));
    }

    #[test]
    #[should_panic(expected = "not a sandboxed backend")]
    fn sandbox_backend_rejects_non_sandboxed_kind() {
        SandboxBackend::new(BackendKind::MarkupRaster, Arc::new(CodeSandbox::with_defaults()));
    }
}
