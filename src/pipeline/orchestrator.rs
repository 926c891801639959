//! The per-request pipeline state machine.
//!
//! One orchestrator run drives a single question through
//! `CLASSIFY → ROUTE → GENERATE → RENDER → REVIEW` and the review outcomes
//! `{ACCEPT, REGENERATE, FIX, EXHAUSTED}`, bounded by the attempt budget.
//! The run is purely sequential: each state strictly depends on the
//! previous output, so there is no internal concurrency and no external
//! cancellation — a pipeline runs to a terminal state or sandbox timeout.
//!
//! Attempt-local failures (generation, render, failed review) consume
//! budget and transition; they never propagate. Only malformed input errors
//! escape to the caller.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::agents::{
    build_image_prompt, CodeGenerationAgent, GenerationContext, MarkupGenerationAgent,
    ReviewAgent, ReviewVerdict,
};
use crate::classify::{Classification, DomainClassifier};
use crate::error::{LlmError, PipelineError};
use crate::render::{BackendKind, BackendSet, Render, RenderError, RenderSpec, SandboxRuntime};
use crate::route::{BackendRouter, Route};
use crate::storage::StorageUploader;

use super::types::{DiagramRequest, PipelineOutcome, RenderResult};

/// States of the pipeline, used for transition logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Generate,
    Fix,
}

/// Drives one DiagramRequest to a terminal outcome.
pub struct PipelineOrchestrator {
    classifier: Arc<DomainClassifier>,
    router: BackendRouter,
    code_agent: Arc<CodeGenerationAgent>,
    markup_agent: Arc<MarkupGenerationAgent>,
    backends: Arc<BackendSet>,
    procedural_reviewer: Arc<dyn ReviewAgent>,
    generative_reviewer: Arc<dyn ReviewAgent>,
    uploader: Option<Arc<dyn StorageUploader>>,
    max_attempts: usize,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over explicitly constructed collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Arc<DomainClassifier>,
        router: BackendRouter,
        code_agent: Arc<CodeGenerationAgent>,
        markup_agent: Arc<MarkupGenerationAgent>,
        backends: Arc<BackendSet>,
        procedural_reviewer: Arc<dyn ReviewAgent>,
        generative_reviewer: Arc<dyn ReviewAgent>,
        uploader: Option<Arc<dyn StorageUploader>>,
        max_attempts: usize,
    ) -> Self {
        Self {
            classifier,
            router,
            code_agent,
            markup_agent,
            backends,
            procedural_reviewer,
            generative_reviewer,
            uploader,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The configured attempt budget.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Runs the pipeline for one request.
    ///
    /// Returns `Err` only for malformed input; every renderable request
    /// produces a `PipelineOutcome`, exhausted or otherwise.
    pub async fn run(&self, request: &DiagramRequest) -> Result<PipelineOutcome, PipelineError> {
        if request.question_text.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("empty question text".to_string()));
        }

        let started = Instant::now();

        // CLASSIFY: degrades internally, never fails.
        let classification = self
            .classifier
            .classify(&request.question_text, &request.domain_hint)
            .await;
        debug!(
            question = request.question_index,
            domain = %classification.domain,
            diagram_type = %classification.diagram_type,
            backend = %classification.preferred_backend,
            "Classified question"
        );

        // ROUTE: pure lookup.
        let route = self.router.route(classification.domain, classification.diagram_type);

        let Some(backend) = self.backends.get(route.backend) else {
            warn!(backend = %route.backend, "Routed backend is not registered");
            return Ok(PipelineOutcome::backend_unavailable());
        };

        let outcome = self
            .attempt_loop(request, &classification, &route, backend)
            .await;

        info!(
            question = request.question_index,
            status = ?outcome.status,
            attempts = outcome.attempts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline reached terminal state"
        );
        Ok(outcome)
    }

    /// The generate/render/review loop, bounded by the attempt budget.
    async fn attempt_loop(
        &self,
        request: &DiagramRequest,
        classification: &Classification,
        route: &Route,
        backend: &Arc<dyn Render>,
    ) -> PipelineOutcome {
        let reviewer = self.reviewer_for(route.backend);

        let mut attempts: Vec<RenderResult> = Vec::new();
        let mut verdicts: Vec<ReviewVerdict> = Vec::new();
        // Append-only log of specs; a superseding spec is pushed, never
        // edited in place.
        let mut spec_log: Vec<RenderSpec> = Vec::new();
        let mut corrected_description: Option<String> = None;
        // Set only when the previous verdict was fixable on a fix-capable
        // backend; consumed by the next iteration.
        let mut pending_fix: Option<(Vec<u8>, ReviewVerdict)> = None;

        let mut attempt = 0usize;
        while attempt < self.max_attempts {
            attempt += 1;

            let state = if pending_fix.is_some() { State::Fix } else { State::Generate };
            debug!(question = request.question_index, attempt, ?state, "Starting attempt");

            let description = corrected_description
                .clone()
                .unwrap_or_else(|| request.question_text.clone());

            let image = match state {
                State::Fix => {
                    let (prior_image, verdict) =
                        pending_fix.take().expect("fix state implies pending fix");
                    match backend.fix(&prior_image, &verdict, &description).await {
                        Ok(image) => image,
                        Err(error) => {
                            // Failed fix consumes the attempt; next
                            // iteration regenerates from scratch.
                            warn!(attempt, error = %error, "In-place fix failed, will regenerate");
                            continue;
                        }
                    }
                }
                State::Generate => {
                    let ctx = GenerationContext {
                        question_text: &request.question_text,
                        domain: classification.domain,
                        diagram_type: classification.diagram_type,
                        subtype: route.subtype,
                        guidance: route.guidance,
                        corrected_description: corrected_description.as_deref(),
                    };

                    let source = match self.generate_source(route, &ctx).await {
                        Ok(source) => source,
                        Err(error) => {
                            if is_unavailable(&error) && attempts.is_empty() {
                                warn!(error = %error, "Backend unavailable before first attempt");
                                return PipelineOutcome::backend_unavailable();
                            }
                            warn!(attempt, error = %error, "Generation failed, consuming attempt");
                            continue;
                        }
                    };

                    let spec = RenderSpec::new(
                        route.backend,
                        route.subtype,
                        source,
                        description.clone(),
                    );
                    spec_log.push(spec.clone());

                    match backend.render(&spec).await {
                        Ok(image) => image,
                        Err(error) => {
                            if is_render_unavailable(&error) && attempts.is_empty() {
                                warn!(error = %error, "Backend unavailable before first attempt");
                                return PipelineOutcome::backend_unavailable();
                            }
                            warn!(
                                attempt,
                                backend = %route.backend,
                                error = %error,
                                "Render failed, consuming attempt"
                            );
                            continue;
                        }
                    }
                }
            };

            attempts.push(RenderResult {
                image_bytes: image.clone(),
                backend_used: route.backend,
                attempt_number: attempt,
            });

            // REVIEW: degrades internally, never fails.
            let verdict = reviewer
                .review(&image, &request.question_text, &description, route.guidance)
                .await;
            verdicts.push(verdict.clone());

            if verdict.passed {
                // ACCEPT.
                let stored = match &self.uploader {
                    Some(uploader) => match uploader.put(&image).await {
                        Ok(stored) => Some(stored),
                        Err(error) => {
                            warn!(error = %error, "Upload of accepted image failed");
                            None
                        }
                    },
                    None => None,
                };
                return PipelineOutcome::accepted(image, attempts, verdicts, stored);
            }

            debug!(
                attempt,
                fixable = verdict.fixable,
                reason = %verdict.reason,
                "Review rejected candidate"
            );

            if verdict.fixable && backend.supports_fix() && attempt < self.max_attempts {
                // FIX: legal only right after a fixable verdict.
                pending_fix = Some((image, verdict));
            } else {
                // REGENERATE with the superseding description, if any.
                if let Some(corrected) = verdict.corrected_description {
                    corrected_description = Some(corrected);
                }
            }
        }

        debug!(
            question = request.question_index,
            specs = spec_log.len(),
            renders = attempts.len(),
            "Attempt budget exhausted without an accepted candidate"
        );
        PipelineOutcome::exhausted(attempts, verdicts)
    }

    /// GENERATE: the backend decides which generation path runs.
    async fn generate_source(
        &self,
        route: &Route,
        ctx: &GenerationContext<'_>,
    ) -> Result<String, crate::error::GenerationError> {
        match route.backend {
            BackendKind::ProceduralPlot | BackendKind::CircuitSchematic
            | BackendKind::GraphLayout => {
                let runtime = SandboxRuntime::for_backend(route.backend)
                    .expect("sandboxed backend has a runtime");
                self.code_agent.generate(runtime, ctx).await
            }
            BackendKind::MarkupRaster => self.markup_agent.generate(ctx).await,
            // The image backend's "source" is the prompt; composing it is
            // local and cannot fail.
            BackendKind::GenerativeImage => Ok(build_image_prompt(ctx)),
        }
    }

    fn reviewer_for(&self, backend: BackendKind) -> &Arc<dyn ReviewAgent> {
        match backend {
            BackendKind::GenerativeImage => &self.generative_reviewer,
            _ => &self.procedural_reviewer,
        }
    }
}

/// Generation failure that means the model service is down, not that this
/// particular generation went wrong.
fn is_unavailable(error: &crate::error::GenerationError) -> bool {
    matches!(
        error,
        crate::error::GenerationError::Llm(LlmError::CircuitOpen(_))
    )
}

/// Render failure that means the backend's model service is down.
fn is_render_unavailable(error: &RenderError) -> bool {
    matches!(error, RenderError::Llm(LlmError::CircuitOpen(_)))
}
