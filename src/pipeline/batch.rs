//! Concurrent batch execution of independent pipelines.
//!
//! One orchestrator run per question, fanned out under a semaphore so the
//! number of simultaneously active pipelines — and with them external API
//! calls and sandboxed processes — stays bounded. Pipelines share nothing;
//! a failing question is recorded and the rest of the batch continues.
//! Results are correlated by question index, not completion order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::orchestrator::PipelineOrchestrator;
use super::types::{DiagramRequest, OutcomeStatus, PipelineOutcome};

/// Result for one question in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_index: usize,
    pub assignment_id: String,
    /// Terminal outcome; `None` when the pipeline itself failed (malformed
    /// input), in which case `error` explains why.
    pub outcome: Option<PipelineOutcome>,
    pub error: Option<String>,
}

impl QuestionResult {
    /// True when this question ends with an accepted diagram.
    pub fn has_diagram(&self) -> bool {
        self.outcome.as_ref().map(|o| o.is_accepted()).unwrap_or(false)
    }
}

/// Aggregate statistics for a finished batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub accepted: usize,
    pub exhausted: usize,
    pub backend_unavailable: usize,
    pub failed: usize,
    pub average_attempts: f64,
    pub wall_clock: Duration,
}

impl BatchStats {
    fn from_results(results: &[QuestionResult], wall_clock: Duration) -> Self {
        let mut stats = Self { total: results.len(), wall_clock, ..Default::default() };

        let mut attempt_sum = 0usize;
        let mut attempt_count = 0usize;
        for result in results {
            match &result.outcome {
                Some(outcome) => {
                    attempt_sum += outcome.attempts.len();
                    attempt_count += 1;
                    match outcome.status {
                        OutcomeStatus::Accepted => stats.accepted += 1,
                        OutcomeStatus::Exhausted => stats.exhausted += 1,
                        OutcomeStatus::BackendUnavailable => stats.backend_unavailable += 1,
                    }
                }
                None => stats.failed += 1,
            }
        }

        if attempt_count > 0 {
            stats.average_attempts = attempt_sum as f64 / attempt_count as f64;
        }
        stats
    }
}

/// Runs independent orchestrators concurrently under a fixed limit.
pub struct BatchCoordinator {
    orchestrator: Arc<PipelineOrchestrator>,
    concurrency: usize,
}

impl BatchCoordinator {
    /// Creates a coordinator with the given concurrency limit.
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, concurrency: usize) -> Self {
        Self { orchestrator, concurrency: concurrency.max(1) }
    }

    /// The configured concurrency limit.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every request to a terminal state and returns results ordered
    /// by question index, plus aggregate stats.
    pub async fn run_batch(&self, requests: Vec<DiagramRequest>) -> (Vec<QuestionResult>, BatchStats) {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let futures: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let semaphore = Arc::clone(&semaphore);
                let orchestrator = Arc::clone(&self.orchestrator);
                async move {
                    let _permit =
                        semaphore.acquire().await.expect("batch semaphore never closes");

                    let question_index = request.question_index;
                    let assignment_id = request.assignment_id.clone();

                    match orchestrator.run(&request).await {
                        Ok(outcome) => QuestionResult {
                            question_index,
                            assignment_id,
                            outcome: Some(outcome),
                            error: None,
                        },
                        Err(error) => {
                            // Per-question failure; siblings keep running.
                            warn!(question = question_index, %error, "Pipeline failed");
                            QuestionResult {
                                question_index,
                                assignment_id,
                                outcome: None,
                                error: Some(error.to_string()),
                            }
                        }
                    }
                }
            })
            .collect();

        let mut results = futures::future::join_all(futures).await;
        results.sort_by_key(|result| result.question_index);

        let stats = BatchStats::from_results(&results, started.elapsed());
        info!(
            total = stats.total,
            accepted = stats.accepted,
            exhausted = stats.exhausted,
            backend_unavailable = stats.backend_unavailable,
            failed = stats.failed,
            wall_clock_ms = stats.wall_clock.as_millis() as u64,
            "Batch complete"
        );

        (results, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ReviewVerdict;
    use crate::pipeline::types::RenderResult;
    use crate::render::BackendKind;

    fn outcome_with_status(status: OutcomeStatus, attempts: usize) -> PipelineOutcome {
        let attempts = (1..=attempts)
            .map(|n| RenderResult {
                image_bytes: vec![0u8],
                backend_used: BackendKind::ProceduralPlot,
                attempt_number: n,
            })
            .collect();
        let mut outcome = PipelineOutcome::exhausted(attempts, vec![ReviewVerdict::skipped()]);
        outcome.status = status;
        if status == OutcomeStatus::Accepted {
            outcome.final_image = Some(vec![0u8]);
        }
        outcome
    }

    fn result(index: usize, outcome: Option<PipelineOutcome>, error: Option<&str>) -> QuestionResult {
        QuestionResult {
            question_index: index,
            assignment_id: "a".to_string(),
            outcome,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn stats_aggregate_by_status() {
        let results = vec![
            result(0, Some(outcome_with_status(OutcomeStatus::Accepted, 1)), None),
            result(1, Some(outcome_with_status(OutcomeStatus::Accepted, 3)), None),
            result(2, Some(outcome_with_status(OutcomeStatus::Exhausted, 3)), None),
            result(3, Some(outcome_with_status(OutcomeStatus::BackendUnavailable, 0)), None),
            result(4, None, Some("empty question text")),
        ];

        let stats = BatchStats::from_results(&results, Duration::from_secs(2));
        assert_eq!(stats.total, 5);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.backend_unavailable, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.average_attempts - 7.0 / 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn has_diagram_only_for_accepted() {
        assert!(result(0, Some(outcome_with_status(OutcomeStatus::Accepted, 1)), None)
            .has_diagram());
        assert!(!result(0, Some(outcome_with_status(OutcomeStatus::Exhausted, 3)), None)
            .has_diagram());
        assert!(!result(0, None, Some("boom")).has_diagram());
    }
}
