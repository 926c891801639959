//! Core data model for the pipeline.
//!
//! Image bytes are base64-encoded when outcomes are serialized so records
//! stay valid JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::ReviewVerdict;
use crate::render::BackendKind;
use crate::storage::StoredObject;

/// Maximum generate/render/review cycles before giving up.
pub const MAX_ATTEMPTS: usize = 3;

/// A request to produce one diagram. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramRequest {
    /// The assignment question the diagram accompanies.
    pub question_text: String,
    /// Course-level subject hint, possibly empty.
    pub domain_hint: String,
    /// Owning assignment.
    pub assignment_id: String,
    /// Position of the question within the assignment; results are
    /// correlated by this index, not completion order.
    pub question_index: usize,
}

impl DiagramRequest {
    /// Creates a request.
    pub fn new(
        question_text: impl Into<String>,
        domain_hint: impl Into<String>,
        assignment_id: impl Into<String>,
        question_index: usize,
    ) -> Self {
        Self {
            question_text: question_text.into(),
            domain_hint: domain_hint.into(),
            assignment_id: assignment_id.into(),
            question_index,
        }
    }
}

/// A successfully rendered candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResult {
    /// Raster bytes of the candidate.
    #[serde(with = "base64_bytes")]
    pub image_bytes: Vec<u8>,
    /// Backend that produced it.
    pub backend_used: BackendKind,
    /// 1-based attempt number that produced it.
    pub attempt_number: usize,
}

/// Terminal status of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A candidate passed review.
    Accepted,
    /// The attempt budget ran out without an accepted candidate.
    Exhausted,
    /// The routed backend was not available; no attempt was made.
    BackendUnavailable,
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub status: OutcomeStatus,
    /// Present exactly when `status == Accepted`.
    #[serde(with = "base64_opt_bytes")]
    pub final_image: Option<Vec<u8>>,
    /// Every successfully rendered candidate, in attempt order.
    pub attempts: Vec<RenderResult>,
    /// Every review verdict, in attempt order.
    pub verdicts: Vec<ReviewVerdict>,
    /// Storage handle when an uploader was configured and the image was
    /// accepted.
    pub stored: Option<StoredObject>,
    /// When the pipeline reached its terminal state.
    pub completed_at: DateTime<Utc>,
}

impl PipelineOutcome {
    /// Accepted outcome carrying the final image.
    pub fn accepted(
        final_image: Vec<u8>,
        attempts: Vec<RenderResult>,
        verdicts: Vec<ReviewVerdict>,
        stored: Option<StoredObject>,
    ) -> Self {
        Self {
            status: OutcomeStatus::Accepted,
            final_image: Some(final_image),
            attempts,
            verdicts,
            stored,
            completed_at: Utc::now(),
        }
    }

    /// Exhausted outcome; the caller decides whether to re-route or omit
    /// the diagram.
    pub fn exhausted(attempts: Vec<RenderResult>, verdicts: Vec<ReviewVerdict>) -> Self {
        Self {
            status: OutcomeStatus::Exhausted,
            final_image: None,
            attempts,
            verdicts,
            stored: None,
            completed_at: Utc::now(),
        }
    }

    /// Outcome for a backend that was unavailable before the first attempt.
    pub fn backend_unavailable() -> Self {
        Self {
            status: OutcomeStatus::BackendUnavailable,
            final_image: None,
            attempts: Vec::new(),
            verdicts: Vec::new(),
            stored: None,
            completed_at: Utc::now(),
        }
    }

    /// True when the outcome carries an accepted image.
    pub fn is_accepted(&self) -> bool {
        self.status == OutcomeStatus::Accepted
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

mod base64_opt_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer
                .serialize_some(&base64::engine::general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| base64::engine::general_purpose::STANDARD.decode(s))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_outcome_invariant() {
        let outcome = PipelineOutcome::accepted(b"png".to_vec(), Vec::new(), Vec::new(), None);
        assert!(outcome.is_accepted());
        assert!(outcome.final_image.is_some());
    }

    #[test]
    fn exhausted_outcome_has_no_image() {
        let outcome = PipelineOutcome::exhausted(Vec::new(), Vec::new());
        assert_eq!(outcome.status, OutcomeStatus::Exhausted);
        assert!(outcome.final_image.is_none());
    }

    #[test]
    fn outcome_serializes_image_as_base64() {
        let result = RenderResult {
            image_bytes: b"\x89PNG".to_vec(),
            backend_used: BackendKind::ProceduralPlot,
            attempt_number: 1,
        };
        let outcome = PipelineOutcome::accepted(b"\x89PNG".to_vec(), vec![result], Vec::new(), None);

        let json = serde_json::to_string(&outcome).expect("serializes");
        assert!(json.contains("\"status\":\"accepted\""));
        assert!(json.contains("iVBORw")); // base64 of \x89PNG...

        let parsed: PipelineOutcome = serde_json::from_str(&json).expect("parses");
        assert_eq!(parsed.final_image.as_deref(), Some(b"\x89PNG".as_ref()));
        assert_eq!(parsed.attempts[0].image_bytes, b"\x89PNG");
    }

    #[test]
    fn request_is_plain_data() {
        let request = DiagramRequest::new("Draw an RC circuit", "ee101", "assignment-7", 2);
        assert_eq!(request.question_index, 2);
        assert_eq!(request.assignment_id, "assignment-7");
    }
}
