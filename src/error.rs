//! Error types for diagramforge operations.
//!
//! Defines error types for the major subsystems:
//! - Model service calls (classification, generation, review, image)
//! - Sandboxed execution of generated renderer code
//! - Vector-markup to raster conversion
//! - Pipeline orchestration
//! - Image storage

use thiserror::Error;

/// Errors that can occur during model service calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: DIAGRAMFORGE_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse model response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Circuit breaker open for '{0}': refusing call")]
    CircuitOpen(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlmError {
    /// True for failures worth retrying: network hiccups, rate limits, 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RequestFailed(msg) => {
                msg.contains("timeout")
                    || msg.contains("connection")
                    || msg.contains("temporarily")
                    || msg.contains("Connection refused")
            }
            LlmError::RateLimited(_) => true,
            LlmError::ApiError { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    /// True for failures that indicate the credential itself is bad.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            LlmError::MissingApiKey | LlmError::ApiError { code: 401 | 403, .. }
        )
    }
}

/// Errors that can occur while generating renderer source or markup.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model response contained no usable source: {0}")]
    EmptySource(String),
}

/// Errors from the sandboxed execution of untrusted generated code.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Source rejected: disallowed pattern '{pattern}'")]
    DisallowedPattern { pattern: String },

    #[error("Source rejected: import '{module}' is outside the allow-list")]
    DisallowedImport { module: String },

    #[error("Execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Renderer process exited with code {code}: {stderr}")]
    RuntimeError { code: i32, stderr: String },

    #[error("Renderer completed but produced no usable output artifact")]
    MissingArtifact,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from vector-markup to raster conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Malformed markup: {0}")]
    MalformedInput(String),

    #[error("Raster backend failure: {0}")]
    BackendFailure(String),
}

/// Errors from a render backend. One variant per failure source so the
/// orchestrator can log the failure class without downcasting.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Image model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Image model returned no image payload")]
    NoImagePayload,

    #[error("Backend does not support in-place fixing")]
    FixUnsupported,
}

/// Errors that terminate a pipeline rather than consuming an attempt.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Attempt budget exhausted after {attempts} attempts")]
    Exhausted { attempts: usize },
}

/// Errors from the storage uploader.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
