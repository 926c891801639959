//! Pipeline configuration.
//!
//! One config covers the orchestrator, the batch coordinator, the sandbox
//! and the per-role model selection. Construct with `Default`, from the
//! environment, or through the builder methods; `validate()` runs before a
//! pipeline is built.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::types::MAX_ATTEMPTS;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the diagram pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Attempt budget and batching
    /// Maximum generate/render/review cycles per request.
    pub max_attempts: usize,
    /// Concurrent pipelines per batch.
    pub batch_concurrency: usize,

    // Sandbox settings
    /// Interpreter binary for the procedural renderers.
    pub python_bin: String,
    /// Wall-clock limit for one sandboxed execution.
    pub sandbox_timeout: Duration,
    /// Minimum output DPI for sandboxed renders.
    pub dpi_floor: u32,

    // Raster settings
    /// Target raster width for markup conversion.
    pub raster_width: u32,
    /// Target raster height for markup conversion.
    pub raster_height: u32,

    // Model roles
    /// Low-latency model for classification.
    pub classifier_model: String,
    /// Model for code and markup generation.
    pub generation_model: String,
    /// Vision model for review.
    pub vision_model: String,
    /// Image generation/fix model.
    pub image_model: String,

    // Storage
    /// Directory accepted images are stored under (local uploader).
    pub storage_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            batch_concurrency: 5,
            python_bin: "python3".to_string(),
            sandbox_timeout: Duration::from_secs(20),
            dpi_floor: 150,
            raster_width: 1200,
            raster_height: 900,
            classifier_model: "openai/gpt-4o-mini".to_string(),
            generation_model: "anthropic/claude-sonnet-4.5".to_string(),
            vision_model: "openai/gpt-4o".to_string(),
            image_model: "google/gemini-2.5-flash-image".to_string(),
            storage_root: PathBuf::from("./diagrams"),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from `DIAGRAMFORGE_*` environment variables,
    /// falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DIAGRAMFORGE_MAX_ATTEMPTS") {
            config.max_attempts = parse_env_value(&val, "DIAGRAMFORGE_MAX_ATTEMPTS")?;
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_BATCH_CONCURRENCY") {
            config.batch_concurrency = parse_env_value(&val, "DIAGRAMFORGE_BATCH_CONCURRENCY")?;
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_PYTHON_BIN") {
            config.python_bin = val;
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_SANDBOX_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "DIAGRAMFORGE_SANDBOX_TIMEOUT_SECS")?;
            config.sandbox_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_DPI_FLOOR") {
            config.dpi_floor = parse_env_value(&val, "DIAGRAMFORGE_DPI_FLOOR")?;
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_CLASSIFIER_MODEL") {
            config.classifier_model = val;
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_GENERATION_MODEL") {
            config.generation_model = val;
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_VISION_MODEL") {
            config.vision_model = val;
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_IMAGE_MODEL") {
            config.image_model = val;
        }
        if let Ok(val) = std::env::var("DIAGRAMFORGE_STORAGE_ROOT") {
            config.storage_root = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.batch_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.python_bin.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "python_bin cannot be empty".to_string(),
            ));
        }

        let timeout_secs = self.sandbox_timeout.as_secs();
        if timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "sandbox_timeout must be greater than 0".to_string(),
            ));
        }
        if timeout_secs > 120 {
            return Err(ConfigError::ValidationFailed(
                "sandbox_timeout above 120s defeats the point of time-boxing".to_string(),
            ));
        }

        if self.raster_width == 0 || self.raster_height == 0 {
            return Err(ConfigError::ValidationFailed(
                "raster resolution must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the attempt budget.
    pub fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts = max;
        self
    }

    /// Builder method to set batch concurrency.
    pub fn with_batch_concurrency(mut self, limit: usize) -> Self {
        self.batch_concurrency = limit;
        self
    }

    /// Builder method to set the interpreter binary.
    pub fn with_python_bin(mut self, bin: impl Into<String>) -> Self {
        self.python_bin = bin.into();
        self
    }

    /// Builder method to set the sandbox timeout.
    pub fn with_sandbox_timeout(mut self, timeout: Duration) -> Self {
        self.sandbox_timeout = timeout;
        self
    }

    /// Builder method to set the storage root.
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
