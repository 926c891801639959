//! Model service integration for diagramforge.
//!
//! Four vendor-agnostic model roles back the pipeline:
//! 1. classification — text in, structured JSON out, low-latency tier
//! 2. code/markup generation — text prompt in, source text out
//! 3. vision review — image + text in, structured JSON out
//! 4. image generation/fix — text (+ image) in, image out
//!
//! Each role is a trait so agents can be tested against mock providers. The
//! production adapter ([`OpenRouterClient`]) implements all of them over one
//! chat-completions endpoint. Clients are constructed once at process start
//! and passed by `Arc` into the agents — no module-level globals.

pub mod breaker;
pub mod openrouter;

pub use breaker::{BreakerState, CircuitBreaker, GuardedImage, GuardedText, GuardedVision};
pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// A message in a conversation with a text model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Request for text generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRequest {
    /// Model identifier; empty string selects the adapter's default.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl TextRequest {
    /// Create a new request with default sampling parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from a text generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResponse {
    /// Model that generated this response.
    pub model: String,
    /// Generated content of the first choice.
    pub content: String,
    /// Token usage statistics.
    pub usage: Usage,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Request for a vision-model analysis of a candidate image.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    /// Model identifier; empty string selects the adapter's default.
    pub model: String,
    /// System instructions for the reviewer role.
    pub system: String,
    /// User prompt describing what to check.
    pub prompt: String,
    /// PNG or JPEG bytes of the candidate image.
    pub image: Vec<u8>,
}

/// Request for image generation or in-place image fixing.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Model identifier; empty string selects the adapter's default.
    pub model: String,
    /// Generation or correction prompt.
    pub prompt: String,
    /// Existing image to edit; `None` generates from scratch.
    pub base_image: Option<Vec<u8>>,
}

/// Text generation role (classification, code and markup generation).
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, request: TextRequest) -> Result<TextResponse, LlmError>;
}

/// Vision review role.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Analyze an image and return the model's raw text verdict.
    async fn analyze(&self, request: VisionRequest) -> Result<String, LlmError>;
}

/// Image generation/fix role.
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Produce image bytes, or `None` when the model yields no image payload.
    async fn create_image(&self, request: ImageRequest) -> Result<Option<Vec<u8>>, LlmError>;
}
