//! OpenRouter-compatible adapter for all four model roles.
//!
//! OpenRouter exposes chat, vision and image-capable models behind a single
//! chat-completions endpoint, which keeps this adapter small: text requests
//! send plain messages, vision requests send a text part plus an image-URL
//! part carrying a data URI, and image requests opt into the image modality
//! and read the image payload back out of the first choice.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::{
    ImageModel, ImageRequest, TextModel, TextRequest, TextResponse, Usage, VisionModel,
    VisionRequest,
};

/// Default OpenRouter API endpoint.
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Maximum number of retry attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Request timeout in seconds. Image generation is the slowest role.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// HTTP adapter over an OpenRouter-compatible endpoint.
///
/// One client serves all four model roles; which model each role uses is
/// decided per-request by the caller (the pipeline config carries a model id
/// per role).
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default model.
    pub fn new(api_key: String, default_model: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client - system TLS configuration error"),
            api_key,
            base_url: OPENROUTER_BASE_URL.to_string(),
            default_model,
        }
    }

    /// Create a client with a custom base URL, for proxies and tests.
    pub fn with_custom_url(api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client - system TLS configuration error"),
            api_key,
            base_url,
            default_model,
        }
    }

    /// Create a client from `DIAGRAMFORGE_API_KEY` / `DIAGRAMFORGE_API_BASE`.
    pub fn from_env(default_model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key =
            std::env::var("DIAGRAMFORGE_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        let base_url = std::env::var("DIAGRAMFORGE_API_BASE")
            .unwrap_or_else(|_| OPENROUTER_BASE_URL.to_string());
        Ok(Self::with_custom_url(api_key, base_url, default_model.into()))
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The API key masked for logging.
    pub fn api_key_masked(&self) -> String {
        if self.api_key.len() <= 8 {
            "*".repeat(self.api_key.len())
        } else {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        }
    }

    fn resolve_model(&self, requested: &str) -> String {
        if requested.is_empty() {
            self.default_model.clone()
        } else {
            requested.to_string()
        }
    }

    /// POST a chat-completions body with exponential backoff on transient errors.
    async fn post_with_retry(&self, body: &Value) -> Result<ApiResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay_ms = BASE_RETRY_DELAY_MS * (1 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                tracing::debug!(attempt = attempt + 1, delay_ms, "Retrying model request");
            }

            match self.post_once(&url, body).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        error = %err,
                        "Transient model service error, will retry"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LlmError::RequestFailed("Max retries exceeded with no error captured".to_string())
        }))
    }

    async fn post_once(&self, url: &str, body: &Value) -> Result<ApiResponse, LlmError> {
        let http_response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "diagramforge")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                if status_code == 429 {
                    return Err(LlmError::RateLimited(error_response.error.message));
                }
                return Err(LlmError::ApiError {
                    code: status_code,
                    message: error_response.error.message,
                });
            }

            return Err(LlmError::ApiError { code: status_code, message: error_text });
        }

        http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))
    }
}

#[async_trait]
impl TextModel for OpenRouterClient {
    async fn generate(&self, request: TextRequest) -> Result<TextResponse, LlmError> {
        let mut body = json!({
            "model": self.resolve_model(&request.model),
            "messages": request.messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self.post_with_retry(&body).await?;
        response.into_text_response()
    }
}

#[async_trait]
impl VisionModel for OpenRouterClient {
    async fn analyze(&self, request: VisionRequest) -> Result<String, LlmError> {
        let data_uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&request.image)
        );

        let body = json!({
            "model": self.resolve_model(&request.model),
            "messages": [
                { "role": "system", "content": request.system },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.prompt },
                        { "type": "image_url", "image_url": { "url": data_uri } },
                    ],
                },
            ],
        });

        let response = self.post_with_retry(&body).await?;
        response.into_text_response().map(|r| r.content)
    }
}

#[async_trait]
impl ImageModel for OpenRouterClient {
    async fn create_image(&self, request: ImageRequest) -> Result<Option<Vec<u8>>, LlmError> {
        let user_content = match &request.base_image {
            Some(image) => {
                let data_uri = format!(
                    "data:image/png;base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(image)
                );
                json!([
                    { "type": "text", "text": request.prompt },
                    { "type": "image_url", "image_url": { "url": data_uri } },
                ])
            }
            None => json!(request.prompt),
        };

        let body = json!({
            "model": self.resolve_model(&request.model),
            "modalities": ["image", "text"],
            "messages": [{ "role": "user", "content": user_content }],
        });

        let response = self.post_with_retry(&body).await?;
        Ok(response.first_image_bytes())
    }
}

/// Wire response from the chat-completions endpoint.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    /// Present only for image-modality responses.
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    image_url: ApiImageUrl,
}

#[derive(Debug, Deserialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ApiResponse {
    fn into_text_response(self) -> Result<TextResponse, LlmError> {
        let usage = self.usage.unwrap_or_default();
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(TextResponse {
            model: self.model,
            content,
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }

    /// Decode the first image payload, if the response carries one.
    fn first_image_bytes(&self) -> Option<Vec<u8>> {
        let url = &self.choices.first()?.message.images.first()?.image_url.url;
        let encoded = url.split("base64,").nth(1)?;
        base64::engine::general_purpose::STANDARD.decode(encoded).ok()
    }
}
