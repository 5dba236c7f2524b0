use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ImageMime, StructuredOutputFormat};
use thiserror::Error;

use lostfound_core::AiSettings;

use crate::prompt::ContentPart;

/// Everything one model round trip needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub flow: String,
    pub system: String,
    pub parts: Vec<ContentPart>,
    /// JSON Schema of the flow's output shape
    pub output_schema: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("model client misconfigured: {0}")]
    Config(String),
    #[error("request rejected before sending: {0}")]
    InvalidRequest(String),
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model did not answer within {0:?}")]
    Timeout(Duration),
    #[error("model returned no text")]
    Empty,
}

/// A hosted generative model reachable in a single request/response round trip.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, TransportError>;
}

#[async_trait]
impl<C: ModelClient + ?Sized> ModelClient for Arc<C> {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, TransportError> {
        (**self).generate(request).await
    }
}

/// Bounds every round trip of `inner`; an overrun is a [`TransportError::Timeout`].
pub struct TimeoutClient<C> {
    inner: C,
    limit: Duration,
}

impl<C: ModelClient> TimeoutClient<C> {
    pub fn new(inner: C, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<C: ModelClient> ModelClient for TimeoutClient<C> {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, TransportError> {
        tokio::time::timeout(self.limit, self.inner.generate(request))
            .await
            .map_err(|_| TransportError::Timeout(self.limit))?
    }
}

fn map_backend(provider: &str) -> Result<LLMBackend, TransportError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(TransportError::Config(format!("unknown provider: {other}"))),
    }
}

fn map_image_mime(mime: &str) -> Result<ImageMime, TransportError> {
    match mime {
        "image/jpeg" | "image/jpg" => Ok(ImageMime::JPEG),
        "image/png" => Ok(ImageMime::PNG),
        "image/gif" => Ok(ImageMime::GIF),
        "image/webp" => Ok(ImageMime::WEBP),
        other => Err(TransportError::InvalidRequest(format!(
            "unsupported image type: {other}"
        ))),
    }
}

/// One user message per content part, in order.
fn to_messages(parts: &[ContentPart]) -> Result<Vec<ChatMessage>, TransportError> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => Ok(ChatMessage::user().content(text).build()),
            ContentPart::Media(uri) => {
                let mime = map_image_mime(uri.mime_type())?;
                Ok(ChatMessage::user().image(mime, uri.bytes().to_vec()).build())
            }
        })
        .collect()
}

/// [`ModelClient`] backed by the `llm` crate, configured from [`AiSettings`].
///
/// Waits as long as the provider takes; wrap it in [`TimeoutClient`] to bound
/// that.
pub struct LlmClient {
    settings: AiSettings,
}

impl LlmClient {
    pub fn new(settings: AiSettings) -> Self {
        Self { settings }
    }

    /// The client with `timeoutSecs` from its settings applied.
    pub fn with_timeout(settings: AiSettings) -> TimeoutClient<Self> {
        let limit = Duration::from_secs(settings.timeout_secs.max(1));
        TimeoutClient::new(Self::new(settings), limit)
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, TransportError> {
        let backend = map_backend(&self.settings.provider)?;

        let format: StructuredOutputFormat = serde_json::from_value(serde_json::json!({
            "name": request.flow,
            "schema": request.output_schema,
        }))
        .map_err(|e| TransportError::InvalidRequest(format!("output schema: {e}")))?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&self.settings.model)
            .system(&request.system)
            .schema(format);

        if !self.settings.api_key.is_empty() {
            builder = builder.api_key(&self.settings.api_key);
        }

        let llm = builder
            .build()
            .map_err(|e| TransportError::Config(format!("build LLM: {e}")))?;

        let messages = to_messages(&request.parts)?;

        let response = llm
            .chat(&messages)
            .await
            .map_err(|e| TransportError::Request(format!("chat: {e}")))?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(ModelResponse { text }),
            _ => Err(TransportError::Empty),
        }
    }
}
