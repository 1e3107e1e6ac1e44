use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::types::{ChatMessage, ChatRequest, ResponseSchema};

#[derive(Debug, Error)]
pub enum LlmError {
    /// Unreachable, timed out, or still failing with 429/5xx after retries.
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },
    #[error("{provider} rejected the request ({status}): {body}")]
    Rejected {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("unknown model provider '{0}'")]
    UnknownProvider(String),
}

impl LlmError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LlmError::Unavailable { .. })
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai", "lmstudio")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, LlmError>;

    /// generate embeddings, one vector per input in input order
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// Embeds text with a `provider/model` id.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, model_id: &str, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Produces a JSON value shaped by `schema` from a `provider/model` id.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_structured(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        schema: &ResponseSchema,
    ) -> Result<Value, LlmError>;
}
