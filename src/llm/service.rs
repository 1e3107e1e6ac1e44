use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::openai::OpenAiCompatibleProvider;
use super::provider::{LlmError, LlmProvider, StructuredGenerator, TextEmbedder};
use super::types::{ChatMessage, ChatRequest, ResponseSchema};
use crate::core::config::ProviderSettings;
use crate::core::errors::ApiError;

/// Sampling temperature for schema-constrained replies.
pub const STRUCTURED_TEMPERATURE: f64 = 0.0;

/// Routes `provider/model` ids to the configured providers.
#[derive(Clone, Default)]
pub struct LlmService {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl LlmService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &HashMap<String, ProviderSettings>) -> Result<Self, ApiError> {
        let mut service = Self::new();
        for (name, provider_settings) in settings {
            let provider = OpenAiCompatibleProvider::new(name, provider_settings)?;
            service = service.with_provider(name, Arc::new(provider));
        }
        Ok(service)
    }

    pub fn with_provider(mut self, name: &str, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(name.to_string(), provider);
        self
    }

    pub fn has_provider_for(&self, model_id: &str) -> bool {
        self.resolve(model_id).is_ok()
    }

    fn resolve<'a>(&self, model_id: &'a str) -> Result<(Arc<dyn LlmProvider>, &'a str), LlmError> {
        let (provider, model) = model_id
            .split_once('/')
            .ok_or_else(|| LlmError::UnknownProvider(model_id.to_string()))?;
        let handle = self
            .providers
            .get(provider)
            .cloned()
            .ok_or_else(|| LlmError::UnknownProvider(provider.to_string()))?;
        Ok((handle, model))
    }
}

#[async_trait]
impl TextEmbedder for LlmService {
    async fn embed(&self, model_id: &str, text: &str) -> Result<Vec<f32>, LlmError> {
        let (provider, model) = self.resolve(model_id)?;
        provider
            .embed(&[text.to_string()], model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no embedding returned".to_string()))
    }
}

#[async_trait]
impl StructuredGenerator for LlmService {
    async fn generate_structured(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        schema: &ResponseSchema,
    ) -> Result<Value, LlmError> {
        let (provider, model) = self.resolve(model_id)?;
        let request = ChatRequest::new(messages)
            .with_response_schema(schema.clone())
            .with_temperature(STRUCTURED_TEMPERATURE);
        let content = provider.chat(request, model).await?;
        serde_json::from_str(strip_code_fences(&content)).map_err(|err| {
            LlmError::InvalidResponse(format!("reply is not JSON ({}): {}", err, truncate(&content)))
        })
    }
}

fn code_fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").ok())
        .as_ref()
}

/// Some local models wrap JSON replies in a markdown code fence.
fn strip_code_fences(content: &str) -> &str {
    match code_fence()
        .and_then(|fence| fence.captures(content))
        .and_then(|caps| caps.get(1))
    {
        Some(inner) => inner.as_str(),
        None => content.trim(),
    }
}

fn truncate(content: &str) -> String {
    content.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProvider {
        reply: String,
        calls: Mutex<Vec<String>>,
        temperatures: Mutex<Vec<Option<f64>>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, LlmError> {
            assert!(request.response_format.is_some());
            self.calls.lock().unwrap().push(model_id.to_string());
            self.temperatures.lock().unwrap().push(request.temperature);
            Ok(self.reply.clone())
        }

        async fn embed(
            &self,
            inputs: &[String],
            model_id: &str,
        ) -> Result<Vec<Vec<f32>>, LlmError> {
            self.calls.lock().unwrap().push(model_id.to_string());
            Ok(inputs.iter().map(|text| vec![text.len() as f32, 1.0]).collect())
        }
    }

    fn schema() -> ResponseSchema {
        ResponseSchema {
            name: "test".to_string(),
            schema: serde_json::json!({ "type": "object" }),
        }
    }

    #[test]
    fn strip_code_fences_handles_plain_and_fenced_replies() {
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1]\n```\n"), "[1]");
    }

    #[tokio::test]
    async fn routes_by_provider_prefix() {
        let provider = Arc::new(RecordingProvider::default());
        let service = LlmService::new().with_provider("openai", provider.clone());

        let vector = service
            .embed("openai/text-embedding-3-large", "abc")
            .await
            .unwrap();
        assert_eq!(vector, vec![3.0, 1.0]);
        assert_eq!(
            provider.calls.lock().unwrap().as_slice(),
            ["text-embedding-3-large"]
        );
    }

    #[tokio::test]
    async fn unknown_prefix_is_reported() {
        let service = LlmService::new();
        let err = service.embed("cohere/embed-v3", "abc").await.unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider(name) if name == "cohere"));

        let err = service.embed("no-prefix", "abc").await.unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider(_)));
        assert!(!service.has_provider_for("openai/gpt-4o-mini"));
    }

    #[tokio::test]
    async fn generate_structured_parses_fenced_json() {
        let provider = Arc::new(RecordingProvider {
            reply: "```json\n{\"queries\": [\"tabelas dinâmicas\"]}\n```".to_string(),
            ..Default::default()
        });
        let service = LlmService::new().with_provider("openai", provider.clone());

        let value = service
            .generate_structured("openai/gpt-4o-mini", vec![ChatMessage::user("x")], &schema())
            .await
            .unwrap();
        assert_eq!(value["queries"][0], "tabelas dinâmicas");
        assert_eq!(
            provider.temperatures.lock().unwrap().as_slice(),
            [Some(STRUCTURED_TEMPERATURE)]
        );
    }

    #[tokio::test]
    async fn generate_structured_rejects_prose() {
        let provider = Arc::new(RecordingProvider {
            reply: "Claro! Aqui estão as consultas.".to_string(),
            ..Default::default()
        });
        let service = LlmService::new().with_provider("openai", provider);

        let err = service
            .generate_structured("openai/gpt-4o-mini", vec![ChatMessage::user("x")], &schema())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        assert!(!err.is_unavailable());
    }
}
