//! OpenAI-compatible HTTP provider (OpenAI, LM Studio, Ollama's `/v1` surface).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::{LlmError, LlmProvider};
use super::types::ChatRequest;
use crate::core::config::ProviderSettings;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    client: Client,
    max_retries: u32,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, settings: &ProviderSettings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = settings.api_key.as_deref() {
            let auth = format!("Bearer {}", api_key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).map_err(|_| {
                    ApiError::Internal(format!("invalid api_key for provider '{}'", name))
                })?,
            );
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            name: name.to_string(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client,
            max_retries: settings.max_retries,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            match self.client.post(&url).json(body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<Value>()
                            .await
                            .map_err(|err| LlmError::InvalidResponse(err.to_string()));
                    }

                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) {
                        if attempt < self.max_retries {
                            attempt += 1;
                            tracing::warn!(
                                provider = %self.name,
                                %status,
                                attempt,
                                "retrying model request"
                            );
                            tokio::time::sleep(retry_backoff(attempt)).await;
                            continue;
                        }
                        return Err(LlmError::Unavailable {
                            provider: self.name.clone(),
                            message: format!("{} after {} attempts: {}", status, attempt + 1, text),
                        });
                    }
                    return Err(LlmError::Rejected {
                        provider: self.name.clone(),
                        status: status.as_u16(),
                        body: text,
                    });
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt < self.max_retries {
                        attempt += 1;
                        tracing::warn!(provider = %self.name, attempt, "retrying model request: {}", err);
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(LlmError::Unavailable {
                        provider: self.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, LlmError> {
        let body = chat_body(&request, model_id);
        let payload = self.post_json("/chat/completions", &body).await?;
        parse_chat_content(&payload)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, LlmError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "model": model_id,
            "input": inputs,
        });
        let payload = self.post_json("/embeddings", &body).await?;
        parse_embeddings(payload, inputs.len())
    }
}

fn chat_body(request: &ChatRequest, model_id: &str) -> Value {
    let mut body = json!({
        "model": model_id,
        "messages": request.messages,
        "stream": false,
    });

    if let Some(obj) = body.as_object_mut() {
        if let Some(t) = request.temperature {
            obj.insert("temperature".to_string(), json!(t));
        }
        if let Some(format) = &request.response_format {
            obj.insert(
                "response_format".to_string(),
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": format.name,
                        "schema": format.schema,
                        "strict": false,
                    }
                }),
            );
        }
    }

    body
}

fn parse_chat_content(payload: &Value) -> Result<String, LlmError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".to_string()))
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

fn parse_embeddings(payload: Value, expected: usize) -> Result<Vec<Vec<f32>>, LlmError> {
    let mut parsed: EmbeddingResponse = serde_json::from_value(payload)
        .map_err(|err| LlmError::InvalidResponse(format!("embedding payload: {}", err)))?;
    parsed.data.sort_by_key(|entry| entry.index);
    if parsed.data.len() != expected {
        return Err(LlmError::InvalidResponse(format!(
            "returned {} embeddings for {} inputs",
            parsed.data.len(),
            expected
        )));
    }
    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_backoff(attempt: u32) -> Duration {
    let capped = attempt.min(5);
    Duration::from_millis(500 * (1 << capped))
}
