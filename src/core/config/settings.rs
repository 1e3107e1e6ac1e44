use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use super::defaults::{
    DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, DEFAULT_K, DEFAULT_MAX_RECOMMENDATIONS,
    DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRIEVER_BACKEND, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::recommend::PipelineConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RecommenderSettings {
    pub embedding_model: String,
    pub generation_model: String,
    pub planner_model: Option<String>,
    pub retriever_backend: String,
    pub k: usize,
    pub similarity_threshold: f32,
    pub max_recommendations: usize,
    pub request_timeout: Duration,
}

impl RecommenderSettings {
    pub fn from_config(config: &Value) -> Self {
        let section = &config["recommender"];
        Self {
            embedding_model: string_or(section, "embedding_model", DEFAULT_EMBEDDING_MODEL),
            generation_model: string_or(section, "generation_model", DEFAULT_GENERATION_MODEL),
            planner_model: section
                .get("planner_model")
                .and_then(Value::as_str)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string),
            retriever_backend: string_or(
                section,
                "retriever_backend",
                DEFAULT_RETRIEVER_BACKEND,
            ),
            k: u64_or(section, "k", DEFAULT_K as u64) as usize,
            similarity_threshold: section
                .get("similarity_threshold")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD) as f32,
            max_recommendations: u64_or(
                section,
                "max_recommendations",
                DEFAULT_MAX_RECOMMENDATIONS as u64,
            ) as usize,
            request_timeout: Duration::from_secs(u64_or(
                section,
                "request_timeout_secs",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
        }
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            embedding_model_id: self.embedding_model.clone(),
            generation_model_id: self.generation_model.clone(),
            planner_model_id: self.planner_model.clone(),
            retriever_backend_id: self.retriever_backend.clone(),
            k: self.k,
            similarity_threshold: self.similarity_threshold,
            max_recommendations: self.max_recommendations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitSettings {
    pub fn from_config(config: &Value) -> Self {
        let section = &config["rate_limit"];
        let max_requests = u64_or(
            section,
            "max_requests",
            DEFAULT_RATE_LIMIT_MAX_REQUESTS as u64,
        )
        .clamp(1, u32::MAX as u64) as u32;
        let window_secs = u64_or(section, "window_secs", DEFAULT_RATE_LIMIT_WINDOW_SECS).max(1);
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// One OpenAI-compatible endpoint, addressed by the `provider/` prefix of a model id.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl ProviderSettings {
    pub fn all_from_config(config: &Value) -> HashMap<String, ProviderSettings> {
        let Some(providers) = config.get("providers").and_then(Value::as_object) else {
            return HashMap::new();
        };

        providers
            .iter()
            .filter_map(|(name, section)| {
                let base_url = section.get("base_url").and_then(Value::as_str)?;
                Some((
                    name.clone(),
                    ProviderSettings {
                        base_url: base_url.trim_end_matches('/').to_string(),
                        api_key: section
                            .get("api_key")
                            .and_then(Value::as_str)
                            .filter(|key| !key.is_empty())
                            .map(str::to_string),
                        timeout: Duration::from_secs(u64_or(section, "timeout_secs", 60)),
                        max_retries: u64_or(section, "max_retries", 3) as u32,
                    },
                ))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QdrantSettings {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl QdrantSettings {
    pub fn from_config(config: &Value) -> Self {
        let section = &config["qdrant"];
        Self {
            url: string_or(section, "url", "http://localhost:6334")
                .trim_end_matches('/')
                .to_string(),
            collection: string_or(section, "collection", "course_chunks"),
            api_key: section
                .get("api_key")
                .and_then(Value::as_str)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            timeout: Duration::from_secs(u64_or(section, "timeout_secs", 30)),
        }
    }
}

fn string_or(section: &Value, key: &str, default: &str) -> String {
    section
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

fn u64_or(section: &Value, key: &str, default: u64) -> u64 {
    section.get(key).and_then(Value::as_u64).unwrap_or(default)
}
