use serde_json::{json, Value};

pub const DEFAULT_EMBEDDING_MODEL: &str = "openai/text-embedding-3-large";
pub const DEFAULT_GENERATION_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_RETRIEVER_BACKEND: &str = "sqlite";
pub const DEFAULT_K: usize = 10;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Baseline configuration tree. `config.yml` and `secrets.yaml` are merged over it.
pub fn default_config() -> Value {
    json!({
        "server": {
            "host": "127.0.0.1",
            "port": 8000
        },
        "recommender": {
            "embedding_model": DEFAULT_EMBEDDING_MODEL,
            "generation_model": DEFAULT_GENERATION_MODEL,
            "retriever_backend": DEFAULT_RETRIEVER_BACKEND,
            "k": DEFAULT_K,
            "similarity_threshold": DEFAULT_SIMILARITY_THRESHOLD,
            "max_recommendations": DEFAULT_MAX_RECOMMENDATIONS,
            "request_timeout_secs": DEFAULT_REQUEST_TIMEOUT_SECS
        },
        "rate_limit": {
            "max_requests": DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            "window_secs": DEFAULT_RATE_LIMIT_WINDOW_SECS
        },
        "providers": {
            "openai": {
                "base_url": "https://api.openai.com/v1",
                "timeout_secs": 60,
                "max_retries": 3
            },
            "lmstudio": {
                "base_url": "http://localhost:1234/v1",
                "timeout_secs": 120,
                "max_retries": 1
            },
            "ollama": {
                "base_url": "http://localhost:11434/v1",
                "timeout_secs": 120,
                "max_retries": 1
            }
        },
        "qdrant": {
            "url": "http://localhost:6334",
            "collection": "course_chunks",
            "timeout_secs": 30
        }
    })
}
