use std::sync::Arc;

use serde_json::Value;

use crate::catalog::SqliteCatalogStore;
use crate::core::config::{
    AppPaths, ConfigService, ProviderSettings, QdrantSettings, RateLimitSettings,
    RecommenderSettings,
};
use crate::llm::LlmService;
use crate::rag::{QdrantChunkStore, SqliteChunkStore};
use crate::recommend::{BackendRegistry, RecommendationPipeline};
use crate::server::rate_limit::ClientRateLimiter;

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes and background tasks.
///
/// Contains references to:
/// - Configuration and paths
/// - The recommendation pipeline with its stores and model providers
/// - The per-client rate limiter
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: RecommenderSettings,
    pub pipeline: Arc<RecommendationPipeline>,
    pub rate_limiter: Arc<ClientRateLimiter>,
}

impl AppState {
    /// Initializes the application state under `paths`.
    ///
    /// This process includes:
    /// 1. Loading configuration
    /// 2. Opening the course catalog and the chunk stores
    /// 3. Registering the configured model providers
    /// 4. Building the recommendation pipeline
    ///
    /// Install logging for `paths` first; this reports misconfiguration through `tracing`.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let config_value = config
            .load_config()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let catalog = SqliteCatalogStore::new(&paths)
            .await
            .map_err(|e| InitializationError::Catalog(e.into()))?;
        let backends = open_backends(&paths, &config_value).await?;

        let llm = LlmService::from_settings(&ProviderSettings::all_from_config(&config_value))
            .map_err(|e| InitializationError::Llm(e.into()))?;

        let settings = RecommenderSettings::from_config(&config_value);
        for model_id in unrouted_models(&llm, &settings) {
            tracing::warn!("No provider configured for model '{}'", model_id);
        }

        let llm = Arc::new(llm);
        let pipeline = RecommendationPipeline::new(llm.clone(), llm, Arc::new(catalog), backends)
            .map_err(|e| InitializationError::Pipeline(e.into()))?;

        tracing::info!(
            "Recommendation pipeline ready (backend: {}, backends available: {:?})",
            settings.retriever_backend,
            pipeline.backend_ids()
        );

        Ok(Self::from_parts(
            paths,
            settings,
            RateLimitSettings::from_config(&config_value),
            Arc::new(pipeline),
        ))
    }

    /// Assembles state around an already built pipeline.
    pub fn from_parts(
        paths: Arc<AppPaths>,
        settings: RecommenderSettings,
        rate_limit: RateLimitSettings,
        pipeline: Arc<RecommendationPipeline>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: ConfigService::new(paths.clone()),
            paths,
            settings,
            pipeline,
            rate_limiter: Arc::new(ClientRateLimiter::new(&rate_limit)),
        })
    }
}

/// Configured model ids whose `provider/` prefix matches no registered provider.
fn unrouted_models<'a>(llm: &LlmService, settings: &'a RecommenderSettings) -> Vec<&'a str> {
    [
        Some(settings.embedding_model.as_str()),
        Some(settings.generation_model.as_str()),
        settings.planner_model.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|model_id| !llm.has_provider_for(model_id))
    .collect()
}

/// Chunk stores addressable by `recommender.retriever_backend`.
pub async fn open_backends(
    paths: &AppPaths,
    config: &Value,
) -> Result<BackendRegistry, InitializationError> {
    let sqlite = SqliteChunkStore::new(paths)
        .await
        .map_err(|e| InitializationError::ChunkStore(e.into()))?;
    let qdrant = QdrantChunkStore::new(&QdrantSettings::from_config(config))
        .map_err(|e| InitializationError::ChunkStore(e.into()))?;

    Ok(BackendRegistry::new()
        .with_backend("sqlite", Arc::new(sqlite))
        .with_backend("qdrant", Arc::new(qdrant)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_paths(label: &str) -> Arc<AppPaths> {
        let dir = std::env::temp_dir().join(format!("{}-{}", label, uuid::Uuid::new_v4()));
        Arc::new(AppPaths::from_dirs(dir.clone(), dir))
    }

    #[tokio::test]
    async fn initialize_opens_stores_under_supplied_paths() {
        let paths = temp_paths("state-init");
        let state = AppState::initialize(paths.clone()).await.unwrap();

        assert_eq!(state.paths.db_path, paths.db_path);
        assert!(paths.db_path.exists());
        assert_eq!(state.pipeline.backend_ids(), vec!["qdrant", "sqlite"]);
        assert_eq!(state.settings.retriever_backend, "sqlite");
    }

    #[test]
    fn models_without_a_provider_are_reported() {
        let config = json!({
            "providers": {
                "openai": { "base_url": "https://api.openai.com/v1" }
            },
            "recommender": {
                "embedding_model": "openai/text-embedding-3-large",
                "generation_model": "lmstudio/qwen2.5-7b-instruct",
                "planner_model": "ollama/llama3.1"
            }
        });
        let llm = LlmService::from_settings(&ProviderSettings::all_from_config(&config)).unwrap();
        let settings = RecommenderSettings::from_config(&config);

        assert_eq!(
            unrouted_models(&llm, &settings),
            vec!["lmstudio/qwen2.5-7b-instruct", "ollama/llama3.1"]
        );
    }
}
