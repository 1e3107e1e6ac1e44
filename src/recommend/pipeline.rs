use std::sync::Arc;

use super::error::PipelineError;
use super::planner::QueryPlanner;
use super::retriever::{BackendRegistry, Retriever};
use super::synthesizer::RecommendationSynthesizer;
use super::types::{PipelineInput, RecommendationResult};
use crate::catalog::CatalogStore;
use crate::llm::{StructuredGenerator, TextEmbedder};

/// Planner -> Retriever -> Synthesizer, once per request.
pub struct RecommendationPipeline {
    planner: QueryPlanner,
    retriever: Retriever,
    synthesizer: RecommendationSynthesizer,
}

impl RecommendationPipeline {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        embedder: Arc<dyn TextEmbedder>,
        catalog: Arc<dyn CatalogStore>,
        backends: BackendRegistry,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            planner: QueryPlanner::new(generator.clone())?,
            retriever: Retriever::new(embedder, catalog, backends),
            synthesizer: RecommendationSynthesizer::new(generator)?,
        })
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.retriever.backends().ids()
    }

    /// Runs all three stages. Planning and synthesis failures yield an empty result;
    /// upstream and configuration failures are returned.
    pub async fn run(&self, input: PipelineInput) -> Result<RecommendationResult, PipelineError> {
        match self.run_stages(&input).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_degradable() => {
                tracing::warn!("returning empty recommendation: {}", err);
                Ok(RecommendationResult::empty())
            }
            Err(err) => {
                tracing::error!("recommendation pipeline failed: {}", err);
                Err(err)
            }
        }
    }

    async fn run_stages(&self, input: &PipelineInput) -> Result<RecommendationResult, PipelineError> {
        let config = &input.config;
        let queries = self.planner.plan(input).await?;

        let candidates = {
            let scope = self.retriever.scope(&config.retriever_backend_id)?;
            scope.retrieve(&queries, config).await?
        };

        self.synthesizer
            .synthesize(&input.user_message, &candidates, config)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CourseId, CourseRecord};
    use crate::core::errors::ApiError;
    use crate::llm::{ChatMessage, LlmError, ResponseSchema};
    use crate::rag::{ChunkSearchResult, ChunkStore, CourseChunk};
    use crate::recommend::PipelineConfig;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies in order: first the planner call, then the synthesis call.
    struct QueueGenerator {
        replies: Mutex<VecDeque<Result<Value, LlmError>>>,
        calls: AtomicUsize,
    }

    impl QueueGenerator {
        fn new(replies: Vec<Result<Value, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StructuredGenerator for QueueGenerator {
        async fn generate_structured(
            &self,
            _model_id: &str,
            _messages: Vec<ChatMessage>,
            _schema: &ResponseSchema,
        ) -> Result<Value, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::InvalidResponse("unscripted call".to_string())))
        }
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TextEmbedder for CountingEmbedder {
        async fn embed(&self, _model_id: &str, _text: &str) -> Result<Vec<f32>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::Unavailable {
                    provider: "openai".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(vec![1.0, 0.0])
        }
    }

    struct FixedStore {
        hits: Vec<(CourseId, f32)>,
        searches: AtomicUsize,
    }

    #[async_trait]
    impl ChunkStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(
            &self,
            _query_embedding: &[f32],
            embedding_model: &str,
            _k: usize,
            _threshold: f32,
        ) -> Result<Vec<ChunkSearchResult>, ApiError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .hits
                .iter()
                .map(|(course_id, score)| ChunkSearchResult {
                    chunk: CourseChunk {
                        course_id: *course_id,
                        text: String::new(),
                        embedding_model: embedding_model.to_string(),
                        source: "test".to_string(),
                    },
                    score: *score,
                })
                .collect())
        }

        async fn upsert(&self, _chunk: CourseChunk, _embedding: Vec<f32>) -> Result<(), ApiError> {
            Ok(())
        }

        async fn count(&self, _embedding_model: &str) -> Result<usize, ApiError> {
            Ok(self.hits.len())
        }
    }

    struct StaticCatalog;

    #[async_trait]
    impl CatalogStore for StaticCatalog {
        async fn get_course(&self, id: CourseId) -> Result<Option<CourseRecord>, ApiError> {
            Ok(Some(course(id)))
        }

        async fn get_courses(&self, ids: &[CourseId]) -> Result<Vec<CourseRecord>, ApiError> {
            Ok(ids.iter().map(|id| course(*id)).collect())
        }

        async fn list_active_courses(&self) -> Result<Vec<CourseRecord>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn course(id: CourseId) -> CourseRecord {
        CourseRecord {
            id,
            title: format!("Curso {}", id),
            app: "Excel".to_string(),
            level: "Essencial".to_string(),
            version: "365".to_string(),
            duration: "8h".to_string(),
            short_description: String::new(),
            objectives: String::new(),
            audience: String::new(),
            prerequisites: String::new(),
            syllabus: String::new(),
            active: true,
            modalities: Vec::new(),
            modules: Vec::new(),
        }
    }

    struct Harness {
        pipeline: RecommendationPipeline,
        generator: Arc<QueueGenerator>,
        embedder: Arc<CountingEmbedder>,
        store: Arc<FixedStore>,
    }

    fn harness(replies: Vec<Result<Value, LlmError>>, embed_fails: bool) -> Harness {
        let generator = QueueGenerator::new(replies);
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            fail: embed_fails,
        });
        let store = Arc::new(FixedStore {
            hits: vec![(5, 0.9), (7, 0.8), (9, 0.6), (11, 0.2)],
            searches: AtomicUsize::new(0),
        });
        let pipeline = RecommendationPipeline::new(
            generator.clone(),
            embedder.clone(),
            Arc::new(StaticCatalog),
            BackendRegistry::new().with_backend("sqlite", store.clone()),
        )
        .unwrap();
        Harness {
            pipeline,
            generator,
            embedder,
            store,
        }
    }

    fn input() -> PipelineInput {
        PipelineInput::new("Quero criar relatórios com tabelas dinâmicas", PipelineConfig::default())
    }

    #[tokio::test]
    async fn full_run_returns_grounded_path() {
        let h = harness(
            vec![
                Ok(json!({ "queries": ["tabelas dinâmicas Excel", "relatórios gerenciais"] })),
                Ok(json!({
                    "recommendations": [
                        { "course_id": 5, "path_position": 1, "rationale": "a", "comment": "b" },
                        { "course_id": 11, "path_position": 2, "rationale": "c", "comment": "d" },
                        { "course_id": 9, "path_position": 3, "rationale": "e", "comment": "f" }
                    ],
                    "path_summary": "Do básico ao avançado."
                })),
            ],
            false,
        );

        let result = h.pipeline.run(input()).await.unwrap();
        let ids: Vec<CourseId> = result.items.iter().map(|item| item.course_id).collect();
        assert_eq!(ids, vec![5, 9]);
        assert_eq!(result.path_summary, "Do básico ao avançado.");
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_planned_queries_short_circuit() {
        let h = harness(vec![Ok(json!({ "queries": [""] }))], false);

        let result = h.pipeline.run(input()).await.unwrap();
        assert_eq!(result, RecommendationResult::empty());
        assert_eq!(result.path_summary, "");
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.searches.load(Ordering::SeqCst), 0);
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparseable_synthesis_degrades_to_empty() {
        let h = harness(
            vec![
                Ok(json!({ "queries": ["tabelas dinâmicas"] })),
                Err(LlmError::InvalidResponse("not json".to_string())),
            ],
            false,
        );

        let result = h.pipeline.run(input()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn embedding_outage_propagates() {
        let h = harness(vec![Ok(json!({ "queries": ["tabelas dinâmicas"] }))], true);

        let err = h.pipeline.run(input()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upstream(_)));
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_backend_is_reported() {
        let h = harness(vec![Ok(json!({ "queries": ["tabelas dinâmicas"] }))], false);
        let mut request = input();
        request.config.retriever_backend_id = "pinecone".to_string();

        let err = h.pipeline.run(request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(h.pipeline.backend_ids(), vec!["sqlite"]);
    }
}
