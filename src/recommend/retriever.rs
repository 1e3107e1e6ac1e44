//! Query embedding, backend search, and candidate assembly.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::try_join_all;

use super::error::PipelineError;
use super::types::{CandidateSet, PipelineConfig, ScoredDocument, SearchQuery};
use crate::catalog::{CatalogStore, CourseId, CourseRecord};
use crate::llm::TextEmbedder;
use crate::rag::{ChunkSearchResult, ChunkStore};

/// Chunk store backends addressable by `retriever_backend_id`.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ChunkStore>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, id: &str, store: Arc<dyn ChunkStore>) -> Self {
        self.backends.insert(id.to_string(), store);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ChunkStore>> {
        self.backends.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }
}

pub struct Retriever {
    embedder: Arc<dyn TextEmbedder>,
    catalog: Arc<dyn CatalogStore>,
    backends: BackendRegistry,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        catalog: Arc<dyn CatalogStore>,
        backends: BackendRegistry,
    ) -> Self {
        Self {
            embedder,
            catalog,
            backends,
        }
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Acquires the selected backend for one run. The backend is released when the
    /// scope is dropped.
    pub fn scope(&self, backend_id: &str) -> Result<RetrieverScope, PipelineError> {
        let backend = self.backends.get(backend_id).ok_or_else(|| {
            PipelineError::Config(format!(
                "unknown retriever backend '{}' (expected one of: {})",
                backend_id,
                self.backends.ids().join(", ")
            ))
        })?;
        Ok(RetrieverScope {
            embedder: self.embedder.clone(),
            catalog: self.catalog.clone(),
            backend,
        })
    }
}

pub struct RetrieverScope {
    embedder: Arc<dyn TextEmbedder>,
    catalog: Arc<dyn CatalogStore>,
    backend: Arc<dyn ChunkStore>,
}

impl RetrieverScope {
    pub async fn retrieve(
        &self,
        queries: &[SearchQuery],
        config: &PipelineConfig,
    ) -> Result<CandidateSet, PipelineError> {
        if queries.is_empty() {
            return Ok(CandidateSet::new());
        }

        // try_join_all keeps results in query order regardless of completion order.
        let per_query = try_join_all(
            queries
                .iter()
                .map(|query| self.search_one(query, config)),
        )
        .await?;

        let hits = merge_first_seen(per_query);
        let ids: Vec<CourseId> = hits.iter().map(|hit| hit.chunk.course_id).collect();
        let courses: HashMap<CourseId, CourseRecord> = self
            .catalog
            .get_courses(&ids)
            .await
            .map_err(|err| PipelineError::Upstream(err.to_string()))?
            .into_iter()
            .map(|course| (course.id, course))
            .collect();

        let mut candidates = CandidateSet::new();
        for hit in hits {
            let course_id = hit.chunk.course_id;
            let Some(course) = courses.get(&course_id) else {
                tracing::warn!(course_id, "skipping chunk whose course is missing from the catalog");
                continue;
            };
            if !course.active {
                tracing::debug!(course_id, "skipping inactive course");
                continue;
            }
            candidates.push_first_seen(ScoredDocument {
                course_id,
                text: hit.chunk.text,
                snapshot: course.clone(),
                similarity_score: hit.score,
            });
        }

        tracing::info!(
            backend = self.backend.name(),
            queries = queries.len(),
            candidates = candidates.len(),
            "retrieved candidate courses"
        );
        Ok(candidates)
    }

    async fn search_one(
        &self,
        query: &str,
        config: &PipelineConfig,
    ) -> Result<Vec<ChunkSearchResult>, PipelineError> {
        let embedding = self
            .embedder
            .embed(&config.embedding_model_id, query)
            .await
            .map_err(PipelineError::from_embedding)?;

        let results = self
            .backend
            .search(
                &embedding,
                &config.embedding_model_id,
                config.k,
                config.similarity_threshold,
            )
            .await
            .map_err(|err| PipelineError::Upstream(err.to_string()))?;

        Ok(enforce_bounds(results, config.k, config.similarity_threshold))
    }
}

impl Drop for RetrieverScope {
    fn drop(&mut self) {
        self.backend.release();
    }
}

/// Re-applies the ranking contract to a backend's results: best first, nothing
/// below `threshold`, at most `k`.
pub fn enforce_bounds(
    mut results: Vec<ChunkSearchResult>,
    k: usize,
    threshold: f32,
) -> Vec<ChunkSearchResult> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.retain(|result| result.score >= threshold);
    results.truncate(k);
    results
}

/// Flattens per-query results in query order, keeping only the first hit per course.
pub fn merge_first_seen(per_query: Vec<Vec<ChunkSearchResult>>) -> Vec<ChunkSearchResult> {
    let mut seen: HashSet<CourseId> = HashSet::new();
    per_query
        .into_iter()
        .flatten()
        .filter(|hit| seen.insert(hit.chunk.course_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CourseRecord;
    use crate::core::errors::ApiError;
    use crate::llm::LlmError;
    use crate::rag::{CourseChunk, SqliteChunkStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn hit(course_id: CourseId, score: f32) -> ChunkSearchResult {
        ChunkSearchResult {
            chunk: CourseChunk {
                course_id,
                text: format!("chunk {}", course_id),
                embedding_model: "m".to_string(),
                source: "test".to_string(),
            },
            score,
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

    /// Embeds a query as `[index]` where index is its position in `queries`; the
    /// first query is delayed so completion order differs from query order.
    struct IndexEmbedder {
        queries: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextEmbedder for IndexEmbedder {
        async fn embed(&self, _model_id: &str, text: &str) -> Result<Vec<f32>, LlmError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            let index = self
                .queries
                .iter()
                .position(|query| query == text)
                .ok_or_else(|| LlmError::InvalidResponse("unexpected query".to_string()))?;
            if index == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Ok(vec![index as f32])
        }
    }

    /// Returns canned results per query index, ignoring k and threshold like a
    /// misbehaving remote index would.
    struct CannedStore {
        results: Vec<Vec<ChunkSearchResult>>,
        released: AtomicUsize,
    }

    #[async_trait]
    impl ChunkStore for CannedStore {
        fn name(&self) -> &str {
            "canned"
        }

        async fn search(
            &self,
            query_embedding: &[f32],
            _embedding_model: &str,
            _k: usize,
            _threshold: f32,
        ) -> Result<Vec<ChunkSearchResult>, ApiError> {
            Ok(self.results[query_embedding[0] as usize].clone())
        }

        async fn upsert(&self, _chunk: CourseChunk, _embedding: Vec<f32>) -> Result<(), ApiError> {
            Ok(())
        }

        async fn count(&self, _embedding_model: &str) -> Result<usize, ApiError> {
            Ok(0)
        }

        fn release(&self) {
            self.released.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    struct MapCatalog {
        courses: Vec<CourseRecord>,
        requested: Mutex<Vec<Vec<CourseId>>>,
    }

    #[async_trait]
    impl CatalogStore for MapCatalog {
        async fn get_course(&self, id: CourseId) -> Result<Option<CourseRecord>, ApiError> {
            Ok(self.courses.iter().find(|c| c.id == id).cloned())
        }

        async fn get_courses(&self, ids: &[CourseId]) -> Result<Vec<CourseRecord>, ApiError> {
            self.requested.lock().unwrap().push(ids.to_vec());
            Ok(ids
                .iter()
                .filter_map(|id| self.courses.iter().find(|c| c.id == *id).cloned())
                .collect())
        }

        async fn list_active_courses(&self) -> Result<Vec<CourseRecord>, ApiError> {
            Ok(self.courses.clone())
        }
    }

    struct Fixture {
        retriever: Retriever,
        embedder: Arc<IndexEmbedder>,
        store: Arc<CannedStore>,
        catalog: Arc<MapCatalog>,
    }

    fn fixture(
        queries: &[&str],
        results: Vec<Vec<ChunkSearchResult>>,
        courses: Vec<CourseRecord>,
    ) -> Fixture {
        let embedder = Arc::new(IndexEmbedder {
            queries: queries.iter().map(|q| q.to_string()).collect(),
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(CannedStore {
            results,
            released: AtomicUsize::new(0),
        });
        let catalog = Arc::new(MapCatalog {
            courses,
            requested: Mutex::new(Vec::new()),
        });
        let retriever = Retriever::new(
            embedder.clone(),
            catalog.clone(),
            BackendRegistry::new().with_backend("canned", store.clone()),
        );
        Fixture {
            retriever,
            embedder,
            store,
            catalog,
        }
    }

    fn config(k: usize, threshold: f32) -> PipelineConfig {
        PipelineConfig {
            retriever_backend_id: "canned".to_string(),
            k,
            similarity_threshold: threshold,
            ..PipelineConfig::default()
        }
    }

    fn queries(items: &[&str]) -> Vec<SearchQuery> {
        items.iter().map(|q| q.to_string()).collect()
    }

    #[test]
    fn enforce_bounds_sorts_filters_and_truncates() {
        let results = vec![hit(1, 0.4), hit(2, 0.9), hit(3, 0.6), hit(4, 0.7)];
        let bounded = enforce_bounds(results, 2, 0.5);
        let ids: Vec<CourseId> = bounded.iter().map(|r| r.chunk.course_id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[test]
    fn merge_keeps_first_query_position() {
        let merged = merge_first_seen(vec![
            vec![hit(5, 0.9), hit(7, 0.8)],
            vec![hit(9, 0.95), hit(5, 0.99)],
        ]);
        let ids: Vec<CourseId> = merged.iter().map(|r| r.chunk.course_id).collect();
        assert_eq!(ids, vec![5, 7, 9]);
        assert!((merged[0].score - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn dedup_follows_query_order_not_completion_order() {
        let f = fixture(
            &["tabelas dinâmicas", "gráficos"],
            vec![
                vec![hit(5, 0.8), hit(7, 0.6)],
                vec![hit(7, 0.95), hit(9, 0.7)],
            ],
            vec![course(5), course(7), course(9)],
        );
        let scope = f.retriever.scope("canned").unwrap();
        let candidates = scope
            .retrieve(&queries(&["tabelas dinâmicas", "gráficos"]), &config(10, 0.5))
            .await
            .unwrap();

        assert_eq!(candidates.ids(), vec![5, 7, 9]);
        let seven = candidates.get(7).unwrap();
        assert!((seven.similarity_score - 0.6).abs() < 1e-6);
        assert_eq!(seven.snapshot.title, "Curso 7");
        let requested = f.catalog.requested.lock().unwrap().clone();
        assert_eq!(requested, vec![vec![5, 7, 9]]);
    }

    #[tokio::test]
    async fn threshold_and_k_hold_for_misbehaving_backends() {
        let scores = [0.1, 0.9, 0.3, 0.55, 0.2, 0.7, 0.45, 0.05, 0.51, 0.15];
        let results: Vec<ChunkSearchResult> = scores
            .iter()
            .enumerate()
            .map(|(idx, score)| hit(idx as CourseId + 1, *score))
            .collect();
        let courses = (1..=10).map(course).collect();
        let f = fixture(&["tabelas dinâmicas Excel"], vec![results], courses);

        let scope = f.retriever.scope("canned").unwrap();
        let candidates = scope
            .retrieve(&queries(&["tabelas dinâmicas Excel"]), &config(10, 0.5))
            .await
            .unwrap();

        assert_eq!(candidates.ids(), vec![2, 6, 4, 9]);
        let docs = candidates.documents();
        assert!(docs.iter().all(|doc| doc.similarity_score >= 0.5));
        assert!(docs.windows(2).all(|w| w[0].similarity_score >= w[1].similarity_score));

        let top_two = scope
            .retrieve(&queries(&["tabelas dinâmicas Excel"]), &config(2, 0.0))
            .await
            .unwrap();
        assert_eq!(top_two.ids(), vec![2, 6]);
    }

    #[tokio::test]
    async fn missing_and_inactive_courses_are_skipped() {
        let mut inactive = course(7);
        inactive.active = false;
        let f = fixture(
            &["q"],
            vec![vec![hit(5, 0.9), hit(7, 0.8), hit(42, 0.7)]],
            vec![course(5), inactive],
        );

        let scope = f.retriever.scope("canned").unwrap();
        let candidates = scope.retrieve(&queries(&["q"]), &config(10, 0.5)).await.unwrap();
        assert_eq!(candidates.ids(), vec![5]);
    }

    #[tokio::test]
    async fn empty_query_list_skips_embedding() {
        let f = fixture(&[], Vec::new(), Vec::new());
        let scope = f.retriever.scope("canned").unwrap();
        let candidates = scope.retrieve(&[], &config(10, 0.5)).await.unwrap();

        assert!(candidates.is_empty());
        assert_eq!(f.embedder.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scope_releases_backend_on_drop_even_after_errors() {
        let f = fixture(&["known"], vec![vec![hit(5, 0.9)]], vec![course(5)]);
        {
            let scope = f.retriever.scope("canned").unwrap();
            let err = scope
                .retrieve(&queries(&["unknown query"]), &config(10, 0.5))
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::Upstream(_)));
        }
        assert_eq!(f.store.released.load(AtomicOrdering::SeqCst), 1);

        drop(f.retriever.scope("canned").unwrap());
        assert_eq!(f.store.released.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let f = fixture(&[], Vec::new(), Vec::new());
        let err = f.retriever.scope("pgvector").err().unwrap();
        assert!(matches!(err, PipelineError::Config(message) if message.contains("canned")));
    }

    struct FixedEmbedder;

    #[async_trait]
    impl TextEmbedder for FixedEmbedder {
        async fn embed(&self, _model_id: &str, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn malformed_stored_embeddings_do_not_abort_retrieval() {
        let db_path = std::env::temp_dir().join(format!(
            "retriever-sqlite-{}.db",
            uuid::Uuid::new_v4()
        ));
        let store = Arc::new(SqliteChunkStore::with_path(db_path).await.unwrap());
        let model = PipelineConfig::default().embedding_model_id;
        let stored_chunk = |course_id: CourseId| CourseChunk {
            course_id,
            text: format!("Curso {}", course_id),
            embedding_model: model.clone(),
            source: "test".to_string(),
        };

        store.upsert(stored_chunk(5), vec![1.0, 0.0]).await.unwrap();
        store.upsert(stored_chunk(7), vec![0.8, 0.6]).await.unwrap();
        store.insert_raw_chunk(9, &model, "not json").await.unwrap();
        store.upsert(stored_chunk(11), vec![1.0, 0.0, 0.0]).await.unwrap();

        let catalog = Arc::new(MapCatalog {
            courses: vec![course(5), course(7), course(9), course(11)],
            requested: Mutex::new(Vec::new()),
        });
        let retriever = Retriever::new(
            Arc::new(FixedEmbedder),
            catalog,
            BackendRegistry::new().with_backend("sqlite", store),
        );
        let config = PipelineConfig {
            retriever_backend_id: "sqlite".to_string(),
            ..config(10, 0.5)
        };

        let scope = retriever.scope("sqlite").unwrap();
        let candidates = scope
            .retrieve(&queries(&["tabelas dinâmicas Excel"]), &config)
            .await
            .unwrap();

        assert_eq!(candidates.ids(), vec![5, 7]);
        assert!((candidates.get(7).unwrap().similarity_score - 0.8).abs() < 1e-5);
    }
}
