//! Qdrant-backed chunk store.
//!
//! Points carry the chunk as payload and are keyed by a UUIDv5 of
//! `(course_id, embedding_model)`, so re-indexing a course replaces its point.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue, value::Kind,
    vectors_config::Config, with_payload_selector::SelectorOptions, Condition, CountPoints,
    CreateCollection, Distance, FieldCondition, Filter, Match, PointStruct, ScoredPoint,
    SearchPoints, UpsertPoints, Value as QdrantValue, VectorParams, VectorsConfig,
    WithPayloadSelector,
};
use qdrant_client::{Qdrant, QdrantError};
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::store::{ChunkSearchResult, ChunkStore, CourseChunk, DEFAULT_CHUNK_SOURCE};
use crate::catalog::CourseId;
use crate::core::config::QdrantSettings;
use crate::core::errors::ApiError;

pub struct QdrantChunkStore {
    client: Qdrant,
    collection: String,
    collection_ready: OnceCell<()>,
}

impl QdrantChunkStore {
    pub fn new(settings: &QdrantSettings) -> Result<Self, ApiError> {
        let client = Qdrant::from_url(&settings.url)
            .api_key(settings.api_key.clone())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ApiError::Internal(format!("invalid qdrant settings: {}", err)))?;

        Ok(Self {
            client,
            collection: settings.collection.clone(),
            collection_ready: OnceCell::new(),
        })
    }

    async fn collection_exists(&self) -> Result<bool, ApiError> {
        if self.collection_ready.initialized() {
            return Ok(true);
        }
        let listing = self
            .client
            .list_collections()
            .await
            .map_err(|err| upstream("list collections", err))?;
        let exists = listing
            .collections
            .iter()
            .any(|collection| collection.name == self.collection);
        if exists {
            let _ = self.collection_ready.set(());
        }
        Ok(exists)
    }

    /// Creates the collection on first write if it does not exist yet.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), ApiError> {
        self.collection_ready
            .get_or_try_init(|| async {
                let listing = self
                    .client
                    .list_collections()
                    .await
                    .map_err(|err| upstream("list collections", err))?;
                if listing
                    .collections
                    .iter()
                    .any(|collection| collection.name == self.collection)
                {
                    return Ok(());
                }

                tracing::info!(
                    collection = %self.collection,
                    dimension,
                    "creating qdrant collection"
                );
                self.client
                    .create_collection(CreateCollection {
                        collection_name: self.collection.clone(),
                        vectors_config: Some(VectorsConfig {
                            config: Some(Config::Params(VectorParams {
                                size: dimension as u64,
                                distance: Distance::Cosine.into(),
                                ..Default::default()
                            })),
                        }),
                        ..Default::default()
                    })
                    .await
                    .map_err(|err| upstream("create collection", err))?;
                Ok::<(), ApiError>(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ChunkStore for QdrantChunkStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        embedding_model: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        if !self.collection_exists().await? {
            tracing::warn!(collection = %self.collection, "qdrant collection missing; nothing indexed yet");
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(search_request(
                &self.collection,
                query_embedding,
                embedding_model,
                k,
                threshold,
            ))
            .await
            .map_err(|err| upstream("search", err))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| scored_point_to_result(point, embedding_model))
            .collect())
    }

    async fn upsert(&self, chunk: CourseChunk, embedding: Vec<f32>) -> Result<(), ApiError> {
        if embedding.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "refusing to index course {} with an empty embedding",
                chunk.course_id
            )));
        }
        self.ensure_collection(embedding.len()).await?;

        self.client
            .upsert_points(UpsertPoints {
                collection_name: self.collection.clone(),
                wait: Some(true),
                points: vec![chunk_point(chunk, embedding)],
                ..Default::default()
            })
            .await
            .map_err(|err| upstream("upsert", err))?;
        Ok(())
    }

    async fn count(&self, embedding_model: &str) -> Result<usize, ApiError> {
        if !self.collection_exists().await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPoints {
                collection_name: self.collection.clone(),
                filter: Some(model_filter(embedding_model)),
                exact: Some(true),
                ..Default::default()
            })
            .await
            .map_err(|err| upstream("count", err))?;
        Ok(response.result.map(|result| result.count).unwrap_or(0) as usize)
    }
}

pub fn point_id(course_id: CourseId, embedding_model: &str) -> Uuid {
    let key = format!("{}:{}", course_id, embedding_model);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

fn model_filter(embedding_model: &str) -> Filter {
    Filter {
        must: vec![Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: "embedding_model".to_string(),
                r#match: Some(Match {
                    match_value: Some(MatchValue::Keyword(embedding_model.to_string())),
                }),
                ..Default::default()
            })),
        }],
        ..Default::default()
    }
}

fn search_request(
    collection: &str,
    query_embedding: &[f32],
    embedding_model: &str,
    k: usize,
    threshold: f32,
) -> SearchPoints {
    SearchPoints {
        collection_name: collection.to_string(),
        vector: query_embedding.to_vec(),
        limit: k as u64,
        score_threshold: Some(threshold),
        filter: Some(model_filter(embedding_model)),
        with_payload: Some(WithPayloadSelector {
            selector_options: Some(SelectorOptions::Enable(true)),
        }),
        ..Default::default()
    }
}

fn chunk_point(chunk: CourseChunk, embedding: Vec<f32>) -> PointStruct {
    let mut payload: HashMap<String, QdrantValue> = HashMap::new();
    payload.insert("course_id".to_string(), integer_value(chunk.course_id));
    payload.insert("text".to_string(), string_value(chunk.text));
    payload.insert(
        "embedding_model".to_string(),
        string_value(chunk.embedding_model.clone()),
    );
    payload.insert("source".to_string(), string_value(chunk.source));

    PointStruct::new(
        point_id(chunk.course_id, &chunk.embedding_model).to_string(),
        embedding,
        payload,
    )
}

fn scored_point_to_result(point: ScoredPoint, embedding_model: &str) -> Option<ChunkSearchResult> {
    let Some(course_id) = point.payload.get("course_id").and_then(as_integer) else {
        tracing::warn!("skipping qdrant point without a course_id payload");
        return None;
    };
    Some(ChunkSearchResult {
        chunk: CourseChunk {
            course_id,
            text: point
                .payload
                .get("text")
                .and_then(as_string)
                .unwrap_or_default(),
            embedding_model: embedding_model.to_string(),
            source: point
                .payload
                .get("source")
                .and_then(as_string)
                .unwrap_or_else(|| DEFAULT_CHUNK_SOURCE.to_string()),
        },
        score: point.score,
    })
}

fn integer_value(value: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::IntegerValue(value)),
    }
}

fn string_value(value: String) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::StringValue(value)),
    }
}

fn as_integer(value: &QdrantValue) -> Option<i64> {
    match value.kind.as_ref()? {
        Kind::IntegerValue(number) => Some(*number),
        Kind::DoubleValue(number) if number.fract() == 0.0 => Some(*number as i64),
        _ => None,
    }
}

fn as_string(value: &QdrantValue) -> Option<String> {
    match value.kind.as_ref()? {
        Kind::StringValue(text) => Some(text.clone()),
        _ => None,
    }
}

fn upstream(operation: &str, err: QdrantError) -> ApiError {
    ApiError::Upstream(format!("qdrant {} failed: {}", operation, err))
}
