//! ChunkStore trait: per-course embedding storage used by the retriever.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::CourseId;
use crate::core::errors::ApiError;

pub const DEFAULT_CHUNK_SOURCE: &str = "courses_export.json";

/// One text blob per (course, embedding model) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseChunk {
    pub course_id: CourseId,
    pub text: String,
    pub embedding_model: String,
    /// Where the text came from (the catalog export by default).
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSearchResult {
    pub chunk: CourseChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    fn name(&self) -> &str;

    /// Chunks of `embedding_model` with `score >= threshold`, best first, at most `k`.
    async fn search(
        &self,
        query_embedding: &[f32],
        embedding_model: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Insert or replace the chunk for its (course, model) pair.
    async fn upsert(&self, chunk: CourseChunk, embedding: Vec<f32>) -> Result<(), ApiError>;

    async fn count(&self, embedding_model: &str) -> Result<usize, ApiError>;

    /// Called when a retriever scope that borrowed this store ends. Stores backed by
    /// shared connection pools hold nothing per run and keep the default no-op.
    fn release(&self) {}
}
