//! SQLite-backed chunk store.
//!
//! Embeddings are stored as JSON arrays and scored in-process with brute-force
//! cosine similarity.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkSearchResult, ChunkStore, CourseChunk};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::vector_math::rank_descending_by_cosine;

pub struct SqliteChunkStore {
    pool: SqlitePool,
}

impl SqliteChunkStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS course_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT 'courses_export.json',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE (course_id, embedding_model)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_course_chunks_model ON course_chunks(embedding_model)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Stores a chunk row with an arbitrary embedding column, bypassing encoding.
    #[cfg(test)]
    pub(crate) async fn insert_raw_chunk(
        &self,
        course_id: i64,
        embedding_model: &str,
        raw_embedding: &str,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO course_chunks (course_id, text, embedding, embedding_model)
             VALUES (?1, 'raw', ?2, ?3)",
        )
        .bind(course_id)
        .bind(raw_embedding)
        .bind(embedding_model)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        embedding_model: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, course_id, text, source, embedding
             FROM course_chunks
             WHERE embedding_model = ?1",
        )
        .bind(embedding_model)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut chunks: Vec<(i64, CourseChunk)> = Vec::with_capacity(rows.len());
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(rows.len());
        for row in &rows {
            let row_id: i64 = row.get("id");
            let raw: String = row.get("embedding");
            let stored = match serde_json::from_str::<Vec<f32>>(&raw) {
                Ok(stored) => stored,
                Err(err) => {
                    tracing::warn!(chunk_id = row_id, "skipping chunk with unparseable embedding: {}", err);
                    continue;
                }
            };
            chunks.push((
                row_id,
                CourseChunk {
                    course_id: row.get("course_id"),
                    text: row.get("text"),
                    embedding_model: embedding_model.to_string(),
                    source: row.get("source"),
                },
            ));
            embeddings.push(stored);
        }

        let (ranked, rejected) = rank_descending_by_cosine(query_embedding, &embeddings);
        for (idx, err) in &rejected {
            tracing::warn!(chunk_id = chunks[*idx].0, "skipping chunk with malformed embedding: {}", err);
        }

        Ok(ranked
            .into_iter()
            .take_while(|(_, score)| *score >= threshold)
            .take(k)
            .map(|(idx, score)| ChunkSearchResult {
                chunk: chunks[idx].1.clone(),
                score,
            })
            .collect())
    }

    async fn upsert(&self, chunk: CourseChunk, embedding: Vec<f32>) -> Result<(), ApiError> {
        let encoded = serde_json::to_string(&embedding).map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO course_chunks (course_id, text, embedding, embedding_model, source)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(course_id, embedding_model) DO UPDATE SET
                text = excluded.text,
                embedding = excluded.embedding,
                source = excluded.source,
                created_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(chunk.course_id)
        .bind(&chunk.text)
        .bind(&encoded)
        .bind(&chunk.embedding_model)
        .bind(&chunk.source)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn count(&self, embedding_model: &str) -> Result<usize, ApiError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM course_chunks WHERE embedding_model = ?1")
                .bind(embedding_model)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        Ok(count as usize)
    }
}
