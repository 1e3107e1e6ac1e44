//! Builds the per-course embedding chunks the retriever searches.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::store::{ChunkStore, CourseChunk, DEFAULT_CHUNK_SOURCE};
use crate::catalog::{CatalogStore, CourseRecord, SqliteCatalogStore};
use crate::core::errors::ApiError;
use crate::llm::TextEmbedder;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed: usize,
}

pub struct CourseIndexer {
    catalog: Arc<dyn CatalogStore>,
    chunks: Arc<dyn ChunkStore>,
    embedder: Arc<dyn TextEmbedder>,
}

impl CourseIndexer {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        chunks: Arc<dyn ChunkStore>,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Self {
        Self {
            catalog,
            chunks,
            embedder,
        }
    }

    /// Embeds every active course and upserts one chunk per (course, model).
    /// A course that fails is logged and counted; the run continues.
    pub async fn index_catalog(&self, embedding_model: &str) -> Result<IndexReport, ApiError> {
        let courses = self.catalog.list_active_courses().await?;
        tracing::info!(
            courses = courses.len(),
            store = self.chunks.name(),
            embedding_model,
            "indexing catalog"
        );

        let mut report = IndexReport::default();
        for course in &courses {
            match self.index_course(course, embedding_model).await {
                Ok(()) => report.indexed += 1,
                Err(err) => {
                    tracing::warn!(course_id = course.id, "failed to index course: {}", err);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            indexed = report.indexed,
            failed = report.failed,
            "catalog indexing finished"
        );
        Ok(report)
    }

    async fn index_course(&self, course: &CourseRecord, embedding_model: &str) -> Result<(), ApiError> {
        let text = consolidate_course_text(course);
        let embedding = self
            .embedder
            .embed(embedding_model, &text)
            .await
            .map_err(|err| ApiError::Upstream(err.to_string()))?;

        self.chunks
            .upsert(
                CourseChunk {
                    course_id: course.id,
                    text,
                    embedding_model: embedding_model.to_string(),
                    source: DEFAULT_CHUNK_SOURCE.to_string(),
                },
                embedding,
            )
            .await
    }
}

/// Flattens a course into the text that gets embedded. Empty sections are omitted
/// and modules follow their syllabus order.
pub fn consolidate_course_text(course: &CourseRecord) -> String {
    let mut sections = vec![format!("Curso: {}", course.title)];

    let facets: Vec<String> = [
        ("Aplicação", &course.app),
        ("Nível", &course.level),
        ("Versão", &course.version),
        ("Carga horária", &course.duration),
    ]
    .iter()
    .filter(|(_, value)| !value.trim().is_empty())
    .map(|(label, value)| format!("{}: {}", label, value.trim()))
    .collect();
    if !facets.is_empty() {
        sections.push(facets.join(" | "));
    }

    for (label, value) in [
        ("Descrição", &course.short_description),
        ("Objetivos", &course.objectives),
        ("Público-alvo", &course.audience),
        ("Pré-requisitos", &course.prerequisites),
        ("Conteúdo programático", &course.syllabus),
    ] {
        if !value.trim().is_empty() {
            sections.push(format!("{}: {}", label, value.trim()));
        }
    }

    if !course.modules.is_empty() {
        let mut modules: Vec<_> = course.modules.iter().collect();
        modules.sort_by_key(|module| module.order);
        let lines: Vec<String> = modules
            .iter()
            .map(|module| {
                if module.description.trim().is_empty() {
                    format!("- {}", module.title)
                } else {
                    format!("- {}: {}", module.title, module.description.trim())
                }
            })
            .collect();
        sections.push(format!("Módulos:\n{}", lines.join("\n")));
    }

    sections.join("\n")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogExport {
    List(Vec<CourseRecord>),
    Wrapped {
        #[serde(alias = "cursos")]
        courses: Vec<CourseRecord>,
    },
}

/// Loads a JSON catalog export (a list of courses, or `{"courses": [...]}`) into
/// the catalog. Returns the number of courses written.
pub async fn import_courses_json(catalog: &SqliteCatalogStore, path: &Path) -> Result<usize, ApiError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ApiError::BadRequest(format!("cannot read {}: {}", path.display(), err)))?;
    let courses = match serde_json::from_str::<CatalogExport>(&contents)
        .map_err(|err| ApiError::BadRequest(format!("invalid catalog export {}: {}", path.display(), err)))?
    {
        CatalogExport::List(courses) | CatalogExport::Wrapped { courses } => courses,
    };

    for course in &courses {
        catalog.upsert_course(course).await?;
    }
    tracing::info!(courses = courses.len(), path = %path.display(), "imported catalog export");
    Ok(courses.len())
}
