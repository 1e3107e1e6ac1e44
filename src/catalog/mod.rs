//! Course catalog: the authoritative source of course data.
//!
//! The recommendation pipeline only reads from the catalog. Writes happen through
//! the indexer binary when a catalog export is imported.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

pub use sqlite::SqliteCatalogStore;

pub type CourseId = i64;

/// A module of a course, in syllabus order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseModule {
    #[serde(alias = "titulo")]
    pub title: String,
    #[serde(default, alias = "descricao")]
    pub description: String,
    #[serde(default, alias = "ordem")]
    pub order: i64,
}

/// A catalog course with its modalities and modules.
///
/// Field aliases accept the Portuguese keys of the catalog JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    #[serde(alias = "curso_id")]
    pub id: CourseId,
    #[serde(alias = "titulo")]
    pub title: String,
    #[serde(default)]
    pub app: String,
    #[serde(default, alias = "nivel")]
    pub level: String,
    #[serde(default, alias = "versao")]
    pub version: String,
    #[serde(default, alias = "carga_horaria")]
    pub duration: String,
    #[serde(default, alias = "descricao_curta")]
    pub short_description: String,
    #[serde(default, alias = "objetivos")]
    pub objectives: String,
    #[serde(default, alias = "publico_alvo")]
    pub audience: String,
    #[serde(default, alias = "prerequisitos")]
    pub prerequisites: String,
    #[serde(default, alias = "conteudo_programatico")]
    pub syllabus: String,
    #[serde(default = "default_active", alias = "ativo")]
    pub active: bool,
    #[serde(default, alias = "modalidades")]
    pub modalities: Vec<String>,
    #[serde(default, alias = "modulos")]
    pub modules: Vec<CourseModule>,
}

fn default_active() -> bool {
    true
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_course(&self, id: CourseId) -> Result<Option<CourseRecord>, ApiError>;

    /// Bulk fetch. Results follow the order of `ids`; unknown ids are omitted.
    async fn get_courses(&self, ids: &[CourseId]) -> Result<Vec<CourseRecord>, ApiError>;

    async fn list_active_courses(&self) -> Result<Vec<CourseRecord>, ApiError>;
}
