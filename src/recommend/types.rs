use serde::Serialize;

use crate::catalog::{CourseId, CourseRecord};
use crate::core::config::defaults::{
    DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, DEFAULT_K, DEFAULT_MAX_RECOMMENDATIONS,
    DEFAULT_RETRIEVER_BACKEND, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::llm::ChatMessage;

/// Per-run configuration. Threaded explicitly through every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub embedding_model_id: String,
    pub generation_model_id: String,
    /// Falls back to `generation_model_id` when unset.
    pub planner_model_id: Option<String>,
    pub retriever_backend_id: String,
    pub k: usize,
    pub similarity_threshold: f32,
    pub max_recommendations: usize,
}

impl PipelineConfig {
    pub fn planner_model(&self) -> &str {
        self.planner_model_id
            .as_deref()
            .unwrap_or(&self.generation_model_id)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_model_id: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model_id: DEFAULT_GENERATION_MODEL.to_string(),
            planner_model_id: None,
            retriever_backend_id: DEFAULT_RETRIEVER_BACKEND.to_string(),
            k: DEFAULT_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD as f32,
            max_recommendations: DEFAULT_MAX_RECOMMENDATIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub user_message: String,
    pub prior_queries: Vec<SearchQuery>,
    pub history: Vec<ChatMessage>,
    pub config: PipelineConfig,
}

impl PipelineInput {
    pub fn new(user_message: impl Into<String>, config: PipelineConfig) -> Self {
        Self {
            user_message: user_message.into(),
            prior_queries: Vec::new(),
            history: Vec::new(),
            config,
        }
    }
}

pub type SearchQuery = String;

/// A retrieved course: the chunk text, a snapshot of the catalog record, and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub course_id: CourseId,
    pub text: String,
    pub snapshot: CourseRecord,
    pub similarity_score: f32,
}

/// Retrieved courses, each id at most once, in first-retrieval order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    documents: Vec<ScoredDocument>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `document` unless its course is already present. Returns whether it was added.
    pub fn push_first_seen(&mut self, document: ScoredDocument) -> bool {
        if self.contains(document.course_id) {
            return false;
        }
        self.documents.push(document);
        true
    }

    pub fn contains(&self, course_id: CourseId) -> bool {
        self.get(course_id).is_some()
    }

    pub fn get(&self, course_id: CourseId) -> Option<&ScoredDocument> {
        self.documents.iter().find(|doc| doc.course_id == course_id)
    }

    pub fn documents(&self) -> &[ScoredDocument] {
        &self.documents
    }

    pub fn ids(&self) -> Vec<CourseId> {
        self.documents.iter().map(|doc| doc.course_id).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// A recommended course: catalog fields from the candidate snapshot, path fields
/// from the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationItem {
    pub course_id: CourseId,
    pub title: String,
    pub app: String,
    pub level: String,
    pub version: String,
    pub duration: String,
    pub short_description: String,
    pub modalities: Vec<String>,
    pub similarity_score: f32,
    pub path_position: u32,
    pub rationale: String,
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationResult {
    pub items: Vec<RecommendationItem>,
    pub path_summary: String,
}

impl RecommendationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
