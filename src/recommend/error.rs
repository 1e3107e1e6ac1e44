use thiserror::Error;

use crate::core::errors::ApiError;
use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Degrades to an empty result.
    #[error("query planning failed: {0}")]
    Planning(String),
    /// Degrades to an empty result.
    #[error("recommendation synthesis failed: {0}")]
    Synthesis(String),
    #[error("upstream service failed: {0}")]
    Upstream(String),
    #[error("pipeline misconfigured: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn is_degradable(&self) -> bool {
        matches!(self, PipelineError::Planning(_) | PipelineError::Synthesis(_))
    }

    /// Maps a generation failure: infrastructure errors propagate, anything else is
    /// a failure of the stage itself.
    pub(crate) fn from_generation(err: LlmError, stage: fn(String) -> PipelineError) -> Self {
        match err {
            LlmError::Unavailable { .. } => PipelineError::Upstream(err.to_string()),
            LlmError::UnknownProvider(_) => PipelineError::Config(err.to_string()),
            LlmError::Rejected { .. } | LlmError::InvalidResponse(_) => stage(err.to_string()),
        }
    }

    /// Embedding failures always propagate.
    pub(crate) fn from_embedding(err: LlmError) -> Self {
        match err {
            LlmError::UnknownProvider(_) => PipelineError::Config(err.to_string()),
            _ => PipelineError::Upstream(err.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Upstream(message) => ApiError::Upstream(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
