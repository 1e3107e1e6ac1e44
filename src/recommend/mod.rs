//! Course recommendation pipeline.
//!
//! - `QueryPlanner`: user message -> 1..=3 search queries
//! - `Retriever`: queries -> deduplicated `CandidateSet` via a `ChunkStore` backend
//! - `RecommendationSynthesizer`: candidates -> ordered, grounded learning path

pub mod contract;
pub mod error;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod retriever;
pub mod synthesizer;
pub mod types;

pub use error::PipelineError;
pub use pipeline::RecommendationPipeline;
pub use retriever::{BackendRegistry, Retriever, RetrieverScope};
pub use types::{
    CandidateSet, PipelineConfig, PipelineInput, RecommendationItem, RecommendationResult,
    ScoredDocument, SearchQuery,
};
