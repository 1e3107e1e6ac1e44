use std::collections::HashSet;
use std::sync::Arc;

use super::contract::{OutputContract, ProposedPath};
use super::error::PipelineError;
use super::prompts::{render_synthesis_prompt, synthesis_system_prompt};
use super::types::{CandidateSet, PipelineConfig, RecommendationItem, RecommendationResult};
use crate::catalog::CourseId;
use crate::llm::{ChatMessage, StructuredGenerator};

/// Orders candidates into a learning path with one generation call.
pub struct RecommendationSynthesizer {
    generator: Arc<dyn StructuredGenerator>,
    contract: OutputContract<ProposedPath>,
}

impl RecommendationSynthesizer {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Result<Self, PipelineError> {
        let contract = OutputContract::new("learning_path")
            .map_err(|err| PipelineError::Config(err.to_string()))?;
        Ok(Self {
            generator,
            contract,
        })
    }

    pub async fn synthesize(
        &self,
        user_message: &str,
        candidates: &CandidateSet,
        config: &PipelineConfig,
    ) -> Result<RecommendationResult, PipelineError> {
        if candidates.is_empty() {
            return Ok(RecommendationResult::empty());
        }

        let messages = vec![
            ChatMessage::system(synthesis_system_prompt()),
            ChatMessage::user(render_synthesis_prompt(
                candidates,
                user_message,
                config.max_recommendations,
            )),
        ];

        let reply = self
            .generator
            .generate_structured(
                &config.generation_model_id,
                messages,
                &self.contract.response_schema(),
            )
            .await
            .map_err(|err| PipelineError::from_generation(err, PipelineError::Synthesis))?;

        let proposal = self
            .contract
            .parse(reply)
            .map_err(|err| PipelineError::Synthesis(err.to_string()))?;

        let result = ground_proposal(proposal, candidates);
        tracing::info!(
            candidates = candidates.len(),
            accepted = result.items.len(),
            "synthesized learning path"
        );
        Ok(result)
    }
}

/// Joins the model's proposal onto the candidate snapshots. Repeated ids and ids
/// outside the candidate set are dropped; surviving items keep the proposed order.
pub fn ground_proposal(proposal: ProposedPath, candidates: &CandidateSet) -> RecommendationResult {
    let mut accepted: HashSet<CourseId> = HashSet::new();
    let mut items = Vec::with_capacity(proposal.recommendations.len());

    for proposed in proposal.recommendations {
        if accepted.contains(&proposed.course_id) {
            tracing::debug!(course_id = proposed.course_id, "dropping repeated recommendation");
            continue;
        }
        let Some(candidate) = candidates.get(proposed.course_id) else {
            tracing::debug!(course_id = proposed.course_id, "dropping recommendation outside candidates");
            continue;
        };
        accepted.insert(proposed.course_id);

        let course = &candidate.snapshot;
        items.push(RecommendationItem {
            course_id: candidate.course_id,
            title: course.title.clone(),
            app: course.app.clone(),
            level: course.level.clone(),
            version: course.version.clone(),
            duration: course.duration.clone(),
            short_description: course.short_description.clone(),
            modalities: course.modalities.clone(),
            similarity_score: candidate.similarity_score,
            path_position: proposed.path_position,
            rationale: proposed.rationale,
            comment: proposed.comment,
        });
    }

    RecommendationResult {
        items,
        path_summary: proposal.path_summary,
    }
}
