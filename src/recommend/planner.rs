use std::sync::Arc;

use chrono::Utc;

use super::contract::{OutputContract, PlannedQueries};
use super::error::PipelineError;
use super::prompts::render_query_planner_prompt;
use super::types::{PipelineInput, SearchQuery};
use crate::llm::{ChatMessage, StructuredGenerator};

pub const MAX_QUERIES: usize = 3;

/// Turns a free-text request into 1..=3 focused search queries.
pub struct QueryPlanner {
    generator: Arc<dyn StructuredGenerator>,
    contract: OutputContract<PlannedQueries>,
}

impl QueryPlanner {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Result<Self, PipelineError> {
        let contract = OutputContract::new("search_queries")
            .map_err(|err| PipelineError::Config(err.to_string()))?;
        Ok(Self {
            generator,
            contract,
        })
    }

    pub async fn plan(&self, input: &PipelineInput) -> Result<Vec<SearchQuery>, PipelineError> {
        let mut messages = vec![ChatMessage::system(render_query_planner_prompt(
            &input.prior_queries,
            Utc::now(),
        ))];
        messages.extend(input.history.iter().cloned());
        messages.push(ChatMessage::user(input.user_message.trim()));

        let reply = self
            .generator
            .generate_structured(
                input.config.planner_model(),
                messages,
                &self.contract.response_schema(),
            )
            .await
            .map_err(|err| PipelineError::from_generation(err, PipelineError::Planning))?;

        let planned = self
            .contract
            .parse(reply)
            .map_err(|err| PipelineError::Planning(err.to_string()))?;

        let queries = normalize_queries(planned.queries);
        if queries.is_empty() {
            return Err(PipelineError::Planning("no search queries planned".to_string()));
        }

        tracing::info!(count = queries.len(), ?queries, "planned search queries");
        Ok(queries)
    }
}

/// Trims, drops blanks, keeps the first `MAX_QUERIES`.
fn normalize_queries(raw: Vec<String>) -> Vec<SearchQuery> {
    let mut queries: Vec<SearchQuery> = raw
        .into_iter()
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .collect();
    if queries.len() > MAX_QUERIES {
        tracing::debug!(dropped = queries.len() - MAX_QUERIES, "truncating planned queries");
        queries.truncate(MAX_QUERIES);
    }
    queries
}
