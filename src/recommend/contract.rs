//! Structured-output contracts for the two generation calls.
//!
//! Each output type derives its JSON Schema; the schema is sent to the model and
//! the reply is validated against it before deserialization.

use std::marker::PhantomData;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::CourseId;
use crate::llm::ResponseSchema;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("invalid output schema: {0}")]
    Schema(String),
    #[error("output violates schema: {0}")]
    Violation(String),
    #[error("output could not be decoded: {0}")]
    Decode(String),
}

/// Search queries for finding relevant courses.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlannedQueries {
    /// One to three search queries, each focused on a single concept or skill.
    #[schemars(length(min = 1))]
    pub queries: Vec<String>,
}

/// One course placed on the learning path. Only ids from the candidate list are valid.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProposedRecommendation {
    /// Id of a course from the candidate list.
    pub course_id: CourseId,
    /// 1-based position in the learning path; lower positions come first.
    #[schemars(range(min = 1))]
    pub path_position: u32,
    /// Why the course sits at this position (2-3 sentences).
    pub rationale: String,
    /// How the course helps this user reach their goal (2-4 sentences).
    pub comment: String,
}

/// Recommended courses ordered as a learning path.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProposedPath {
    pub recommendations: Vec<ProposedRecommendation>,
    /// Short summary of the path: why these courses, in this order.
    pub path_summary: String,
}

pub struct OutputContract<T> {
    name: &'static str,
    schema: Value,
    validator: jsonschema::Validator,
    _output: PhantomData<fn() -> T>,
}

impl<T> OutputContract<T>
where
    T: JsonSchema + DeserializeOwned,
{
    pub fn new(name: &'static str) -> Result<Self, ContractError> {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|err| ContractError::Schema(err.to_string()))?;
        let validator = jsonschema::validator_for(&schema)
            .map_err(|err| ContractError::Schema(err.to_string()))?;
        Ok(Self {
            name,
            schema,
            validator,
            _output: PhantomData,
        })
    }

    pub fn response_schema(&self) -> ResponseSchema {
        ResponseSchema {
            name: self.name.to_string(),
            schema: self.schema.clone(),
        }
    }

    pub fn parse(&self, value: Value) -> Result<T, ContractError> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            return Err(ContractError::Violation(violations.join("; ")));
        }
        serde_json::from_value(value).map_err(|err| ContractError::Decode(err.to_string()))
    }
}
