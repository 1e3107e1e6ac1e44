use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::recommend::PipelineInput;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub prior_queries: Vec<String>,
}

/// `POST /api/recommend`: rate limit, validate, then run the pipeline under the
/// configured time budget.
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let client_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    state.rate_limiter.check(client_ip)?;

    let Json(request) = payload.map_err(|err| {
        tracing::debug!("rejected recommend body: {}", err);
        ApiError::BadRequest("Invalid JSON".to_string())
    })?;

    let user_message = request.message.trim().to_string();
    if user_message.is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }

    let mut input = PipelineInput::new(user_message.clone(), state.settings.to_pipeline_config());
    input.prior_queries = request
        .prior_queries
        .into_iter()
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .collect();

    let budget = state.settings.request_timeout;
    let result = match tokio::time::timeout(budget, state.pipeline.run(input)).await {
        Ok(outcome) => outcome?,
        Err(_) => {
            tracing::warn!("recommendation run exceeded {}s", budget.as_secs());
            return Err(ApiError::Timeout(budget.as_secs()));
        }
    };

    tracing::info!(
        "recommended {} courses for {}",
        result.items.len(),
        client_ip
    );

    Ok(Json(json!({
        "success": true,
        "total_found": result.items.len(),
        "results": result.items,
        "path_summary": result.path_summary,
        "user_message": user_message,
    })))
}
