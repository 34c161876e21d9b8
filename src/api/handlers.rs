use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use super::dto::{AnalysisRequest, HealthResponse};
use super::error::ApiError;
use super::state::AppState;
use crate::orchestrator::AnalysisResult;

/// POST /analyze - Market snapshot, recent articles and summary for a symbol
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected malformed analysis request");
        ApiError::from(rejection)
    })?;
    let days = req.days.unwrap_or(i64::from(state.default_lookback_days));
    tracing::info!(symbol = %req.symbol, days, "Received analysis request");

    let result = state
        .orchestrator
        .analyze(&req.symbol, days)
        .await
        .map_err(|e| {
            if e.is_client_error() {
                tracing::warn!(error = %e, "Rejected analysis request");
            } else {
                tracing::error!(error = %e, "Error processing analysis request");
            }
            ApiError::from(e)
        })?;

    tracing::info!(symbol = %result.market.symbol, "Successfully processed request");
    Ok(Json(result))
}

/// GET /health - Health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
