use serde::{Deserialize, Serialize};

/// POST /analyze request
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    // Missing symbol becomes a 400 from validation rather than a deserialization rejection
    #[serde(default)]
    pub symbol: String,
    /// Signed so that negative values reach validation
    pub days: Option<i64>,
}

/// GET /health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
