use crate::config::Config;
use crate::orchestrator::AnalysisOrchestrator;

/// Shared state for all handlers
pub struct AppState {
    // Safe to share: fetchers only hold cloneable client handles
    pub orchestrator: AnalysisOrchestrator,
    pub default_lookback_days: u32,
}

impl AppState {
    pub fn new(orchestrator: AnalysisOrchestrator, config: &Config) -> Self {
        Self {
            orchestrator,
            default_lookback_days: config.news.default_lookback_days,
        }
    }
}
