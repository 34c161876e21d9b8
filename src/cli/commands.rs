use anyhow::{Context, Result};
use std::sync::Arc;
use tickerdesk::{api, AnalysisOrchestrator, Config, InstrumentQuery, Lifecycle};
use tracing::info;

/// One-shot analysis printed to stdout
pub async fn analyze(config: Config, symbol: String, days: Option<i64>, pretty: bool) -> Result<()> {
    let days = days.unwrap_or(i64::from(config.news.default_lookback_days));
    // Reject bad input before initialize touches the network
    let query = InstrumentQuery::new(&symbol, days)?;

    let orchestrator = AnalysisOrchestrator::from_config(&config);
    orchestrator
        .initialize()
        .await
        .context("Failed to initialize analysis pipeline")?;

    let outcome = orchestrator.process(&query).await;
    orchestrator.cleanup().await;
    let result = outcome?;

    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    info!(
        "Analysis for {} complete: {} articles",
        result.market.symbol,
        result.articles.len()
    );
    Ok(())
}

/// Serve the HTTP API; resources are released after the server stops
pub async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let orchestrator = AnalysisOrchestrator::from_config(&config);
    orchestrator
        .initialize()
        .await
        .context("Failed to initialize analysis pipeline")?;

    let state = Arc::new(api::AppState::new(orchestrator, &config));
    let served = api::serve(Arc::clone(&state), &host, port).await;

    state.orchestrator.cleanup().await;
    served
}
