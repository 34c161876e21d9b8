//! Single-symbol analysis run
//! Coordinates: (market snapshot || news fan-out) → synthesis → result

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::{
    config::Config,
    data::{Article, InstrumentQuery, MarketDataFetcher, MarketSnapshot, NewsFetcher, ValidationError},
    lifecycle::{Lifecycle, LifecycleError},
    llm::{LlmSynthesizer, SynthesisError, Synthesizer},
};

/// Combined report for one symbol. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub market: MarketSnapshot,
    /// Newest first
    pub articles: Vec<Article>,
    pub summary: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Summary generation failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl AnalysisError {
    /// Caller's fault rather than ours
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalysisError::Validation(_))
    }
}

/// Owns every sub-component and their shared network resources
pub struct AnalysisOrchestrator {
    market: MarketDataFetcher,
    news: NewsFetcher,
    synthesizer: Arc<dyn Synthesizer>,
}

impl AnalysisOrchestrator {
    pub fn new(market: MarketDataFetcher, news: NewsFetcher, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            market,
            news,
            synthesizer,
        }
    }

    /// Wire the production providers from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MarketDataFetcher::from_config(config),
            NewsFetcher::from_config(config),
            Arc::new(LlmSynthesizer::from_config(&config.llm)),
        )
    }

    /// Validate raw request input, then run the pipeline. Invalid input never
    /// reaches the network.
    pub async fn analyze(&self, symbol: &str, days: i64) -> Result<AnalysisResult, AnalysisError> {
        let query = InstrumentQuery::new(symbol, days)?;
        self.process(&query).await
    }

    /// Run the full pipeline for an already validated query
    pub async fn process(&self, query: &InstrumentQuery) -> Result<AnalysisResult, AnalysisError> {
        let symbol = query.symbol();
        info!("Starting analysis for {} ({} day window)", symbol, query.lookback_days());

        // Step 1: market data and news have no dependency on each other
        let (market, articles) = tokio::join!(
            self.market.fetch_market_data(symbol),
            self.news.fetch_news(symbol, query.lookback_days())
        );

        // Step 2: synthesis input is the article text only, newest first
        let contents: Vec<String> = articles.iter().map(|a| a.content.clone()).collect();

        // Step 3: no partial result without a summary
        let summary = self
            .synthesizer
            .summarize(symbol, &contents)
            .await
            .map_err(|e| {
                error!(symbol, error = %e, "Summary generation failed, aborting analysis");
                e
            })?;

        info!(
            symbol,
            articles = articles.len(),
            price = market.price,
            "Analysis complete"
        );

        Ok(AnalysisResult {
            market,
            articles,
            summary,
            requested_at: query.requested_at(),
        })
    }
}

#[async_trait]
impl Lifecycle for AnalysisOrchestrator {
    fn name(&self) -> &str {
        "orchestrator"
    }

    /// Initialize news, market, synthesizer in that order. On the first failure
    /// everything is cleaned up, including components that never initialized.
    async fn initialize(&self) -> Result<(), LifecycleError> {
        info!("Initializing analysis orchestrator");

        let result = async {
            self.news.initialize().await?;
            self.market.initialize().await?;
            self.synthesizer.initialize().await
        }
        .await;

        match &result {
            Ok(()) => info!("Analysis orchestrator initialized successfully"),
            Err(e) => {
                error!(error = %e, "Initialization failed, releasing acquired resources");
                self.cleanup().await;
            }
        }
        result
    }

    /// Same order as initialize, unconditionally
    async fn cleanup(&self) {
        self.news.cleanup().await;
        self.market.cleanup().await;
        self.synthesizer.cleanup().await;
        info!("Analysis orchestrator cleaned up");
    }
}
