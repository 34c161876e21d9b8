//! Data pipeline module for fetching market data and news
//! Upstream sources are unreliable, so every fetcher degrades instead of failing

pub mod errors;
pub mod extract;
pub mod market;
pub mod news;
pub mod providers;
pub mod retry;

// Re-export commonly used types
pub use errors::{DataError, DataResult, ValidationError};
pub use extract::HttpArticleExtractor;
pub use market::{AlphaVantageClient, MarketDataFetcher, YahooProfileClient};
pub use news::{NewsApiClient, NewsFetcher};
pub use providers::{ContentExtractor, MetadataProvider, NewsIndex, QuoteProvider};
pub use retry::{execute_with_retry, RetryPolicy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::HttpConfig;
use crate::lifecycle::{LifecycleError, LifecycleState, Resource};

/// Validated input for one analysis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentQuery {
    symbol: String,
    lookback_days: u32,
    requested_at: DateTime<Utc>,
}

impl InstrumentQuery {
    /// Validate and normalize raw request input, stamping the request time
    pub fn new(symbol: &str, lookback_days: i64) -> Result<Self, ValidationError> {
        let symbol = validation::normalize_symbol(symbol)?;
        let lookback_days = validation::validate_lookback_days(lookback_days)?;

        Ok(Self {
            symbol,
            lookback_days,
            requested_at: Utc::now(),
        })
    }

    pub fn with_requested_at(mut self, requested_at: DateTime<Utc>) -> Self {
        self.requested_at = requested_at;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

/// Best-effort merged view of an instrument. Missing data is zero/empty, never absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub dividend_yield: f64,
    pub price: f64,
    pub change_percent: f64,
    pub volume: u64,
}

impl MarketSnapshot {
    /// Merge the two independent sub-records. No field is supplied by both.
    pub fn merge(symbol: &str, profile: CompanyProfile, quote: LiveQuote) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: profile.name,
            sector: profile.sector,
            industry: profile.industry,
            market_cap: non_negative(profile.market_cap),
            pe_ratio: non_negative(profile.pe_ratio),
            dividend_yield: non_negative(profile.dividend_yield),
            price: non_negative(quote.price),
            change_percent: if quote.change_percent.is_finite() {
                quote.change_percent
            } else {
                0.0
            },
            volume: quote.volume,
        }
    }
}

/// Descriptive metadata sub-record from the metadata provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub dividend_yield: f64,
}

/// Live quote sub-record from the quote provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveQuote {
    pub price: f64,
    pub change_percent: f64,
    pub volume: u64,
}

/// Candidate article as listed by the news index, before content is fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsHeadline {
    pub title: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source: String,
}

/// News article with its extracted full text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub content: String,
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Build the per-component HTTP client with a transport deadline.
/// Retries do not cover hung connections, the timeout does.
fn build_http_client(component: &str, http: &HttpConfig) -> Result<reqwest::Client, LifecycleError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(http.timeout_seconds))
        .user_agent(http.user_agent.clone())
        .cookie_store(true)
        .build()
        .map_err(|e| LifecycleError::init_failed(component, e.to_string()))
}

/// The one reusable HTTP client a provider owns: built on initialize, dropped on cleanup
pub struct HttpHandle {
    component: &'static str,
    http: HttpConfig,
    client: Resource<reqwest::Client>,
}

impl HttpHandle {
    pub fn new(component: &'static str, http: HttpConfig) -> Self {
        Self {
            component,
            http,
            client: Resource::new(component),
        }
    }

    pub async fn open(&self) -> Result<(), LifecycleError> {
        self.client
            .acquire(|| async { build_http_client(self.component, &self.http) })
            .await
            .map(|_| ())
    }

    /// Client for one request, created lazily if `open` was skipped
    pub async fn client(&self) -> DataResult<reqwest::Client> {
        let client = self
            .client
            .get_or_acquire(|| async { build_http_client(self.component, &self.http) })
            .await?;
        Ok(client)
    }

    pub async fn close(&self) {
        self.client.release().await;
    }

    pub async fn state(&self) -> LifecycleState {
        self.client.state().await
    }
}

/// Turn a non-2xx response into an API error carrying the body
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    source: &str,
) -> DataResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::error!(source, status = status.as_u16(), "Upstream request failed");

    Err(DataError::api_error(
        status.as_u16(),
        format!("{}: {}", source, truncate_chars(&error_text, 200)),
    ))
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Validation helpers
pub mod validation {
    use super::ValidationError;

    const MAX_SYMBOL_LEN: usize = 12;

    /// Trim and upper-case a ticker symbol, rejecting empty or malformed input
    pub fn normalize_symbol(symbol: &str) -> Result<String, ValidationError> {
        let symbol = symbol.trim().to_ascii_uppercase();

        if symbol.is_empty() {
            return Err(ValidationError::new("symbol", "Symbol is required"));
        }

        if symbol.len() > MAX_SYMBOL_LEN {
            return Err(ValidationError::new(
                "symbol",
                format!("Symbol too long (max {} chars)", MAX_SYMBOL_LEN),
            ));
        }

        // Share classes and indices: BRK.B, ^VIX, EURUSD=X
        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
        {
            return Err(ValidationError::new(
                "symbol",
                "Symbol may only contain letters, digits, '.', '-', '^' or '='",
            ));
        }

        Ok(symbol)
    }

    pub fn validate_lookback_days(days: i64) -> Result<u32, ValidationError> {
        if days < 1 {
            return Err(ValidationError::new("days", "Days must be greater than 0"));
        }
        u32::try_from(days).map_err(|_| ValidationError::new("days", "Days is too large"))
    }
}
