use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::providers::{MetadataProvider, QuoteProvider};
use super::retry::{execute_with_retry, RetryPolicy};
use super::{
    ensure_success, CompanyProfile, DataError, DataResult, HttpHandle, LiveQuote, MarketSnapshot,
};
use crate::config::Config;
use crate::lifecycle::{Lifecycle, LifecycleError};

/// Yahoo Finance quote summary: company name, sector, valuation ratios.
///
/// quoteSummary only answers requests carrying a session cookie and the matching
/// crumb. Both are obtained on first use and the crumb is cached until Yahoo
/// rejects it.
pub struct YahooProfileClient {
    http: HttpHandle,
    base_url: String,
    session_url: String,
    crumb: RwLock<Option<String>>,
}

impl YahooProfileClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: HttpHandle::new("yahoo-profile", config.http.clone()),
            base_url: config.endpoints.yahoo_url.trim_end_matches('/').to_string(),
            session_url: config.endpoints.yahoo_session_url.clone(),
            crumb: RwLock::new(None),
        }
    }

    /// Cached crumb, or a fresh cookie + crumb handshake
    async fn crumb(&self, client: &reqwest::Client) -> DataResult<String> {
        if let Some(crumb) = self.crumb.read().await.as_ref() {
            return Ok(crumb.clone());
        }

        let mut cached = self.crumb.write().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // The session endpoint answers 404 but still sets the cookie
        client.get(&self.session_url).send().await?;

        let response = client
            .get(format!("{}/v1/test/getcrumb", self.base_url))
            .send()
            .await?;
        let body = ensure_success(response, "Yahoo Finance crumb").await?.text().await?;
        let crumb = body.trim();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(DataError::parse_error("Yahoo Finance returned no crumb"));
        }

        debug!("Obtained Yahoo Finance crumb");
        *cached = Some(crumb.to_string());
        Ok(crumb.to_string())
    }

    async fn request_summary(
        &self,
        client: &reqwest::Client,
        symbol: &str,
        crumb: &str,
    ) -> DataResult<reqwest::Response> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);
        debug!("Yahoo quote summary request: GET {}", url);

        let response = client
            .get(&url)
            .query(&[("modules", "assetProfile,price,summaryDetail"), ("crumb", crumb)])
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl Lifecycle for YahooProfileClient {
    fn name(&self) -> &str {
        "yahoo-profile"
    }

    async fn initialize(&self) -> Result<(), LifecycleError> {
        self.http.open().await
    }

    async fn cleanup(&self) {
        self.crumb.write().await.take();
        self.http.close().await;
    }
}

#[async_trait]
impl MetadataProvider for YahooProfileClient {
    async fn fetch_profile(&self, symbol: &str) -> DataResult<CompanyProfile> {
        let client = self.http.client().await?;

        let crumb = self.crumb(&client).await?;
        let mut response = self.request_summary(&client, symbol, &crumb).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Yahoo Finance rejected the cached crumb, renewing session");
            self.crumb.write().await.take();
            let crumb = self.crumb(&client).await?;
            response = self.request_summary(&client, symbol, &crumb).await?;
        }

        let body: Value = ensure_success(response, "Yahoo Finance").await?.json().await?;
        parse_profile(&body)
    }
}

/// Alpha Vantage GLOBAL_QUOTE: price, volume, percent change
pub struct AlphaVantageClient {
    http: HttpHandle,
    base_url: String,
    api_key: Option<String>,
}

impl AlphaVantageClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: HttpHandle::new("alpha-vantage", config.http.clone()),
            base_url: config.endpoints.alpha_vantage_url.trim_end_matches('/').to_string(),
            api_key: config.apis.alphavantage_api_key.clone(),
        }
    }
}

#[async_trait]
impl Lifecycle for AlphaVantageClient {
    fn name(&self) -> &str {
        "alpha-vantage"
    }

    async fn initialize(&self) -> Result<(), LifecycleError> {
        if self.api_key.is_none() {
            warn!("ALPHAVANTAGE_API_KEY not configured, quotes will be empty");
        }
        self.http.open().await
    }

    async fn cleanup(&self) {
        self.http.close().await;
    }
}

#[async_trait]
impl QuoteProvider for AlphaVantageClient {
    async fn fetch_quote(&self, symbol: &str) -> DataResult<LiveQuote> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            DataError::Config("ALPHAVANTAGE_API_KEY environment variable must be set".to_string())
        })?;

        let url = format!("{}/query", self.base_url);
        let response = self
            .http
            .client()
            .await?
            .get(&url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", api_key.as_str()),
            ])
            .send()
            .await?;
        let body: Value = ensure_success(response, "Alpha Vantage").await?.json().await?;

        parse_quote(&body)
    }
}

/// Merges metadata and quote providers into one snapshot. Never fails.
pub struct MarketDataFetcher {
    metadata: Arc<dyn MetadataProvider>,
    quotes: Arc<dyn QuoteProvider>,
    retry: RetryPolicy,
}

impl MarketDataFetcher {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        quotes: Arc<dyn QuoteProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            metadata,
            quotes,
            retry,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(YahooProfileClient::new(config)),
            Arc::new(AlphaVantageClient::new(config)),
            config.retry.primary.clone(),
        )
    }

    /// Fetch both sources concurrently; a source that stays down contributes zeros
    pub async fn fetch_market_data(&self, symbol: &str) -> MarketSnapshot {
        info!("Fetching market data for {}", symbol);

        let (profile, quote) = tokio::join!(
            execute_with_retry(&self.retry, "metadata", || self.metadata.fetch_profile(symbol)),
            execute_with_retry(&self.retry, "quote", || self.quotes.fetch_quote(symbol)),
        );

        let profile = profile.unwrap_or_else(|e| {
            warn!(
                symbol,
                provider = self.metadata.name(),
                error = %e,
                "Metadata source unavailable, using empty profile"
            );
            CompanyProfile::default()
        });
        let quote = quote.unwrap_or_else(|e| {
            warn!(
                symbol,
                provider = self.quotes.name(),
                error = %e,
                "Quote source unavailable, using zero quote"
            );
            LiveQuote::default()
        });

        let snapshot = MarketSnapshot::merge(symbol, profile, quote);
        info!(
            symbol,
            price = snapshot.price,
            change_percent = snapshot.change_percent,
            "Fetched market data"
        );
        snapshot
    }
}

#[async_trait]
impl Lifecycle for MarketDataFetcher {
    fn name(&self) -> &str {
        "market-data"
    }

    async fn initialize(&self) -> Result<(), LifecycleError> {
        self.metadata.initialize().await?;
        self.quotes.initialize().await
    }

    async fn cleanup(&self) {
        self.metadata.cleanup().await;
        self.quotes.cleanup().await;
    }
}

/// Parse a Yahoo quoteSummary payload. Absent modules leave fields at zero.
pub fn parse_profile(body: &Value) -> DataResult<CompanyProfile> {
    let summary = &body["quoteSummary"];
    let result = match summary["result"].as_array().and_then(|r| r.first()) {
        Some(result) => result,
        None => {
            let message = summary["error"]["description"]
                .as_str()
                .unwrap_or("No quoteSummary result in response");
            return Err(DataError::parse_error(message));
        }
    };

    let price = &result["price"];
    let profile = &result["assetProfile"];
    let detail = &result["summaryDetail"];

    let name = price["longName"]
        .as_str()
        .or_else(|| price["shortName"].as_str())
        .unwrap_or_default();
    let market_cap = raw_number(&detail["marketCap"]).or_else(|| raw_number(&price["marketCap"]));

    Ok(CompanyProfile {
        name: name.to_string(),
        sector: profile["sector"].as_str().unwrap_or_default().to_string(),
        industry: profile["industry"].as_str().unwrap_or_default().to_string(),
        market_cap: market_cap.unwrap_or(0.0),
        pe_ratio: raw_number(&detail["trailingPE"]).unwrap_or(0.0),
        dividend_yield: raw_number(&detail["dividendYield"]).unwrap_or(0.0),
    })
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`, sometimes as `{}`
fn raw_number(value: &Value) -> Option<f64> {
    value["raw"].as_f64().or_else(|| value.as_f64())
}

/// Parse an Alpha Vantage GLOBAL_QUOTE payload. Missing fields become 0.
pub fn parse_quote(body: &Value) -> DataResult<LiveQuote> {
    let quote = match body.get("Global Quote") {
        Some(quote) => quote,
        None => {
            // Free tier throttling comes back as 200 with a Note/Information message
            if body.get("Note").is_some() || body.get("Information").is_some() {
                return Err(DataError::RateLimit { retry_after: 60 });
            }
            let message = body["Error Message"]
                .as_str()
                .unwrap_or("No Global Quote in response");
            return Err(DataError::parse_error(message));
        }
    };

    Ok(LiveQuote {
        price: parse_decimal(quote.get("05. price")),
        change_percent: parse_decimal(quote.get("10. change percent")),
        volume: parse_volume(quote.get("06. volume")),
    })
}

/// Lenient numeric parse: strings or numbers, trailing `%` stripped, anything else is 0
pub fn parse_decimal(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
            trimmed.parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

pub fn parse_volume(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or_else(|_| {
            let fallback = parse_decimal(value);
            if fallback > 0.0 {
                fallback as u64
            } else {
                0
            }
        }),
        _ => 0,
    }
}
