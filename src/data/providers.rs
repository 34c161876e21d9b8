//! Contracts for the upstream sources the fetchers depend on

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CompanyProfile, DataResult, LiveQuote, NewsHeadline};
use crate::lifecycle::Lifecycle;

/// Descriptive metadata keyed by symbol (company, sector, valuation)
#[async_trait]
pub trait MetadataProvider: Lifecycle {
    async fn fetch_profile(&self, symbol: &str) -> DataResult<CompanyProfile>;
}

/// Live price, volume and percent change keyed by symbol
#[async_trait]
pub trait QuoteProvider: Lifecycle {
    async fn fetch_quote(&self, symbol: &str) -> DataResult<LiveQuote>;
}

/// Searchable news index
#[async_trait]
pub trait NewsIndex: Lifecycle {
    async fn search(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DataResult<Vec<NewsHeadline>>;
}

/// Download a page and return its readable plain text
#[async_trait]
pub trait ContentExtractor: Lifecycle {
    async fn extract(&self, url: &str) -> DataResult<String>;
}
