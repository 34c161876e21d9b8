use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::providers::{ContentExtractor, NewsIndex};
use super::retry::{execute_with_retry, RetryPolicy};
use super::{ensure_success, Article, DataError, DataResult, HttpArticleExtractor, HttpHandle, NewsHeadline};
use crate::config::Config;
use crate::lifecycle::{Lifecycle, LifecycleError};

/// NewsAPI `/v2/everything` search
pub struct NewsApiClient {
    http: HttpHandle,
    base_url: String,
    api_key: Option<String>,
    page_size: usize,
}

impl NewsApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: HttpHandle::new("newsapi", config.http.clone()),
            base_url: config.endpoints.news_api_url.trim_end_matches('/').to_string(),
            api_key: config.apis.news_api_key.clone(),
            // Over-fetch a little: entries without a URL are dropped later
            page_size: (config.news.max_articles * 2).clamp(1, 100),
        }
    }
}

#[async_trait]
impl Lifecycle for NewsApiClient {
    fn name(&self) -> &str {
        "newsapi"
    }

    async fn initialize(&self) -> Result<(), LifecycleError> {
        if self.api_key.is_none() {
            warn!("NEWS_API_KEY not configured, news will be empty");
        }
        self.http.open().await
    }

    async fn cleanup(&self) {
        self.http.close().await;
    }
}

#[async_trait]
impl NewsIndex for NewsApiClient {
    async fn search(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DataResult<Vec<NewsHeadline>> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            DataError::Config("NEWS_API_KEY environment variable must be set".to_string())
        })?;

        let url = format!("{}/v2/everything", self.base_url);
        let query = format!("\"{}\" stock", symbol);
        let page_size = self.page_size.to_string();
        let from = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let to = to.to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .http
            .client()
            .await?
            .get(&url)
            .header("X-Api-Key", api_key)
            .query(&[
                ("q", query.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await?;
        let body: Value = ensure_success(response, "NewsAPI").await?.json().await?;

        let headlines = parse_headlines(&body)?;
        info!("Fetched {} news headlines from NewsAPI", headlines.len());
        Ok(headlines)
    }
}

/// Two-stage news pipeline: cheap index query, then parallel content fetches
pub struct NewsFetcher {
    index: Arc<dyn NewsIndex>,
    extractor: Arc<dyn ContentExtractor>,
    index_retry: RetryPolicy,
    article_retry: RetryPolicy,
    max_articles: usize,
    max_concurrent_fetches: usize,
}

impl NewsFetcher {
    pub fn new(
        index: Arc<dyn NewsIndex>,
        extractor: Arc<dyn ContentExtractor>,
        index_retry: RetryPolicy,
        article_retry: RetryPolicy,
    ) -> Self {
        Self {
            index,
            extractor,
            index_retry,
            article_retry,
            max_articles: 10,
            max_concurrent_fetches: 10,
        }
    }

    pub fn with_limits(mut self, max_articles: usize, max_concurrent_fetches: usize) -> Self {
        self.max_articles = max_articles.max(1);
        self.max_concurrent_fetches = max_concurrent_fetches.max(1);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(NewsApiClient::new(config)),
            Arc::new(HttpArticleExtractor::new(config)),
            config.retry.primary.clone(),
            config.retry.article.clone(),
        )
        .with_limits(config.news.max_articles, config.news.max_concurrent_fetches)
    }

    /// Articles for `symbol` published in the last `window_days`, newest first.
    /// Never fails: an unreachable index yields an empty list.
    pub async fn fetch_news(&self, symbol: &str, window_days: u32) -> Vec<Article> {
        info!("Fetching news for {} over the last {} days", symbol, window_days);

        let to = Utc::now();
        let from = to - Duration::days(i64::from(window_days));

        let headlines = match execute_with_retry(&self.index_retry, "news-index", || {
            self.index.search(symbol, from, to)
        })
        .await
        {
            Ok(headlines) => headlines,
            Err(e) => {
                warn!(
                    symbol,
                    provider = self.index.name(),
                    error = %e,
                    "News index unavailable, continuing without articles"
                );
                return Vec::new();
            }
        };

        let candidates = select_candidates(headlines, self.max_articles);
        if candidates.is_empty() {
            info!("No news candidates with a URL for {}", symbol);
            return Vec::new();
        }

        let requested = candidates.len();
        let articles = self.fetch_contents(candidates).await;
        info!(
            symbol,
            requested,
            fetched = articles.len(),
            "Processed news articles"
        );
        articles
    }

    /// One task per candidate, bounded by a semaphore. A failed, empty or panicked
    /// fetch drops only its own candidate.
    async fn fetch_contents(&self, candidates: Vec<Candidate>) -> Vec<Article> {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let extractor = Arc::clone(&self.extractor);
            let retry = self.article_retry.clone();
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let outcome =
                    execute_with_retry(&retry, "article", || extractor.extract(&candidate.url))
                        .await;
                (candidate, outcome)
            });
        }

        let mut articles = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((candidate, Ok(content))) => {
                    let content = content.trim();
                    if content.is_empty() {
                        debug!(url = %candidate.url, "Dropping article with empty content");
                        continue;
                    }
                    articles.push(candidate.into_article(content.to_string()));
                }
                Ok((candidate, Err(e))) => {
                    warn!(url = %candidate.url, error = %e, "Dropping article after fetch failure");
                }
                Err(e) => {
                    warn!(error = %e, "Article fetch task aborted");
                }
            }
        }

        sort_by_recency(&mut articles);
        articles
    }
}

#[async_trait]
impl Lifecycle for NewsFetcher {
    fn name(&self) -> &str {
        "news"
    }

    async fn initialize(&self) -> Result<(), LifecycleError> {
        self.index.initialize().await?;
        self.extractor.initialize().await
    }

    async fn cleanup(&self) {
        self.index.cleanup().await;
        self.extractor.cleanup().await;
    }
}

/// Headline that survived URL filtering, waiting for its content
#[derive(Debug, Clone)]
struct Candidate {
    title: String,
    url: String,
    published_at: DateTime<Utc>,
    source: String,
}

impl Candidate {
    fn into_article(self, content: String) -> Article {
        Article {
            title: self.title,
            url: self.url,
            published_at: self.published_at,
            source: self.source,
            content,
        }
    }
}

/// Drop entries without a URL, newest first, keep the newest entry per URL, cap at `max`
fn select_candidates(headlines: Vec<NewsHeadline>, max: usize) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = headlines
        .into_iter()
        .filter_map(|h| {
            let url = h.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?.to_string();
            Some(Candidate {
                title: h.title,
                url,
                published_at: h.published_at,
                source: h.source,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.url.cmp(&b.url)));

    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.url.clone()));
    candidates.truncate(max);
    candidates
}

/// Newest first; URL breaks ties so the order never depends on completion order
pub fn sort_by_recency(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.url.cmp(&b.url)));
}

/// Parse a NewsAPI response. Entries with an unreadable timestamp are skipped.
pub fn parse_headlines(body: &Value) -> DataResult<Vec<NewsHeadline>> {
    if body["status"].as_str() == Some("error") {
        let code = body["code"].as_str().unwrap_or("unknown");
        let message = body["message"].as_str().unwrap_or("NewsAPI error");
        return Err(match code {
            "rateLimited" => DataError::RateLimit { retry_after: 3600 },
            "apiKeyInvalid" | "apiKeyMissing" | "apiKeyDisabled" => {
                DataError::Config(format!("NewsAPI: {}", message))
            }
            _ => DataError::parse_error(format!("NewsAPI {}: {}", code, message)),
        });
    }

    let articles = body["articles"]
        .as_array()
        .ok_or_else(|| DataError::parse_error("No articles array in response"))?;

    let mut headlines = Vec::with_capacity(articles.len());
    for article in articles {
        let raw_published = article["publishedAt"].as_str().unwrap_or_default();
        let published_at = match DateTime::parse_from_rfc3339(raw_published) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(_) => {
                debug!(published_at = raw_published, "Skipping headline with bad timestamp");
                continue;
            }
        };

        headlines.push(NewsHeadline {
            title: article["title"].as_str().unwrap_or_default().to_string(),
            url: article["url"].as_str().map(String::from),
            published_at,
            source: article["source"]["name"].as_str().unwrap_or_default().to_string(),
        });
    }

    Ok(headlines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn headline(url: Option<&str>, hour: u32) -> NewsHeadline {
        NewsHeadline {
            title: format!("headline {}", hour),
            url: url.map(String::from),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            source: "Reuters".to_string(),
        }
    }

    #[test]
    fn test_select_candidates_filters_sorts_and_caps() {
        let headlines = vec![
            headline(Some("https://a.example/1"), 9),
            headline(None, 23),
            headline(Some("  "), 22),
            headline(Some("https://a.example/2"), 12),
            headline(Some("https://a.example/1"), 13),
            headline(Some("https://a.example/3"), 15),
        ];

        let candidates = select_candidates(headlines, 2);
        let urls: Vec<_> = candidates.iter().map(|c| c.url.as_str()).collect();
        // The duplicate of /1 at 13:00 outranks /2
        assert_eq!(urls, vec!["https://a.example/3", "https://a.example/1"]);
    }

    #[test]
    fn test_select_candidates_keeps_newest_duplicate() {
        let mut older = headline(Some("https://a.example/1"), 8);
        older.title = "first report".to_string();
        let mut newer = headline(Some("https://a.example/1"), 16);
        newer.title = "updated report".to_string();

        let candidates = select_candidates(vec![older, headline(Some("https://a.example/2"), 12), newer], 10);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://a.example/1");
        assert_eq!(candidates[0].title, "updated report");
        assert_eq!(
            candidates[0].published_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_headlines() {
        let body = json!({
            "status": "ok",
            "totalResults": 3,
            "articles": [
                {
                    "source": { "id": "reuters", "name": "Reuters" },
                    "title": "Apple unveils new chips",
                    "url": "https://reuters.example/apple",
                    "publishedAt": "2024-05-01T12:30:00Z"
                },
                {
                    "source": { "name": "Bloomberg" },
                    "title": "No link here",
                    "url": null,
                    "publishedAt": "2024-05-01T11:00:00Z"
                },
                {
                    "source": { "name": "Blog" },
                    "title": "Broken date",
                    "url": "https://blog.example/x",
                    "publishedAt": "yesterday"
                }
            ]
        });

        let headlines = parse_headlines(&body).unwrap();
        assert_eq!(headlines.len(), 2);
        assert_eq!(headlines[0].source, "Reuters");
        assert_eq!(
            headlines[0].published_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
        );
        assert_eq!(headlines[1].url, None);
    }

    #[test]
    fn test_parse_headlines_error_status() {
        let limited = json!({ "status": "error", "code": "rateLimited", "message": "Too many requests" });
        assert!(parse_headlines(&limited).unwrap_err().is_retryable());

        let bad_key = json!({ "status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid" });
        let err = parse_headlines(&bad_key).unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
        assert!(!err.is_retryable());
    }
}
