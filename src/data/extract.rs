//! Article download and readable-text extraction

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::providers::ContentExtractor;
use super::{ensure_success, DataError, DataResult, HttpHandle};
use crate::config::Config;
use crate::lifecycle::{Lifecycle, LifecycleError};

/// Paragraphs shorter than this are usually bylines, captions or nav links
const MIN_PARAGRAPH_CHARS: usize = 25;

/// Most specific container first
const CONTENT_SELECTORS: &[&str] = &["article p", "main p", "[role=main] p", "p"];

/// Downloads a page over HTTP and keeps the body paragraphs
pub struct HttpArticleExtractor {
    http: HttpHandle,
}

impl HttpArticleExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            http: HttpHandle::new("article-extractor", config.http.clone()),
        }
    }
}

#[async_trait]
impl Lifecycle for HttpArticleExtractor {
    fn name(&self) -> &str {
        "article-extractor"
    }

    async fn initialize(&self) -> Result<(), LifecycleError> {
        self.http.open().await
    }

    async fn cleanup(&self) {
        self.http.close().await;
    }
}

#[async_trait]
impl ContentExtractor for HttpArticleExtractor {
    async fn extract(&self, url: &str) -> DataResult<String> {
        let response = self.http.client().await?.get(url).send().await?;
        let response = ensure_success(response, url).await?;

        let is_plain_text = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/plain"))
            .unwrap_or(false);
        let body = response.text().await?;

        let text = if is_plain_text {
            normalize_whitespace(&body)
        } else {
            // HTML parsing is CPU-bound, keep it off the async workers
            tokio::task::spawn_blocking(move || extract_text(&body))
                .await
                .map_err(|e| DataError::parse_error(format!("Extraction task failed: {}", e)))?
        };

        if text.is_empty() {
            return Err(DataError::EmptyContent {
                url: url.to_string(),
            });
        }

        tracing::debug!(url, chars = text.len(), "Extracted article text");
        Ok(text)
    }
}

/// Pull readable paragraphs out of an HTML document.
/// Returns an empty string when nothing article-like is found.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for raw in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };

        let paragraphs: Vec<String> = document
            .select(&selector)
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
            .collect();

        if !paragraphs.is_empty() {
            return paragraphs.join("\n\n");
        }
    }

    String::new()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
