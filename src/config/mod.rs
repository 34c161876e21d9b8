use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::data::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub apis: ApiConfig,
    pub endpoints: EndpointConfig,
    pub http: HttpConfig,
    pub news: NewsConfig,
    pub retry: RetryConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub alphavantage_api_key: Option<String>,
    pub news_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub yahoo_url: String,
    /// Page that hands out the Yahoo session cookie
    pub yahoo_session_url: String,
    pub alpha_vantage_url: String,
    pub news_api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    pub max_articles: usize,
    pub max_concurrent_fetches: usize,
    pub default_lookback_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub primary: RetryPolicy,
    pub article: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_marker: String,
    /// Model context window in tokens
    pub context_window: u32,
    /// Character budget for the article block in the prompt
    pub max_context_chars: usize,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            apis: ApiConfig {
                alphavantage_api_key: env::var("ALPHAVANTAGE_API_KEY").ok(),
                news_api_key: env::var("NEWS_API_KEY").ok(),
            },
            endpoints: EndpointConfig {
                yahoo_url: env::var("YAHOO_FINANCE_URL")
                    .unwrap_or(defaults.endpoints.yahoo_url),
                yahoo_session_url: env::var("YAHOO_SESSION_URL")
                    .unwrap_or(defaults.endpoints.yahoo_session_url),
                alpha_vantage_url: env::var("ALPHAVANTAGE_URL")
                    .unwrap_or(defaults.endpoints.alpha_vantage_url),
                news_api_url: env::var("NEWS_API_URL").unwrap_or(defaults.endpoints.news_api_url),
            },
            http: HttpConfig {
                timeout_seconds: parse_env("HTTP_TIMEOUT_SECONDS", defaults.http.timeout_seconds)?,
                user_agent: env::var("HTTP_USER_AGENT").unwrap_or(defaults.http.user_agent),
            },
            news: NewsConfig {
                max_articles: parse_env("MAX_NEWS_ARTICLES", defaults.news.max_articles)?,
                max_concurrent_fetches: parse_env(
                    "MAX_CONCURRENT_FETCHES",
                    defaults.news.max_concurrent_fetches,
                )?,
                default_lookback_days: parse_env(
                    "DEFAULT_LOOKBACK_DAYS",
                    defaults.news.default_lookback_days,
                )?,
            },
            retry: RetryConfig {
                primary: retry_from_env("PRIMARY", &defaults.retry.primary)?,
                article: retry_from_env("ARTICLE", &defaults.retry.article)?,
            },
            llm: LlmConfig {
                ollama_url: env::var("OLLAMA_URL").unwrap_or(defaults.llm.ollama_url),
                model: env::var("LLM_MODEL").unwrap_or(defaults.llm.model),
                max_tokens: parse_env("LLM_MAX_TOKENS", defaults.llm.max_tokens)?,
                temperature: parse_env("LLM_TEMPERATURE", defaults.llm.temperature)?,
                stop_marker: env::var("LLM_STOP_MARKER").unwrap_or(defaults.llm.stop_marker),
                context_window: parse_env("LLM_CONTEXT_WINDOW", defaults.llm.context_window)?,
                max_context_chars: parse_env(
                    "LLM_MAX_CONTEXT_CHARS",
                    defaults.llm.max_context_chars,
                )?,
                timeout_seconds: parse_env("LLM_TIMEOUT_SECONDS", defaults.llm.timeout_seconds)?,
            },
            server: ServerConfig {
                host: env::var("API_HOST").unwrap_or(defaults.server.host),
                port: parse_env("API_PORT", defaults.server.port)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline meaningless
    pub fn validate(&self) -> Result<()> {
        if self.news.max_articles == 0 {
            bail!("MAX_NEWS_ARTICLES must be at least 1");
        }
        if self.news.max_concurrent_fetches == 0 {
            bail!("MAX_CONCURRENT_FETCHES must be at least 1");
        }
        if self.news.default_lookback_days == 0 {
            bail!("DEFAULT_LOOKBACK_DAYS must be at least 1");
        }
        if self.retry.primary.max_attempts == 0 || self.retry.article.max_attempts == 0 {
            bail!("Retry attempts must be at least 1");
        }
        if !(self.llm.temperature > 0.0 && self.llm.temperature <= 2.0) {
            bail!("LLM_TEMPERATURE must be in (0, 2], got {}", self.llm.temperature);
        }
        if self.llm.stop_marker.is_empty() {
            bail!("LLM_STOP_MARKER cannot be empty");
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn retry_from_env(prefix: &str, defaults: &RetryPolicy) -> Result<RetryPolicy> {
    Ok(RetryPolicy {
        max_attempts: parse_env(&format!("{}_RETRY_ATTEMPTS", prefix), defaults.max_attempts)?,
        base_delay: Duration::from_secs(parse_env(
            &format!("{}_RETRY_BASE_SECONDS", prefix),
            defaults.base_delay.as_secs(),
        )?),
        max_delay: Duration::from_secs(parse_env(
            &format!("{}_RETRY_MAX_SECONDS", prefix),
            defaults.max_delay.as_secs(),
        )?),
        jitter: parse_env("RETRY_JITTER", defaults.jitter)?,
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apis: ApiConfig {
                alphavantage_api_key: None,
                news_api_key: None,
            },
            endpoints: EndpointConfig {
                yahoo_url: "https://query2.finance.yahoo.com".to_string(),
                yahoo_session_url: "https://fc.yahoo.com".to_string(),
                alpha_vantage_url: "https://www.alphavantage.co".to_string(),
                news_api_url: "https://newsapi.org".to_string(),
            },
            http: HttpConfig {
                timeout_seconds: 30,
                user_agent: format!("tickerdesk/{}", env!("CARGO_PKG_VERSION")),
            },
            news: NewsConfig {
                max_articles: 10,
                max_concurrent_fetches: 10,
                default_lookback_days: 1,
            },
            retry: RetryConfig {
                primary: RetryPolicy::primary(),
                article: RetryPolicy::article(),
            },
            llm: LlmConfig {
                ollama_url: "http://localhost:11434".to_string(),
                model: "tinyllama".to_string(),
                max_tokens: 2048,
                temperature: 0.7,
                stop_marker: "###".to_string(),
                context_window: 2048,
                max_context_chars: 6000,
                timeout_seconds: 120,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
        }
    }
}
