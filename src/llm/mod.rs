//! LLM integration module: summary synthesis over a local Ollama model
//! Synthesis is never retried; a failure here fails the whole analysis run

use async_trait::async_trait;
use ollama_rs::{
    generation::{completion::request::GenerationRequest, options::GenerationOptions},
    Ollama,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};
use url::Url;

use crate::config::LlmConfig;
use crate::lifecycle::{Lifecycle, LifecycleError, Resource};

pub const SUMMARY_PROMPT: &str = "Analyze the following news articles about {symbol} stock and create a concise summary *make it short and concise*:

{articles}

Focus on:
1. Key market-moving events
2. Important financial metrics
3. Market sentiment
4. Future outlook

Summary:
";

const NO_ARTICLES: &str = "(no recent articles were found)";

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Text generation timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Sampling parameters passed to the text model
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: String,
    pub context_window: u32,
}

impl From<&LlmConfig> for GenerationParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            stop: config.stop_marker.clone(),
            context_window: config.context_window,
        }
    }
}

/// Opaque prompt-in, text-out model
#[async_trait]
pub trait TextGenerator: Lifecycle {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, SynthesisError>;
}

/// Turns article texts into a summary for one symbol
#[async_trait]
pub trait Synthesizer: Lifecycle {
    async fn summarize(&self, symbol: &str, articles: &[String]) -> Result<String, SynthesisError>;
}

/// Ollama-backed generator. Connects on initialize, or lazily on first generate.
pub struct OllamaGenerator {
    url: String,
    model: String,
    timeout_seconds: u64,
    connection: Resource<Ollama>,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            url: config.ollama_url.clone(),
            model: config.model.clone(),
            timeout_seconds: config.timeout_seconds,
            connection: Resource::new("ollama"),
        }
    }

    async fn connect(&self) -> Result<Ollama, LifecycleError> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| LifecycleError::init_failed("ollama", format!("Invalid Ollama URL: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| LifecycleError::init_failed("ollama", "No host in Ollama URL"))?;
        let port = parsed.port().unwrap_or(11434);

        let ollama = Ollama::new(format!("{}://{}", parsed.scheme(), host), port);

        info!("Testing Ollama connectivity at {}", self.url);
        match timeout(Duration::from_secs(10), ollama.list_local_models()).await {
            Ok(Ok(models)) => {
                let available = models.iter().any(|m| m.name.contains(&self.model));
                if !available {
                    warn!(
                        "Model '{}' not found locally. Consider pulling it with: ollama pull {}",
                        self.model, self.model
                    );
                }
                Ok(ollama)
            }
            Ok(Err(e)) => Err(LifecycleError::init_failed(
                "ollama",
                format!("Failed to list models: {}. Is Ollama running?", e),
            )),
            Err(_) => Err(LifecycleError::init_failed(
                "ollama",
                format!("Timeout connecting to Ollama at {}", self.url),
            )),
        }
    }
}

#[async_trait]
impl Lifecycle for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn initialize(&self) -> Result<(), LifecycleError> {
        self.connection.acquire(|| self.connect()).await.map(|_| ())
    }

    async fn cleanup(&self) {
        self.connection.release().await;
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, SynthesisError> {
        let ollama = self.connection.get_or_acquire(|| self.connect()).await?;

        info!(
            "Generating text with model '{}' (prompt length: {} chars)",
            self.model,
            prompt.len()
        );

        let options = GenerationOptions::default()
            .num_predict(i32::try_from(params.max_tokens).unwrap_or(i32::MAX))
            .temperature(params.temperature)
            .stop(vec![params.stop.clone()])
            .num_ctx(params.context_window.into());
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string()).options(options);

        match timeout(Duration::from_secs(self.timeout_seconds), ollama.generate(request)).await {
            Ok(Ok(response)) => Ok(response.response),
            Ok(Err(e)) => Err(SynthesisError::Generation(format!("Ollama API error: {}", e))),
            Err(_) => Err(SynthesisError::Timeout {
                timeout_seconds: self.timeout_seconds,
            }),
        }
    }
}

/// Builds the numbered article prompt and runs it through a text generator
pub struct LlmSynthesizer {
    generator: Arc<dyn TextGenerator>,
    params: GenerationParams,
    max_context_chars: usize,
}

impl LlmSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, params: GenerationParams, max_context_chars: usize) -> Self {
        Self {
            generator,
            params,
            max_context_chars,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            Arc::new(OllamaGenerator::new(config)),
            GenerationParams::from(config),
            config.max_context_chars,
        )
    }
}

#[async_trait]
impl Lifecycle for LlmSynthesizer {
    fn name(&self) -> &str {
        "synthesizer"
    }

    async fn initialize(&self) -> Result<(), LifecycleError> {
        self.generator.initialize().await
    }

    async fn cleanup(&self) {
        self.generator.cleanup().await;
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn summarize(&self, symbol: &str, articles: &[String]) -> Result<String, SynthesisError> {
        let prompt = build_prompt(symbol, articles, self.max_context_chars);
        let raw = self.generator.generate(&prompt, &self.params).await?;

        let summary = finish_output(&raw, &self.params.stop);
        if summary.is_empty() {
            warn!(symbol, "Model returned an empty summary");
        }
        info!(symbol, articles = articles.len(), chars = summary.len(), "Generated summary");
        Ok(summary)
    }
}

/// Number the articles in order and fit them into `max_chars`.
/// The article that crosses the budget is truncated and later ones are left out.
pub fn build_prompt(symbol: &str, articles: &[String], max_chars: usize) -> String {
    let mut block = String::new();
    let mut remaining = max_chars;

    for (i, article) in articles.iter().enumerate() {
        let separator = if block.is_empty() { "" } else { "\n\n" };
        let header = format!("{}Article {}:\n", separator, i + 1);
        let needed = header.chars().count();
        if remaining <= needed {
            break;
        }
        remaining -= needed;

        let body = crate::data::truncate_chars(article.trim(), remaining);
        remaining -= body.chars().count();
        block.push_str(&header);
        block.push_str(body);

        if remaining == 0 {
            break;
        }
    }

    if block.is_empty() {
        block.push_str(NO_ARTICLES);
    }

    SUMMARY_PROMPT
        .replace("{symbol}", symbol)
        .replace("{articles}", &block)
}

/// Cut at the stop marker in case the backend did not, then trim
pub fn finish_output(raw: &str, stop: &str) -> String {
    let text = match raw.find(stop) {
        Some(idx) if !stop.is_empty() => &raw[..idx],
        _ => raw,
    };
    text.trim().to_string()
}
