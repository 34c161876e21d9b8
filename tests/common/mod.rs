//! Hand-written mock providers shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tickerdesk::data::{
    CompanyProfile, ContentExtractor, DataError, DataResult, LiveQuote, MarketDataFetcher,
    MetadataProvider, NewsFetcher, NewsHeadline, NewsIndex, QuoteProvider, RetryPolicy,
};
use tickerdesk::lifecycle::{Lifecycle, LifecycleError};
use tickerdesk::llm::{GenerationParams, LlmSynthesizer, SynthesisError, TextGenerator};
use tickerdesk::AnalysisOrchestrator;

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

macro_rules! mock_lifecycle {
    ($ty:ty) => {
        #[async_trait]
        impl Lifecycle for $ty {
            fn name(&self) -> &str {
                self.label
            }

            async fn initialize(&self) -> Result<(), LifecycleError> {
                self.log.lock().unwrap().push(format!("init:{}", self.label));
                if self.fail_init {
                    return Err(LifecycleError::init_failed(self.label, "mock init failure"));
                }
                Ok(())
            }

            async fn cleanup(&self) {
                self.log.lock().unwrap().push(format!("cleanup:{}", self.label));
            }
        }
    };
}

fn unavailable(source: &str) -> DataError {
    DataError::api_error(503, format!("{} unavailable", source))
}

pub struct MockMetadata {
    label: &'static str,
    log: EventLog,
    fail_init: bool,
    profile: Option<CompanyProfile>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl MockMetadata {
    pub fn new(log: &EventLog, profile: Option<CompanyProfile>) -> Self {
        Self {
            label: "metadata",
            log: Arc::clone(log),
            fail_init: false,
            profile,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }
}

mock_lifecycle!(MockMetadata);

#[async_trait]
impl MetadataProvider for MockMetadata {
    async fn fetch_profile(&self, _symbol: &str) -> DataResult<CompanyProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.profile.clone().ok_or_else(|| unavailable("metadata"))
    }
}

pub struct MockQuotes {
    label: &'static str,
    log: EventLog,
    fail_init: bool,
    quote: Option<LiveQuote>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl MockQuotes {
    pub fn new(log: &EventLog, quote: Option<LiveQuote>) -> Self {
        Self {
            label: "quotes",
            log: Arc::clone(log),
            fail_init: false,
            quote,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }
}

mock_lifecycle!(MockQuotes);

#[async_trait]
impl QuoteProvider for MockQuotes {
    async fn fetch_quote(&self, _symbol: &str) -> DataResult<LiveQuote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.quote.clone().ok_or_else(|| unavailable("quotes"))
    }
}

pub struct MockNewsIndex {
    label: &'static str,
    log: EventLog,
    fail_init: bool,
    headlines: Option<Vec<NewsHeadline>>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl MockNewsIndex {
    pub fn new(log: &EventLog, headlines: Option<Vec<NewsHeadline>>) -> Self {
        Self {
            label: "news-index",
            log: Arc::clone(log),
            fail_init: false,
            headlines,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            windows: Mutex::new(Vec::new()),
        }
    }
}

mock_lifecycle!(MockNewsIndex);

#[async_trait]
impl NewsIndex for MockNewsIndex {
    async fn search(
        &self,
        _symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DataResult<Vec<NewsHeadline>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().push((from, to));
        tokio::time::sleep(self.delay).await;
        self.headlines.clone().ok_or_else(|| unavailable("news index"))
    }
}

#[derive(Debug, Clone)]
pub enum Extraction {
    Text(String),
    Empty,
    Fail,
    Panic,
}

pub struct MockExtractor {
    label: &'static str,
    log: EventLog,
    fail_init: bool,
    outcomes: HashMap<String, Extraction>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    pub calls_by_url: Mutex<HashMap<String, usize>>,
}

impl MockExtractor {
    pub fn new(log: &EventLog) -> Self {
        Self {
            label: "extractor",
            log: Arc::clone(log),
            fail_init: false,
            outcomes: HashMap::new(),
            delays: HashMap::new(),
            default_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            calls_by_url: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls_by_url.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

mock_lifecycle!(MockExtractor);

#[async_trait]
impl ContentExtractor for MockExtractor {
    async fn extract(&self, url: &str) -> DataResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.calls_by_url.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(url).copied().unwrap_or(self.default_delay);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.outcomes.get(url) {
            Some(Extraction::Text(text)) => Ok(text.clone()),
            Some(Extraction::Empty) => Ok("   ".to_string()),
            Some(Extraction::Panic) => panic!("extractor blew up on {}", url),
            Some(Extraction::Fail) | None => Err(unavailable(url)),
        }
    }
}

pub struct MockGenerator {
    label: &'static str,
    log: EventLog,
    fail_init: bool,
    reply: Option<String>,
    delay: Duration,
    pub prompts: Mutex<Vec<String>>,
    pub params: Mutex<Vec<GenerationParams>>,
}

impl MockGenerator {
    pub fn new(log: &EventLog, reply: Option<&str>) -> Self {
        Self {
            label: "generator",
            log: Arc::clone(log),
            fail_init: false,
            reply: reply.map(String::from),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

mock_lifecycle!(MockGenerator);

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, SynthesisError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.params.lock().unwrap().push(params.clone());
        tokio::time::sleep(self.delay).await;
        self.reply
            .clone()
            .ok_or_else(|| SynthesisError::Generation("model crashed".to_string()))
    }
}

pub fn fast_retry(max_attempts: usize) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(2),
        jitter: false,
    }
}

pub fn test_params() -> GenerationParams {
    GenerationParams {
        max_tokens: 512,
        temperature: 0.2,
        stop: "###".to_string(),
        context_window: 2048,
    }
}

pub fn published(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

pub fn headline(n: u32, hour: u32) -> NewsHeadline {
    NewsHeadline {
        title: format!("Headline {}", n),
        url: Some(format!("https://news.example/{}", n)),
        published_at: published(hour),
        source: "Reuters".to_string(),
    }
}

pub fn apple_profile() -> CompanyProfile {
    CompanyProfile {
        name: "Apple Inc.".to_string(),
        sector: "Technology".to_string(),
        industry: "Consumer Electronics".to_string(),
        market_cap: 2.9e12,
        pe_ratio: 29.4,
        dividend_yield: 0.005,
    }
}

pub fn apple_quote() -> LiveQuote {
    LiveQuote {
        price: 189.84,
        change_percent: 3.12,
        volume: 48_291_022,
    }
}

/// Every mock in one place, so tests can tweak one and inspect all
pub struct Fixture {
    pub log: EventLog,
    pub metadata: MockMetadata,
    pub quotes: MockQuotes,
    pub index: MockNewsIndex,
    pub extractor: MockExtractor,
    pub generator: MockGenerator,
    pub max_articles: usize,
    pub max_concurrent_fetches: usize,
}

impl Fixture {
    /// Healthy upstreams: a full profile and quote, three articles with text
    pub fn healthy() -> Self {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));

        let mut extractor = MockExtractor::new(&log);
        for n in 1..=3 {
            extractor.outcomes.insert(
                format!("https://news.example/{}", n),
                Extraction::Text(format!("Body of article {}.", n)),
            );
        }

        Self {
            metadata: MockMetadata::new(&log, Some(apple_profile())),
            quotes: MockQuotes::new(&log, Some(apple_quote())),
            index: MockNewsIndex::new(
                &log,
                Some(vec![headline(1, 8), headline(2, 14), headline(3, 11)]),
            ),
            extractor,
            generator: MockGenerator::new(&log, Some("Apple rallied on record services revenue.")),
            log,
            max_articles: 10,
            max_concurrent_fetches: 4,
        }
    }

    pub fn set_headlines(&mut self, headlines: Option<Vec<NewsHeadline>>) {
        self.index.headlines = headlines;
    }

    pub fn set_extraction(&mut self, url: &str, outcome: Extraction) {
        self.extractor.outcomes.insert(url.to_string(), outcome);
    }

    pub fn set_extraction_delay(&mut self, url: &str, delay: Duration) {
        self.extractor.delays.insert(url.to_string(), delay);
    }

    pub fn set_default_extraction_delay(&mut self, delay: Duration) {
        self.extractor.default_delay = delay;
    }

    pub fn fail_market(&mut self) {
        self.fail_metadata();
        self.fail_quotes();
    }

    pub fn fail_metadata(&mut self) {
        self.metadata.profile = None;
    }

    pub fn fail_quotes(&mut self) {
        self.quotes.quote = None;
    }

    pub fn fail_synthesis(&mut self) {
        self.generator.reply = None;
    }

    pub fn set_market_delay(&mut self, delay: Duration) {
        self.metadata.delay = delay;
        self.quotes.delay = delay;
    }

    pub fn set_index_delay(&mut self, delay: Duration) {
        self.index.delay = delay;
    }

    pub fn fail_quotes_init(&mut self) {
        self.quotes.fail_init = true;
    }

    /// Hand the mocks to a real orchestrator; the returned handles stay inspectable
    pub fn build(self) -> Harness {
        let metadata = Arc::new(self.metadata);
        let quotes = Arc::new(self.quotes);
        let index = Arc::new(self.index);
        let extractor = Arc::new(self.extractor);
        let generator = Arc::new(self.generator);

        let market = MarketDataFetcher::new(metadata.clone(), quotes.clone(), fast_retry(3));
        let news = NewsFetcher::new(index.clone(), extractor.clone(), fast_retry(3), fast_retry(2))
            .with_limits(self.max_articles, self.max_concurrent_fetches);
        let synthesizer = LlmSynthesizer::new(generator.clone(), test_params(), 10_000);

        Harness {
            orchestrator: AnalysisOrchestrator::new(market, news, Arc::new(synthesizer)),
            log: self.log,
            metadata,
            quotes,
            index,
            extractor,
            generator,
        }
    }
}

pub struct Harness {
    pub orchestrator: AnalysisOrchestrator,
    pub log: EventLog,
    pub metadata: Arc<MockMetadata>,
    pub quotes: Arc<MockQuotes>,
    pub index: Arc<MockNewsIndex>,
    pub extractor: Arc<MockExtractor>,
    pub generator: Arc<MockGenerator>,
}

impl Harness {
    pub fn network_calls(&self) -> usize {
        self.mocks().network_calls()
    }

    /// Handles that outlive the orchestrator once it is moved elsewhere
    pub fn mocks(&self) -> Mocks {
        Mocks {
            metadata: Arc::clone(&self.metadata),
            quotes: Arc::clone(&self.quotes),
            index: Arc::clone(&self.index),
            extractor: Arc::clone(&self.extractor),
            generator: Arc::clone(&self.generator),
        }
    }
}

pub struct Mocks {
    pub metadata: Arc<MockMetadata>,
    pub quotes: Arc<MockQuotes>,
    pub index: Arc<MockNewsIndex>,
    pub extractor: Arc<MockExtractor>,
    pub generator: Arc<MockGenerator>,
}

impl Mocks {
    pub fn network_calls(&self) -> usize {
        self.metadata.calls.load(Ordering::SeqCst)
            + self.quotes.calls.load(Ordering::SeqCst)
            + self.index.calls.load(Ordering::SeqCst)
            + self.extractor.calls.load(Ordering::SeqCst)
            + self.generator.calls()
    }
}
