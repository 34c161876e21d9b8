// TickerDesk - Stock News Digest
// Pulls a market snapshot and recent news for a ticker from independent upstream
// sources, extracts the article text, and asks a local LLM for a short summary.

#![deny(clippy::unwrap_used)]

pub mod api;
pub mod config;
pub mod data;
pub mod lifecycle;
pub mod llm;
pub mod orchestrator;

// Re-export commonly used items
pub use config::Config;
pub use data::{Article, InstrumentQuery, MarketSnapshot};
pub use lifecycle::Lifecycle;
pub use orchestrator::{AnalysisError, AnalysisOrchestrator, AnalysisResult};
