//! Orchestrator module for coordinating the analysis pipeline
//! Market data and news run concurrently, then the summary is generated from the news

pub mod analysis;

// Re-export main orchestrator
pub use analysis::{AnalysisError, AnalysisOrchestrator, AnalysisResult};
