//! Text transformation between the journal and the posts
//!
//! Polishing and summarizing are optional niceties: when they fail the
//! original text is used and the run continues.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

pub mod ai;
pub mod splitter;

pub use splitter::{split_into_thread, DEFAULT_BOUND};

#[async_trait]
pub trait TextTransformer: Send + Sync {
    /// Rewrite raw journal text as a social post
    async fn polish(&self, text: &str) -> Result<String>;

    /// Shorten text to roughly `target_chars` characters
    async fn summarize(&self, text: &str, target_chars: usize) -> Result<String>;

    /// Split into bounded thread posts carrying `(i/N)` markers
    fn split(&self, text: &str) -> Vec<String> {
        split_into_thread(text, DEFAULT_BOUND)
    }
}

/// Leaves text untouched; used when no model is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransformer;

#[async_trait]
impl TextTransformer for PassthroughTransformer {
    async fn polish(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }

    async fn summarize(&self, text: &str, _target_chars: usize) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Polish, falling back to the input on error or empty output
pub async fn polish_or_original(transformer: &dyn TextTransformer, text: &str) -> String {
    match transformer.polish(text).await {
        Ok(polished) if !polished.trim().is_empty() => polished.trim().to_string(),
        Ok(_) => {
            warn!("Polish returned nothing, using the original text");
            text.to_string()
        }
        Err(e) => {
            warn!(error = %e, "Polish failed, using the original text");
            text.to_string()
        }
    }
}

/// Summarize only when `text` is longer than `threshold` characters
pub async fn summarize_above(
    transformer: &dyn TextTransformer,
    text: &str,
    threshold: usize,
    target_chars: usize,
) -> String {
    let length = text.chars().count();
    if length <= threshold {
        return text.to_string();
    }
    match transformer.summarize(text, target_chars).await {
        Ok(summary) if !summary.trim().is_empty() => {
            tracing::info!(from = length, to = summary.chars().count(), "Summarized body");
            summary.trim().to_string()
        }
        Ok(_) => {
            warn!("Summary was empty, using the original text");
            text.to_string()
        }
        Err(e) => {
            warn!(error = %e, "Summarize failed, using the original text");
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JournalcastError, ServiceError};

    struct Broken;

    #[async_trait]
    impl TextTransformer for Broken {
        async fn polish(&self, _text: &str) -> Result<String> {
            Err(JournalcastError::Service(ServiceError::Http("down".to_string())))
        }

        async fn summarize(&self, _text: &str, _target: usize) -> Result<String> {
            Ok("   ".to_string())
        }
    }

    #[tokio::test]
    async fn test_polish_falls_back_on_error() {
        assert_eq!(polish_or_original(&Broken, "raw day").await, "raw day");
    }

    #[tokio::test]
    async fn test_summarize_skipped_below_threshold() {
        let text = "short";
        assert_eq!(summarize_above(&Broken, text, 1000, 850).await, "short");
    }

    #[tokio::test]
    async fn test_summarize_empty_result_falls_back() {
        let text = "a".repeat(1200);
        assert_eq!(summarize_above(&Broken, &text, 1000, 850).await, text);
    }

    #[tokio::test]
    async fn test_passthrough_split() {
        let segments = PassthroughTransformer.split("One. Two.");
        assert_eq!(segments, vec!["One. Two. (1/1)"]);
    }
}
