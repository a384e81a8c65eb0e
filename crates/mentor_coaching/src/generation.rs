//! External text generation seam.
//!
//! The engine only needs `generate(prompt) -> text`; which model answers (remote
//! API or on-device) is the host's business.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce text for a prompt. May be slow; callers bound it with a timeout.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Why a generation attempt was replaced by the template.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation backend failed: {0}")]
    Backend(#[from] anyhow::Error),
    #[error("generation returned empty text")]
    Empty,
}

// ============================================================================
// Mock generator
// ============================================================================

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    /// Echo a prefix of the prompt, useful for asserting prompt contents.
    Echo,
    Fail(String),
}

/// Deterministic generator for tests and offline runs.
#[derive(Debug)]
pub struct MockGenerator {
    reply: MockReply,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::with_reply(MockReply::Text(text.into()))
    }

    pub fn echo() -> Self {
        Self::with_reply(MockReply::Echo)
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_reply(MockReply::Fail(message.into()))
    }

    fn with_reply(reply: MockReply) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            MockReply::Text(text) => Ok(text.clone()),
            MockReply::Echo => Ok(format!("(Mock) {}", prompt.chars().take(200).collect::<String>())),
            MockReply::Fail(message) => anyhow::bail!("{}", message),
        }
    }
}
