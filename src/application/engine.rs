//! Capability interface for the external rendering engine.
//!
//! The orchestrator only ever talks to these traits; the Chromium adapter lives in
//! `infra::engine` and tests plug in scripted engines.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::convert::PageConfig;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rendering engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine operation timed out: {0}")]
    Timeout(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("engine protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }
}

/// Launches one isolated engine instance per call.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, EngineError>;
}

/// One engine instance with a single page.
///
/// Sessions are owned by exactly one conversion and must be consumed through
/// [`RenderSession::close`].
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Replace the page document with `html` and wait for its load signal.
    async fn load_content(&self, html: &str) -> Result<(), EngineError>;

    /// Evaluate `expression` in the page, awaiting it when it yields a promise.
    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError>;

    /// Print the current page to PDF.
    async fn snapshot_pdf(&self, config: &PageConfig) -> Result<Vec<u8>, EngineError>;

    /// Tear down the page and its engine process.
    async fn close(self: Box<Self>) -> Result<(), EngineError>;
}
