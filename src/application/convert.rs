//! Render-and-capture orchestrator.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{
    document::{AssemblyError, DocumentSource},
    engine::{EngineError, RenderEngine, RenderSession},
    wait::{self, CompletionWaitPolicy, WaitTimings},
};

/// Leading bytes of every PDF file.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(25);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_PRINT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PaperSize {
    pub const A4: Self = Self {
        width_mm: 210.0,
        height_mm: 297.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top_mm: f64,
    pub right_mm: f64,
    pub bottom_mm: f64,
    pub left_mm: f64,
}

/// Print settings. The default is the fixed layout every conversion uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageConfig {
    pub paper: PaperSize,
    pub margins: Margins,
    pub print_background: bool,
    pub display_header_footer: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            paper: PaperSize::A4,
            margins: Margins {
                top_mm: 20.0,
                right_mm: 15.0,
                bottom_mm: 20.0,
                left_mm: 15.0,
            },
            print_background: true,
            display_header_footer: false,
        }
    }
}

/// Per-step budgets for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTimings {
    pub launch_timeout: Duration,
    pub load_timeout: Duration,
    pub wait: WaitTimings,
    pub print_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for RenderTimings {
    fn default() -> Self {
        Self {
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            wait: WaitTimings {
                completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
                poll_interval: DEFAULT_POLL_INTERVAL,
                settle_delay: DEFAULT_SETTLE_DELAY,
            },
            print_timeout: DEFAULT_PRINT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("document source is empty")]
    InvalidSource,
    #[error("rendering engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("timed out loading the document after {0:?}")]
    LoadTimeout(Duration),
    #[error("timed out printing the document after {0:?}")]
    RenderTimeout(Duration),
    #[error("render failed: {0}")]
    RenderFailure(String),
}

impl ConversionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LoadTimeout(_) | Self::RenderTimeout(_))
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidSource => "invalid_source",
            Self::EngineUnavailable(_) => "engine_unavailable",
            Self::LoadTimeout(_) => "load_timeout",
            Self::RenderTimeout(_) => "render_timeout",
            Self::RenderFailure(_) => "render_failure",
        }
    }
}

impl From<AssemblyError> for ConversionError {
    fn from(error: AssemblyError) -> Self {
        match error {
            AssemblyError::EmptySource | AssemblyError::InvalidCoverImage(_) => {
                Self::InvalidSource
            }
            AssemblyError::Template(err) => {
                Self::RenderFailure(format!("failed to assemble document: {err}"))
            }
        }
    }
}

/// Drives one engine session per conversion through load, settle, print and close.
pub struct Converter {
    engine: Arc<dyn RenderEngine>,
    policy: CompletionWaitPolicy,
    timings: RenderTimings,
}

impl Converter {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        policy: CompletionWaitPolicy,
        timings: RenderTimings,
    ) -> Self {
        Self {
            engine,
            policy,
            timings,
        }
    }

    /// Render `source` to PDF bytes.
    ///
    /// The session acquired from the engine is closed exactly once on every path that
    /// acquired one; failures while closing are logged and never replace the result.
    pub async fn convert(
        &self,
        source: &DocumentSource,
        config: &PageConfig,
    ) -> Result<Bytes, ConversionError> {
        let started_at = Instant::now();
        let result = self.run(source, config).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        let outcome = match &result {
            Ok(pdf) => {
                info!(
                    target = "stampa::render::convert",
                    op = "convert",
                    result = "ok",
                    kind = source.kind(),
                    policy = %self.policy,
                    elapsed_ms,
                    pdf_bytes = pdf.len(),
                    "Document rendered"
                );
                "ok"
            }
            Err(err) => {
                warn!(
                    target = "stampa::render::convert",
                    op = "convert",
                    result = "error",
                    kind = source.kind(),
                    policy = %self.policy,
                    elapsed_ms,
                    error_code = err.outcome(),
                    error = %err,
                    "Document rendering failed"
                );
                err.outcome()
            }
        };
        counter!("stampa_conversions_total", "outcome" => outcome).increment(1);
        histogram!("stampa_conversion_ms").record(elapsed_ms as f64);

        result
    }

    async fn run(
        &self,
        source: &DocumentSource,
        config: &PageConfig,
    ) -> Result<Bytes, ConversionError> {
        let html = source.to_html()?;

        let launched_at = Instant::now();
        let session = match timeout(self.timings.launch_timeout, self.engine.launch()).await {
            Ok(Ok(session)) => session,
            Ok(Err(EngineError::Unavailable(message))) => {
                return Err(ConversionError::EngineUnavailable(message));
            }
            Ok(Err(other)) => return Err(ConversionError::EngineUnavailable(other.to_string())),
            Err(_) => {
                return Err(ConversionError::EngineUnavailable(format!(
                    "engine did not start within {:?}",
                    self.timings.launch_timeout
                )));
            }
        };
        debug!(
            target = "stampa::render::convert",
            op = "engine::launch",
            elapsed_ms = launched_at.elapsed().as_millis() as u64,
            "Render session acquired"
        );

        let policy = self.policy.for_page(source.writes_completion_marker());
        let result = self.drive(session.as_ref(), &html, policy, config).await;
        self.release(session).await;
        result
    }

    async fn drive(
        &self,
        session: &dyn RenderSession,
        html: &str,
        policy: CompletionWaitPolicy,
        config: &PageConfig,
    ) -> Result<Bytes, ConversionError> {
        let load_timeout = self.timings.load_timeout;
        match timeout(load_timeout, session.load_content(html)).await {
            Ok(Ok(())) => {}
            Ok(Err(EngineError::Timeout(_))) | Err(_) => {
                return Err(ConversionError::LoadTimeout(load_timeout));
            }
            Ok(Err(err)) => return Err(ConversionError::RenderFailure(err.to_string())),
        }

        let report = wait::await_completion(session, policy, &self.timings.wait).await;
        debug!(
            target = "stampa::render::convert",
            op = "wait::complete",
            policy = %policy,
            typeset = ?report.typeset,
            marker = ?report.marker,
            "Completion wait finished"
        );

        let print_timeout = self.timings.print_timeout;
        let pdf = match timeout(print_timeout, session.snapshot_pdf(config)).await {
            Ok(Ok(pdf)) => pdf,
            Ok(Err(EngineError::Timeout(_))) | Err(_) => {
                return Err(ConversionError::RenderTimeout(print_timeout));
            }
            Ok(Err(err)) => return Err(ConversionError::RenderFailure(err.to_string())),
        };

        if !pdf.starts_with(PDF_SIGNATURE) {
            return Err(ConversionError::RenderFailure(
                "engine returned a payload without a PDF signature".to_string(),
            ));
        }

        Ok(Bytes::from(pdf))
    }

    async fn release(&self, session: Box<dyn RenderSession>) {
        let failure = match timeout(self.timings.close_timeout, session.close()).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!(
                "close did not finish within {:?}",
                self.timings.close_timeout
            )),
        };

        if let Some(error) = failure {
            counter!("stampa_session_close_failures_total").increment(1);
            warn!(
                target = "stampa::render::convert",
                op = "engine::close",
                result = "error",
                error = %error,
                "Failed to release render session"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_config_is_a4_with_fixed_margins() {
        let config = PageConfig::default();
        assert_eq!(config.paper, PaperSize::A4);
        assert_eq!(config.margins.top_mm, 20.0);
        assert_eq!(config.margins.bottom_mm, 20.0);
        assert_eq!(config.margins.left_mm, 15.0);
        assert_eq!(config.margins.right_mm, 15.0);
        assert!(config.print_background);
        assert!(!config.display_header_footer);
    }

    #[test]
    fn default_timings_match_request_budgets() {
        let timings = RenderTimings::default();
        assert_eq!(timings.load_timeout, Duration::from_secs(30));
        assert_eq!(timings.wait.completion_timeout, Duration::from_secs(25));
        assert_eq!(timings.print_timeout, Duration::from_secs(60));
    }

    #[test]
    fn only_timeouts_report_as_timeouts() {
        assert!(ConversionError::LoadTimeout(DEFAULT_LOAD_TIMEOUT).is_timeout());
        assert!(ConversionError::RenderTimeout(DEFAULT_PRINT_TIMEOUT).is_timeout());
        assert!(!ConversionError::InvalidSource.is_timeout());
        assert!(!ConversionError::RenderFailure("boom".into()).is_timeout());
    }
}
