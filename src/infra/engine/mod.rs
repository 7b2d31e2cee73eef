//! Headless Chromium adapter for the render engine interface.

mod profile;

pub use profile::{DeploymentMode, LaunchProfile, SERVERLESS_ENV_VARS};

use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::Browser,
    cdp::{browser_protocol::page::PrintToPdfParams, js_protocol::runtime::EvaluateParams},
    error::CdpError,
};
use futures::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::{
    convert::PageConfig,
    engine::{EngineError, RenderEngine, RenderSession},
};

const MM_PER_INCH: f64 = 25.4;

/// Resolves once the document has fired its `load` event.
const DOCUMENT_LOADED_SCRIPT: &str = r#"new Promise((resolve) => {
  if (document.readyState === 'complete') {
    resolve(true);
  } else {
    window.addEventListener('load', () => resolve(true), { once: true });
  }
})"#;

/// Starts a fresh Chromium process for every session.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    profile: LaunchProfile,
}

impl ChromiumEngine {
    pub fn new(profile: LaunchProfile) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, EngineError> {
        let data_dir = tempfile::Builder::new()
            .prefix("stampa-chromium-")
            .tempdir_in(&self.profile.user_data_root)
            .map_err(|err| {
                EngineError::unavailable(format!(
                    "failed to create browser profile under {}: {err}",
                    self.profile.user_data_root.display()
                ))
            })?;
        let config = self.profile.browser_config(data_dir.path())?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| EngineError::unavailable(format!("failed to launch Chromium: {err}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(
                        target = "stampa::engine::chromium",
                        error = %err,
                        "Browser handler reported an error"
                    );
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                if let Err(close_err) = browser.close().await {
                    warn!(
                        target = "stampa::engine::chromium",
                        op = "engine::launch",
                        error = %close_err,
                        "Failed to close Chromium after page creation failed"
                    );
                }
                if let Err(wait_err) = browser.wait().await {
                    warn!(
                        target = "stampa::engine::chromium",
                        op = "engine::launch",
                        error = %wait_err,
                        "Failed to reap Chromium after page creation failed"
                    );
                }
                handler_task.abort();
                return Err(EngineError::unavailable(format!(
                    "failed to open a page: {err}"
                )));
            }
        };

        info!(
            target = "stampa::engine::chromium",
            op = "engine::launch",
            mode = %self.profile.mode,
            profile_dir = %data_dir.path().display(),
            "Chromium session started"
        );

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
            data_dir,
        }))
    }
}

/// One Chromium process with a single page.
///
/// Dropping the session without [`RenderSession::close`] still kills the process
/// through `Browser`'s own drop.
struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    data_dir: TempDir,
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn load_content(&self, html: &str) -> Result<(), EngineError> {
        self.page.set_content(html).await.map_err(map_cdp_error)?;
        self.page
            .evaluate_expression(promise_params(DOCUMENT_LOADED_SCRIPT)?)
            .await
            .map_err(map_cdp_error)?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError> {
        let result = self
            .page
            .evaluate_expression(promise_params(expression)?)
            .await
            .map_err(map_cdp_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn snapshot_pdf(&self, config: &PageConfig) -> Result<Vec<u8>, EngineError> {
        self.page
            .pdf(print_params(config))
            .await
            .map_err(map_cdp_error)
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
            data_dir,
        } = *self;
        drop(page);

        let closed = browser.close().await;
        let waited = browser.wait().await;
        handler_task.abort();
        let _ = handler_task.await;

        if let Err(err) = data_dir.close() {
            warn!(
                target = "stampa::engine::chromium",
                op = "engine::close",
                error = %err,
                "Failed to remove browser profile directory"
            );
        }

        closed.map_err(|err| EngineError::protocol(format!("failed to close Chromium: {err}")))?;
        waited.map_err(|err| {
            EngineError::protocol(format!("failed to reap Chromium process: {err}"))
        })?;
        Ok(())
    }
}

fn promise_params(expression: &str) -> Result<EvaluateParams, EngineError> {
    EvaluateParams::builder()
        .expression(expression)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(EngineError::evaluation)
}

pub(crate) fn print_params(config: &PageConfig) -> PrintToPdfParams {
    PrintToPdfParams {
        landscape: Some(false),
        display_header_footer: Some(config.display_header_footer),
        print_background: Some(config.print_background),
        paper_width: Some(mm_to_inches(config.paper.width_mm)),
        paper_height: Some(mm_to_inches(config.paper.height_mm)),
        margin_top: Some(mm_to_inches(config.margins.top_mm)),
        margin_bottom: Some(mm_to_inches(config.margins.bottom_mm)),
        margin_left: Some(mm_to_inches(config.margins.left_mm)),
        margin_right: Some(mm_to_inches(config.margins.right_mm)),
        prefer_css_page_size: Some(false),
        ..Default::default()
    }
}

fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

fn map_cdp_error(error: CdpError) -> EngineError {
    match error {
        CdpError::Timeout => EngineError::Timeout("DevTools request timed out".to_string()),
        CdpError::JavascriptException(details) => {
            EngineError::evaluation(format!("{details:?}"))
        }
        other => EngineError::protocol(other.to_string()),
    }
}
