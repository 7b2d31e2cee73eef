//! Live rendering against a real Chromium installation.
//!
//! - Uses the executable named by `STAMPA_TEST_CHROMIUM`, or lets the launcher discover one.
//! - The Markdown case loads MathJax and marked from their CDNs, so it needs network access.
//! - Marked `#[ignore]` so it only runs manually on machines with a browser.

use std::{path::PathBuf, sync::Arc, time::Duration};

use stampa::{
    application::{
        convert::{Converter, PDF_SIGNATURE, PageConfig, RenderTimings},
        document::DocumentSource,
        wait::CompletionWaitPolicy,
    },
    infra::engine::{ChromiumEngine, DeploymentMode, LaunchProfile},
};

fn live_converter(policy: CompletionWaitPolicy) -> Converter {
    let executable = std::env::var_os("STAMPA_TEST_CHROMIUM").map(PathBuf::from);
    let profile = LaunchProfile::for_mode(
        DeploymentMode::Local,
        executable,
        std::env::temp_dir(),
        &[],
        Duration::from_secs(65),
    );
    Converter::new(
        Arc::new(ChromiumEngine::new(profile)),
        policy,
        RenderTimings::default(),
    )
}

#[tokio::test]
#[ignore]
async fn renders_plain_html() {
    let pdf = live_converter(CompletionWaitPolicy::FixedDelay)
        .convert(
            &DocumentSource::html("<html><body><h1>Olá</h1><p>Teste.</p></body></html>"),
            &PageConfig::default(),
        )
        .await
        .expect("chromium renders html");

    assert!(pdf.starts_with(PDF_SIGNATURE));
    assert!(pdf.len() > 500);
}

#[tokio::test]
#[ignore]
async fn renders_markdown_with_math_and_marker() {
    let text = "# Equações\n\nInline $e^{i\\pi} + 1 = 0$ e bloco:\n\n$$\\sum_{k=1}^n k = \\frac{n(n+1)}{2}$$\n";
    let pdf = live_converter(CompletionWaitPolicy::Combined)
        .convert(&DocumentSource::markdown(text, None), &PageConfig::default())
        .await
        .expect("chromium renders markdown");

    assert!(pdf.starts_with(PDF_SIGNATURE));
}
