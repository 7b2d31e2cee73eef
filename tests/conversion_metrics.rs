mod support;

use std::collections::HashSet;

use metrics_util::debugging::DebuggingRecorder;
use stampa::application::{
    convert::PageConfig, document::DocumentSource, wait::CompletionWaitPolicy,
};
use support::{Fault, ScriptedEngine, Step};

#[tokio::test]
async fn conversions_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let page = PageConfig::default();
    let source = DocumentSource::html("<p>métricas</p>");

    // Success path; the failing close feeds the close-failure counter.
    ScriptedEngine::new()
        .with_fault(Step::Close, Fault::Fail)
        .converter(CompletionWaitPolicy::FixedDelay)
        .convert(&source, &page)
        .await
        .expect("close failures do not fail the conversion");

    // Failure path.
    let err = ScriptedEngine::new()
        .with_fault(Step::Snapshot, Fault::Hang)
        .converter(CompletionWaitPolicy::FixedDelay)
        .convert(&source, &page)
        .await
        .expect_err("snapshot stalls");
    assert!(err.is_timeout());

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [
        "stampa_conversions_total",
        "stampa_conversion_ms",
        "stampa_session_close_failures_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let outcomes: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| composite_key.key().name() == "stampa_conversions_total")
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .filter(|label| label.key() == "outcome")
                .map(|label| label.value().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    assert!(outcomes.contains("ok"));
    assert!(outcomes.contains("render_timeout"));
}
