//! Render-completion wait protocol.
//!
//! Load signals fire before asynchronous typesetting finishes mutating the DOM, so a
//! conversion waits on one of several interchangeable strategies before printing.
//! None of them can fail a conversion: a missing hook, a rejected promise or an absent
//! marker all fall through to the fixed settle delay.

use std::{fmt, str::FromStr, time::Duration};

use serde_json::Value;
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::{debug, warn};

use super::engine::RenderSession;

/// Awaits `MathJax.typesetPromise()` when the hook exists.
///
/// Resolves `true` once typesetting completes, `false` when the promise rejects and
/// `null` when no hook is present.
pub(crate) const TYPESET_HOOK_SCRIPT: &str = r#"new Promise((resolve) => {
  if (typeof MathJax !== 'undefined' && MathJax && typeof MathJax.typesetPromise === 'function') {
    MathJax.typesetPromise().then(() => resolve(true)).catch(() => resolve(false));
  } else {
    resolve(null);
  }
})"#;

/// Attribute written on `<body>` by assembled documents once their scripts finish.
pub const RENDER_COMPLETE_ATTRIBUTE: &str = "data-render-complete";
/// Class accepted as an alternative completion marker.
pub const RENDER_COMPLETE_CLASS: &str = "render-complete";

pub(crate) const MARKER_SCRIPT: &str = r#"(() => {
  const body = document.body;
  if (!body) { return false; }
  return body.getAttribute('data-render-complete') === 'true'
    || body.classList.contains('render-complete')
    || document.querySelector('[data-render-complete="true"]') !== null;
})()"#;

/// Strategy used to decide when a loaded page is safe to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionWaitPolicy {
    /// Await the in-page typesetting hook, then settle.
    Callback,
    /// Poll for the completion marker, then settle.
    Marker,
    /// Only sleep the settle delay.
    FixedDelay,
    /// Hook, then marker, then settle.
    #[default]
    Combined,
}

impl CompletionWaitPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Callback => "callback",
            Self::Marker => "marker",
            Self::FixedDelay => "fixed-delay",
            Self::Combined => "combined",
        }
    }

    /// Narrow the policy for a page that may not write the completion marker.
    ///
    /// Without the marker, polling would always run out the completion budget, so
    /// `Marker` degrades to `FixedDelay` and `Combined` to `Callback`.
    pub fn for_page(self, writes_marker: bool) -> Self {
        if writes_marker {
            return self;
        }
        match self {
            Self::Marker => Self::FixedDelay,
            Self::Combined => Self::Callback,
            other => other,
        }
    }

    fn uses_callback(self) -> bool {
        matches!(self, Self::Callback | Self::Combined)
    }

    fn uses_marker(self) -> bool {
        matches!(self, Self::Marker | Self::Combined)
    }
}

impl fmt::Display for CompletionWaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolicy(pub String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown wait policy `{}` (expected callback, marker, fixed-delay or combined)",
            self.0
        )
    }
}

impl std::error::Error for UnknownPolicy {}

impl FromStr for CompletionWaitPolicy {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "callback" => Ok(Self::Callback),
            "marker" => Ok(Self::Marker),
            "fixed-delay" | "fixed_delay" | "delay" => Ok(Self::FixedDelay),
            "combined" => Ok(Self::Combined),
            _ => Err(UnknownPolicy(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypesetOutcome {
    Completed,
    HookMissing,
    Rejected,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOutcome {
    Found,
    Missing,
}

/// What the completion wait observed; `None` for strategies the policy skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitReport {
    pub typeset: Option<TypesetOutcome>,
    pub marker: Option<MarkerOutcome>,
}

/// Durations governing the completion wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimings {
    /// Shared budget for the hook and marker strategies.
    pub completion_timeout: Duration,
    pub poll_interval: Duration,
    /// Grace period applied after every policy.
    pub settle_delay: Duration,
}

/// Run `policy` against a loaded page. Never fails.
pub async fn await_completion(
    session: &dyn RenderSession,
    policy: CompletionWaitPolicy,
    timings: &WaitTimings,
) -> WaitReport {
    let deadline = Instant::now() + timings.completion_timeout;
    let mut report = WaitReport::default();

    if policy.uses_callback() {
        report.typeset = Some(run_typeset_hook(session, deadline).await);
    }

    if policy.uses_marker() {
        report.marker = Some(poll_marker(session, deadline, timings.poll_interval).await);
    }

    if !timings.settle_delay.is_zero() {
        sleep(timings.settle_delay).await;
    }

    report
}

async fn run_typeset_hook(session: &dyn RenderSession, deadline: Instant) -> TypesetOutcome {
    match timeout_at(deadline, session.evaluate(TYPESET_HOOK_SCRIPT)).await {
        Ok(Ok(Value::Bool(true))) => TypesetOutcome::Completed,
        Ok(Ok(Value::Bool(false))) => {
            warn!(
                target = "stampa::render::wait",
                op = "wait::typeset_hook",
                result = "rejected",
                "Typesetting promise rejected; continuing"
            );
            TypesetOutcome::Rejected
        }
        Ok(Ok(_)) => {
            debug!(
                target = "stampa::render::wait",
                op = "wait::typeset_hook",
                result = "hook_missing",
                "No typesetting hook in document"
            );
            TypesetOutcome::HookMissing
        }
        Ok(Err(err)) => {
            warn!(
                target = "stampa::render::wait",
                op = "wait::typeset_hook",
                result = "error",
                error = %err,
                "Typesetting hook evaluation failed; continuing"
            );
            TypesetOutcome::Rejected
        }
        Err(_) => {
            warn!(
                target = "stampa::render::wait",
                op = "wait::typeset_hook",
                result = "timeout",
                "Typesetting hook did not resolve in time; continuing"
            );
            TypesetOutcome::TimedOut
        }
    }
}

async fn poll_marker(
    session: &dyn RenderSession,
    deadline: Instant,
    poll_interval: Duration,
) -> MarkerOutcome {
    let mut polls = 0u32;
    loop {
        polls += 1;
        match timeout_at(deadline, session.evaluate(MARKER_SCRIPT)).await {
            Ok(Ok(Value::Bool(true))) => {
                debug!(
                    target = "stampa::render::wait",
                    op = "wait::marker",
                    result = "found",
                    polls,
                    "Completion marker present"
                );
                return MarkerOutcome::Found;
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                debug!(
                    target = "stampa::render::wait",
                    op = "wait::marker",
                    error = %err,
                    "Marker check failed"
                );
            }
            Err(_) => break,
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep_until((now + poll_interval).min(deadline)).await;
    }

    warn!(
        target = "stampa::render::wait",
        op = "wait::marker",
        result = "missing",
        polls,
        "Completion marker not found before timeout; continuing"
    );
    MarkerOutcome::Missing
}
