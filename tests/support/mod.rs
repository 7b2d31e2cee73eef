#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use stampa::application::{
    convert::{Converter, PageConfig, RenderTimings},
    engine::{EngineError, RenderEngine, RenderSession},
    wait::{CompletionWaitPolicy, WaitTimings},
};

pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n%fake\n%%EOF\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Launch,
    Load,
    Typeset,
    Marker,
    Snapshot,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Return an error.
    Fail,
    /// Report an engine-side timeout.
    Timeout,
    /// Never complete.
    Hang,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub launch_attempts: AtomicUsize,
    pub sessions: AtomicUsize,
    pub closes: AtomicUsize,
    pub snapshots: AtomicUsize,
    pub marker_polls: AtomicUsize,
    pub loaded: Mutex<Vec<String>>,
}

impl Counters {
    pub fn launch_attempts(&self) -> usize {
        self.launch_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn marker_polls(&self) -> usize {
        self.marker_polls.load(Ordering::SeqCst)
    }

    pub fn last_loaded(&self) -> Option<String> {
        self.loaded.lock().expect("loaded lock").last().cloned()
    }
}

#[derive(Debug, Clone)]
struct Script {
    faults: HashMap<Step, Fault>,
    typeset_result: Value,
    marker_present: bool,
    pdf: Vec<u8>,
}

/// In-memory engine that records every session and injects scripted faults.
#[derive(Clone)]
pub struct ScriptedEngine {
    counters: Arc<Counters>,
    script: Arc<Script>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            script: Arc::new(Script {
                faults: HashMap::new(),
                typeset_result: Value::Null,
                marker_present: false,
                pdf: FAKE_PDF.to_vec(),
            }),
        }
    }

    pub fn with_fault(mut self, step: Step, fault: Fault) -> Self {
        Arc::make_mut(&mut self.script).faults.insert(step, fault);
        self
    }

    pub fn with_typeset_result(mut self, value: Value) -> Self {
        Arc::make_mut(&mut self.script).typeset_result = value;
        self
    }

    pub fn with_marker(mut self) -> Self {
        Arc::make_mut(&mut self.script).marker_present = true;
        self
    }

    pub fn with_pdf(mut self, pdf: &[u8]) -> Self {
        Arc::make_mut(&mut self.script).pdf = pdf.to_vec();
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    pub fn converter(&self, policy: CompletionWaitPolicy) -> Converter {
        Converter::new(Arc::new(self.clone()), policy, fast_timings())
    }
}

async fn apply(script: &Script, step: Step) -> Result<(), EngineError> {
    match script.faults.get(&step) {
        None => Ok(()),
        Some(Fault::Fail) => Err(EngineError::protocol(format!(
            "injected failure at {step:?}"
        ))),
        Some(Fault::Timeout) => Err(EngineError::Timeout(format!(
            "injected timeout at {step:?}"
        ))),
        Some(Fault::Hang) => {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }
}

#[async_trait]
impl RenderEngine for ScriptedEngine {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, EngineError> {
        self.counters.launch_attempts.fetch_add(1, Ordering::SeqCst);
        match self.script.faults.get(&Step::Launch) {
            Some(Fault::Hang) => futures::future::pending::<()>().await,
            Some(_) => return Err(EngineError::unavailable("no Chromium executable found")),
            None => {}
        }
        self.counters.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            counters: Arc::clone(&self.counters),
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedSession {
    counters: Arc<Counters>,
    script: Arc<Script>,
}

#[async_trait]
impl RenderSession for ScriptedSession {
    async fn load_content(&self, html: &str) -> Result<(), EngineError> {
        self.counters
            .loaded
            .lock()
            .expect("loaded lock")
            .push(html.to_string());
        apply(&self.script, Step::Load).await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError> {
        if expression.contains("typesetPromise") {
            apply(&self.script, Step::Typeset).await?;
            Ok(self.script.typeset_result.clone())
        } else {
            self.counters.marker_polls.fetch_add(1, Ordering::SeqCst);
            apply(&self.script, Step::Marker).await?;
            Ok(Value::Bool(self.script.marker_present))
        }
    }

    async fn snapshot_pdf(&self, _config: &PageConfig) -> Result<Vec<u8>, EngineError> {
        self.counters.snapshots.fetch_add(1, Ordering::SeqCst);
        apply(&self.script, Step::Snapshot).await?;
        Ok(self.script.pdf.clone())
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        apply(&self.script, Step::Close).await
    }
}

/// Budgets small enough to exercise every timeout quickly.
pub fn fast_timings() -> RenderTimings {
    RenderTimings {
        launch_timeout: Duration::from_millis(200),
        load_timeout: Duration::from_millis(200),
        wait: WaitTimings {
            completion_timeout: Duration::from_millis(150),
            poll_interval: Duration::from_millis(5),
            settle_delay: Duration::from_millis(10),
        },
        print_timeout: Duration::from_millis(200),
        close_timeout: Duration::from_millis(100),
    }
}
