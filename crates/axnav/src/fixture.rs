//! Snapshot fixtures standing in for a live browsing context.
//!
//! A scenario file lists the pages a context goes through and what each
//! plan step does to it:
//!
//! ```json
//! {
//!   "context": "tab-1",
//!   "intent": { "schema_version": "intent_v1", "action": "click", "target": "sign in" },
//!   "pages": [ { "schema_version": "axtree_v1", ... } ],
//!   "steps": { "2": { "navigate": 1 } },
//!   "answers": ["2"]
//! }
//! ```

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use axnav_engine::backend::{NavigationSignal, ProviderError, SnapshotProvider, StepInvoker};
use axnav_engine::protocol::{
    self, ContextId, ExecutionStep, Intent, InvocationOutcome, ProbeHint, TreeSnapshot,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// What invoking a step does to the fixture page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepEffect {
    /// Index of the page the step navigates to.
    #[serde(default)]
    pub navigate: Option<usize>,
    /// Index of the page swapped in without a navigation.
    #[serde(default)]
    pub mutate: Option<usize>,
    #[serde(default)]
    pub reject: Option<String>,
    /// Fail transiently this many times before the effect applies.
    #[serde(default)]
    pub flaky: u32,
}

#[derive(Deserialize)]
struct RawScenario {
    #[serde(default = "default_context")]
    context: String,
    intent: Value,
    pages: Vec<Value>,
    #[serde(default)]
    steps: HashMap<String, StepEffect>,
    #[serde(default)]
    answers: Vec<String>,
}

fn default_context() -> String {
    "tab-1".to_string()
}

pub struct Scenario {
    pub context: ContextId,
    pub intent: Intent,
    pub pages: Vec<TreeSnapshot>,
    pub steps: HashMap<String, StepEffect>,
    /// Clarification answers given in order before falling back to stdin.
    pub answers: Vec<String>,
}

impl Scenario {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let raw: RawScenario = serde_json::from_str(&content)
            .with_context(|| format!("parsing scenario {}", path.display()))?;

        let context = ContextId::new(raw.context);
        let intent = protocol::decode_value::<Intent>(raw.intent).context("scenario intent")?;
        let pages = raw
            .pages
            .into_iter()
            .enumerate()
            .map(|(i, page)| {
                let mut snapshot = protocol::decode_value::<TreeSnapshot>(page)
                    .with_context(|| format!("scenario page {}", i))?;
                snapshot.page.context = context.clone();
                Ok(snapshot)
            })
            .collect::<Result<Vec<_>>>()?;
        if pages.is_empty() {
            bail!("scenario {} has no pages", path.display());
        }

        for (step, effect) in &raw.steps {
            for index in effect.navigate.iter().chain(effect.mutate.iter()) {
                if *index >= pages.len() {
                    bail!("step {} points at page {} of {}", step, index, pages.len());
                }
            }
        }

        Ok(Self {
            context,
            intent,
            pages,
            steps: raw.steps,
            answers: raw.answers,
        })
    }
}

/// Load a single snapshot file, checking its schema tag.
pub async fn load_snapshot(path: &Path, context: &ContextId) -> Result<TreeSnapshot> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let mut snapshot = protocol::decode::<TreeSnapshot>(&content)
        .with_context(|| format!("decoding snapshot {}", path.display()))?;
    snapshot.page.context = context.clone();
    Ok(snapshot)
}

pub async fn load_intent(path: &Path) -> Result<Intent> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading intent {}", path.display()))?;
    protocol::decode::<Intent>(&content).with_context(|| format!("decoding intent {}", path.display()))
}

struct PageState {
    current: usize,
    effects: HashMap<String, StepEffect>,
    failures: HashMap<String, u32>,
}

/// Serves fixture pages as snapshot provider, step invoker and navigation
/// signal for one context.
pub struct FixturePage {
    pages: Vec<TreeSnapshot>,
    state: Mutex<PageState>,
}

impl FixturePage {
    pub fn new(pages: Vec<TreeSnapshot>, effects: HashMap<String, StepEffect>) -> Self {
        Self {
            pages,
            state: Mutex::new(PageState {
                current: 0,
                effects,
                failures: HashMap::new(),
            }),
        }
    }

    pub fn single(snapshot: TreeSnapshot) -> Self {
        Self::new(vec![snapshot], HashMap::new())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PageState>, ProviderError> {
        self.state.lock().map_err(|_| ProviderError::ConnectionLost)
    }

    fn current(&self) -> Result<TreeSnapshot, ProviderError> {
        let index = self.lock()?.current;
        self.pages.get(index).cloned().ok_or(ProviderError::NotReady)
    }
}

#[async_trait]
impl SnapshotProvider for FixturePage {
    async fn capture(&self, _context: &ContextId) -> Result<TreeSnapshot, ProviderError> {
        self.current()
    }

    async fn probe(&self, _context: &ContextId, hint: ProbeHint) -> Result<TreeSnapshot, ProviderError> {
        debug!("Fixture probe {} leaves the page unchanged", hint.as_str());
        self.current()
    }
}

#[async_trait]
impl StepInvoker for FixturePage {
    async fn invoke(
        &self,
        _context: &ContextId,
        step: &ExecutionStep,
    ) -> Result<InvocationOutcome, ProviderError> {
        let mut state = self.lock()?;
        info!(
            "Invoking step {} ({}) on page {}",
            step.step_id, step.action_type, state.current
        );
        let Some(effect) = state.effects.get(&step.step_id).cloned() else {
            return Ok(InvocationOutcome::ok());
        };

        let failed = state.failures.entry(step.step_id.clone()).or_insert(0);
        if *failed < effect.flaky {
            *failed += 1;
            return Err(ProviderError::NotReady);
        }
        if let Some(message) = &effect.reject {
            return Ok(InvocationOutcome::rejected(message));
        }
        if let Some(next) = effect.mutate {
            state.current = next;
            return Ok(InvocationOutcome::ok());
        }
        if let Some(next) = effect.navigate {
            state.current = next;
            return Ok(InvocationOutcome::navigated());
        }
        Ok(InvocationOutcome::ok())
    }
}

#[async_trait]
impl NavigationSignal for FixturePage {
    async fn wait_ready(&self, _context: &ContextId) -> Result<(), ProviderError> {
        Ok(())
    }
}
