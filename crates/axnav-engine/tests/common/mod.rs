#![allow(dead_code)]

use async_trait::async_trait;
use axnav_engine::backend::{NavigationSignal, ProviderError, SnapshotProvider, StepInvoker};
use axnav_engine::config::EngineConfig;
use axnav_engine::protocol::{
    ContextId, ExecutionStep, InvocationOutcome, Node, PageContext, ProbeHint, TreeSnapshot,
};
use axnav_engine::session::MemorySessionStore;
use axnav_engine::Engine;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn context() -> ContextId {
    ContextId::new("tab-1")
}

pub fn page(id: &str, nodes: Vec<Node>) -> TreeSnapshot {
    TreeSnapshot::new(PageContext::new(context()).with_url("https://example.test/"), nodes).with_id(id)
}

#[derive(Default)]
struct State {
    current: Option<TreeSnapshot>,
    /// Pages revealed by successive probes.
    revealed: VecDeque<TreeSnapshot>,
    captures: Vec<Option<ProbeHint>>,
    invocations: Vec<ExecutionStep>,
    /// Scripted results per step id, consumed in order; success when empty.
    outcomes: HashMap<String, VecDeque<Result<InvocationOutcome, ProviderError>>>,
    /// Steps whose invocation navigates to a new page, and how many plain
    /// captures fail before that page settles.
    navigations: HashMap<String, (TreeSnapshot, usize)>,
    unsettled_captures: usize,
    /// Served to plain captures; refreshes see the full page.
    collapsed: Option<TreeSnapshot>,
    /// Steps that change the page in place.
    mutations: HashMap<String, TreeSnapshot>,
    /// Steps whose next invocation never returns.
    hanging: Vec<String>,
    navigation_waits: usize,
}

/// One fake browsing context acting as provider, invoker and navigation signal.
#[derive(Default)]
pub struct MockPage {
    state: Mutex<State>,
}

impl MockPage {
    pub fn new(initial: TreeSnapshot) -> Arc<Self> {
        let page = Self::default();
        page.state.lock().unwrap().current = Some(initial);
        Arc::new(page)
    }

    pub fn blank() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reveal_on_probe(&self, snapshot: TreeSnapshot) {
        self.state.lock().unwrap().revealed.push_back(snapshot);
    }

    pub fn script(&self, step_id: &str, outcome: Result<InvocationOutcome, ProviderError>) {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .entry(step_id.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn navigate_on(&self, step_id: &str, next: TreeSnapshot) {
        self.navigate_unsettled(step_id, next, 0);
    }

    /// Like `navigate_on`, but the first `failures` captures afterwards
    /// report the page as not ready.
    pub fn navigate_unsettled(&self, step_id: &str, next: TreeSnapshot, failures: usize) {
        self.state
            .lock()
            .unwrap()
            .navigations
            .insert(step_id.to_string(), (next, failures));
    }

    /// Plain captures see `collapsed`; any refresh sees the current page.
    pub fn collapse_until_refreshed(&self, collapsed: TreeSnapshot) {
        self.state.lock().unwrap().collapsed = Some(collapsed);
    }

    pub fn mutate_on(&self, step_id: &str, next: TreeSnapshot) {
        self.state
            .lock()
            .unwrap()
            .mutations
            .insert(step_id.to_string(), next);
    }

    pub fn hang_on(&self, step_id: &str) {
        self.state.lock().unwrap().hanging.push(step_id.to_string());
    }

    pub fn invocations(&self) -> Vec<ExecutionStep> {
        self.state.lock().unwrap().invocations.clone()
    }

    pub fn invoked_ids(&self) -> Vec<String> {
        self.invocations().into_iter().map(|s| s.step_id).collect()
    }

    pub fn captures(&self) -> Vec<Option<ProbeHint>> {
        self.state.lock().unwrap().captures.clone()
    }

    pub fn navigation_waits(&self) -> usize {
        self.state.lock().unwrap().navigation_waits
    }

    fn serve(&self, hint: Option<ProbeHint>) -> Result<TreeSnapshot, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.captures.push(hint);
        if hint.is_none() && state.unsettled_captures > 0 {
            state.unsettled_captures -= 1;
            return Err(ProviderError::NotReady);
        }
        if hint.is_none()
            && let Some(collapsed) = &state.collapsed
        {
            return Ok(collapsed.clone());
        }
        if hint.is_some()
            && let Some(next) = state.revealed.pop_front()
        {
            state.current = Some(next);
        }
        state.current.clone().ok_or(ProviderError::NotReady)
    }
}

#[async_trait]
impl SnapshotProvider for MockPage {
    async fn capture(&self, _context: &ContextId) -> Result<TreeSnapshot, ProviderError> {
        self.serve(None)
    }

    async fn probe(&self, _context: &ContextId, hint: ProbeHint) -> Result<TreeSnapshot, ProviderError> {
        self.serve(Some(hint))
    }
}

#[async_trait]
impl StepInvoker for MockPage {
    async fn invoke(
        &self,
        _context: &ContextId,
        step: &ExecutionStep,
    ) -> Result<InvocationOutcome, ProviderError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.invocations.push(step.clone());
            match state.hanging.iter().position(|id| *id == step.step_id) {
                Some(i) => {
                    state.hanging.remove(i);
                    true
                }
                None => false,
            }
        };
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(outcome) = state
            .outcomes
            .get_mut(&step.step_id)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        if let Some(next) = state.mutations.remove(&step.step_id) {
            state.current = Some(next);
            return Ok(InvocationOutcome::ok());
        }
        if let Some((next, failures)) = state.navigations.remove(&step.step_id) {
            state.current = Some(next);
            state.unsettled_captures = failures;
            return Ok(InvocationOutcome::navigated());
        }
        Ok(InvocationOutcome::ok())
    }
}

#[async_trait]
impl NavigationSignal for MockPage {
    async fn wait_ready(&self, _context: &ContextId) -> Result<(), ProviderError> {
        self.state.lock().unwrap().navigation_waits += 1;
        Ok(())
    }
}

pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.supervisor.retry_delay_ms = 1;
    config
}

pub fn engine_with(page: &Arc<MockPage>, config: EngineConfig) -> Engine {
    Engine::new(
        config,
        page.clone(),
        page.clone(),
        page.clone(),
        Arc::new(MemorySessionStore::new()),
    )
}

pub fn engine(page: &Arc<MockPage>) -> Engine {
    engine_with(page, fast_config())
}
