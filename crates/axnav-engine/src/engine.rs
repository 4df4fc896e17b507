//! Entry points keyed by browsing context.

use crate::backend::{NavigationSignal, ProviderError, SnapshotProvider, StepInvoker};
use crate::clarification::Interpretation;
use crate::config::{ConfigError, EngineConfig};
use crate::matcher::MatchHints;
use crate::resolution::{MultiStepResolver, Resolution};
use crate::session::{
    FailureCode, FailureReason, FileSessionStore, MemorySessionStore, Session, SessionError,
    SessionStatus, SessionStore, SessionTable, StartPolicy, StoreError,
};
use crate::supervisor::{CancelReason, CancelToken, ExecutionSupervisor, cancel_code, cancel_detail};
use axnav_common::protocol::{
    ClarificationAnswer, ClarificationExchange, ClarificationRequest, ContextId, ExecutionPlan,
    ExecutionResult, Intent, ProtocolError,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// What a caller sees of a session after each entry point.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub context: ContextId,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    pub results: Vec<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl From<&Session> for SessionReport {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            context: session.context.clone(),
            status: session.status,
            plan: session.plan.clone(),
            results: session.results().to_vec(),
            clarification: session.pending_clarification.clone(),
            failure: session.failure.clone(),
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    resolver: Arc<MultiStepResolver>,
    supervisor: ExecutionSupervisor,
    store: Arc<dyn SessionStore>,
    table: Arc<SessionTable>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn SnapshotProvider>,
        invoker: Arc<dyn StepInvoker>,
        navigation: Arc<dyn NavigationSignal>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let resolver = Arc::new(MultiStepResolver::new(
            config.matcher.clone(),
            config.resolver.clone(),
            provider,
        ));
        let table = Arc::new(SessionTable::new());
        let supervisor = ExecutionSupervisor::new(
            config.supervisor.clone(),
            invoker,
            navigation,
            resolver.clone(),
            store.clone(),
            table.clone(),
        );
        Self {
            config,
            resolver,
            supervisor,
            store,
            table,
        }
    }

    /// Build an engine whose store follows `config.sessions.persist_dir`.
    pub async fn from_config(
        config: EngineConfig,
        provider: Arc<dyn SnapshotProvider>,
        invoker: Arc<dyn StepInvoker>,
        navigation: Arc<dyn NavigationSignal>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let store: Arc<dyn SessionStore> = match &config.sessions.persist_dir {
            Some(dir) => Arc::new(FileSessionStore::new(dir.clone()).await?),
            None => Arc::new(MemorySessionStore::new()),
        };
        Ok(Self::new(config, provider, invoker, navigation, store))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The start policy configured for `submit` callers without an opinion.
    pub fn default_policy(&self) -> StartPolicy {
        if self.config.sessions.supersede {
            StartPolicy::Supersede
        } else {
            StartPolicy::Reject
        }
    }

    /// Start a session for `intent` and drive it as far as it can go without
    /// the user.
    pub async fn submit(
        &self,
        context: &ContextId,
        intent: Intent,
        policy: StartPolicy,
    ) -> Result<SessionReport, EngineError> {
        if let Some(stored) = self.store.load(context).await? {
            self.table.restore(&stored).await;
        }

        let mut session = Session::new(context.clone(), intent);
        let mut claim = self.table.begin(&session, policy).await?;
        // The superseded task may still be mid-step on this context.
        claim.displaced_stopped().await;
        info!(
            "Session {} started on {}: {} {:?}",
            session.id, context, session.intent.action, session.intent.target
        );

        let outcome = self.start(&mut session, &claim.cancel).await;
        self.table.release(context, &session.id).await;
        outcome?;
        Ok(SessionReport::from(&session))
    }

    async fn start(&self, session: &mut Session, cancel: &CancelToken) -> Result<(), EngineError> {
        self.persist(session).await?;
        let hints = MatchHints::default();
        self.resolve_and_run(session, cancel, &hints).await
    }

    /// Feed an answer to the session waiting on `context`.
    pub async fn answer(
        &self,
        context: &ContextId,
        answer: ClarificationAnswer,
    ) -> Result<SessionReport, EngineError> {
        let mut session = self.load_required(context).await?;
        if session.status != SessionStatus::AwaitingClarification {
            return Err(SessionError::NotAwaitingClarification(session.status).into());
        }
        let request = session
            .pending_clarification
            .clone()
            .ok_or(SessionError::NotAwaitingClarification(session.status))?;

        let interpretation = self
            .resolver
            .clarifier()
            .interpret(&request, &answer, &session.intent)?;

        let cancel = self.table.adopt(&session).await?;
        let outcome = self
            .continue_with(&mut session, &cancel, request, answer, interpretation)
            .await;
        self.table.release(context, &session.id).await;
        outcome?;
        Ok(SessionReport::from(&session))
    }

    async fn continue_with(
        &self,
        session: &mut Session,
        cancel: &CancelToken,
        request: ClarificationRequest,
        answer: ClarificationAnswer,
        interpretation: Interpretation,
    ) -> Result<(), EngineError> {
        let chosen_label = match &interpretation {
            Interpretation::Pin { label, .. } => Some(label.clone()),
            _ => None,
        };
        info!(
            "Session {} answered {} ({})",
            session.id,
            answer,
            chosen_label.as_deref().unwrap_or("free text")
        );
        session.clarification_history.push(ClarificationExchange {
            question: request.question,
            reason: request.reason,
            answer,
            chosen_label,
        });
        let pending_snapshot = session.pending_snapshot.take();
        session.transition(SessionStatus::Resolving)?;

        match interpretation {
            Interpretation::Pin { node, .. } => {
                session.pinned.push(node);
                let hints = self.hints_for(session);

                // The options were drawn from this snapshot; the pin only
                // means something there.
                if let Some(snapshot) = pending_snapshot
                    && let Ok(resolution) =
                        self.resolver
                            .resolve_snapshot(&session.intent, &snapshot, &hints)
                {
                    return self.apply(session, cancel, resolution).await;
                }
                self.resolve_and_run(session, cancel, &hints).await
            }
            Interpretation::Refine { intent } | Interpretation::Fill { intent } => {
                session.intent = intent;
                let hints = self.hints_for(session);
                self.resolve_and_run(session, cancel, &hints).await
            }
        }
    }

    /// Continue a session left executing or navigating, e.g. after a restart.
    pub async fn resume(&self, context: &ContextId) -> Result<SessionReport, EngineError> {
        let mut session = self.load_required(context).await?;
        if !matches!(
            session.status,
            SessionStatus::Executing | SessionStatus::NavigatingResume
        ) {
            return Ok(SessionReport::from(&session));
        }

        let cancel = self.table.adopt(&session).await?;
        info!(
            "Resuming session {} on {} at step {}",
            session.id, context, session.next_step
        );
        self.supervisor.run(&mut session, &cancel).await;
        self.table.release(context, &session.id).await;
        Ok(SessionReport::from(&session))
    }

    /// Stop the session on `context`. Waits for a running session to wind
    /// down before reporting it.
    pub async fn cancel(&self, context: &ContextId) -> Result<SessionReport, EngineError> {
        if let Some(mut running) = self.table.cancel(context, CancelReason::Cancelled).await {
            let _ = running.wait_for(|busy| !*busy).await;
        }

        let mut session = self.load_required(context).await?;
        if !session.is_terminal() {
            // Nothing is driving it: waiting for an answer, or left over from
            // an earlier process.
            self.supervisor
                .abort(&mut session, FailureCode::Cancelled, cancel_detail(CancelReason::Cancelled))
                .await;
        }
        Ok(SessionReport::from(&session))
    }

    pub async fn session(&self, context: &ContextId) -> Result<Option<SessionReport>, EngineError> {
        Ok(self
            .store
            .load(context)
            .await?
            .as_ref()
            .map(SessionReport::from))
    }

    pub async fn sessions(&self) -> Result<Vec<SessionReport>, EngineError> {
        Ok(self
            .store
            .list()
            .await?
            .iter()
            .map(SessionReport::from)
            .collect())
    }

    /// Hand back a finished session and forget it.
    pub async fn consume(&self, context: &ContextId) -> Result<SessionReport, EngineError> {
        let session = self.load_required(context).await?;
        if !session.is_terminal() {
            return Err(SessionError::SessionActive {
                context: context.clone(),
                status: session.status,
            }
            .into());
        }
        self.store.delete(context).await?;
        self.table.remove(context).await;
        Ok(SessionReport::from(&session))
    }

    /// Drop whatever exists for `context`, cancelling it first if needed.
    pub async fn reset(&self, context: &ContextId) -> Result<(), EngineError> {
        if let Some(mut running) = self.table.cancel(context, CancelReason::Cancelled).await {
            let _ = running.wait_for(|busy| !*busy).await;
        }
        self.store.delete(context).await?;
        self.table.remove(context).await;
        info!("Reset context {}", context);
        Ok(())
    }

    async fn resolve_and_run(
        &self,
        session: &mut Session,
        cancel: &CancelToken,
        hints: &MatchHints,
    ) -> Result<(), EngineError> {
        let resolution = tokio::select! {
            biased;
            reason = cancel.cancelled() => {
                self.supervisor
                    .abort(session, cancel_code(reason), cancel_detail(reason))
                    .await;
                return Ok(());
            }
            resolution = self.resolver.resolve(&session.context, &session.intent, hints) => resolution,
        };
        self.apply(session, cancel, resolution).await
    }

    async fn apply(
        &self,
        session: &mut Session,
        cancel: &CancelToken,
        resolution: Resolution,
    ) -> Result<(), EngineError> {
        match resolution {
            Resolution::Plan(resolved) => {
                info!(
                    "Session {} planned {} step(s) on snapshot {}",
                    session.id,
                    resolved.plan.steps.len(),
                    resolved.snapshot.id
                );
                session.start_plan(resolved.plan, resolved.snapshot.snapshot_ref())?;
                self.persist(session).await?;
                self.supervisor.run(session, cancel).await;
            }
            Resolution::Clarify(clarification) => {
                info!(
                    "Session {} needs clarification ({}): {}",
                    session.id,
                    clarification.request.reason.as_str(),
                    clarification.request.question
                );
                session.await_clarification(clarification.request, clarification.snapshot)?;
                self.persist(session).await?;
            }
            Resolution::NoMatch(report) => {
                warn!("Session {} found no match: {}", session.id, report);
                session.fail(FailureCode::NoMatch, report.to_string())?;
                self.persist(session).await?;
            }
        }
        Ok(())
    }

    fn hints_for(&self, session: &Session) -> MatchHints {
        MatchHints {
            pinned: session.pinned.clone(),
            ..MatchHints::default()
        }
        .with_history(&session.answer_history())
    }

    async fn load_required(&self, context: &ContextId) -> Result<Session, EngineError> {
        self.store
            .load(context)
            .await?
            .ok_or_else(|| SessionError::NoSession(context.clone()).into())
    }

    async fn persist(&self, session: &Session) -> Result<(), EngineError> {
        self.table.persist(session, self.store.as_ref()).await?;
        Ok(())
    }
}
