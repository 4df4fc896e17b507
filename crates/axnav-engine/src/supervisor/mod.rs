//! Running a plan step by step on a live context.
//!
//! Steps run strictly in order. Each invocation is bounded by a timeout and
//! transient failures are retried within the configured budget. A step that
//! navigates suspends the session until the context is ready again; steps
//! that still point into an older snapshot are re-resolved before they run.
//! Cancellation is checked before each invocation and raced against every
//! wait.

pub mod cancel;
pub mod retry;

pub use cancel::{CancelReason, CancelToken};
pub use retry::RetryPolicy;

use crate::backend::{NavigationSignal, ProviderError, StepInvoker};
use crate::config::SupervisorConfig;
use crate::resolution::{MultiStepResolver, NoMatchReport};
use crate::session::{FailureCode, Session, SessionStatus, SessionStore, SessionTable};
use axnav_common::protocol::{ContextId, ExecutionResult, ExecutionStep, TreeSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

/// How one step's invocation ended.
#[derive(Debug)]
enum StepRun {
    Succeeded {
        navigated: bool,
        attempts: u32,
        duration_ms: u64,
    },
    Failed {
        error: ProviderError,
        attempts: u32,
        duration_ms: u64,
    },
    Cancelled {
        reason: CancelReason,
        attempts: u32,
        duration_ms: u64,
    },
}

/// Why a step could not be made ready to run.
#[derive(Debug)]
enum Halt {
    Cancelled(CancelReason),
    Unresolved(NoMatchReport),
}

pub struct ExecutionSupervisor {
    config: SupervisorConfig,
    retry: RetryPolicy,
    invoker: Arc<dyn StepInvoker>,
    navigation: Arc<dyn NavigationSignal>,
    resolver: Arc<MultiStepResolver>,
    store: Arc<dyn SessionStore>,
    table: Arc<SessionTable>,
}

impl ExecutionSupervisor {
    pub fn new(
        config: SupervisorConfig,
        invoker: Arc<dyn StepInvoker>,
        navigation: Arc<dyn NavigationSignal>,
        resolver: Arc<MultiStepResolver>,
        store: Arc<dyn SessionStore>,
        table: Arc<SessionTable>,
    ) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config),
            config,
            invoker,
            navigation,
            resolver,
            store,
            table,
        }
    }

    /// Drive `session` from its first unexecuted step until it completes,
    /// fails, or is cancelled.
    pub async fn run(&self, session: &mut Session, cancel: &CancelToken) {
        if !matches!(
            session.status,
            SessionStatus::Executing | SessionStatus::NavigatingResume
        ) {
            warn!(
                "Session {} is {}, nothing to execute",
                session.id, session.status
            );
            return;
        }

        let mut fresh: Option<TreeSnapshot> = None;
        if session.status == SessionStatus::NavigatingResume {
            match self.await_navigation(session, cancel).await {
                Ok(snapshot) => fresh = snapshot,
                Err((code, detail)) => {
                    self.abort(session, code, detail).await;
                    return;
                }
            }
        }

        while let Some(planned) = session.current_step().cloned() {
            if let Some(reason) = cancel.reason() {
                self.cancel_remaining(session, reason).await;
                return;
            }

            let (step_id, optional) = (planned.step_id.clone(), planned.optional);
            let step = match self.prepare(session, planned, fresh.take(), cancel).await {
                Ok(step) => step,
                Err(Halt::Cancelled(reason)) => {
                    self.cancel_remaining(session, reason).await;
                    return;
                }
                Err(Halt::Unresolved(report)) => {
                    let code = report
                        .last_error
                        .as_ref()
                        .filter(|_| report.is_provider_failure())
                        .map(ProviderError::code)
                        .unwrap_or("NODE_NOT_FOUND");
                    let detail = report.to_string();
                    let result = ExecutionResult::failed(&step_id, code, detail.clone(), 0, 0);
                    if !self.fail_step(session, result, optional, &detail).await {
                        return;
                    }
                    continue;
                }
            };

            info!(
                "Session {} step {} ({}) {}",
                session.id,
                step.step_id,
                step.action_type,
                step.notes.as_deref().unwrap_or("")
            );

            match self.invoke_with_retry(&session.context, &step, cancel).await {
                StepRun::Succeeded {
                    navigated,
                    attempts,
                    duration_ms,
                } => {
                    self.record(session, ExecutionResult::success(&step.step_id, duration_ms, attempts));
                    self.persist(session).await;

                    if navigated && session.current_step().is_some() {
                        match self.await_navigation(session, cancel).await {
                            Ok(snapshot) => fresh = snapshot,
                            Err((code, detail)) => {
                                self.abort(session, code, detail).await;
                                return;
                            }
                        }
                    }
                }
                StepRun::Failed {
                    error,
                    attempts,
                    duration_ms,
                } => {
                    let detail = format!("step {}: {}", step.step_id, error);
                    let result = ExecutionResult::failed(
                        &step.step_id,
                        error.code(),
                        error.to_string(),
                        duration_ms,
                        attempts,
                    );
                    if !self.fail_step(session, result, step.optional, &detail).await {
                        return;
                    }
                }
                StepRun::Cancelled {
                    reason,
                    attempts,
                    duration_ms,
                } => {
                    let code = cancel_code(reason);
                    if attempts > 0 {
                        self.record(
                            session,
                            ExecutionResult::failed(
                                &step.step_id,
                                code.as_str(),
                                "interrupted".into(),
                                duration_ms,
                                attempts,
                            ),
                        );
                    }
                    self.cancel_remaining(session, reason).await;
                    return;
                }
            }
        }

        match session.transition(SessionStatus::Completed) {
            Ok(()) => info!(
                "Session {} completed ({} steps)",
                session.id,
                session.results().len()
            ),
            Err(e) => warn!("Session {} could not complete: {}", session.id, e),
        }
        self.persist(session).await;
    }

    /// Make sure `step` points into a snapshot of the page as it is now.
    async fn prepare(
        &self,
        session: &mut Session,
        step: ExecutionStep,
        fresh: Option<TreeSnapshot>,
        cancel: &CancelToken,
    ) -> Result<ExecutionStep, Halt> {
        let stale = match &session.latest_snapshot {
            Some(latest) => step.is_stale_for(&latest.id),
            // Navigated and not captured since: every planned id is stale.
            None => step.target.is_some(),
        };
        if !stale && !step.awaits_target() {
            return Ok(step);
        }

        debug!(
            "Re-resolving step {} of session {} (stale: {})",
            step.step_id, session.id, stale
        );
        let resolved = tokio::select! {
            biased;
            reason = cancel.cancelled() => return Err(Halt::Cancelled(reason)),
            resolved = self.resolver.reresolve_step(&session.context, &step, fresh) => resolved,
        };

        let resolved = resolved.map_err(Halt::Unresolved)?;
        session.latest_snapshot = Some(resolved.snapshot.snapshot_ref());
        session.replace_step(resolved.step.clone());
        Ok(resolved.step)
    }

    async fn invoke_with_retry(
        &self,
        context: &ContextId,
        step: &ExecutionStep,
        cancel: &CancelToken,
    ) -> StepRun {
        let started = Instant::now();
        let limit = Duration::from_millis(step.timeout_ms.unwrap_or(self.config.step_timeout_ms));
        let elapsed = || started.elapsed().as_millis() as u64;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if let Some(reason) = cancel.reason() {
                return StepRun::Cancelled {
                    reason,
                    attempts: attempt - 1,
                    duration_ms: elapsed(),
                };
            }

            let result = tokio::select! {
                biased;
                reason = cancel.cancelled() => {
                    return StepRun::Cancelled {
                        reason,
                        attempts: attempt,
                        duration_ms: elapsed(),
                    };
                }
                result = timeout(limit, self.invoker.invoke(context, step)) => result,
            };

            let error = match result {
                Ok(Ok(outcome)) if outcome.success => {
                    return StepRun::Succeeded {
                        navigated: outcome.navigated,
                        attempts: attempt,
                        duration_ms: elapsed(),
                    };
                }
                Ok(Ok(outcome)) => ProviderError::Rejected(
                    outcome.message.unwrap_or_else(|| "step rejected".to_string()),
                ),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::timeout(format!("step {} after {:?}", step.step_id, limit)),
            };

            if !self.retry.should_retry(&error, attempt) {
                return StepRun::Failed {
                    error,
                    attempts: attempt,
                    duration_ms: elapsed(),
                };
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                "Step {} attempt {} failed ({}), retrying in {:?}",
                step.step_id, attempt, error, delay
            );
            tokio::select! {
                biased;
                reason = cancel.cancelled() => {
                    return StepRun::Cancelled {
                        reason,
                        attempts: attempt,
                        duration_ms: elapsed(),
                    };
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// Park the session until the context has finished navigating, then
    /// capture the page it landed on.
    async fn await_navigation(
        &self,
        session: &mut Session,
        cancel: &CancelToken,
    ) -> Result<Option<TreeSnapshot>, (FailureCode, String)> {
        // Whatever was captured before the navigation no longer describes
        // the page.
        session.latest_snapshot = None;
        if session.status != SessionStatus::NavigatingResume {
            session
                .transition(SessionStatus::NavigatingResume)
                .map_err(|e| (FailureCode::StepFailed, e.to_string()))?;
            self.persist(session).await;
        }
        info!("Session {} waiting for navigation on {}", session.id, session.context);

        let limit = Duration::from_millis(self.config.navigation_timeout_ms);
        tokio::select! {
            biased;
            reason = cancel.cancelled() => return Err((cancel_code(reason), cancel_detail(reason))),
            ready = timeout(limit, self.navigation.wait_ready(&session.context)) => match ready {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err((FailureCode::ProviderError, format!("navigation: {}", e)));
                }
                Err(_) => {
                    return Err((
                        FailureCode::ProviderError,
                        format!("navigation not ready after {:?}", limit),
                    ));
                }
            },
        }

        let captured = tokio::select! {
            biased;
            reason = cancel.cancelled() => return Err((cancel_code(reason), cancel_detail(reason))),
            captured = self.resolver.provider().capture(&session.context) => captured,
        };
        let fresh = match captured.and_then(|s| {
            s.validate()?;
            Ok(s)
        }) {
            Ok(snapshot) => {
                session.latest_snapshot = Some(snapshot.snapshot_ref());
                Some(snapshot)
            }
            Err(e) => {
                // latest_snapshot stays empty; the next targeted step
                // captures on its own.
                warn!("Capture after navigation failed on {}: {}", session.context, e);
                None
            }
        };

        session
            .transition(SessionStatus::Executing)
            .map_err(|e| (FailureCode::StepFailed, e.to_string()))?;
        self.persist(session).await;
        Ok(fresh)
    }

    /// Record a failed step. Returns whether the plan goes on.
    async fn fail_step(
        &self,
        session: &mut Session,
        result: ExecutionResult,
        optional: bool,
        detail: &str,
    ) -> bool {
        self.record(session, result);
        if optional {
            info!("Optional step failed in session {}: {}", session.id, detail);
            self.persist(session).await;
            return true;
        }
        self.abort(session, FailureCode::PlanFailed, detail.to_string())
            .await;
        false
    }

    async fn cancel_remaining(&self, session: &mut Session, reason: CancelReason) {
        info!("Session {} {}", session.id, cancel_detail(reason));
        self.abort(session, cancel_code(reason), cancel_detail(reason))
            .await;
    }

    /// Skip whatever is left and fail the session.
    pub async fn abort(&self, session: &mut Session, code: FailureCode, detail: String) {
        let skip = match code {
            FailureCode::Cancelled | FailureCode::Superseded => code.as_str(),
            _ => "plan failed",
        };
        let remaining: Vec<String> = session
            .remaining_steps()
            .iter()
            .map(|s| s.step_id.clone())
            .collect();
        for step_id in remaining {
            self.record(session, ExecutionResult::skipped(&step_id, skip));
        }

        if let Err(e) = session.fail(code, detail) {
            warn!("Session {} could not be failed: {}", session.id, e);
        }
        self.persist(session).await;
    }

    fn record(&self, session: &mut Session, result: ExecutionResult) {
        if let Err(e) = session.record(result) {
            warn!("Session {}: {}", session.id, e);
        }
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.table.persist(session, self.store.as_ref()).await {
            warn!("Failed to persist session {}: {}", session.id, e);
        }
    }
}

pub(crate) fn cancel_code(reason: CancelReason) -> FailureCode {
    match reason {
        CancelReason::Cancelled => FailureCode::Cancelled,
        CancelReason::Superseded => FailureCode::Superseded,
    }
}

pub(crate) fn cancel_detail(reason: CancelReason) -> String {
    match reason {
        CancelReason::Cancelled => "cancelled by request".to_string(),
        CancelReason::Superseded => "superseded by a newer session".to_string(),
    }
}
