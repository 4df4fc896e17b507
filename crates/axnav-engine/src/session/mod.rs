//! The unit of work: one intent on one browsing context, from resolution
//! through execution.

pub mod store;
pub mod table;

pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError};
pub use table::{Claim, SessionTable, StartPolicy};

use axnav_common::protocol::{
    ClarificationAnswer, ClarificationExchange, ClarificationRequest, ContextId, ExecutionPlan,
    ExecutionResult, ExecutionStep, Intent, NodeRef, SnapshotRef, StepStatus, TreeSnapshot,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Resolving,
    Executing,
    AwaitingClarification,
    NavigatingResume,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Resolving => "resolving",
            SessionStatus::Executing => "executing",
            SessionStatus::AwaitingClarification => "awaiting_clarification",
            SessionStatus::NavigatingResume => "navigating_resume",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Allowed edges of the session lifecycle. Any live state may fail.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Resolving, Executing | AwaitingClarification) => true,
            (AwaitingClarification, Resolving) => true,
            (Executing, NavigatingResume | Completed) => true,
            (NavigatingResume, Executing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    NoMatch,
    StepFailed,
    PlanFailed,
    Cancelled,
    Superseded,
    ProviderError,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::NoMatch => "no_match",
            FailureCode::StepFailed => "step_failed",
            FailureCode::PlanFailed => "plan_failed",
            FailureCode::Cancelled => "cancelled",
            FailureCode::Superseded => "superseded",
            FailureCode::ProviderError => "provider_error",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub code: FailureCode,
    pub detail: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("context {context} already has an active session ({status})")]
    SessionActive {
        context: ContextId,
        status: SessionStatus,
    },

    #[error("no session for context {0}")]
    NoSession(ContextId),

    #[error("session is {0}, not awaiting clarification")]
    NotAwaitingClarification(SessionStatus),

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("step {0} already has a result")]
    DuplicateResult(String),

    #[error("invalid clarification answer: {0}")]
    InvalidAnswer(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub context: ContextId,
    pub intent: Intent,
    #[serde(default)]
    pub latest_snapshot: Option<SnapshotRef>,
    #[serde(default)]
    pub plan: Option<ExecutionPlan>,
    /// Index of the first step without a result.
    #[serde(default)]
    pub next_step: usize,
    #[serde(default)]
    results: Vec<ExecutionResult>,
    #[serde(default)]
    pub pending_clarification: Option<ClarificationRequest>,
    /// The snapshot the pending question was asked about.
    #[serde(default)]
    pub pending_snapshot: Option<TreeSnapshot>,
    /// Nodes the user picked in earlier rounds.
    #[serde(default)]
    pub pinned: Vec<NodeRef>,
    #[serde(default)]
    pub clarification_history: Vec<ClarificationExchange>,
    pub status: SessionStatus,
    #[serde(default)]
    pub failure: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(context: ContextId, intent: Intent) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            context,
            intent,
            latest_snapshot: None,
            plan: None,
            next_step: 0,
            results: Vec::new(),
            pending_clarification: None,
            pending_snapshot: None,
            pinned: Vec::new(),
            clarification_history: Vec::new(),
            status: SessionStatus::Resolving,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn transition(&mut self, next: SessionStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn fail(&mut self, code: FailureCode, detail: impl Into<String>) -> Result<(), SessionError> {
        self.transition(SessionStatus::Failed)?;
        self.failure = Some(FailureReason {
            code,
            detail: detail.into(),
        });
        self.pending_clarification = None;
        self.pending_snapshot = None;
        Ok(())
    }

    /// Install a freshly resolved plan and start executing it.
    pub fn start_plan(&mut self, plan: ExecutionPlan, snapshot: SnapshotRef) -> Result<(), SessionError> {
        self.transition(SessionStatus::Executing)?;
        self.plan = Some(plan);
        self.latest_snapshot = Some(snapshot);
        self.next_step = 0;
        self.results.clear();
        self.pending_clarification = None;
        self.pending_snapshot = None;
        Ok(())
    }

    pub fn await_clarification(
        &mut self,
        request: ClarificationRequest,
        snapshot: TreeSnapshot,
    ) -> Result<(), SessionError> {
        self.transition(SessionStatus::AwaitingClarification)?;
        self.latest_snapshot = Some(snapshot.snapshot_ref());
        self.pending_clarification = Some(request);
        self.pending_snapshot = Some(snapshot);
        Ok(())
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    /// Append a step result. Each planned step gets exactly one.
    pub fn record(&mut self, result: ExecutionResult) -> Result<(), SessionError> {
        if self.results.iter().any(|r| r.step_id == result.step_id) {
            return Err(SessionError::DuplicateResult(result.step_id));
        }
        self.results.push(result);
        self.next_step = self.results.len();
        self.touch();
        Ok(())
    }

    pub fn current_step(&self) -> Option<&ExecutionStep> {
        self.plan.as_ref()?.steps.get(self.next_step)
    }

    pub fn remaining_steps(&self) -> &[ExecutionStep] {
        match &self.plan {
            Some(plan) => plan.steps.get(self.next_step..).unwrap_or(&[]),
            None => &[],
        }
    }

    /// Swap in a re-resolved version of a planned step.
    pub fn replace_step(&mut self, step: ExecutionStep) {
        if let Some(plan) = self.plan.as_mut()
            && let Some(slot) = plan.steps.iter_mut().find(|s| s.step_id == step.step_id)
        {
            *slot = step;
            self.touch();
        }
    }

    /// Free-text traces of earlier answers, used as matching hints.
    pub fn answer_history(&self) -> Vec<String> {
        self.clarification_history
            .iter()
            .filter_map(|exchange| match (&exchange.chosen_label, &exchange.answer) {
                (Some(label), _) => Some(label.clone()),
                (None, ClarificationAnswer::Text { text }) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.status != StepStatus::Failed)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axnav_common::protocol::{ActionKind, SnapshotId, StepAction};

    fn session_with_plan() -> Session {
        let mut session = Session::new(ContextId::new("tab"), Intent::new(ActionKind::Click, "go"));
        let plan = ExecutionPlan::new(
            "i1",
            SnapshotId::new("s1"),
            vec![
                ExecutionStep::new("1", StepAction::Click),
                ExecutionStep::new("2", StepAction::Click),
            ],
        );
        let snapshot = SnapshotRef {
            id: SnapshotId::new("s1"),
            captured_at: Utc::now(),
            url: None,
        };
        session.start_plan(plan, snapshot).unwrap();
        session
    }

    #[test]
    fn test_lifecycle_edges() {
        use SessionStatus::*;
        assert!(Resolving.can_transition_to(Executing));
        assert!(Resolving.can_transition_to(AwaitingClarification));
        assert!(AwaitingClarification.can_transition_to(Resolving));
        assert!(Executing.can_transition_to(NavigatingResume));
        assert!(NavigatingResume.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Failed));
        assert!(!Resolving.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Resolving));
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut session = Session::new(ContextId::new("tab"), Intent::new(ActionKind::Click, "go"));
        let err = session.transition(SessionStatus::Completed).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: SessionStatus::Resolving,
                to: SessionStatus::Completed
            }
        );
        assert_eq!(session.status, SessionStatus::Resolving);
    }

    #[test]
    fn test_results_are_append_only() {
        let mut session = session_with_plan();
        session.record(ExecutionResult::success("1", 5, 1)).unwrap();
        assert_eq!(session.next_step, 1);
        assert_eq!(session.current_step().unwrap().step_id, "2");

        let err = session
            .record(ExecutionResult::failed("1", "timeout", "late".into(), 5, 3))
            .unwrap_err();
        assert_eq!(err, SessionError::DuplicateResult("1".into()));
        assert_eq!(session.results().len(), 1);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut session = session_with_plan();
        session.fail(FailureCode::Cancelled, "user asked").unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failure.as_ref().unwrap().code.as_str(), "cancelled");
        assert!(session.fail(FailureCode::Cancelled, "again").is_err());
    }

    #[test]
    fn test_session_round_trips_through_json() {
        let mut session = session_with_plan();
        session.record(ExecutionResult::success("1", 5, 1)).unwrap();
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.results().len(), 1);
        assert_eq!(back.next_step, 1);
        assert_eq!(back.status, SessionStatus::Executing);
    }
}
