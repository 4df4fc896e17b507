//! Resolving an intent into a plan against live snapshots.
//!
//! Matching runs on the current snapshot first. When nothing fits, the
//! provider is asked for passive refreshes in escalating order until a match
//! appears or the attempt budget runs out. Ambiguity is never retried: it
//! goes to the user.

use super::planner::{PlanOutcome, Planner};
use super::reidentify::{ReidentifyError, reidentify, signature_for};
use crate::backend::{ProviderError, SnapshotProvider};
use crate::clarification::ClarificationGenerator;
use crate::config::{MatcherConfig, ResolverConfig};
use crate::matcher::{MatchHints, MatchOutcome, Matcher};
use axnav_common::protocol::{
    ClarificationRequest, ContextId, ExecutionPlan, ExecutionStep, Intent, Node, PageContext,
    ProbeHint, TreeSnapshot,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    pub plan: ExecutionPlan,
    /// The snapshot the plan's node references belong to.
    pub snapshot: TreeSnapshot,
}

#[derive(Debug, Clone)]
pub struct Clarification {
    pub request: ClarificationRequest,
    /// The snapshot the options were drawn from.
    pub snapshot: TreeSnapshot,
}

/// Why resolution gave up after exhausting its refresh budget.
#[derive(Debug, Clone, PartialEq)]
pub struct NoMatchReport {
    /// Intent id, or step id when a single step was being re-resolved.
    pub subject: String,
    pub attempts: u32,
    pub probes: Vec<ProbeHint>,
    pub last_error: Option<ProviderError>,
    pub detail: String,
}

impl NoMatchReport {
    /// True when every attempt failed at the provider rather than in matching.
    pub fn is_provider_failure(&self) -> bool {
        self.last_error.is_some() && self.detail.is_empty()
    }
}

impl fmt::Display for NoMatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = if self.detail.is_empty() {
            "nothing matched"
        } else {
            self.detail.as_str()
        };
        write!(f, "{} after {} attempt(s)", detail, self.attempts)?;
        if let Some(err) = &self.last_error {
            write!(f, " (last provider error: {})", err)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Plan(ResolvedPlan),
    Clarify(Clarification),
    NoMatch(NoMatchReport),
}

/// A step pointed at a node of `snapshot`.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub step: ExecutionStep,
    pub snapshot: TreeSnapshot,
}

pub struct MultiStepResolver {
    matcher: Matcher,
    clarifier: ClarificationGenerator,
    config: ResolverConfig,
    provider: Arc<dyn SnapshotProvider>,
}

impl MultiStepResolver {
    pub fn new(
        matcher_config: MatcherConfig,
        config: ResolverConfig,
        provider: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self {
            clarifier: ClarificationGenerator::new(&matcher_config),
            matcher: Matcher::new(matcher_config),
            config,
            provider,
        }
    }

    pub fn clarifier(&self) -> &ClarificationGenerator {
        &self.clarifier
    }

    pub fn provider(&self) -> &Arc<dyn SnapshotProvider> {
        &self.provider
    }

    /// Resolve `intent` on `context` into a plan, a question, or a no-match.
    pub async fn resolve(&self, context: &ContextId, intent: &Intent, hints: &MatchHints) -> Resolution {
        if intent.action.is_targetless() {
            let snapshot = match self.provider.capture(context).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Capture failed before {} on {}: {}", intent.action, context, e);
                    TreeSnapshot::new(PageContext::new(context.clone()), Vec::new())
                }
            };
            return self
                .resolve_snapshot(intent, &snapshot, hints)
                .unwrap_or_else(|detail| {
                    Resolution::NoMatch(NoMatchReport {
                        subject: intent.id.clone(),
                        attempts: 1,
                        probes: Vec::new(),
                        last_error: None,
                        detail,
                    })
                });
        }

        let mut report = NoMatchReport {
            subject: intent.id.clone(),
            attempts: 0,
            probes: Vec::new(),
            last_error: None,
            detail: String::new(),
        };

        for attempt in 0..=self.config.max_refresh_attempts {
            let snapshot = match self.snapshot_for_attempt(context, attempt, &mut report).await {
                Some(snapshot) => snapshot,
                None => continue,
            };

            match self.resolve_snapshot(intent, &snapshot, hints) {
                Ok(resolution) => {
                    info!(
                        "Resolved intent {} on {} after {} attempt(s)",
                        intent.id, context, report.attempts
                    );
                    return resolution;
                }
                Err(detail) => {
                    debug!(attempt, "{}", detail);
                    report.detail = detail;
                }
            }
        }

        info!("No match for intent {} on {}: {}", intent.id, context, report);
        Resolution::NoMatch(report)
    }

    /// Resolve against one snapshot. `Err` carries why nothing matched.
    pub fn resolve_snapshot(
        &self,
        intent: &Intent,
        snapshot: &TreeSnapshot,
        hints: &MatchHints,
    ) -> Result<Resolution, String> {
        match Planner::new(&self.matcher).plan(intent, snapshot, hints) {
            PlanOutcome::Ready(steps) => Ok(Resolution::Plan(ResolvedPlan {
                plan: ExecutionPlan::new(&intent.id, snapshot.id.clone(), steps),
                snapshot: snapshot.clone(),
            })),
            PlanOutcome::Ambiguous(candidates) => Ok(Resolution::Clarify(Clarification {
                request: self.clarifier.from_candidates(intent, snapshot, &candidates),
                snapshot: snapshot.clone(),
            })),
            PlanOutcome::MissingValue(question) => Ok(Resolution::Clarify(Clarification {
                request: self.clarifier.missing_value(intent, question),
                snapshot: snapshot.clone(),
            })),
            PlanOutcome::Unmatched(detail) => Err(detail),
        }
    }

    /// Point a step at a node of a fresh snapshot.
    ///
    /// `first` is used as the initial snapshot when the caller already holds
    /// one; otherwise a capture is taken. Steps with a signature are found
    /// again by role and name, deferred lookups by matching their query.
    pub async fn reresolve_step(
        &self,
        context: &ContextId,
        step: &ExecutionStep,
        first: Option<TreeSnapshot>,
    ) -> Result<ResolvedStep, NoMatchReport> {
        let mut report = NoMatchReport {
            subject: step.step_id.clone(),
            attempts: 0,
            probes: Vec::new(),
            last_error: None,
            detail: String::new(),
        };
        let mut first = first;

        for attempt in 0..=self.config.max_refresh_attempts {
            let snapshot = match first.take() {
                Some(snapshot) => {
                    report.attempts += 1;
                    snapshot
                }
                None => match self.snapshot_for_attempt(context, attempt, &mut report).await {
                    Some(snapshot) => snapshot,
                    None => continue,
                },
            };

            match self.retarget(step, &snapshot) {
                Ok(Some(step)) => {
                    debug!(
                        "Step {} re-resolved to {} on snapshot {}",
                        step.step_id,
                        step.target.as_ref().map(|t| t.node.to_string()).unwrap_or_default(),
                        snapshot.id
                    );
                    return Ok(ResolvedStep { step, snapshot });
                }
                Ok(None) => {
                    report.detail = format!("step {} target not found", step.step_id);
                }
                Err(e) => {
                    report.detail = e.to_string();
                    return Err(report);
                }
            }
        }

        Err(report)
    }

    fn retarget(
        &self,
        step: &ExecutionStep,
        snapshot: &TreeSnapshot,
    ) -> Result<Option<ExecutionStep>, ReidentifyError> {
        if let Some(signature) = &step.signature {
            match reidentify(snapshot, signature) {
                Ok(node) => return Ok(Some(rebind(step, snapshot, node, step.confidence))),
                Err(e @ ReidentifyError::Ambiguous { .. }) => return Err(e),
                Err(ReidentifyError::NotFound { .. }) => {}
            }
        }

        let query = step.lookup.clone().or_else(|| {
            step.signature
                .as_ref()
                .map(|sig| Intent::new(step.action_type.intent_action(), &sig.name))
        });
        let Some(query) = query else {
            return Ok(None);
        };

        match self.matcher.match_intent(&query, snapshot, &MatchHints::default()) {
            MatchOutcome::Confident(candidate) => Ok(snapshot
                .resolve(&candidate.node)
                .map(|node| rebind(step, snapshot, node, candidate.confidence))),
            _ => Ok(None),
        }
    }

    /// Attempt 0 captures; later attempts probe in the configured order,
    /// repeating the last hint once the list runs out.
    async fn snapshot_for_attempt(
        &self,
        context: &ContextId,
        attempt: u32,
        report: &mut NoMatchReport,
    ) -> Option<TreeSnapshot> {
        report.attempts += 1;

        let result = if attempt == 0 {
            self.provider.capture(context).await
        } else {
            let index = (attempt as usize - 1).min(self.config.probe_order.len().saturating_sub(1));
            let hint = self.config.probe_order.get(index).copied()?;
            debug!("Probing {} with {}", context, hint.as_str());
            report.probes.push(hint);
            self.provider.probe(context, hint).await
        };

        match result.and_then(|snapshot| {
            snapshot.validate()?;
            Ok(snapshot)
        }) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Snapshot attempt {} on {} failed: {}", report.attempts, context, e);
                report.last_error = Some(e);
                None
            }
        }
    }
}

fn rebind(step: &ExecutionStep, snapshot: &TreeSnapshot, node: &Node, confidence: f64) -> ExecutionStep {
    let mut step = step.clone();
    step.target = Some(snapshot.node_ref(&node.id));
    step.signature = Some(signature_for(snapshot, node));
    step.confidence = confidence;
    step
}
