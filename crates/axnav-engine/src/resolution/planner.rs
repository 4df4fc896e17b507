//! Turning a matched intent into an ordered list of steps.

use super::context::ResolutionContext;
use super::inference::infer_target;
use super::reidentify::signature_for;
use super::site::map_site_to_url;
use crate::matcher::{MatchCandidate, MatchHints, MatchOutcome, Matcher, TargetRequirement};
use axnav_common::protocol::{
    ActionKind, ExecutionStep, Intent, Node, NodeId, StepAction, TreeSnapshot,
};
use tracing::debug;

/// Confidence recorded for targets found by inference rules rather than scoring.
pub const INFERRED_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Ready(Vec<ExecutionStep>),
    /// The matcher could not single out a target; ask the user.
    Ambiguous(Vec<MatchCandidate>),
    /// The intent lacks a value only the user can supply.
    MissingValue(String),
    /// Nothing on this snapshot fits; a refreshed snapshot may help.
    Unmatched(String),
}

pub struct Planner<'m> {
    matcher: &'m Matcher,
}

impl<'m> Planner<'m> {
    pub fn new(matcher: &'m Matcher) -> Self {
        Self { matcher }
    }

    pub fn plan(&self, intent: &Intent, snapshot: &TreeSnapshot, hints: &MatchHints) -> PlanOutcome {
        let outcome = if intent.action.is_targetless() {
            plan_targetless(intent)
        } else if intent.action == ActionKind::Search && intent.is_form_search() {
            self.plan_search_form(intent, snapshot, hints)
        } else {
            self.plan_targeted(intent, snapshot, hints)
        };

        match outcome {
            PlanOutcome::Ready(steps) => PlanOutcome::Ready(number_steps(steps)),
            other => other,
        }
    }

    fn plan_targeted(&self, intent: &Intent, snapshot: &TreeSnapshot, hints: &MatchHints) -> PlanOutcome {
        let candidate = match self.matcher.match_intent(intent, snapshot, hints) {
            MatchOutcome::Confident(c) => c,
            MatchOutcome::Ambiguous(candidates) => return PlanOutcome::Ambiguous(candidates),
            MatchOutcome::Empty => {
                if intent.action == ActionKind::Submit
                    && let Some(step) = inferred_submit(snapshot, &[], false)
                {
                    return PlanOutcome::Ready(vec![step]);
                }
                return PlanOutcome::Unmatched(format!(
                    "no {} node matches {:?}",
                    intent.action, intent.target
                ));
            }
        };
        let Some(node) = snapshot.resolve(&candidate.node) else {
            return PlanOutcome::Unmatched(format!("candidate {} vanished", candidate.node));
        };

        let action = step_action_for(&intent.action);
        let value = intent
            .value
            .clone()
            .or_else(|| intent.query().map(str::to_string));

        let mut step = targeted_step(action, snapshot, node, &candidate);
        match intent.action {
            ActionKind::Input => {
                let Some(value) = value else {
                    return PlanOutcome::MissingValue(format!(
                        "What should I type into {}?",
                        describe(node)
                    ));
                };
                step.value = Some(value);
            }
            ActionKind::Search => {
                let Some(value) = value else {
                    return PlanOutcome::MissingValue("What should I search for?".to_string());
                };
                step.value = Some(value);
            }
            _ => step.value = value,
        }

        let mut steps = vec![step];
        let submits = matches!(intent.action, ActionKind::Search)
            || (intent.action == ActionKind::Input && intent.wants_submit());
        if submits
            && let Some(submit) = inferred_submit(snapshot, &[node.id.clone()], true)
        {
            steps.push(submit);
        }
        PlanOutcome::Ready(steps)
    }

    /// Origin, destination, date, then the search button, in that order.
    fn plan_search_form(
        &self,
        intent: &Intent,
        snapshot: &TreeSnapshot,
        hints: &MatchHints,
    ) -> PlanOutcome {
        let mut claimed: Vec<NodeId> = Vec::new();
        let mut steps = Vec::new();

        for (field, value) in [
            ("origin", intent.origin()),
            ("destination", intent.destination()),
        ] {
            let Some(value) = value else {
                continue;
            };
            let query = Intent::new(ActionKind::Input, field).with_value(value);
            let candidate = match self.match_unclaimed(&query, snapshot, hints, &claimed) {
                MatchOutcome::Confident(c) => c,
                MatchOutcome::Ambiguous(candidates) => return PlanOutcome::Ambiguous(candidates),
                MatchOutcome::Empty => {
                    return PlanOutcome::Unmatched(format!("no {field} field on the page"));
                }
            };
            let Some(node) = snapshot.resolve(&candidate.node) else {
                continue;
            };
            let mut step = targeted_step(StepAction::InputSelect, snapshot, node, &candidate);
            step.value = Some(value.to_string());
            claimed.push(node.id.clone());
            steps.push(step);
        }

        if let Some(date) = intent.date() {
            let cell = date_cell_query(date);
            match self.match_unclaimed(&cell, snapshot, hints, &claimed) {
                MatchOutcome::Confident(c) => {
                    if let Some(node) = snapshot.resolve(&c.node) {
                        let mut step = targeted_step(StepAction::Click, snapshot, node, &c);
                        step.value = Some(date.to_string());
                        claimed.push(node.id.clone());
                        steps.push(step);
                    }
                }
                MatchOutcome::Ambiguous(candidates) => return PlanOutcome::Ambiguous(candidates),
                MatchOutcome::Empty => {
                    // Calendar still closed: open it, pick the cell once it shows.
                    let opener = Intent::new(ActionKind::Click, "date");
                    let candidate = match self.match_unclaimed(&opener, snapshot, hints, &claimed) {
                        MatchOutcome::Confident(c) => c,
                        MatchOutcome::Ambiguous(candidates) => {
                            return PlanOutcome::Ambiguous(candidates);
                        }
                        MatchOutcome::Empty => {
                            return PlanOutcome::Unmatched("no date picker on the page".into());
                        }
                    };
                    if let Some(node) = snapshot.resolve(&candidate.node) {
                        steps.push(targeted_step(StepAction::Click, snapshot, node, &candidate));
                        claimed.push(node.id.clone());
                    }
                    steps.push(lookup_step(cell, date));
                }
            }
            if let Some(end) = intent.date_end() {
                steps.push(lookup_step(date_cell_query(end), end));
            }
        }

        match inferred_submit(snapshot, &claimed, false) {
            Some(submit) => steps.push(submit),
            None => return PlanOutcome::Unmatched("no search button on the page".into()),
        }

        debug!(steps = steps.len(), "planned search form");
        PlanOutcome::Ready(steps)
    }

    fn match_unclaimed(
        &self,
        intent: &Intent,
        snapshot: &TreeSnapshot,
        hints: &MatchHints,
        claimed: &[NodeId],
    ) -> MatchOutcome {
        let mut hints = hints.clone();
        hints.exclude.extend(claimed.iter().cloned());
        self.matcher.match_intent(intent, snapshot, &hints)
    }
}

/// Plans for actions that need no node.
pub fn plan_targetless(intent: &Intent) -> PlanOutcome {
    match intent.action {
        ActionKind::Navigate => {
            let url = [
                intent.url(),
                intent.value.as_deref(),
                intent.site(),
                Some(intent.target.as_str()),
            ]
            .into_iter()
            .flatten()
            .find_map(map_site_to_url);

            match url {
                Some(url) => {
                    let mut step = ExecutionStep::new("", StepAction::Navigate);
                    step.value = Some(url.to_string());
                    PlanOutcome::Ready(vec![step])
                }
                None => PlanOutcome::MissingValue("Which site should I open?".to_string()),
            }
        }
        ActionKind::Scroll => {
            let direction = intent
                .scroll_direction()
                .or(intent.value.as_deref())
                .unwrap_or("down")
                .to_lowercase();
            let mut step = ExecutionStep::new("", StepAction::Scroll);
            step.value = Some(direction);
            PlanOutcome::Ready(vec![step])
        }
        _ => PlanOutcome::Ready(vec![ExecutionStep::new("", StepAction::HistoryBack)]),
    }
}

fn step_action_for(action: &ActionKind) -> StepAction {
    match action {
        ActionKind::Input | ActionKind::Search => StepAction::Input,
        ActionKind::Select => StepAction::Select,
        ActionKind::Check => StepAction::Check,
        ActionKind::Read => StepAction::Read,
        ActionKind::Scroll => StepAction::Scroll,
        ActionKind::Navigate => StepAction::Navigate,
        ActionKind::Back => StepAction::HistoryBack,
        ActionKind::Click | ActionKind::Submit | ActionKind::Other(_) => StepAction::Click,
    }
}

fn targeted_step(
    action: StepAction,
    snapshot: &TreeSnapshot,
    node: &Node,
    candidate: &MatchCandidate,
) -> ExecutionStep {
    let mut step = ExecutionStep::new("", action);
    step.target = Some(candidate.node.clone());
    step.signature = Some(signature_for(snapshot, node));
    step.confidence = candidate.confidence;
    step.notes = Some(describe(node));
    step
}

fn lookup_step(lookup: Intent, date: &str) -> ExecutionStep {
    let mut step = ExecutionStep::new("", StepAction::Click);
    step.lookup = Some(lookup);
    step.value = Some(date.to_string());
    step.notes = Some(format!("date cell for {date}"));
    step
}

fn date_cell_query(date: &str) -> Intent {
    Intent::new(ActionKind::Select, "").with_entity("date", date)
}

/// A submit click found by the inference rules, excluding `claimed` nodes.
fn inferred_submit(snapshot: &TreeSnapshot, claimed: &[NodeId], optional: bool) -> Option<ExecutionStep> {
    let ctx = ResolutionContext::new(snapshot).with_claimed(claimed);
    let (rule, id) = infer_target(&ctx, TargetRequirement::Submittable)?;
    let node = snapshot.get(&id)?;

    let mut step = ExecutionStep::new("", StepAction::Click);
    step.target = Some(snapshot.node_ref(&id));
    step.signature = Some(signature_for(snapshot, node));
    step.confidence = INFERRED_CONFIDENCE;
    step.notes = Some(format!("{} (inferred by {rule})", describe(node)));
    step.optional = optional;
    Some(step)
}

fn number_steps(mut steps: Vec<ExecutionStep>) -> Vec<ExecutionStep> {
    for (i, step) in steps.iter_mut().enumerate() {
        step.step_id = (i + 1).to_string();
    }
    steps
}

/// `button "Search"`, or `the textbox` for unnamed nodes.
pub fn describe(node: &Node) -> String {
    let name = node.name.trim();
    if name.is_empty() {
        format!("the {}", node.role)
    } else {
        format!("{} {:?}", node.role, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;
    use axnav_common::protocol::{ContextId, PageContext};

    fn snapshot(nodes: Vec<Node>) -> TreeSnapshot {
        TreeSnapshot::new(PageContext::new(ContextId::new("tab")), nodes).with_id("s1")
    }

    fn plan(intent: &Intent, snap: &TreeSnapshot) -> PlanOutcome {
        let matcher = Matcher::new(MatcherConfig::default());
        Planner::new(&matcher).plan(intent, snap, &MatchHints::default())
    }

    fn ready(outcome: PlanOutcome) -> Vec<ExecutionStep> {
        match outcome {
            PlanOutcome::Ready(steps) => steps,
            other => panic!("expected a plan, got {:?}", other),
        }
    }

    #[test]
    fn test_origin_field_single_step() {
        let snap = snapshot(vec![
            Node::new("1", "textbox", "From"),
            Node::new("2", "textbox", "To"),
        ]);
        let intent = Intent::new(ActionKind::Input, "origin city field").with_value("Istanbul");
        let steps = ready(plan(&intent, &snap));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_id, "1");
        assert_eq!(steps[0].action_type, StepAction::Input);
        assert_eq!(steps[0].target, Some(snap.node_ref(&NodeId::new("1"))));
        assert_eq!(steps[0].value.as_deref(), Some("Istanbul"));
        assert_eq!(steps[0].signature.as_ref().map(|s| s.name.as_str()), Some("From"));
    }

    #[test]
    fn test_search_adds_optional_submit() {
        let snap = snapshot(vec![
            Node::new("1", "searchbox", "Search"),
            Node::new("2", "button", "Search"),
        ]);
        let intent = Intent::new(ActionKind::Search, "").with_entity("query", "rust async");
        let steps = ready(plan(&intent, &snap));
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].value.as_deref(), Some("rust async"));
        assert_eq!(steps[1].action_type, StepAction::Click);
        assert_eq!(steps[1].target, Some(snap.node_ref(&NodeId::new("2"))));
        assert!(steps[1].optional);
        assert!((steps[1].confidence - INFERRED_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn test_input_without_value_asks() {
        let snap = snapshot(vec![Node::new("1", "textbox", "Email")]);
        let intent = Intent::new(ActionKind::Input, "email");
        match plan(&intent, &snap) {
            PlanOutcome::MissingValue(question) => {
                assert_eq!(question, "What should I type into textbox \"Email\"?");
            }
            other => panic!("expected missing value, got {:?}", other),
        }
    }

    #[test]
    fn test_navigate_to_known_site() {
        let snap = snapshot(vec![]);
        let intent = Intent::new(ActionKind::Navigate, "").with_entity("site", "booking.com");
        let steps = ready(plan(&intent, &snap));
        assert_eq!(steps[0].action_type, StepAction::Navigate);
        assert_eq!(steps[0].value.as_deref(), Some("https://www.booking.com/"));
        assert!(steps[0].target.is_none());
    }

    #[test]
    fn test_navigate_without_site_asks() {
        let intent = Intent::new(ActionKind::Navigate, "");
        assert_eq!(
            plan_targetless(&intent),
            PlanOutcome::MissingValue("Which site should I open?".into())
        );
    }

    #[test]
    fn test_scroll_and_back() {
        let intent = Intent::new(ActionKind::Scroll, "").with_entity("scroll_direction", "Up");
        let steps = ready(plan_targetless(&intent));
        assert_eq!(steps[0].value.as_deref(), Some("up"));

        let steps = ready(plan_targetless(&Intent::new(ActionKind::Back, "")));
        assert_eq!(steps[0].action_type, StepAction::HistoryBack);
    }

    #[test]
    fn test_search_form_order() {
        let snap = snapshot(vec![
            Node::new("1", "textbox", "From"),
            Node::new("2", "textbox", "To"),
            Node::new("3", "button", "Check-in date"),
            Node::new("4", "button", "Search"),
        ]);
        let intent = Intent::new(ActionKind::Search, "flights")
            .with_entity("origin", "Istanbul")
            .with_entity("destination", "Berlin")
            .with_entity("date", "2026-03-14");
        let steps = ready(plan(&intent, &snap));

        let summary: Vec<_> = steps
            .iter()
            .map(|s| {
                (
                    s.action_type,
                    s.target.as_ref().map(|t| t.node.to_string()),
                    s.value.clone(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (StepAction::InputSelect, Some("1".into()), Some("Istanbul".into())),
                (StepAction::InputSelect, Some("2".into()), Some("Berlin".into())),
                (StepAction::Click, Some("3".into()), None),
                (StepAction::Click, None, Some("2026-03-14".into())),
                (StepAction::Click, Some("4".into()), None),
            ]
        );
        assert!(steps[3].awaits_target());
        let ids: Vec<_> = steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_search_form_picks_visible_date_cell() {
        let snap = snapshot(vec![
            Node::new("1", "combobox", "Where are you going?"),
            Node::new("2", "grid", "March 2026"),
            Node::new("3", "gridcell", "13").with_parent("2"),
            Node::new("4", "gridcell", "14").with_parent("2"),
            Node::new("5", "button", "Search"),
        ]);
        let intent = Intent::new(ActionKind::Search, "hotels")
            .with_entity("destination", "Paris")
            .with_entity("date", "2026-03-14");
        let steps = ready(plan(&intent, &snap));
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].target, Some(snap.node_ref(&NodeId::new("4"))));
        assert_eq!(steps[2].target, Some(snap.node_ref(&NodeId::new("5"))));
    }

    #[test]
    fn test_search_form_without_button_is_unmatched() {
        let snap = snapshot(vec![Node::new("1", "textbox", "From")]);
        let intent = Intent::new(ActionKind::Search, "").with_entity("origin", "Oslo");
        assert!(matches!(plan(&intent, &snap), PlanOutcome::Unmatched(_)));
    }

    #[test]
    fn test_submit_falls_back_to_inference() {
        let snap = snapshot(vec![
            Node::new("1", "textbox", "Name"),
            Node::new("2", "button", "Done"),
        ]);
        let intent = Intent::new(ActionKind::Submit, "the form");
        let steps = ready(plan(&intent, &snap));
        assert_eq!(steps[0].target, Some(snap.node_ref(&NodeId::new("2"))));
        assert!(steps[0].notes.as_deref().unwrap_or("").contains("keyword_button"));
    }

    #[test]
    fn test_ambiguity_is_passed_up() {
        let snap = snapshot(vec![
            Node::new("1", "button", "Delete"),
            Node::new("2", "button", "Delete"),
        ]);
        let intent = Intent::new(ActionKind::Click, "delete");
        assert!(matches!(plan(&intent, &snap), PlanOutcome::Ambiguous(c) if c.len() == 2));
    }
}
