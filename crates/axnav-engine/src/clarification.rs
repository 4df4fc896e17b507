//! Turning ambiguity into a question, and answers back into resolution input.

use crate::config::MatcherConfig;
use crate::matcher::MatchCandidate;
use crate::resolution::planner::describe;
use crate::session::SessionError;
use axnav_common::protocol::{
    ClarificationAnswer, ClarificationOption, ClarificationReason, ClarificationRequest, Intent,
    NodeRef, TreeSnapshot,
};
use axnav_common::text::{content_tokens, parse_ordinal};
use std::collections::HashMap;
use tracing::debug;

/// What an answer means for the pending resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// The user picked a node from the offered options.
    Pin { node: NodeRef, label: String },
    /// The answer narrows the target; resolve again with this intent.
    Refine { intent: Intent },
    /// The answer supplies a missing value.
    Fill { intent: Intent },
}

pub struct ClarificationGenerator {
    max_options: usize,
    accept_threshold: f64,
}

impl ClarificationGenerator {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            max_options: config.max_options,
            accept_threshold: config.accept_threshold,
        }
    }

    /// Ask the user to choose among ranked candidates (best first).
    pub fn from_candidates(
        &self,
        intent: &Intent,
        snapshot: &TreeSnapshot,
        candidates: &[MatchCandidate],
    ) -> ClarificationRequest {
        let shown = &candidates[..candidates.len().min(self.max_options)];

        let reason = match shown {
            [_] => ClarificationReason::SingleWeakCandidate,
            [top, ..] if top.confidence < self.accept_threshold => ClarificationReason::LowConfidence,
            _ => ClarificationReason::MultipleEqualTargets,
        };

        let mut labels: Vec<String> = shown
            .iter()
            .map(|c| option_label(snapshot, &c.node))
            .collect();
        disambiguate(&mut labels);

        let options = shown
            .iter()
            .zip(labels)
            .map(|(c, label)| ClarificationOption {
                label,
                candidate_node_ids: vec![c.node.clone()],
            })
            .collect();

        let target = intent.target.trim();
        let question = if target.is_empty() {
            "Which one did you mean?".to_string()
        } else {
            format!("Which {} did you mean?", target)
        };

        let mut request = ClarificationRequest::new(question, reason, options);
        request.trace_id = intent.trace_id.clone();
        debug!(
            reason = reason.as_str(),
            options = request.options.len(),
            "built clarification for intent {}",
            intent.id
        );
        request
    }

    /// Ask for a value the intent did not carry.
    pub fn missing_value(&self, intent: &Intent, question: impl Into<String>) -> ClarificationRequest {
        let mut request = ClarificationRequest::new(question, ClarificationReason::MissingValue, Vec::new());
        request.trace_id = intent.trace_id.clone();
        request
    }

    /// Read an answer against the request it replies to.
    pub fn interpret(
        &self,
        request: &ClarificationRequest,
        answer: &ClarificationAnswer,
        intent: &Intent,
    ) -> Result<Interpretation, SessionError> {
        match answer {
            ClarificationAnswer::Option { index } => {
                let option = request.options.get(*index).ok_or_else(|| {
                    SessionError::InvalidAnswer(format!(
                        "option #{} not offered ({} options)",
                        index + 1,
                        request.options.len()
                    ))
                })?;
                pin_option(option)
            }
            ClarificationAnswer::Candidate { node } => {
                let option = request
                    .options
                    .iter()
                    .find(|o| o.candidate_node_ids.contains(node))
                    .ok_or_else(|| SessionError::InvalidAnswer(format!("{} was not offered", node)))?;
                Ok(Interpretation::Pin {
                    node: node.clone(),
                    label: option.label.clone(),
                })
            }
            ClarificationAnswer::Text { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(SessionError::InvalidAnswer("empty answer".into()));
                }

                if request.reason == ClarificationReason::MissingValue {
                    let mut filled = intent.clone();
                    filled.value = Some(text.to_string());
                    return Ok(Interpretation::Fill { intent: filled });
                }

                if let Some(index) = parse_ordinal(text).and_then(|p| p.index_in(request.options.len())) {
                    return pin_option(&request.options[index]);
                }

                if let Some(option) = best_label_match(&request.options, text) {
                    return pin_option(option);
                }

                Ok(Interpretation::Refine {
                    intent: intent.refined(text),
                })
            }
        }
    }
}

fn pin_option(option: &ClarificationOption) -> Result<Interpretation, SessionError> {
    let node = option
        .candidate_node_ids
        .first()
        .ok_or_else(|| SessionError::InvalidAnswer(format!("option {:?} has no candidate", option.label)))?;
    Ok(Interpretation::Pin {
        node: node.clone(),
        label: option.label.clone(),
    })
}

/// The one option whose label shares the most words with `text`, if unique.
fn best_label_match<'a>(options: &'a [ClarificationOption], text: &str) -> Option<&'a ClarificationOption> {
    let wanted = content_tokens(text);
    if wanted.is_empty() {
        return None;
    }

    let scores: Vec<usize> = options
        .iter()
        .map(|o| {
            let label = content_tokens(&o.label);
            wanted.iter().filter(|t| label.contains(t)).count()
        })
        .collect();

    let best = *scores.iter().max()?;
    if best == 0 || scores.iter().filter(|s| **s == best).count() > 1 {
        return None;
    }
    scores
        .iter()
        .position(|s| *s == best)
        .and_then(|i| options.get(i))
}

/// `button "Delete" (published post)`, or `... in "Row 2"` from the parent.
fn option_label(snapshot: &TreeSnapshot, node_ref: &NodeRef) -> String {
    let Some(node) = snapshot.resolve(node_ref) else {
        return node_ref.node.to_string();
    };
    let base = describe(node);

    if let Some(description) = node.description.as_deref().map(str::trim)
        && !description.is_empty()
    {
        return format!("{base} ({description})");
    }
    if let Some(parent) = snapshot.parent_of(node)
        && !parent.name.trim().is_empty()
    {
        return format!("{base} in {:?}", parent.name.trim());
    }
    base
}

/// Number labels that are still identical: `(#1)`, `(#2)`, ...
fn disambiguate(labels: &mut [String]) {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for label in labels.iter() {
        *totals.entry(label.clone()).or_default() += 1;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for label in labels.iter_mut() {
        if totals.get(label.as_str()).copied().unwrap_or(0) > 1 {
            let k = seen.entry(label.clone()).or_default();
            *k += 1;
            label.push_str(&format!(" (#{k})"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axnav_common::protocol::{ActionKind, ContextId, Node, NodeId, PageContext};

    fn snapshot() -> TreeSnapshot {
        TreeSnapshot::new(
            PageContext::new(ContextId::new("tab")),
            vec![
                Node::new("1", "row", "Draft"),
                Node::new("2", "button", "Delete").with_parent("1"),
                Node::new("3", "row", "Published"),
                Node::new("4", "button", "Delete").with_parent("3"),
                Node::new("5", "button", "Delete"),
                Node::new("6", "button", "Delete"),
            ],
        )
        .with_id("s")
    }

    fn candidate(snap: &TreeSnapshot, id: &str, confidence: f64) -> MatchCandidate {
        MatchCandidate {
            node: snap.node_ref(&NodeId::new(id)),
            confidence,
            rationale: Vec::new(),
        }
    }

    fn generator() -> ClarificationGenerator {
        ClarificationGenerator::new(&MatcherConfig::default())
    }

    fn delete_request(snap: &TreeSnapshot) -> ClarificationRequest {
        let candidates = vec![candidate(snap, "2", 0.9), candidate(snap, "4", 0.9)];
        generator().from_candidates(&Intent::new(ActionKind::Click, "delete"), snap, &candidates)
    }

    #[test]
    fn test_labels_use_parent_names() {
        let snap = snapshot();
        let request = delete_request(&snap);
        assert_eq!(request.question, "Which delete did you mean?");
        assert_eq!(request.reason, ClarificationReason::MultipleEqualTargets);
        let labels: Vec<_> = request.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["button \"Delete\" in \"Draft\"", "button \"Delete\" in \"Published\""]
        );
        assert_eq!(request.options[1].candidate_node_ids, vec![snap.node_ref(&NodeId::new("4"))]);
    }

    #[test]
    fn test_colliding_labels_are_numbered() {
        let snap = snapshot();
        let candidates = vec![candidate(&snap, "5", 0.3), candidate(&snap, "6", 0.3)];
        let request =
            generator().from_candidates(&Intent::new(ActionKind::Click, "delete"), &snap, &candidates);
        assert_eq!(request.reason, ClarificationReason::LowConfidence);
        assert_eq!(request.options[0].label, "button \"Delete\" (#1)");
        assert_eq!(request.options[1].label, "button \"Delete\" (#2)");
    }

    #[test]
    fn test_options_are_capped() {
        let snap = snapshot();
        let candidates: Vec<_> = ["2", "4", "5", "6"]
            .iter()
            .map(|id| candidate(&snap, id, 0.9))
            .collect();
        let config = MatcherConfig {
            max_options: 2,
            ..MatcherConfig::default()
        };
        let request = ClarificationGenerator::new(&config).from_candidates(
            &Intent::new(ActionKind::Click, "delete"),
            &snap,
            &candidates,
        );
        assert_eq!(request.options.len(), 2);
    }

    #[test]
    fn test_single_weak_candidate_reason() {
        let snap = snapshot();
        let request = generator().from_candidates(
            &Intent::new(ActionKind::Click, "remove"),
            &snap,
            &[candidate(&snap, "2", 0.3)],
        );
        assert_eq!(request.reason, ClarificationReason::SingleWeakCandidate);
    }

    #[test]
    fn test_option_and_candidate_answers_pin() {
        let snap = snapshot();
        let request = delete_request(&snap);
        let intent = Intent::new(ActionKind::Click, "delete");

        let pinned = generator()
            .interpret(&request, &ClarificationAnswer::Option { index: 1 }, &intent)
            .unwrap();
        assert!(matches!(pinned, Interpretation::Pin { node, .. } if node.node == NodeId::new("4")));

        let node = snap.node_ref(&NodeId::new("2"));
        let pinned = generator()
            .interpret(&request, &ClarificationAnswer::Candidate { node: node.clone() }, &intent)
            .unwrap();
        assert!(matches!(pinned, Interpretation::Pin { node: n, .. } if n == node));
    }

    #[test]
    fn test_answers_outside_the_options_are_rejected() {
        let snap = snapshot();
        let request = delete_request(&snap);
        let intent = Intent::new(ActionKind::Click, "delete");

        assert!(generator()
            .interpret(&request, &ClarificationAnswer::Option { index: 7 }, &intent)
            .is_err());
        let stray = snap.node_ref(&NodeId::new("6"));
        assert!(generator()
            .interpret(&request, &ClarificationAnswer::Candidate { node: stray }, &intent)
            .is_err());
        assert!(generator()
            .interpret(&request, &ClarificationAnswer::Text { text: "  ".into() }, &intent)
            .is_err());
    }

    #[test]
    fn test_text_answers() {
        let snap = snapshot();
        let request = delete_request(&snap);
        let intent = Intent::new(ActionKind::Click, "delete");
        let text = |t: &str| ClarificationAnswer::Text { text: t.into() };

        let by_ordinal = generator().interpret(&request, &text("the second one"), &intent).unwrap();
        assert!(matches!(by_ordinal, Interpretation::Pin { node, .. } if node.node == NodeId::new("4")));

        let by_label = generator().interpret(&request, &text("the draft"), &intent).unwrap();
        assert!(matches!(by_label, Interpretation::Pin { node, .. } if node.node == NodeId::new("2")));

        match generator().interpret(&request, &text("archived"), &intent).unwrap() {
            Interpretation::Refine { intent } => assert_eq!(intent.target, "delete archived"),
            other => panic!("expected refine, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_value_answer_fills_intent() {
        let intent = Intent::new(ActionKind::Input, "email");
        let request = generator().missing_value(&intent, "What should I type?");
        match generator()
            .interpret(&request, &ClarificationAnswer::Text { text: "me@example.org".into() }, &intent)
            .unwrap()
        {
            Interpretation::Fill { intent } => assert_eq!(intent.value.as_deref(), Some("me@example.org")),
            other => panic!("expected fill, got {:?}", other),
        }
    }
}
