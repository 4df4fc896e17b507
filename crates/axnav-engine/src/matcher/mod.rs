//! Deterministic candidate matching of an intent against one tree snapshot.
//!
//! Every node that satisfies the action's [`TargetRequirement`] is scored
//! (labels may speak for the control they name), candidates are ranked, and
//! the ranking is classified as confident, ambiguous, or empty.

pub mod dates;
pub mod requirement;
pub mod scoring;
pub mod synonyms;

pub use requirement::TargetRequirement;
pub use scoring::Query;

use crate::config::MatcherConfig;
use crate::resolution::association::find_associated_control;
use axnav_common::protocol::{Intent, Node, NodeId, NodeRef, Position, TreeSnapshot};
use axnav_common::text::content_tokens;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Why a candidate earned its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    RoleCompatible,
    ExactName,
    ExactDescription,
    ExactValue,
    Substring,
    TokenOverlap { matched: usize, total: usize },
    Synonym { token: String },
    AttributeHint { attribute: String },
    EntityHint { entity: String },
    HistoryHint,
    AssociatedLabel { label: NodeId },
    ClarifiedByUser,
    OrdinalSelection { position: Position },
    DisabledPenalty,
    NotFocusablePenalty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub node: NodeRef,
    pub confidence: f64,
    pub rationale: Vec<Signal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Confident(MatchCandidate),
    /// Every candidate at or above the floor, best first.
    Ambiguous(Vec<MatchCandidate>),
    Empty,
}

/// Extra context gathered by earlier clarification rounds or the planner.
#[derive(Debug, Clone, Default)]
pub struct MatchHints {
    /// Nodes the user picked explicitly. A pin only applies to a query
    /// that already counts the node among its candidates.
    pub pinned: Vec<NodeRef>,
    /// Tokens from earlier clarification answers.
    pub history: Vec<String>,
    /// Nodes already claimed by other steps of the same plan.
    pub exclude: Vec<NodeId>,
}

impl MatchHints {
    pub fn with_history(mut self, answers: &[String]) -> Self {
        for answer in answers {
            for token in content_tokens(answer) {
                if !self.history.contains(&token) {
                    self.history.push(token);
                }
            }
        }
        self
    }
}

/// Words that describe "an item in a list" rather than naming one.
const GENERIC_TARGET_WORDS: &[&str] = &[
    "result", "results", "entry", "video", "article", "story", "post", "product", "listing",
];
const LIST_ITEM_ROLES: &[&str] = &["link", "listitem", "article", "row", "treeitem"];

pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Score every eligible node, best first. Includes candidates below the floor.
    pub fn score_all(
        &self,
        intent: &Intent,
        snapshot: &TreeSnapshot,
        hints: &MatchHints,
    ) -> Vec<MatchCandidate> {
        let Some(requirement) = TargetRequirement::for_action(&intent.action) else {
            return Vec::new();
        };
        let query = Query::new(intent, requirement, hints);

        let mut scored: Vec<Ranked> = Vec::new();
        for node in &snapshot.nodes {
            if hints.exclude.contains(&node.id) {
                continue;
            }

            if requirement.accepts(node) {
                if let Some(s) = scoring::score_node(node, node, &query, &self.config) {
                    let candidate = MatchCandidate {
                        node: snapshot.node_ref(&node.id),
                        confidence: s.confidence,
                        rationale: s.rationale,
                    };
                    merge(&mut scored, Ranked { candidate, raw: s.raw, node });
                }
                continue;
            }

            if requirement.follows_labels() && requirement::is_label_like(node) {
                let Some(control) = find_associated_control(snapshot, node, requirement) else {
                    continue;
                };
                if hints.exclude.contains(&control.id) {
                    continue;
                }
                if let Some(mut s) = scoring::score_node(node, control, &query, &self.config)
                    && s.rationale.iter().any(|r| !matches!(r, Signal::RoleCompatible))
                {
                    s.rationale.push(Signal::AssociatedLabel {
                        label: node.id.clone(),
                    });
                    let candidate = MatchCandidate {
                        node: snapshot.node_ref(&control.id),
                        confidence: s.confidence,
                        rationale: s.rationale,
                    };
                    merge(
                        &mut scored,
                        Ranked {
                            candidate,
                            raw: s.raw,
                            node: control,
                        },
                    );
                }
            }
        }

        scored.sort_by(rank);
        scored.into_iter().map(|r| r.candidate).collect()
    }

    /// Match an intent against a snapshot and classify the result.
    pub fn match_intent(
        &self,
        intent: &Intent,
        snapshot: &TreeSnapshot,
        hints: &MatchHints,
    ) -> MatchOutcome {
        let ranked = self.score_all(intent, snapshot, hints);
        debug!(
            target = %intent.target,
            candidates = ranked.len(),
            top = ranked.first().map(|c| c.confidence).unwrap_or(0.0),
            "scored snapshot {}",
            snapshot.id
        );

        if let Some(pinned) = hints.pinned.iter().find(|pin| {
            ranked
                .iter()
                .any(|c| &c.node == *pin && c.confidence >= self.config.min_floor)
        }) {
            debug!(node = %pinned, "using node pinned by clarification");
            return MatchOutcome::Confident(MatchCandidate {
                node: pinned.clone(),
                confidence: 1.0,
                rationale: vec![Signal::ClarifiedByUser],
            });
        }

        if let Some(position) = intent
            .position()
            .or_else(|| intent.latest().then_some(Position::Nth(1)))
            && let Some(candidate) = self.select_ordinal(intent, snapshot, &ranked, position)
        {
            return MatchOutcome::Confident(candidate);
        }

        self.classify(ranked)
    }

    /// Split a ranking into confident / ambiguous / empty.
    pub fn classify(&self, ranked: Vec<MatchCandidate>) -> MatchOutcome {
        let retained: Vec<MatchCandidate> = ranked
            .into_iter()
            .filter(|c| c.confidence >= self.config.min_floor)
            .collect();

        let Some(top) = retained.first() else {
            return MatchOutcome::Empty;
        };

        let clear_lead = retained
            .get(1)
            .is_none_or(|runner| top.confidence - runner.confidence > self.config.tie_margin);

        if top.confidence >= self.config.accept_threshold && clear_lead {
            MatchOutcome::Confident(top.clone())
        } else {
            MatchOutcome::Ambiguous(retained)
        }
    }

    /// Pick the n-th of the near-tied leaders in document order.
    fn select_ordinal(
        &self,
        intent: &Intent,
        snapshot: &TreeSnapshot,
        ranked: &[MatchCandidate],
        position: Position,
    ) -> Option<MatchCandidate> {
        let top = ranked.first()?;

        let mut group: Vec<&MatchCandidate> = if top.confidence >= self.config.min_floor {
            ranked
                .iter()
                .filter(|c| top.confidence - c.confidence <= self.config.tie_margin)
                .collect()
        } else if is_generic_target(&intent.target) {
            ranked
                .iter()
                .filter(|c| {
                    snapshot
                        .resolve(&c.node)
                        .is_some_and(|n| n.has_role(LIST_ITEM_ROLES))
                })
                .collect()
        } else {
            Vec::new()
        };

        group.sort_by_key(|c| snapshot.position_of(&c.node.node));
        let index = position.index_in(group.len())?;

        let mut chosen = group[index].clone();
        chosen.confidence = chosen.confidence.max(self.config.accept_threshold);
        chosen.rationale.push(Signal::OrdinalSelection { position });
        Some(chosen)
    }
}

fn is_generic_target(target: &str) -> bool {
    content_tokens(target)
        .iter()
        .all(|t| GENERIC_TARGET_WORDS.contains(&t.as_str()))
}

struct Ranked<'a> {
    candidate: MatchCandidate,
    raw: f64,
    node: &'a Node,
}

/// Keep the better of two candidates for the same node.
fn merge<'a>(scored: &mut Vec<Ranked<'a>>, entry: Ranked<'a>) {
    match scored
        .iter_mut()
        .find(|r| r.candidate.node == entry.candidate.node)
    {
        Some(existing) if existing.raw >= entry.raw => {}
        Some(slot) => *slot = entry,
        None => scored.push(entry),
    }
}

/// Higher confidence, then focusable, then lowest node id.
fn rank(a: &Ranked, b: &Ranked) -> Ordering {
    b.raw
        .total_cmp(&a.raw)
        .then(b.node.state.focusable.cmp(&a.node.state.focusable))
        .then(a.candidate.node.node.cmp(&b.candidate.node.node))
}
