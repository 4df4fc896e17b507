use super::dates::{date_keywords, date_matches};
use super::requirement::TargetRequirement;
use super::synonyms::{TokenMatch, token_match};
use super::{MatchHints, Signal};
use crate::config::MatcherConfig;
use axnav_common::protocol::{ActionKind, Intent, Node};
use axnav_common::text::{content_tokens, normalize_text};

pub const EXACT_NAME: f64 = 1.0;
pub const EXACT_DESCRIPTION: f64 = 0.9;
pub const ATTRIBUTE_EXACT: f64 = 0.85;
pub const VALUE_EXACT: f64 = 0.7;
pub const SUBSTRING: f64 = 0.6;
pub const TOKEN_OVERLAP_WEIGHT: f64 = 0.7;
pub const ROLE_AFFINITY: f64 = 0.1;
pub const DISABLED_FACTOR: f64 = 0.1;
pub const NOT_FOCUSABLE_PENALTY: f64 = 0.15;

/// Attributes that carry a human label for the node.
pub const HINT_ATTRIBUTES: &[&str] = &["label", "placeholder", "title", "autocomplete"];

/// An intent pre-digested for scoring many nodes.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub tokens: Vec<String>,
    pub requirement: TargetRequirement,
    pub interactive: bool,
    date_keywords: Vec<String>,
    origin: Option<String>,
    destination: Option<String>,
    history: Vec<String>,
}

impl Query {
    pub fn new(intent: &Intent, requirement: TargetRequirement, hints: &MatchHints) -> Self {
        let mut target = intent.target.trim().to_string();
        if content_tokens(&target).is_empty() && intent.action == ActionKind::Search {
            target = "search".to_string();
        }

        Self {
            text: normalize_text(&target),
            tokens: content_tokens(&target),
            requirement,
            interactive: intent.action.requires_interaction(),
            date_keywords: intent.date().map(date_keywords).unwrap_or_default(),
            origin: intent.origin().map(normalize_text),
            destination: intent.destination().map(normalize_text),
            history: hints.history.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub confidence: f64,
    /// Unclamped score; keeps saturated candidates apart when ranking.
    pub raw: f64,
    pub rationale: Vec<Signal>,
}

/// Score `text_node` against the query. State penalties come from
/// `state_node`, which differs from `text_node` only when a label speaks
/// for its control. Returns `None` when nothing links the node to the intent.
pub fn score_node(
    text_node: &Node,
    state_node: &Node,
    query: &Query,
    config: &MatcherConfig,
) -> Option<Scored> {
    let mut rationale = Vec::new();

    let textual = textual_score(text_node, query, config, &mut rationale);
    let entity = entity_score(text_node, query, &mut rationale);

    let compatible =
        query.requirement != TargetRequirement::Any && query.requirement.accepts(state_node);

    let mut score = textual + entity;
    if score > 0.0 {
        if compatible {
            score += ROLE_AFFINITY;
            rationale.push(Signal::RoleCompatible);
        }
    } else if compatible {
        score = ROLE_AFFINITY;
        rationale.push(Signal::RoleCompatible);
    } else {
        return None;
    }

    score += history_score(text_node, query, config, &mut rationale);

    if state_node.state.disabled {
        score *= DISABLED_FACTOR;
        rationale.push(Signal::DisabledPenalty);
    }
    if query.interactive && !state_node.state.focusable {
        score -= NOT_FOCUSABLE_PENALTY;
        rationale.push(Signal::NotFocusablePenalty);
    }

    Some(Scored {
        confidence: score.clamp(0.0, 1.0),
        raw: score,
        rationale,
    })
}

fn textual_score(
    node: &Node,
    query: &Query,
    config: &MatcherConfig,
    rationale: &mut Vec<Signal>,
) -> f64 {
    if query.text.is_empty() {
        return 0.0;
    }

    let name = normalize_text(&node.name);
    if !name.is_empty() && name == query.text {
        rationale.push(Signal::ExactName);
        return EXACT_NAME;
    }

    let description = node
        .description
        .as_deref()
        .map(normalize_text)
        .unwrap_or_default();
    if !description.is_empty() && description == query.text {
        rationale.push(Signal::ExactDescription);
        return EXACT_DESCRIPTION;
    }

    let mut best = 0.0f64;

    for attr in HINT_ATTRIBUTES {
        if let Some(value) = node.attr(attr)
            && normalize_text(value) == query.text
        {
            rationale.push(Signal::AttributeHint {
                attribute: attr.to_string(),
            });
            best = best.max(ATTRIBUTE_EXACT);
            break;
        }
    }

    if let Some(value) = &node.value
        && normalize_text(value) == query.text
    {
        rationale.push(Signal::ExactValue);
        best = best.max(VALUE_EXACT);
    }

    if !name.is_empty() && name.contains(&query.text) {
        rationale.push(Signal::Substring);
        best = best.max(SUBSTRING);
    }

    let overlap = token_overlap(node, &description, query, config, rationale);
    best.max(overlap)
}

/// Mean of query coverage and name coverage, scaled by the overlap weight.
fn token_overlap(
    node: &Node,
    description: &str,
    query: &Query,
    config: &MatcherConfig,
    rationale: &mut Vec<Signal>,
) -> f64 {
    if query.tokens.is_empty() {
        return 0.0;
    }

    let name_tokens = content_tokens(&node.name);
    let mut hint_tokens = content_tokens(description);
    for attr in HINT_ATTRIBUTES {
        if let Some(value) = node.attr(attr) {
            hint_tokens.extend(content_tokens(value));
        }
    }

    let mut matched_query = 0usize;
    let mut matched_name = vec![false; name_tokens.len()];
    let mut synonyms = Vec::new();

    for qt in &query.tokens {
        let mut hit: Option<TokenMatch> = None;
        for (i, nt) in name_tokens.iter().enumerate() {
            if let Some(kind) = token_match(qt, nt, config.fuzzy_threshold) {
                matched_name[i] = true;
                hit = hit.max(Some(kind));
            }
        }
        if hit.is_none() {
            hit = hint_tokens
                .iter()
                .filter_map(|ht| token_match(qt, ht, config.fuzzy_threshold))
                .max();
        }
        if let Some(kind) = hit {
            matched_query += 1;
            if kind == TokenMatch::Synonym {
                synonyms.push(qt.clone());
            }
        }
    }

    if matched_query == 0 {
        return 0.0;
    }

    let query_coverage = matched_query as f64 / query.tokens.len() as f64;
    let name_coverage = if name_tokens.is_empty() {
        0.5
    } else {
        matched_name.iter().filter(|m| **m).count() as f64 / name_tokens.len() as f64
    };

    rationale.push(Signal::TokenOverlap {
        matched: matched_query,
        total: query.tokens.len(),
    });
    for token in synonyms {
        rationale.push(Signal::Synonym { token });
    }

    TOKEN_OVERLAP_WEIGHT * (query_coverage + name_coverage) / 2.0
}

fn entity_score(node: &Node, query: &Query, rationale: &mut Vec<Signal>) -> f64 {
    let name = normalize_text(&node.name);
    let description = node
        .description
        .as_deref()
        .map(normalize_text)
        .unwrap_or_default();
    let mut score = 0.0;

    if !query.date_keywords.is_empty() {
        if date_matches(&query.date_keywords, &name) {
            score += 0.9;
            rationale.push(Signal::EntityHint {
                entity: "date".into(),
            });
        } else if date_matches(&query.date_keywords, &description) {
            score += 0.7;
            rationale.push(Signal::EntityHint {
                entity: "date".into(),
            });
        }
    }

    for (entity, value, name_weight, description_weight) in [
        ("destination", &query.destination, 0.7, 0.5),
        ("origin", &query.origin, 0.6, 0.4),
    ] {
        let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        if name.contains(value) {
            score += name_weight;
        } else if description.contains(value) {
            score += description_weight;
        } else {
            continue;
        }
        rationale.push(Signal::EntityHint {
            entity: entity.into(),
        });
    }

    score
}

fn history_score(
    node: &Node,
    query: &Query,
    config: &MatcherConfig,
    rationale: &mut Vec<Signal>,
) -> f64 {
    if query.history.is_empty() {
        return 0.0;
    }
    let mut tokens = content_tokens(&node.name);
    if let Some(description) = &node.description {
        tokens.extend(content_tokens(description));
    }
    let matched = query
        .history
        .iter()
        .filter(|h| tokens.iter().any(|t| t == *h))
        .count();
    if matched == 0 {
        return 0.0;
    }
    rationale.push(Signal::HistoryHint);
    config.history_bonus * matched as f64 / query.history.len() as f64
}
