use super::context::{ResolutionContext, common_ancestor};
use crate::matcher::TargetRequirement;
use axnav_common::protocol::{Node, NodeId};
use axnav_common::text::tokenize;
use tracing::debug;

/// An inference rule that can produce a target from context alone.
pub struct InferenceRule {
    pub name: &'static str,
    pub requirement: TargetRequirement,
    pub priority: i32,
    pub infer: fn(&ResolutionContext) -> Option<NodeId>,
}

/// Words that mark a button as the one that sends a form.
pub const SUBMIT_KEYWORDS: &[&str] = &["search", "submit", "apply", "done", "confirm", "go", "find"];

/// Get inference rules for a requirement type, highest priority first.
pub fn get_inference_rules(requirement: &TargetRequirement) -> Vec<InferenceRule> {
    let mut rules = match requirement {
        TargetRequirement::Submittable => submittable_rules(),
        _ => vec![],
    };
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules
}

/// Run the rules for `requirement` and return the first hit with the rule name.
pub fn infer_target(
    ctx: &ResolutionContext,
    requirement: TargetRequirement,
) -> Option<(&'static str, NodeId)> {
    get_inference_rules(&requirement).into_iter().find_map(|rule| {
        let found = (rule.infer)(ctx)?;
        debug!(rule = rule.name, node = %found, "inferred target");
        Some((rule.name, found))
    })
}

fn attr_is(node: &Node, key: &str, value: &str) -> bool {
    node.attr(key).is_some_and(|v| v.eq_ignore_ascii_case(value))
}

fn is_usable(node: &Node) -> bool {
    !node.state.disabled
}

/// Button (or input) declared as `type=submit`.
fn is_submit_button(node: &Node) -> bool {
    node.has_role(&["button"]) && attr_is(node, "input_type", "submit") && is_usable(node)
}

/// Button whose name carries a submit keyword ("Search", "Find flights", "Go").
pub fn is_keyword_button(node: &Node) -> bool {
    node.has_role(&["button"])
        && is_usable(node)
        && tokenize(&node.name)
            .iter()
            .any(|t| SUBMIT_KEYWORDS.contains(&t.as_str()))
}

fn is_search_field(node: &Node) -> bool {
    node.has_role(&["searchbox"])
        || (node.has_role(&["textbox", "combobox"])
            && (tokenize(&node.name).iter().any(|t| t == "search")
                || attr_is(node, "input_type", "search")))
}

/// Find the single node matching a predicate, or None if zero or several match.
fn find_single<'a>(
    ctx: &ResolutionContext<'a>,
    predicate: impl Fn(&Node) -> bool,
) -> Option<&'a Node> {
    let mut matches = ctx.elements().filter(|n| predicate(n));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn submittable_rules() -> Vec<InferenceRule> {
    vec![
        InferenceRule {
            name: "search_pattern_submit",
            requirement: TargetRequirement::Submittable,
            priority: 95,
            infer: |ctx| {
                let field = ctx.elements().find(|n| is_search_field(n))?;
                // The keyword button sharing the closest container with the field.
                ctx.elements()
                    .filter(|n| is_keyword_button(n) || is_submit_button(n))
                    .filter_map(|button| {
                        let container = common_ancestor(ctx.snapshot, field, button)?;
                        let position = ctx.snapshot.position_of(&container.id)?;
                        Some((position, button))
                    })
                    .max_by_key(|(position, _)| *position)
                    .map(|(_, button)| button.id.clone())
            },
        },
        InferenceRule {
            name: "single_form_submit",
            requirement: TargetRequirement::Submittable,
            priority: 80,
            infer: |ctx| {
                let form = find_single(ctx, |n| n.has_role(&["form"]))?;
                let scoped = ctx.scoped_to(&form.id);
                scoped
                    .elements()
                    .find(|n| is_submit_button(n))
                    .or_else(|| scoped.elements().find(|n| is_keyword_button(n)))
                    .map(|n| n.id.clone())
            },
        },
        InferenceRule {
            name: "any_submit_button",
            requirement: TargetRequirement::Submittable,
            priority: 60,
            infer: |ctx| ctx.elements().find(|n| is_submit_button(n)).map(|n| n.id.clone()),
        },
        InferenceRule {
            name: "keyword_button",
            requirement: TargetRequirement::Submittable,
            priority: 50,
            infer: |ctx| ctx.elements().find(|n| is_keyword_button(n)).map(|n| n.id.clone()),
        },
    ]
}
