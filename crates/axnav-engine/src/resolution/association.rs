//! Label-to-control association.
//!
//! Accessibility trees often expose a field's caption as a separate text
//! node next to an unnamed textbox. When matching lands on such a label for
//! an action that needs a control (`input "Promo code" ...`), this module
//! finds the control the label speaks for.

use super::context::{ResolutionContext, is_descendant};
use crate::matcher::TargetRequirement;
use crate::matcher::requirement::is_label_like;
use axnav_common::protocol::{Node, TreeSnapshot};

/// How many siblings on either side of a label are considered.
const MAX_ADJACENT_ELEMENTS: usize = 5;

/// Find the control a label-like node names.
///
/// Strategies in priority order:
/// 1. explicit link: the control's `labelled_by` names the label, or the
///    label's `for` names the control's `dom_id`
/// 2. nested control: a descendant of the label
/// 3. enclosing control: the label is the control's own caption text
/// 4. adjacent control: a nearby sibling (or the only control inside one),
///    following siblings first
pub fn find_associated_control<'a>(
    snapshot: &'a TreeSnapshot,
    label: &Node,
    requirement: TargetRequirement,
) -> Option<&'a Node> {
    if !is_label_like(label) {
        return None;
    }
    let ctx = ResolutionContext::new(snapshot);

    find_by_explicit_link(&ctx, label, requirement)
        .or_else(|| find_nested_control(&ctx, label, requirement))
        .or_else(|| find_enclosing_control(&ctx, label, requirement))
        .or_else(|| find_adjacent_control(&ctx, label, requirement))
}

fn find_by_explicit_link<'a>(
    ctx: &ResolutionContext<'a>,
    label: &Node,
    requirement: TargetRequirement,
) -> Option<&'a Node> {
    let for_id = label.attr("for");
    ctx.elements().find(|e| {
        requirement.accepts(e)
            && (e.attr("labelled_by") == Some(label.id.as_str())
                || for_id.is_some_and(|f| e.attr("dom_id") == Some(f)))
    })
}

/// `label > textbox`
fn find_nested_control<'a>(
    ctx: &ResolutionContext<'a>,
    label: &Node,
    requirement: TargetRequirement,
) -> Option<&'a Node> {
    ctx.scoped_to(&label.id)
        .elements()
        .find(|e| requirement.accepts(e))
}

/// `textbox > statictext "Email"`
fn find_enclosing_control<'a>(
    ctx: &ResolutionContext<'a>,
    label: &Node,
    requirement: TargetRequirement,
) -> Option<&'a Node> {
    ctx.snapshot
        .parent_of(label)
        .filter(|parent| requirement.accepts(parent))
}

/// `statictext "Email", textbox` or `checkbox, statictext "Remember me"`
fn find_adjacent_control<'a>(
    ctx: &ResolutionContext<'a>,
    label: &Node,
    requirement: TargetRequirement,
) -> Option<&'a Node> {
    let siblings: Vec<&Node> = ctx
        .elements()
        .filter(|e| e.parent_id == label.parent_id)
        .collect();
    let index = siblings.iter().position(|s| s.id == label.id)?;

    let after = siblings
        .iter()
        .skip(index + 1)
        .take(MAX_ADJACENT_ELEMENTS)
        .copied();
    let before = siblings[..index]
        .iter()
        .rev()
        .take(MAX_ADJACENT_ELEMENTS)
        .copied();

    after
        .chain(before)
        .find_map(|sibling| control_within(ctx, sibling, requirement))
}

/// The sibling itself, or the single qualifying control in its subtree.
fn control_within<'a>(
    ctx: &ResolutionContext<'a>,
    sibling: &'a Node,
    requirement: TargetRequirement,
) -> Option<&'a Node> {
    if requirement.accepts(sibling) {
        return Some(sibling);
    }
    // A neighbouring caption names some other control.
    if is_label_like(sibling) && !sibling.name.trim().is_empty() {
        return None;
    }
    let mut inside = ctx
        .elements()
        .filter(|e| is_descendant(ctx.snapshot, e, &sibling.id) && requirement.accepts(e));
    match (inside.next(), inside.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axnav_common::protocol::{ContextId, PageContext};

    fn snapshot(nodes: Vec<Node>) -> TreeSnapshot {
        TreeSnapshot::new(PageContext::new(ContextId::new("tab")), nodes)
    }

    fn associated(snap: &TreeSnapshot, label: &str, requirement: TargetRequirement) -> Option<String> {
        let label = snap.get(&label.into())?;
        find_associated_control(snap, label, requirement).map(|n| n.id.to_string())
    }

    #[test]
    fn test_explicit_link_wins() {
        let snap = snapshot(vec![
            Node::new("1", "textbox", ""),
            Node::new("2", "label", "Email"),
            Node::new("3", "textbox", "").with_attribute("labelled_by", "2"),
        ]);
        assert_eq!(
            associated(&snap, "2", TargetRequirement::Typeable),
            Some("3".into())
        );
    }

    #[test]
    fn test_for_attribute_links_dom_id() {
        let snap = snapshot(vec![
            Node::new("1", "label", "Email").with_attribute("for", "email"),
            Node::new("2", "statictext", "Hint"),
            Node::new("3", "textbox", "").with_attribute("dom_id", "email"),
        ]);
        assert_eq!(
            associated(&snap, "1", TargetRequirement::Typeable),
            Some("3".into())
        );
    }

    #[test]
    fn test_nested_control() {
        let snap = snapshot(vec![
            Node::new("1", "label", "Remember me"),
            Node::new("2", "checkbox", "").with_parent("1"),
        ]);
        assert_eq!(
            associated(&snap, "1", TargetRequirement::Checkable),
            Some("2".into())
        );
    }

    #[test]
    fn test_caption_inside_control() {
        let snap = snapshot(vec![
            Node::new("1", "textbox", ""),
            Node::new("2", "statictext", "Search the site").with_parent("1"),
        ]);
        assert_eq!(
            associated(&snap, "2", TargetRequirement::Typeable),
            Some("1".into())
        );
    }

    #[test]
    fn test_adjacent_prefers_following_sibling() {
        let snap = snapshot(vec![
            Node::new("1", "group", ""),
            Node::new("2", "checkbox", "").with_parent("1"),
            Node::new("3", "statictext", "Newsletter").with_parent("1"),
            Node::new("4", "checkbox", "").with_parent("1"),
        ]);
        assert_eq!(
            associated(&snap, "3", TargetRequirement::Checkable),
            Some("4".into())
        );
    }

    #[test]
    fn test_adjacent_wrapper_with_single_control() {
        let snap = snapshot(vec![
            Node::new("1", "group", ""),
            Node::new("2", "statictext", "City").with_parent("1"),
            Node::new("3", "generic", "").with_parent("1"),
            Node::new("4", "combobox", "").with_parent("3"),
        ]);
        assert_eq!(
            associated(&snap, "2", TargetRequirement::Typeable),
            Some("4".into())
        );
    }

    #[test]
    fn test_non_label_has_no_association() {
        let snap = snapshot(vec![
            Node::new("1", "button", "Email"),
            Node::new("2", "textbox", ""),
        ]);
        assert_eq!(associated(&snap, "1", TargetRequirement::Typeable), None);
    }
}
