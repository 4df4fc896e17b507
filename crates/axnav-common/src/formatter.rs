use crate::protocol::{
    ClarificationRequest, ExecutionPlan, ExecutionResult, Node, StepStatus, TreeSnapshot,
};

/// Default sensitive field names that should be masked in output.
const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "key",
    "cvv",
    "ssn",
    "card_number",
    "credit_card",
];

/// One line per node, indented by depth:
/// `[12] textbox "From" {focused} = "Istanbul"`
pub fn format_snapshot(snapshot: &TreeSnapshot) -> String {
    let mut output = format!(
        "@ {} \"{}\" ({} nodes, snapshot {})\n",
        snapshot.page.url.as_deref().unwrap_or("about:blank"),
        snapshot.page.title.as_deref().unwrap_or(""),
        snapshot.nodes.len(),
        snapshot.id
    );

    for node in &snapshot.nodes {
        let depth = depth_of(snapshot, node);
        output.push_str(&"  ".repeat(depth));
        output.push_str(&format_node(node));
        output.push('\n');
    }
    output
}

pub fn format_node(node: &Node) -> String {
    let mut flags = Vec::new();
    if node.state.focused {
        flags.push("focused");
    }
    if node.state.checked {
        flags.push("checked");
    }
    if node.state.selected {
        flags.push("selected");
    }
    if node.state.expanded {
        flags.push("expanded");
    }
    if node.state.disabled {
        flags.push("disabled");
    }
    if !node.state.focusable {
        flags.push("unfocusable");
    }

    let flags_str = if flags.is_empty() {
        String::new()
    } else {
        format!(" {{{}}}", flags.join(", "))
    };

    let value_suffix = match &node.value {
        Some(val) if !val.is_empty() => {
            format!(" = {:?}", mask_sensitive(val, &sensitive_key(node), &[]))
        }
        _ => String::new(),
    };

    let frame_suffix = node
        .frame
        .as_ref()
        .map(|f| format!(" (frame {})", f))
        .unwrap_or_default();

    format!(
        "[{}] {} {:?}{}{}{}",
        node.id, node.role, node.name, flags_str, value_suffix, frame_suffix
    )
}

/// Render a plan; node names are filled in when the source snapshot is at hand.
pub fn format_plan(plan: &ExecutionPlan, snapshot: Option<&TreeSnapshot>) -> String {
    let mut output = format!(
        "plan {} for intent {} ({} steps)\n",
        plan.id,
        plan.intent_id,
        plan.steps.len()
    );

    for step in &plan.steps {
        let node = step
            .target
            .as_ref()
            .and_then(|t| snapshot.and_then(|s| s.resolve(t)));

        let target = match (&step.target, node) {
            (Some(_), Some(node)) => format!(" [{}] {} {:?}", node.id, node.role, node.name),
            (Some(target), None) => format!(" [{}]", target.node),
            (None, _) => String::new(),
        };

        let value = match &step.value {
            Some(val) => {
                let key = node.map(sensitive_key).unwrap_or_default();
                format!(" = {:?}", mask_sensitive(val, &key, &[]))
            }
            None => String::new(),
        };

        let optional = if step.optional { " (optional)" } else { "" };

        output.push_str(&format!(
            "{}. {}{}{} @ {:.2}{}\n",
            step.step_id, step.action_type, target, value, step.confidence, optional
        ));
        if let Some(notes) = &step.notes {
            output.push_str(&format!("   # {}\n", notes));
        }
    }
    output
}

pub fn format_clarification(request: &ClarificationRequest) -> String {
    let mut output = format!("? {} ({})\n", request.question, request.reason.as_str());
    for (i, option) in request.options.iter().enumerate() {
        output.push_str(&format!("  {}) {}\n", i + 1, option.label));
    }
    output
}

pub fn format_results(results: &[ExecutionResult]) -> String {
    let mut output = String::new();
    for result in results {
        let status = match result.status {
            StepStatus::Success => "ok",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "skipped",
        };
        output.push_str(&format!(
            "{} {} ({}ms, {} attempt{})",
            result.step_id,
            status,
            result.duration_ms,
            result.attempts,
            if result.attempts == 1 { "" } else { "s" }
        ));
        if let Some(error) = &result.error {
            match &result.error_code {
                Some(code) => output.push_str(&format!(": [{}] {}", code, error)),
                None => output.push_str(&format!(": {}", error)),
            }
        }
        output.push('\n');
    }
    output
}

pub fn mask_sensitive(value: &str, field_name: &str, sensitive_fields: &[String]) -> String {
    let lower_field = field_name.to_lowercase();

    let is_sensitive = sensitive_fields
        .iter()
        .any(|f| lower_field.contains(&f.to_lowercase()))
        || DEFAULT_SENSITIVE_FIELDS
            .iter()
            .any(|f| lower_field.contains(*f));

    if is_sensitive {
        "••••••••".to_string()
    } else {
        value.to_string()
    }
}

/// Text used to decide whether a node holds a secret.
fn sensitive_key(node: &Node) -> String {
    let mut key = node.name.clone();
    for attr in ["input_type", "autocomplete", "label", "placeholder"] {
        if let Some(v) = node.attr(attr) {
            key.push(' ');
            key.push_str(v);
        }
    }
    key
}

fn depth_of(snapshot: &TreeSnapshot, node: &Node) -> usize {
    let mut depth = 0;
    let mut current = snapshot.parent_of(node);
    while let Some(parent) = current {
        depth += 1;
        // Guards against parent cycles in malformed captures.
        if depth > snapshot.nodes.len() {
            break;
        }
        current = snapshot.parent_of(parent);
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ContextId, ExecutionStep, PageContext, StepAction};

    fn snapshot() -> TreeSnapshot {
        TreeSnapshot::new(
            PageContext::new(ContextId::new("tab-1")).with_url("https://example.com/login"),
            vec![
                Node::new("1", "form", "Login"),
                Node::new("2", "textbox", "Email").with_parent("1"),
                Node::new("3", "textbox", "Password")
                    .with_parent("1")
                    .with_attribute("input_type", "password")
                    .with_value("hunter2"),
            ],
        )
        .with_id("snap-1")
    }

    #[test]
    fn test_snapshot_masks_password_values() {
        let out = format_snapshot(&snapshot());
        assert!(out.contains("[2] textbox \"Email\""));
        assert!(out.contains("  [3] textbox \"Password\""));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn test_plan_masks_values_for_secret_targets() {
        let snap = snapshot();
        let mut step = ExecutionStep::new("1", StepAction::Input);
        step.target = Some(snap.node_ref(&"3".into()));
        step.value = Some("s3cret".into());
        let plan = ExecutionPlan::new("intent-1", snap.id.clone(), vec![step]);

        let out = format_plan(&plan, Some(&snap));
        assert!(out.contains("input [3] textbox \"Password\""));
        assert!(!out.contains("s3cret"));
    }

    #[test]
    fn test_mask_sensitive_custom_fields() {
        assert_eq!(mask_sensitive("abc", "pin code", &["pin".into()]), "••••••••");
        assert_eq!(mask_sensitive("abc", "city", &[]), "abc");
    }
}
