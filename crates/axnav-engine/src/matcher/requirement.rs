use axnav_common::protocol::{ActionKind, Node};

/// What kind of node an action requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRequirement {
    /// Any node (read, unknown verbs)
    Any,

    /// Must accept text: textbox, searchbox, combobox
    Typeable,

    /// Must be clickable: button, link, interactive item
    Clickable,

    /// Must be checkable: checkbox, radio, switch
    Checkable,

    /// Must be selectable: listbox, option, grid cell
    Selectable,

    /// Must submit a form: a clickable node, with inference fallbacks
    Submittable,
}

const TYPEABLE_ROLES: &[&str] = &[
    "textbox",
    "searchbox",
    "combobox",
    "spinbutton",
    "textarea",
    "textfield",
];

const CLICKABLE_ROLES: &[&str] = &[
    "button",
    "link",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "checkbox",
    "radio",
    "switch",
    "option",
    "gridcell",
    "treeitem",
    "listitem",
    "combobox",
];

const CHECKABLE_ROLES: &[&str] = &[
    "checkbox",
    "radio",
    "switch",
    "menuitemcheckbox",
    "menuitemradio",
];

const SELECTABLE_ROLES: &[&str] = &[
    "combobox",
    "listbox",
    "option",
    "radio",
    "gridcell",
    "menuitemradio",
    "tab",
];

/// Non-actionable text containers that often name a neighbouring control.
const LABEL_ROLES: &[&str] = &[
    "label",
    "labeltext",
    "statictext",
    "text",
    "paragraph",
    "heading",
    "generic",
    "strong",
    "emphasis",
];

impl TargetRequirement {
    /// Requirement for an intent action; `None` for actions without a target.
    pub fn for_action(action: &ActionKind) -> Option<Self> {
        match action {
            ActionKind::Scroll | ActionKind::Navigate | ActionKind::Back => None,
            ActionKind::Input | ActionKind::Search => Some(Self::Typeable),
            ActionKind::Click => Some(Self::Clickable),
            ActionKind::Check => Some(Self::Checkable),
            ActionKind::Select => Some(Self::Selectable),
            ActionKind::Submit => Some(Self::Submittable),
            ActionKind::Read | ActionKind::Other(_) => Some(Self::Any),
        }
    }

    pub fn accepts(&self, node: &Node) -> bool {
        match self {
            Self::Any => true,
            Self::Typeable => node.has_role(TYPEABLE_ROLES),
            Self::Clickable | Self::Submittable => {
                node.has_role(CLICKABLE_ROLES)
                    || (node.has_role(&["image", "img"]) && node.state.focusable)
            }
            Self::Checkable => node.has_role(CHECKABLE_ROLES),
            Self::Selectable => node.has_role(SELECTABLE_ROLES),
        }
    }

    /// Whether a matched label may stand in for the control it names.
    pub fn follows_labels(&self) -> bool {
        matches!(self, Self::Typeable | Self::Checkable | Self::Selectable)
    }
}

pub fn is_label_like(node: &Node) -> bool {
    node.has_role(LABEL_ROLES)
}

pub fn is_typeable(node: &Node) -> bool {
    node.has_role(TYPEABLE_ROLES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_for_action() {
        assert_eq!(
            TargetRequirement::for_action(&ActionKind::Input),
            Some(TargetRequirement::Typeable)
        );
        assert_eq!(TargetRequirement::for_action(&ActionKind::Navigate), None);
        assert_eq!(
            TargetRequirement::for_action(&ActionKind::Other("hover".into())),
            Some(TargetRequirement::Any)
        );
    }

    #[test]
    fn test_accepts_roles_case_insensitively() {
        let textbox = Node::new("1", "TextBox", "Email");
        let button = Node::new("2", "button", "Go");
        assert!(TargetRequirement::Typeable.accepts(&textbox));
        assert!(!TargetRequirement::Typeable.accepts(&button));
        assert!(TargetRequirement::Clickable.accepts(&button));
    }

    #[test]
    fn test_focusable_images_are_clickable() {
        let logo = Node::new("1", "image", "Home");
        let decoration = Node::new("2", "image", "Banner").unfocusable();
        assert!(TargetRequirement::Clickable.accepts(&logo));
        assert!(!TargetRequirement::Clickable.accepts(&decoration));
    }
}
