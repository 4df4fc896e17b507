use crate::text::parse_ordinal;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

pub const INTENT_SCHEMA: &str = "intent_v1";
pub const SNAPSHOT_SCHEMA: &str = "axtree_v1";
pub const PLAN_SCHEMA: &str = "executionplan_v1";
pub const CLARIFICATION_SCHEMA: &str = "clarification_v1";
pub const RESULT_SCHEMA: &str = "executionresult_v1";

/// Payloads that travel with a `schema_version` tag.
pub trait Versioned {
    const SCHEMA_VERSION: &'static str;
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Missing schema_version on {expected} payload")]
    MissingVersion { expected: &'static str },

    #[error("Unsupported schema version '{found}' (expected '{expected}')")]
    UnsupportedVersion {
        expected: &'static str,
        found: String,
    },

    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Decode a versioned payload, checking the tag before interpreting the shape.
pub fn decode<T: Versioned + DeserializeOwned>(raw: &str) -> Result<T, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    decode_value(value)
}

pub fn decode_value<T: Versioned + DeserializeOwned>(value: Value) -> Result<T, ProtocolError> {
    match value.get("schema_version").and_then(Value::as_str) {
        None => Err(ProtocolError::MissingVersion {
            expected: T::SCHEMA_VERSION,
        }),
        Some(found) if found != T::SCHEMA_VERSION => Err(ProtocolError::UnsupportedVersion {
            expected: T::SCHEMA_VERSION,
            found: found.to_string(),
        }),
        Some(_) => Ok(serde_json::from_value(value)?),
    }
}

pub fn encode<T: Versioned + Serialize>(payload: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string_pretty(payload)?)
}

/// Custom deserializer for attribute maps that drops null values.
/// Tree capture reports absent attributes as `null`.
fn deserialize_nullable_string_map<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: BTreeMap<String, Option<String>> = BTreeMap::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.map(|val| (k, val)))
        .collect())
}

// ============================================================
// Identifiers
// ============================================================

/// Key of one browsing context (tab, window, frame host).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a node inside one snapshot. Not stable across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u32> for NodeId {
    fn from(n: u32) -> Self {
        Self(n.to_string())
    }
}

/// Numeric ids order numerically ("9" < "10"); anything else falls back to
/// byte order.
impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            // "07" and "7" parse alike but are distinct ids.
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.len().cmp(&other.0.len()).then(self.0.cmp(&other.0)),
        }
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A node id together with the snapshot that gives it meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub snapshot: SnapshotId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(snapshot: SnapshotId, node: NodeId) -> Self {
        Self { snapshot, node }
    }

    pub fn belongs_to(&self, snapshot: &SnapshotId) -> bool {
        &self.snapshot == snapshot
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node, self.snapshot)
    }
}

// ============================================================
// Tree Snapshot
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub context: ContextId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl PageContext {
    pub fn new(context: ContextId) -> Self {
        Self {
            context,
            url: None,
            title: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeState {
    pub focusable: bool,
    pub focused: bool,
    pub disabled: bool,
    pub checked: bool,
    pub selected: bool,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    /// Placeholder-like hints exposed by the host: `placeholder`, `label`,
    /// `title`, `autocomplete`, `input_type`.
    #[serde(
        default,
        deserialize_with = "deserialize_nullable_string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attributes: BTreeMap<String, String>,
    /// Set when the node lives inside an embedded frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, role: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            role: role.to_string(),
            name: name.to_string(),
            description: None,
            value: None,
            state: NodeState {
                focusable: true,
                ..NodeState::default()
            },
            parent_id: None,
            attributes: BTreeMap::new(),
            frame: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.state.disabled = true;
        self
    }

    pub fn unfocusable(mut self) -> Self {
        self.state.focusable = false;
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn has_role(&self, roles: &[&str]) -> bool {
        let role = self.role.to_ascii_lowercase();
        roles.iter().any(|r| *r == role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    #[serde(default = "snapshot_schema")]
    pub schema_version: String,
    pub id: SnapshotId,
    pub page: PageContext,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

fn snapshot_schema() -> String {
    SNAPSHOT_SCHEMA.to_string()
}

impl Versioned for TreeSnapshot {
    const SCHEMA_VERSION: &'static str = SNAPSHOT_SCHEMA;
}

impl TreeSnapshot {
    pub fn new(page: PageContext, nodes: Vec<Node>) -> Self {
        Self {
            schema_version: snapshot_schema(),
            id: SnapshotId::generate(),
            page,
            captured_at: Utc::now(),
            nodes,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = SnapshotId::new(id);
        self
    }

    pub fn context(&self) -> &ContextId {
        &self.page.context
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Look up a scoped reference. References from other snapshots never resolve.
    pub fn resolve(&self, node: &NodeRef) -> Option<&Node> {
        if !node.belongs_to(&self.id) {
            return None;
        }
        self.get(&node.node)
    }

    pub fn node_ref(&self, id: &NodeId) -> NodeRef {
        NodeRef::new(self.id.clone(), id.clone())
    }

    pub fn parent_of(&self, node: &Node) -> Option<&Node> {
        node.parent_id.as_ref().and_then(|p| self.get(p))
    }

    pub fn children_of<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent_id.as_ref() == Some(id))
    }

    /// Position of a node in document order.
    pub fn position_of(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    pub fn snapshot_ref(&self) -> SnapshotRef {
        SnapshotRef {
            id: self.id.clone(),
            captured_at: self.captured_at,
            url: self.page.url.clone(),
        }
    }

    /// Check per-snapshot invariants: unique ids, parents present.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(&node.id) {
                return Err(ProtocolError::InvalidSnapshot(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }
        for node in &self.nodes {
            if let Some(parent) = &node.parent_id
                && !seen.contains(parent)
            {
                return Err(ProtocolError::InvalidSnapshot(format!(
                    "node {} references missing parent {}",
                    node.id, parent
                )));
            }
        }
        Ok(())
    }
}

/// Lightweight pointer to the snapshot a session last worked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub id: SnapshotId,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Non-destructive refresh requested from the snapshot provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeHint {
    ScrollForward,
    ExpandCollapsed,
    WaitForContent,
    EnterFrames,
}

impl ProbeHint {
    /// Default escalation order used when nothing matched.
    pub const ESCALATION: [ProbeHint; 4] = [
        ProbeHint::ScrollForward,
        ProbeHint::ExpandCollapsed,
        ProbeHint::WaitForContent,
        ProbeHint::EnterFrames,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeHint::ScrollForward => "scroll_forward",
            ProbeHint::ExpandCollapsed => "expand_collapsed",
            ProbeHint::WaitForContent => "wait_for_content",
            ProbeHint::EnterFrames => "enter_frames",
        }
    }
}

// ============================================================
// Intent (Action Plan)
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Click,
    Input,
    Select,
    Check,
    Submit,
    Scroll,
    Navigate,
    Back,
    Search,
    Read,
    Other(String),
}

impl ActionKind {
    /// Map an extractor verb (including its aliases) onto an action.
    pub fn from_verb(verb: &str) -> Self {
        match verb.trim().to_lowercase().as_str() {
            "click" | "click_result" | "click_item" | "press" | "open" => ActionKind::Click,
            "input" | "type" | "fill" | "set_field" | "enter" => ActionKind::Input,
            "select" | "choose" | "pick" | "select_date" | "pick_date" | "select_option" => {
                ActionKind::Select
            }
            "check" | "uncheck" | "toggle" => ActionKind::Check,
            "submit" => ActionKind::Submit,
            "scroll" | "scroll_page" | "scroll_down" | "scroll_up" => ActionKind::Scroll,
            "navigate" | "open_site" | "goto" | "go_to" => ActionKind::Navigate,
            "back" | "history_back" | "go_back" => ActionKind::Back,
            "search" | "search_content" | "search_site" | "search_flights" | "flight_search"
            | "search_hotels" | "search_stays" | "search_travel" => ActionKind::Search,
            "read" | "inspect" => ActionKind::Read,
            other => ActionKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Input => "input",
            ActionKind::Select => "select",
            ActionKind::Check => "check",
            ActionKind::Submit => "submit",
            ActionKind::Scroll => "scroll",
            ActionKind::Navigate => "navigate",
            ActionKind::Back => "back",
            ActionKind::Search => "search",
            ActionKind::Read => "read",
            ActionKind::Other(verb) => verb,
        }
    }

    /// Actions that act on the page as a whole rather than on a node.
    pub fn is_targetless(&self) -> bool {
        matches!(
            self,
            ActionKind::Scroll | ActionKind::Navigate | ActionKind::Back
        )
    }

    /// Actions whose target must accept user interaction.
    pub fn requires_interaction(&self) -> bool {
        !matches!(self, ActionKind::Read | ActionKind::Other(_)) && !self.is_targetless()
    }
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        ActionKind::from_verb(&s)
    }
}

impl From<ActionKind> for String {
    fn from(a: ActionKind) -> Self {
        a.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal selection extracted from the intent ("second result", "last one").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Nth(usize),
    Last,
}

impl Position {
    /// Zero-based index into a list of `len` items.
    pub fn index_in(&self, len: usize) -> Option<usize> {
        match self {
            Position::Nth(n) if *n >= 1 && *n <= len => Some(n - 1),
            Position::Last if len > 0 => Some(len - 1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default = "intent_schema")]
    pub schema_version: String,
    #[serde(default = "generate_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub action: ActionKind,
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub entities: BTreeMap<String, Value>,
}

fn intent_schema() -> String {
    INTENT_SCHEMA.to_string()
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Versioned for Intent {
    const SCHEMA_VERSION: &'static str = INTENT_SCHEMA;
}

impl Intent {
    pub fn new(action: ActionKind, target: &str) -> Self {
        Self {
            schema_version: intent_schema(),
            id: generate_id(),
            trace_id: None,
            action,
            target: target.to_string(),
            value: None,
            entities: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_entity(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.entities.insert(key.to_string(), value.into());
        self
    }

    /// Copy of this intent whose target also carries `extra` text.
    pub fn refined(&self, extra: &str) -> Self {
        let mut refined = self.clone();
        refined.target = format!("{} {}", self.target, extra).trim().to_string();
        refined
    }

    pub fn entity_str(&self, key: &str) -> Option<&str> {
        self.entities
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn first_entity(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.entity_str(k))
    }

    fn entity_flag(&self, key: &str) -> bool {
        match self.entities.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
            _ => false,
        }
    }

    pub fn origin(&self) -> Option<&str> {
        self.first_entity(&["origin", "from"])
    }

    pub fn destination(&self) -> Option<&str> {
        self.first_entity(&["destination", "location", "city"])
    }

    pub fn date(&self) -> Option<&str> {
        self.first_entity(&["date", "date_start", "check_in"])
    }

    pub fn date_end(&self) -> Option<&str> {
        self.first_entity(&["date_end", "date_return", "check_out"])
    }

    pub fn url(&self) -> Option<&str> {
        self.entity_str("url")
    }

    pub fn site(&self) -> Option<&str> {
        self.entity_str("site")
    }

    pub fn query(&self) -> Option<&str> {
        self.entity_str("query")
    }

    pub fn scroll_direction(&self) -> Option<&str> {
        self.entity_str("scroll_direction")
    }

    pub fn latest(&self) -> bool {
        self.entity_flag("latest")
    }

    pub fn wants_submit(&self) -> bool {
        self.entity_flag("submit")
    }

    pub fn position(&self) -> Option<Position> {
        match self.entities.get("position")? {
            Value::Number(n) => match n.as_i64()? {
                -1 => Some(Position::Last),
                n if n >= 1 => Some(Position::Nth(n as usize)),
                _ => None,
            },
            Value::String(s) => parse_ordinal(s),
            _ => None,
        }
    }

    /// True when the entities describe a multi-field search form.
    pub fn is_form_search(&self) -> bool {
        self.origin().is_some() || self.destination().is_some() || self.date().is_some()
    }
}

// ============================================================
// Execution Plan
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Click,
    Input,
    /// Type then confirm the first autocomplete suggestion.
    InputSelect,
    Select,
    Check,
    Scroll,
    Navigate,
    HistoryBack,
    Read,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Click => "click",
            StepAction::Input => "input",
            StepAction::InputSelect => "input_select",
            StepAction::Select => "select",
            StepAction::Check => "check",
            StepAction::Scroll => "scroll",
            StepAction::Navigate => "navigate",
            StepAction::HistoryBack => "history_back",
            StepAction::Read => "read",
        }
    }

    /// The intent action a step re-resolves under when its target goes stale.
    pub fn intent_action(&self) -> ActionKind {
        match self {
            StepAction::Click => ActionKind::Click,
            StepAction::Input | StepAction::InputSelect => ActionKind::Input,
            StepAction::Select => ActionKind::Select,
            StepAction::Check => ActionKind::Check,
            StepAction::Scroll => ActionKind::Scroll,
            StepAction::Navigate => ActionKind::Navigate,
            StepAction::HistoryBack => ActionKind::Back,
            StepAction::Read => ActionKind::Read,
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes a target well enough to find "the same" node in a later snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSignature {
    pub role: String,
    pub name: String,
    /// Index among nodes sharing this role and name, in document order.
    #[serde(default)]
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_id: String,
    pub action_type: StepAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NodeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<TargetSignature>,
    /// Resolved against a fresh snapshot when the step is reached, for
    /// targets that only appear after earlier steps ran (calendar cells).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ExecutionStep {
    pub fn new(step_id: impl Into<String>, action_type: StepAction) -> Self {
        Self {
            step_id: step_id.into(),
            action_type,
            target: None,
            signature: None,
            lookup: None,
            value: None,
            confidence: 1.0,
            notes: None,
            optional: false,
            timeout_ms: None,
        }
    }

    /// True when the step must be pointed at a node before it can run.
    pub fn awaits_target(&self) -> bool {
        self.target.is_none() && self.lookup.is_some()
    }

    /// True when the step targets a node that is not part of `snapshot`.
    pub fn is_stale_for(&self, snapshot: &SnapshotId) -> bool {
        self.target
            .as_ref()
            .is_some_and(|t| !t.belongs_to(snapshot))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default = "plan_schema")]
    pub schema_version: String,
    pub id: String,
    pub intent_id: String,
    pub snapshot: SnapshotId,
    pub steps: Vec<ExecutionStep>,
}

fn plan_schema() -> String {
    PLAN_SCHEMA.to_string()
}

impl Versioned for ExecutionPlan {
    const SCHEMA_VERSION: &'static str = PLAN_SCHEMA;
}

impl ExecutionPlan {
    pub fn new(intent_id: &str, snapshot: SnapshotId, steps: Vec<ExecutionStep>) -> Self {
        Self {
            schema_version: plan_schema(),
            id: generate_id(),
            intent_id: intent_id.to_string(),
            snapshot,
            steps,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default = "result_schema")]
    pub schema_version: String,
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub attempts: u32,
}

fn result_schema() -> String {
    RESULT_SCHEMA.to_string()
}

impl Versioned for ExecutionResult {
    const SCHEMA_VERSION: &'static str = RESULT_SCHEMA;
}

impl ExecutionResult {
    pub fn success(step_id: &str, duration_ms: u64, attempts: u32) -> Self {
        Self {
            schema_version: result_schema(),
            step_id: step_id.to_string(),
            status: StepStatus::Success,
            error: None,
            error_code: None,
            duration_ms,
            attempts,
        }
    }

    pub fn failed(step_id: &str, code: &str, error: String, duration_ms: u64, attempts: u32) -> Self {
        Self {
            schema_version: result_schema(),
            step_id: step_id.to_string(),
            status: StepStatus::Failed,
            error: Some(error),
            error_code: Some(code.to_string()),
            duration_ms,
            attempts,
        }
    }

    pub fn skipped(step_id: &str, reason: &str) -> Self {
        Self {
            schema_version: result_schema(),
            step_id: step_id.to_string(),
            status: StepStatus::Skipped,
            error: Some(reason.to_string()),
            error_code: None,
            duration_ms: 0,
            attempts: 0,
        }
    }
}

/// What the step invoker reports back for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The step caused a full page navigation.
    #[serde(default)]
    pub navigated: bool,
}

impl InvocationOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            navigated: false,
        }
    }

    pub fn navigated() -> Self {
        Self {
            success: true,
            message: None,
            navigated: true,
        }
    }

    pub fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
            navigated: false,
        }
    }
}

// ============================================================
// Clarification
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationReason {
    /// Several candidates scored within the tie margin of each other.
    MultipleEqualTargets,
    /// Candidates exist but none cleared the acceptance threshold.
    LowConfidence,
    /// Exactly one weak candidate.
    SingleWeakCandidate,
    /// A required value is missing from the intent.
    MissingValue,
}

impl ClarificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClarificationReason::MultipleEqualTargets => "multiple_equal_targets",
            ClarificationReason::LowConfidence => "low_confidence",
            ClarificationReason::SingleWeakCandidate => "single_weak_candidate",
            ClarificationReason::MissingValue => "missing_value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationOption {
    pub label: String,
    #[serde(default)]
    pub candidate_node_ids: Vec<NodeRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    #[serde(default = "clarification_schema")]
    pub schema_version: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub question: String,
    pub reason: ClarificationReason,
    #[serde(default)]
    pub options: Vec<ClarificationOption>,
}

fn clarification_schema() -> String {
    CLARIFICATION_SCHEMA.to_string()
}

impl Versioned for ClarificationRequest {
    const SCHEMA_VERSION: &'static str = CLARIFICATION_SCHEMA;
}

impl ClarificationRequest {
    pub fn new(
        question: impl Into<String>,
        reason: ClarificationReason,
        options: Vec<ClarificationOption>,
    ) -> Self {
        Self {
            schema_version: clarification_schema(),
            id: generate_id(),
            trace_id: None,
            question: question.into(),
            reason,
            options,
        }
    }

    /// True when some option carries `node`.
    pub fn offers(&self, node: &NodeRef) -> bool {
        self.options
            .iter()
            .any(|o| o.candidate_node_ids.contains(node))
    }
}

/// An answer arriving on the clarification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClarificationAnswer {
    /// Zero-based index into the request's options.
    Option { index: usize },
    Candidate { node: NodeRef },
    Text { text: String },
}

impl fmt::Display for ClarificationAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClarificationAnswer::Option { index } => write!(f, "option #{}", index + 1),
            ClarificationAnswer::Candidate { node } => write!(f, "candidate {}", node),
            ClarificationAnswer::Text { text } => write!(f, "{:?}", text),
        }
    }
}

/// One question/answer round kept for later disambiguation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationExchange {
    pub question: String,
    pub reason: ClarificationReason,
    pub answer: ClarificationAnswer,
    /// Label text of the option the answer settled on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_label: Option<String>,
}
