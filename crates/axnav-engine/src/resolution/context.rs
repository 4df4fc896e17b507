use axnav_common::protocol::{Node, NodeId, TreeSnapshot};

/// Everything a resolution rule may look at.
pub struct ResolutionContext<'a> {
    pub snapshot: &'a TreeSnapshot,

    /// Restrict lookups to descendants of this node
    scope: Option<NodeId>,

    /// Nodes already claimed by earlier steps of the same plan
    claimed: Vec<NodeId>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(snapshot: &'a TreeSnapshot) -> Self {
        Self {
            snapshot,
            scope: None,
            claimed: Vec::new(),
        }
    }

    pub fn with_claimed(mut self, claimed: &[NodeId]) -> Self {
        self.claimed = claimed.to_vec();
        self
    }

    /// Create a context restricted to the subtree under `container`.
    pub fn scoped_to(&self, container: &NodeId) -> ResolutionContext<'a> {
        ResolutionContext {
            snapshot: self.snapshot,
            scope: Some(container.clone()),
            claimed: self.claimed.clone(),
        }
    }

    /// Unclaimed nodes in document order, limited to the scope if one is set.
    pub fn elements(&self) -> impl Iterator<Item = &'a Node> + '_ {
        let snapshot = self.snapshot;
        snapshot.nodes.iter().filter(move |n| {
            !self.claimed.contains(&n.id)
                && self
                    .scope
                    .as_ref()
                    .is_none_or(|scope| is_descendant(snapshot, n, scope))
        })
    }

    pub fn get(&self, id: &NodeId) -> Option<&'a Node> {
        self.snapshot.get(id)
    }

    pub fn claimed(&self) -> &[NodeId] {
        &self.claimed
    }
}

/// True when `ancestor` appears on the parent chain of `node`.
pub fn is_descendant(snapshot: &TreeSnapshot, node: &Node, ancestor: &NodeId) -> bool {
    let mut current = node.parent_id.as_ref();
    let mut hops = 0;
    while let Some(parent) = current {
        if parent == ancestor {
            return true;
        }
        hops += 1;
        if hops > snapshot.nodes.len() {
            return false;
        }
        current = snapshot.get(parent).and_then(|p| p.parent_id.as_ref());
    }
    false
}

/// Closest common container of two nodes, if they share one.
pub fn common_ancestor<'a>(snapshot: &'a TreeSnapshot, a: &Node, b: &Node) -> Option<&'a Node> {
    let mut current = a.parent_id.as_ref();
    let mut hops = 0;
    while let Some(id) = current {
        if b.id == *id || is_descendant(snapshot, b, id) {
            return snapshot.get(id);
        }
        hops += 1;
        if hops > snapshot.nodes.len() {
            return None;
        }
        current = snapshot.get(id).and_then(|p| p.parent_id.as_ref());
    }
    None
}
