//! Finding "the same" node in a later snapshot.
//!
//! Node ids are only meaningful inside the snapshot that produced them, so a
//! step planned against one snapshot carries a [`TargetSignature`] (role,
//! name, and position among look-alikes) that is matched afresh here.

use axnav_common::protocol::{Node, TargetSignature, TreeSnapshot};
use axnav_common::text::normalize_text;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReidentifyError {
    #[error("no {role} named {name:?} in snapshot")]
    NotFound { role: String, name: String },

    #[error("{count} nodes look like {role} {name:?} and none sits at position {ordinal}")]
    Ambiguous {
        role: String,
        name: String,
        count: usize,
        ordinal: usize,
    },
}

/// Describe `node` so it can be found again after the page changes.
pub fn signature_for(snapshot: &TreeSnapshot, node: &Node) -> TargetSignature {
    let ordinal = look_alikes(snapshot, &node.role, &node.name)
        .iter()
        .position(|n| n.id == node.id)
        .unwrap_or(0);
    TargetSignature {
        role: node.role.clone(),
        name: node.name.clone(),
        ordinal,
    }
}

/// Locate the node a signature describes.
///
/// A single role+name match is taken as is. Several matches are told apart
/// by the recorded ordinal; when the ordinal no longer fits, the result is
/// ambiguous rather than a guess.
pub fn reidentify<'a>(
    snapshot: &'a TreeSnapshot,
    signature: &TargetSignature,
) -> Result<&'a Node, ReidentifyError> {
    let matches = look_alikes(snapshot, &signature.role, &signature.name);
    match matches.as_slice() {
        [] => Err(ReidentifyError::NotFound {
            role: signature.role.clone(),
            name: signature.name.clone(),
        }),
        [only] => Ok(*only),
        many => many
            .get(signature.ordinal)
            .copied()
            .ok_or(ReidentifyError::Ambiguous {
                role: signature.role.clone(),
                name: signature.name.clone(),
                count: many.len(),
                ordinal: signature.ordinal,
            }),
    }
}

fn look_alikes<'a>(snapshot: &'a TreeSnapshot, role: &str, name: &str) -> Vec<&'a Node> {
    let name = normalize_text(name);
    snapshot
        .nodes
        .iter()
        .filter(|n| n.role.eq_ignore_ascii_case(role) && normalize_text(&n.name) == name)
        .collect()
}
