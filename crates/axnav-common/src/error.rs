use crate::protocol::{NodeId, ProtocolError};

/// Failures reported by the snapshot provider, step invoker, or navigation signal.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    // ============================================================
    // Navigation Errors
    // ============================================================
    #[error("Navigation failed: {0}")]
    Navigation(String),

    // ============================================================
    // Node Errors
    // ============================================================
    #[error("Node {id} not found")]
    NodeNotFound { id: NodeId },

    #[error("Node {id} is stale (snapshot superseded)")]
    NodeStale { id: NodeId },

    #[error("Node {id} is not visible")]
    NodeNotVisible { id: NodeId },

    #[error("Node {id} is disabled")]
    NodeDisabled { id: NodeId },

    #[error("Node {id} is not actionable: {reason}")]
    NotActionable { id: NodeId, reason: String },

    #[error("Option not found: {value}")]
    OptionNotFound { value: String },

    // ============================================================
    // Execution Errors
    // ============================================================
    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    #[error("Step rejected: {0}")]
    Rejected(String),

    // ============================================================
    // Protocol Errors
    // ============================================================
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ============================================================
    // System Errors
    // ============================================================
    #[error("Connection lost")]
    ConnectionLost,

    #[error("Not ready")]
    NotReady,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Other: {0}")]
    Other(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Serialization(err.to_string())
    }
}

impl From<ProtocolError> for ProviderError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidSnapshot(msg) => ProviderError::InvalidSnapshot(msg),
            other => ProviderError::Serialization(other.to_string()),
        }
    }
}

impl ProviderError {
    pub fn timeout(operation: impl Into<String>) -> Self {
        ProviderError::Timeout {
            operation: operation.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Navigation(_) => "NAVIGATION_ERROR",
            ProviderError::NodeNotFound { .. } => "NODE_NOT_FOUND",
            ProviderError::NodeStale { .. } => "NODE_STALE",
            ProviderError::NodeNotVisible { .. } => "NODE_NOT_VISIBLE",
            ProviderError::NodeDisabled { .. } => "NODE_DISABLED",
            ProviderError::NotActionable { .. } => "NOT_ACTIONABLE",
            ProviderError::OptionNotFound { .. } => "OPTION_NOT_FOUND",
            ProviderError::Timeout { .. } => "TIMEOUT",
            ProviderError::Rejected(_) => "STEP_REJECTED",
            ProviderError::InvalidSnapshot(_) => "INVALID_SNAPSHOT",
            ProviderError::InvalidRequest(_) => "INVALID_REQUEST",
            ProviderError::ConnectionLost => "CONNECTION_LOST",
            ProviderError::NotReady => "NOT_READY",
            ProviderError::Serialization(_) => "SERIALIZATION_ERROR",
            ProviderError::NotSupported(_) => "NOT_SUPPORTED",
            ProviderError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Failures worth retrying with the same step.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout { .. }
                | ProviderError::NotActionable { .. }
                | ProviderError::NodeNotVisible { .. }
                | ProviderError::NotReady
                | ProviderError::ConnectionLost
        )
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ProviderError::NodeNotFound { .. } | ProviderError::NodeStale { .. } => {
                "Capture a fresh snapshot and re-resolve the target"
            }
            ProviderError::NodeNotVisible { .. } => "Scroll node into view or wait",
            ProviderError::NodeDisabled { .. } => "Wait for node to become enabled",
            ProviderError::NotActionable { .. } => "Wait for the page to settle and retry",
            ProviderError::Timeout { .. } => "Increase step timeout or verify page state",
            ProviderError::Navigation(_) => "Check URL and network connectivity",
            ProviderError::ConnectionLost | ProviderError::NotReady => {
                "Reconnect to the browsing context"
            }
            _ => "Check step parameters",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::timeout("click").is_transient());
        assert!(
            ProviderError::NotActionable {
                id: NodeId::new("4"),
                reason: "covered".into()
            }
            .is_transient()
        );
        assert!(ProviderError::NotReady.is_transient());
        assert!(!ProviderError::NodeDisabled { id: NodeId::new("4") }.is_transient());
        assert!(!ProviderError::Rejected("no".into()).is_transient());
    }

    #[test]
    fn test_codes_and_hints() {
        let err = ProviderError::NodeStale { id: NodeId::new("7") };
        assert_eq!(err.code(), "NODE_STALE");
        assert!(err.recovery_hint().contains("fresh snapshot"));
        assert_eq!(err.to_string(), "Node 7 is stale (snapshot superseded)");
    }
}
