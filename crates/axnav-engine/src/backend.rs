use async_trait::async_trait;
pub use axnav_common::error::ProviderError;
use axnav_common::protocol::{
    ContextId, ExecutionStep, InvocationOutcome, ProbeHint, TreeSnapshot,
};

/// Captures accessibility tree snapshots of a live browsing context.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Capture the tree as it currently is.
    async fn capture(&self, context: &ContextId) -> Result<TreeSnapshot, ProviderError>;

    /// Perform a passive, reversible refresh and capture again.
    /// Providers that cannot honour a hint fall back to a plain capture.
    async fn probe(
        &self,
        context: &ContextId,
        _hint: ProbeHint,
    ) -> Result<TreeSnapshot, ProviderError> {
        self.capture(context).await
    }
}

/// Performs one plan step against the live target.
#[async_trait]
pub trait StepInvoker: Send + Sync {
    async fn invoke(
        &self,
        context: &ContextId,
        step: &ExecutionStep,
    ) -> Result<InvocationOutcome, ProviderError>;
}

/// Tells the supervisor when a navigated context is ready again.
#[async_trait]
pub trait NavigationSignal: Send + Sync {
    async fn wait_ready(&self, context: &ContextId) -> Result<(), ProviderError>;
}
