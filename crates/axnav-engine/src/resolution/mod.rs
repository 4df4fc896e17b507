//! From a matched intent to an executable plan, and back again when the
//! page changes under a plan.

pub mod association;
pub mod context;
pub mod inference;
pub mod planner;
pub mod reidentify;
pub mod resolver;
pub mod site;

pub use association::find_associated_control;
pub use context::ResolutionContext;
pub use inference::InferenceRule;
pub use planner::{PlanOutcome, Planner};
pub use reidentify::{ReidentifyError, reidentify, signature_for};
pub use resolver::{
    Clarification, MultiStepResolver, NoMatchReport, Resolution, ResolvedPlan, ResolvedStep,
};
pub use site::map_site_to_url;
