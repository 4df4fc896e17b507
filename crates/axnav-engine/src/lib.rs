pub mod backend;
pub mod clarification;
pub mod config;
pub mod engine;
pub mod matcher;
pub mod resolution;
pub mod session;
pub mod supervisor;

pub use axnav_common::error;
pub use axnav_common::formatter;
pub use axnav_common::protocol;
pub use engine::{Engine, EngineError, SessionReport};
