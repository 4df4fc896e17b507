use axnav_common::protocol::ProbeHint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum confidence for the top candidate to be taken without asking.
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    /// The top candidate must lead the runner-up by more than this.
    #[serde(default = "default_tie_margin")]
    pub tie_margin: f64,
    /// Candidates below this are not considered at all.
    #[serde(default = "default_min_floor")]
    pub min_floor: f64,
    #[serde(default = "default_max_options")]
    pub max_options: usize,
    /// Jaro-Winkler similarity at which two tokens count as the same word.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// Upper bound of the bonus earned by matching earlier clarification answers.
    #[serde(default = "default_history_bonus")]
    pub history_bonus: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            accept_threshold: default_accept_threshold(),
            tie_margin: default_tie_margin(),
            min_floor: default_min_floor(),
            max_options: default_max_options(),
            fuzzy_threshold: default_fuzzy_threshold(),
            history_bonus: default_history_bonus(),
        }
    }
}

fn default_accept_threshold() -> f64 {
    0.5
}

fn default_tie_margin() -> f64 {
    0.15
}

fn default_min_floor() -> f64 {
    0.2
}

fn default_max_options() -> usize {
    5
}

fn default_fuzzy_threshold() -> f64 {
    0.9
}

fn default_history_bonus() -> f64 {
    0.15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_max_refresh_attempts")]
    pub max_refresh_attempts: u32,
    #[serde(default = "default_probe_order")]
    pub probe_order: Vec<ProbeHint>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_refresh_attempts: default_max_refresh_attempts(),
            probe_order: default_probe_order(),
        }
    }
}

fn default_max_refresh_attempts() -> u32 {
    4
}

fn default_probe_order() -> Vec<ProbeHint> {
    ProbeHint::ESCALATION.to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Bound on a single wait for the navigation signal.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
        }
    }
}

fn default_step_timeout_ms() -> u64 {
    4000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_navigation_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory for persisted sessions; in-memory only when unset.
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,
    /// Replace an active session on submit instead of rejecting the new one.
    #[serde(default)]
    pub supersede: bool,
}
