use super::schema::EngineConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Finds the first config file that exists among a list of candidates.
/// With none present the defaults apply.
pub struct ConfigLoader {
    candidates: Vec<PathBuf>,
}

impl ConfigLoader {
    /// `./axnav.yaml`, then `~/.axnav/config.yaml`.
    pub fn new() -> Self {
        let mut candidates = vec![PathBuf::from("axnav.yaml")];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".axnav").join("config.yaml"));
        }
        Self { candidates }
    }

    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    pub async fn load(&self) -> Result<EngineConfig, ConfigError> {
        for path in &self.candidates {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Self::load_from(path).await;
            }
        }
        debug!("No config file among {:?}; using defaults", self.candidates);
        Ok(EngineConfig::default())
    }

    pub async fn load_default() -> Result<EngineConfig, ConfigError> {
        Self::new().load().await
    }

    pub async fn load_from(path: &Path) -> Result<EngineConfig, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: EngineConfig =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Reports the first setting the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matcher;
        let rules = [
            (
                m.accept_threshold > 0.0 && m.accept_threshold <= 1.0,
                "matcher.accept_threshold must be in (0, 1]",
            ),
            (
                (0.0..=m.accept_threshold).contains(&m.min_floor),
                "matcher.min_floor must be in [0, accept_threshold]",
            ),
            (
                (0.0..1.0).contains(&m.tie_margin),
                "matcher.tie_margin must be in [0, 1)",
            ),
            (m.max_options >= 2, "matcher.max_options must be at least 2"),
            (
                (0.0..=1.0).contains(&m.fuzzy_threshold),
                "matcher.fuzzy_threshold must be in [0, 1]",
            ),
            (
                self.resolver.max_refresh_attempts == 0 || !self.resolver.probe_order.is_empty(),
                "resolver.probe_order cannot be empty when refreshes are allowed",
            ),
            (
                self.supervisor.step_timeout_ms > 0,
                "supervisor.step_timeout_ms must be positive",
            ),
        ];

        match rules.iter().find(|(ok, _)| !ok) {
            Some((_, rule)) => Err(ConfigError::Invalid((*rule).to_string())),
            None => Ok(()),
        }
    }
}
