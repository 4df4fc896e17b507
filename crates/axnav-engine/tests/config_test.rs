mod common;

use axnav_engine::config::{ConfigError, ConfigLoader, EngineConfig};
use axnav_engine::protocol::{ActionKind, Intent, Node, ProbeHint};
use axnav_engine::session::{FileSessionStore, SessionStatus, SessionStore, StartPolicy};
use axnav_engine::{Engine, EngineError};
use common::{context, page, MockPage};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn yaml(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_partial_file_keeps_defaults() {
    let file = yaml(
        r#"
matcher:
  accept_threshold: 0.7
resolver:
  max_refresh_attempts: 2
  probe_order: [wait_for_content, scroll_forward]
supervisor:
  max_retries: 0
"#,
    );

    let config = ConfigLoader::load_from(file.path()).await.unwrap();
    let defaults = EngineConfig::default();

    assert_eq!(config.matcher.accept_threshold, 0.7);
    assert_eq!(config.matcher.tie_margin, defaults.matcher.tie_margin);
    assert_eq!(config.resolver.max_refresh_attempts, 2);
    assert_eq!(
        config.resolver.probe_order,
        vec![ProbeHint::WaitForContent, ProbeHint::ScrollForward]
    );
    assert_eq!(config.supervisor.max_retries, 0);
    assert_eq!(config.supervisor.step_timeout_ms, defaults.supervisor.step_timeout_ms);
    assert!(config.sessions.persist_dir.is_none());
}

#[tokio::test]
async fn test_inconsistent_thresholds_are_rejected() {
    let file = yaml(
        r#"
matcher:
  accept_threshold: 0.4
  min_floor: 0.6
"#,
    );
    let err = ConfigLoader::load_from(file.path()).await.unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("min_floor")));
}

#[tokio::test]
async fn test_empty_probe_order_is_rejected() {
    let file = yaml("resolver:\n  probe_order: []\n");
    let err = ConfigLoader::load_from(file.path()).await.unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[tokio::test]
async fn test_malformed_yaml() {
    let file = yaml("matcher: [not, a, map]\n");
    let err = ConfigLoader::load_from(file.path()).await.unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[tokio::test]
async fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::load_from(&dir.path().join("absent.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[tokio::test]
async fn test_from_config_persists_to_directory() {
    let dir = TempDir::new().unwrap();
    let mut config = common::fast_config();
    config.sessions.persist_dir = Some(dir.path().to_path_buf());
    config.sessions.supersede = true;

    let mock = MockPage::new(page("s1", vec![Node::new("1", "button", "Save")]));
    let engine = Engine::from_config(config, mock.clone(), mock.clone(), mock.clone())
        .await
        .unwrap();
    assert_eq!(engine.default_policy(), StartPolicy::Supersede);

    engine
        .submit(&context(), Intent::new(ActionKind::Click, "save"), engine.default_policy())
        .await
        .unwrap();

    let store = FileSessionStore::new(dir.path()).await.unwrap();
    let stored = store.load(&context()).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_from_config_validates() {
    let mut config = EngineConfig::default();
    config.supervisor.step_timeout_ms = 0;
    let mock = MockPage::blank();

    let err = Engine::from_config(config, mock.clone(), mock.clone(), mock)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::Config(ConfigError::Invalid(_))));
}
