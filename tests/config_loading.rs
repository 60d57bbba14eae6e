//! Configuration discovery through `EDGEQUAKE_RAG_CONFIG`.
//!
//! Tests must run serially due to shared environment state.

use std::path::PathBuf;

use edgequake_rag::config::CONFIG_ENV_VAR;
use edgequake_rag::{RagConfig, RagConfigError};
use serial_test::serial;

fn temp_config(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "edgequake-rag-{}.toml",
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::write(&path, contents).expect("write temp config");
    path
}

#[test]
#[serial]
fn test_env_var_config_is_loaded() {
    let path = temp_config(
        r#"
        [query]
        answer_token_offset = 256
        top_n = 3

        [retry]
        max_attempts = 2
        "#,
    );
    std::env::set_var(CONFIG_ENV_VAR, &path);

    let config = RagConfig::load().expect("config should load");
    assert_eq!(config.query.answer_token_offset, 256);
    assert_eq!(config.query.top_n, 3);
    assert_eq!(config.retry.max_attempts, 2);

    std::env::remove_var(CONFIG_ENV_VAR);
    let _ = std::fs::remove_file(path);
}

#[test]
#[serial]
fn test_invalid_env_config_is_rejected() {
    let path = temp_config("[retry]\nmax_attempts = 0\n");
    std::env::set_var(CONFIG_ENV_VAR, &path);

    let result = RagConfig::load();
    assert!(matches!(result, Err(RagConfigError::ValidationError(_))));

    std::env::remove_var(CONFIG_ENV_VAR);
    let _ = std::fs::remove_file(path);
}

#[test]
#[serial]
fn test_missing_env_file_falls_through() {
    std::env::set_var(CONFIG_ENV_VAR, "/nonexistent/edgequake/rag.toml");
    assert!(RagConfig::load().is_ok());
    std::env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_save_and_reload() {
    let mut config = RagConfig::default();
    config.query.preamble = Some("Answer only from the segments.".to_string());
    let path = temp_config("");

    config.save(&path).unwrap();
    let reloaded = RagConfig::from_file(&path).unwrap();
    assert_eq!(reloaded, config);

    let _ = std::fs::remove_file(path);
}
