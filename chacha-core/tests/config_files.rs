use std::fs;

use chacha_core::{load_chacha_config, ConfigError, InteractionKind, OracleKind};
use tempfile::TempDir;

#[test]
fn loads_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chacha.toml");
    fs::write(
        &path,
        r#"
[automl]
global_lease = 20
max_live_configs = 5
priority_challengers = 2
significance_level = 0.1
estimator_decay = 0.999
lb_trick = true
interactions = "cubic"
oracle = "rand"
catalog_cap = 64
seed = 42
enabled_reductions = ["cb_adf", "cb_explore_adf"]

[logging]
filter = "automl.champion=info"
"#,
    )
    .unwrap();

    let config = load_chacha_config(&path).expect("config should load");
    assert_eq!(config.automl.global_lease, 20);
    assert_eq!(config.automl.resolved_priority_challengers(), 2);
    assert_eq!(config.automl.interactions, InteractionKind::Cubic);
    assert_eq!(config.automl.oracle, OracleKind::Rand);
    assert_eq!(config.automl.catalog_cap, Some(64));
    assert!(config.automl.lb_trick);
    assert_eq!(config.logging.filter, "automl.champion=info");
}

#[test]
fn empty_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.toml");
    fs::write(&path, "").unwrap();
    let config = load_chacha_config(&path).expect("defaults are valid");
    assert_eq!(config.automl.max_live_configs, 4);
    assert_eq!(config.logging.filter, "info");
}

#[test]
fn reports_missing_and_malformed_files() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        load_chacha_config(&missing),
        Err(ConfigError::Io { path, .. }) if path == missing
    ));

    let malformed = dir.path().join("bad.toml");
    fs::write(&malformed, "[automl]\nmax_live_configs = \"many\"\n").unwrap();
    assert!(matches!(
        load_chacha_config(&malformed),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn rejects_incompatible_reduction_at_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chacha.toml");
    fs::write(&path, "[automl]\nenabled_reductions = [\"memory_tree\"]\n").unwrap();
    match load_chacha_config(&path) {
        Err(ConfigError::Incompatible { reduction }) => assert_eq!(reduction, "memory_tree"),
        other => panic!("expected incompatible reduction, got {other:?}"),
    }
}
