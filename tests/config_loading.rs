use std::io::Write;

use taskweave_core::config::AppConfig;
use taskweave_core::error::TaskweaveError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[scheduler]
worker_threads = 8
mapper_arg = "structures"
collect_key = "results"
choice_seed = 7

[session]
app = "docking"
realm = "lab"
system_user = "runner"
authrole = "admin"

[log]
filter = "taskweave=debug"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.scheduler.worker_threads, 8);
    assert_eq!(config.scheduler.mapper_arg, "structures");
    assert_eq!(config.scheduler.collect_key, "results");
    assert_eq!(config.scheduler.choice_seed, Some(7));
    assert_eq!(config.session.app, "docking");
    assert_eq!(config.session.realm.as_deref(), Some("lab"));
    assert_eq!(config.session.resolved_user(), "runner");
    assert_eq!(config.session.authrole, "admin");
    assert_eq!(config.log_filter(), Some("taskweave=debug"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("TASKWEAVE_TEST_REALM", "expanded-realm");

    let toml_content = r#"
[session]
realm = "${TASKWEAVE_TEST_REALM}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.session.realm, Some("expanded-realm".to_string()));

    std::env::remove_var("TASKWEAVE_TEST_REALM");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[scheduler]
worker_threads = 1
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.scheduler.worker_threads, 1);
    assert_eq!(config.scheduler.mapper_arg, "mapper");
    assert_eq!(config.session.app, "taskweave");
    assert!(config.log.is_none());
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, TaskweaveError::ConfigNotFound(_)));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = AppConfig::parse("[scheduler]\nchoice_seed = 3\n").expect("parse");
    let text = toml::to_string_pretty(&config).expect("serialize");
    let back = AppConfig::parse(&text).expect("reparse");
    assert_eq!(back.scheduler.choice_seed, Some(3));
    assert_eq!(back.session.authrole, "default");
}
