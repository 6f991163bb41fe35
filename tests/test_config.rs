use log_filter::config::{ConfigError, load_config, load_config_from_path};
use log_filter::filter::FilterError;
use log_filter::lower::{SelectMode, Stage};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const CONFIG: &str = r#"
[lowering]
match_prefix = "__flt"

[[pipelines]]
tag = "app.web"

[pipelines.filters]
errors = "severity >= ERROR OR jsonPayload.level = error"

[[pipelines]]
tag = "app.worker"
mode = "exclude"

[pipelines.filters]
health = 'jsonPayload.path : "/healthz"'
"#;

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("write file");
}

#[test]
fn test_load_missing_file() {
    let dir = tempdir().expect("temp dir");
    let err = load_config_from_path(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().contains("missing.toml"));
}

#[test]
fn test_load_malformed_file() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("bad.toml");
    write_file(&path, "[[pipelines]\ntag = 1\n");
    assert!(matches!(
        load_config_from_path(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_load_without_path_gives_defaults() {
    let config = load_config(None).unwrap();
    assert_eq!(config.lowering.nest_key, "record");
    assert!(config.pipelines.is_empty());
}

#[test]
fn test_load_and_compile() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("filters.toml");
    write_file(&path, &CONFIG.replace("severity >= ERROR OR ", ""));

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.lowering.match_prefix, "__flt");
    assert_eq!(config.lowering.nest_key, "record");
    assert_eq!(config.pipelines.len(), 2);
    assert_eq!(config.pipelines[0].mode, SelectMode::Include);

    let compiled = config.compile().unwrap();
    assert_eq!(compiled[1].mode, SelectMode::Exclude);
    assert_eq!(
        compiled[1].filters["health"].to_string(),
        r#"jsonPayload.path : "/healthz""#
    );
    for pipeline in &compiled {
        assert!(pipeline.stages.iter().all(|s| s.match_tag() == pipeline.tag));
    }
    assert!(compiled[1].stages.iter().any(|stage| matches!(
        stage,
        Stage::Grep { mode: SelectMode::Exclude, key, .. } if key == "__flt_app_2eworker"
    )));
}

#[test]
fn test_compile_names_the_failing_filter() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("filters.toml");
    write_file(&path, CONFIG);

    let err = load_config(Some(&path)).unwrap().compile().unwrap_err();
    match &err {
        ConfigError::InvalidFilter { tag, name, source } => {
            assert_eq!(tag, "app.web");
            assert_eq!(name, "errors");
            assert!(matches!(source, FilterError::UnsupportedOperator(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}
