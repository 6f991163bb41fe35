use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_log-filter")
}

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("failed to write test file");
}

fn log_filter(args: &[&str]) -> Output {
    Command::new(bin())
        .args(["--color", "never"])
        .args(args)
        .env_remove("LOG_FILTER_CONFIG")
        .output()
        .expect("command should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_check_prints_canonical_form() {
    let output = log_filter(&["check", "foo=bar", "-severity = 1"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("ok foo = bar"), "stdout: {out}");
    assert!(out.contains("ok NOT severity = 1"), "stdout: {out}");
}

#[test]
fn test_filters_may_start_with_minus() {
    let output = log_filter(&["check", "-jsonPayload.a = 1"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("ok NOT jsonPayload.a = 1"));

    let output = log_filter(&["fmt", "-severity = 1"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "NOT severity = 1\n");

    let output = log_filter(&["lower", "-t", "app", "-jsonPayload.a"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Key_does_not_exist __match_app_0_0"));
}

#[test]
fn test_check_fails_on_invalid_filter() {
    let output = log_filter(&["check", "a = 1", "invalid/characters*here"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("error invalid/characters*here"));
    assert!(stderr(&output).contains("1 of 2 filters are invalid"));
}

#[test]
fn test_check_json() {
    let output = log_filter(&["-F", "json", "check", r#""missing operator""#]);
    assert!(!output.status.success());
    let entries: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(entries[0]["valid"], false);
    assert!(entries[0]["error"].as_str().unwrap().contains("text search"));
}

#[test]
fn test_fmt_check() {
    let output = log_filter(&["fmt", "--check", "a = 1 AND b = 2"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let output = log_filter(&["fmt", "--check", "a=1 b=2"]);
    assert!(!output.status.success());
    let out = stdout(&output);
    assert!(out.contains("-a=1 b=2"), "stdout: {out}");
    assert!(out.contains("+a = 1 AND b = 2"), "stdout: {out}");
    assert!(stderr(&output).contains("not in canonical form"));
}

#[test]
fn test_lower_text_and_json() {
    let output = log_filter(&["lower", "-t", "app", "jsonPayload.a = x"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert_eq!(out.matches("[FILTER]").count(), 6);
    assert!(out.contains("Key_value_matches $record['a'] (?i)^x$"), "stdout: {out}");
    assert!(out.contains("Regex __match_app 1"), "stdout: {out}");

    let output = log_filter(&[
        "-F",
        "json",
        "lower",
        "-t",
        "app",
        "-m",
        "exclude",
        "jsonPayload.a",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stages: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(stages[0]["kind"], "nest");
    assert_eq!(stages[3]["kind"], "grep");
    assert_eq!(stages[3]["mode"], "exclude");
}

#[test]
fn test_lower_reports_unimplemented_operator() {
    let output = log_filter(&["lower", "-t", "app", "a.b < 5"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Unimplemented operator: <"), "stderr: {err}");
}

#[test]
fn test_members() {
    let output = log_filter(&[
        "-F",
        "json",
        "members",
        r#"labels."logging.googleapis.com/foo""#,
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let entries: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(
        entries[0]["segments"],
        serde_json::json!(["labels", "logging.googleapis.com/foo"])
    );
    assert_eq!(
        entries[0]["accessor"],
        "$record['logging.googleapis.com/labels']['logging.googleapis.com/foo']"
    );

    let output = log_filter(&["members", "jsonPayload.foo = 1"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Not a field"));
}

#[test]
fn test_members_lua_accessors() {
    let output = log_filter(&["-F", "json", "members", "--lua", "jsonPayload.a.b"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let entries: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(
        entries[0]["lua"]["read"],
        "(function()\nif record[\"a\"] == nil\nthen\nreturn nil\nend\nreturn record[\"a\"][\"b\"]\nend)"
    );
    assert!(
        entries[0]["lua"]["write"]
            .as_str()
            .unwrap()
            .contains("record[\"a\"][\"b\"] = value")
    );

    let output = log_filter(&["-F", "json", "members", "jsonPayload.a"]);
    let entries: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert!(entries[0].get("lua").is_none());
}

#[test]
fn test_eval_record() {
    let dir = tempdir().expect("temp dir");
    let record = dir.path().join("record.json5");
    write_file(
        &record,
        "{\n  // trailing commas and comments are fine\n  level: 'error',\n  code: 503,\n}\n",
    );
    let record = record.to_str().expect("utf8 path");

    let output = log_filter(&[
        "eval",
        "-r",
        record,
        "jsonPayload.level = ERROR",
        "jsonPayload.code : 404",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("match jsonPayload.level = ERROR"), "stdout: {out}");
    assert!(out.contains("no    jsonPayload.code : 404"), "stdout: {out}");
    assert!(out.contains("record kept"), "stdout: {out}");

    let output = log_filter(&[
        "-F",
        "json",
        "eval",
        "-m",
        "exclude",
        "-r",
        record,
        "jsonPayload.code",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let result: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(result["kept"], false);
    assert_eq!(result["filters"]["jsonPayload.code"], true);
    assert!(result["record"].is_null());
}

#[test]
fn test_compile_with_output_file() {
    let dir = tempdir().expect("temp dir");
    let config = dir.path().join("filters.toml");
    let out = dir.path().join("fluent-bit.conf");
    write_file(
        &config,
        r#"
[[pipelines]]
tag = "syslog"
mode = "exclude"

[pipelines.filters]
noisy = 'jsonPayload.message : "health check"'
"#,
    );

    let output = log_filter(&[
        "-c",
        config.to_str().expect("utf8 path"),
        "-o",
        out.to_str().expect("utf8 path"),
        "compile",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let file_content = fs::read_to_string(&out).expect("output file should exist");
    assert_eq!(file_content, stdout(&output));
    assert!(file_content.starts_with("# Generated by log-filter compile\n"));
    assert!(file_content.contains("# Date: "));
    assert!(file_content.contains(r#"#   noisy: jsonPayload.message : "health check""#));
    assert!(file_content.contains("Exclude __match_syslog 1"));
    assert!(file_content.contains(r"Key_value_matches $record['message'] .*health\x20check.*"));
}

#[test]
fn test_compile_requires_config() {
    let output = log_filter(&["compile"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--config"));
}
