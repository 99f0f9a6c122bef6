use crate::common::{fixtures, stderr_of, stdout_of, tagsweep};

#[test]
fn help_describes_the_inputs() {
    let assert = tagsweep().arg("--help").assert().success();
    let stdout = stdout_of(assert);

    for flag in ["--dry", "--file-match", "--extra-fields", "--format"] {
        assert!(stdout.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn offline_dry_run_is_an_empty_plan() {
    let manifest = fixtures().join("docker-compose.yml");
    let before = std::fs::read_to_string(&manifest).expect("fixture exists");

    // All lookups fail offline; per-reference failures never fail the
    // run, so this must succeed with nothing to report.
    let assert = tagsweep()
        .args(["--dry", "--offline", "--format", "json"])
        .arg(fixtures())
        .assert()
        .success();

    let plan: serde_json::Value =
        serde_json::from_str(&stdout_of(assert)).expect("plan output is JSON");
    assert_eq!(plan, serde_json::json!([]));

    // Dry runs never touch the tree.
    let after = std::fs::read_to_string(&manifest).expect("fixture still exists");
    assert_eq!(before, after);
}

#[test]
fn github_format_is_silent_for_an_empty_plan() {
    let assert = tagsweep()
        .args(["--dry", "--offline", "--format", "github"])
        .arg(fixtures())
        .assert()
        .success();

    assert_eq!(stdout_of(assert), "");
}

#[test]
fn offline_dry_run_reports_nothing_to_update() {
    let assert = tagsweep()
        .args(["--dry", "--offline"])
        .arg(fixtures())
        .assert()
        .success();

    assert_eq!(stdout_of(assert), "Nothing to update.\n");
}

#[test]
fn no_matching_files_is_a_successful_noop() {
    let assert = tagsweep()
        .args(["--dry", "--offline", "--format", "json"])
        .args(["--file-match", "**/*.does-not-exist"])
        .arg(fixtures())
        .assert()
        .success();

    let plan: serde_json::Value =
        serde_json::from_str(&stdout_of(assert)).expect("plan output is JSON");
    assert_eq!(plan, serde_json::json!([]));
}

#[test]
fn malformed_template_fails_before_scanning() {
    let assert = tagsweep()
        .args(["--dry", "--offline"])
        .args([
            "--extra-fields",
            r#"{"portainer_version": "portainer/portainer-ce"}"#,
        ])
        .arg(fixtures())
        .assert()
        .failure();

    let stderr = stderr_of(assert);
    assert!(stderr.contains("fatal"), "missing fatal marker: {stderr}");
    assert!(
        stderr.contains("portainer_version"),
        "error must name the offending field: {stderr}"
    );
}

#[test]
fn malformed_extra_fields_json_fails_before_scanning() {
    tagsweep()
        .args(["--dry", "--offline", "--extra-fields", "{not json"])
        .arg(fixtures())
        .assert()
        .failure();
}
