use std::path::PathBuf;

use assert_cmd::Command;

/// A `tagsweep` invocation with a scrubbed environment, so the host's
/// CI variables can't leak into test behavior.
pub(crate) fn tagsweep() -> Command {
    let mut cmd = Command::cargo_bin("tagsweep").expect("binary builds");
    for var in [
        "GITHUB_OUTPUT",
        "GITHUB_REPOSITORY",
        "INPUT_DRY",
        "INPUT_TOKEN",
        "INPUT_EXTRA-FIELDS",
        "INPUT_FILE-MATCH",
        "TAGSWEEP_OFFLINE",
        "NO_COLOR",
        "FORCE_COLOR",
        "CLICOLOR_FORCE",
    ] {
        cmd.env_remove(var);
    }
    cmd.arg("--color=never");
    cmd
}

pub(crate) fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/integration/fixtures")
}

pub(crate) fn stdout_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).expect("stdout is UTF-8")
}

pub(crate) fn stderr_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stderr.clone()).expect("stderr is UTF-8")
}
