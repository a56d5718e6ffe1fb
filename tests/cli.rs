//! CLI surface tests: argument handling, JSON wrapping, startup files.

use assert_cmd::Command;
use predicates::prelude::*;

fn den() -> Command {
    Command::cargo_bin("den").unwrap()
}

#[test]
fn dash_c_runs_and_propagates_status() {
    den().arg("-c").arg("exit 7").assert().code(7);
    den().arg("-c").arg("true").assert().success();
}

#[test]
fn version_subcommand() {
    den()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("den "));
}

#[test]
fn exec_subcommand_joins_words() {
    den()
        .args(["exec", "echo", "joined", "words"])
        .assert()
        .success()
        .stdout("joined words\n");
}

#[test]
fn json_wraps_exit_code() {
    den()
        .args(["-c", "true", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"exit_code\":0"));

    den()
        .args(["-c", "exit 3", "--json"])
        .assert()
        .code(3)
        .stdout(
            predicate::str::contains("\"exit_code\":3")
                .and(predicate::str::contains("\"error\"")),
        );
}

#[test]
fn json_passes_command_stdout_through() {
    den()
        .args(["-c", "echo payload", "--json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("payload")
                .and(predicate::str::contains("\"exit_code\":0")),
        );
}

#[test]
fn script_from_stdin() {
    den()
        .write_stdin("echo from-stdin\n")
        .assert()
        .success()
        .stdout("from-stdin\n");
}

#[test]
fn config_file_replaces_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let rc = dir.path().join("rc");
    std::fs::write(&rc, "config_marker=loaded\n").unwrap();

    den()
        .arg("--config")
        .arg(rc.display().to_string())
        .arg("-c")
        .arg("echo $config_marker")
        .assert()
        .success()
        .stdout("loaded\n");
}

#[test]
fn missing_script_reports_error() {
    den()
        .arg("/no/such/script.sh")
        .assert()
        .code(127)
        .stderr(predicate::str::contains("script.sh"));
}

#[test]
fn environment_is_inherited() {
    den()
        .env("FROM_ENV", "visible")
        .args(["-c", "echo $FROM_ENV"])
        .assert()
        .success()
        .stdout("visible\n");
}

#[test]
fn exported_variables_reach_children() {
    den()
        .args(["-c", "export CHILD_SEES=yes; sh -c 'echo $CHILD_SEES'"])
        .assert()
        .success()
        .stdout("yes\n");
}
