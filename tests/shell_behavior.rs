//! End-to-end behavior tests against the built binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn den() -> Command {
    Command::cargo_bin("den").unwrap()
}

fn run(script: &str) -> assert_cmd::assert::Assert {
    den().arg("-c").arg(script).assert()
}

// ----------------------------------------------------------------------
// Pipelines and exit status
// ----------------------------------------------------------------------

#[test]
fn pipeline_word_count() {
    run("echo a b c | wc -w")
        .success()
        .stdout(predicate::str::diff("3").trim());
}

#[test]
fn pipe_status_is_last_stage() {
    run("false | true").success();
    run("true | false").failure();
}

#[test]
fn pipefail_rightmost_failure() {
    run("set -o pipefail; false | true").code(1);
    run("set -o pipefail; true | false | true").code(1);
    run("set -o pipefail; true | true").success();
}

#[test]
fn negated_pipeline() {
    run("! false").success();
    run("! true").code(1);
}

// ----------------------------------------------------------------------
// Variables, quoting, expansion
// ----------------------------------------------------------------------

#[test]
fn subshell_isolation() {
    run("x=1; (x=2); echo $x").success().stdout("1\n");
}

#[test]
fn single_quotes_suppress_expansion() {
    den()
        .arg("-c")
        .arg("VAR=set; echo '$VAR'")
        .assert()
        .success()
        .stdout("$VAR\n");
}

#[test]
fn expansion_order_and_splitting() {
    run("VAR=hello; echo $VAR world").success().stdout("hello world\n");
    run("VAR=hello; echo \"$VAR world\"").success().stdout("hello world\n");
    run("IFS=:; VAR=a:b:c; set -- $VAR; echo $#").success().stdout("3\n");
}

#[test]
fn nounset_is_fatal_for_the_command() {
    run("set -u; echo $UNDEF")
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("UNDEF"));
}

#[test]
fn readonly_rejects_assignment() {
    run("readonly X=1; X=2 2>/dev/null; echo status=$? value=$X")
        .success()
        .stdout(predicate::str::contains("status=1 value=1"));
}

#[test]
fn parameter_operations() {
    run("echo ${UNSET:-fallback}").success().stdout("fallback\n");
    run("V=hello; echo ${#V}").success().stdout("5\n");
    run("P=a/b/c.txt; echo ${P##*/} ${P%.*}").success().stdout("c.txt a/b/c\n");
    run("S='one two'; echo ${S/two/2}").success().stdout("one 2\n");
}

#[test]
fn arithmetic_expansion() {
    run("echo $((2 + 3 * 4))").success().stdout("14\n");
    run("x=5; echo $((x * x))").success().stdout("25\n");
    run("echo $((16#ff))").success().stdout("255\n");
}

#[test]
fn brace_expansion() {
    run("echo {a,b}{1,2}").success().stdout("a1 a2 b1 b2\n");
    run("echo {1..4}").success().stdout("1 2 3 4\n");
}

#[test]
fn command_substitution() {
    run("echo $(echo nested)").success().stdout("nested\n");
    run("echo `echo legacy`").success().stdout("legacy\n");
    run("out=$(printf 'a\\nb\\n'); echo \"$out\"").success().stdout("a\nb\n");
}

#[test]
fn arrays() {
    run("A=(x y z); echo ${A[1]} ${#A[@]}").success().stdout("y 3\n");
    run("A=(x y z); echo ${A[@]}").success().stdout("x y z\n");
}

// ----------------------------------------------------------------------
// Control flow
// ----------------------------------------------------------------------

#[test]
fn for_loop_output() {
    run("for i in 1 2 3; do echo $i; done").success().stdout("1\n2\n3\n");
}

#[test]
fn while_loop_with_arithmetic() {
    run("i=0; while [ $i -lt 3 ]; do echo $i; i=$((i+1)); done")
        .success()
        .stdout("0\n1\n2\n");
}

#[test]
fn function_return_status() {
    run("f() { return 7; }; f; echo $?").success().stdout("7\n");
}

#[test]
fn function_local_scope() {
    run("f() { local v=1; }; v=0; f; echo $v").success().stdout("0\n");
}

#[test]
fn case_matching() {
    run("case foo in f*) echo match;; *) echo no;; esac").success().stdout("match\n");
}

#[test]
fn errexit_scope() {
    run("set -e; if false; then :; fi; echo ok").success().stdout("ok\n");
    run("set -e; false; echo unreachable").failure().stdout("");
}

#[test]
fn conditional_command() {
    run("[[ abc == a* ]] && echo yes").success().stdout("yes\n");
    run("[[ 5 -gt 3 ]] && echo bigger").success().stdout("bigger\n");
    run("[[ abc =~ ^a.c$ ]] && echo re").success().stdout("re\n");
}

#[test]
fn break_and_continue() {
    run("for i in 1 2 3 4; do [ $i = 3 ] && break; echo $i; done")
        .success()
        .stdout("1\n2\n");
    run("for i in 1 2 3; do [ $i = 2 ] && continue; echo $i; done")
        .success()
        .stdout("1\n3\n");
}

// ----------------------------------------------------------------------
// Redirections
// ----------------------------------------------------------------------

#[test]
fn append_and_truncate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t");
    run(&format!(
        "echo one > {p}; echo two >> {p}; cat {p}",
        p = path.display()
    ))
    .success()
    .stdout("one\ntwo\n");
}

#[test]
fn stderr_duplication_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("both");
    // >file 2>&1 captures both streams.
    run(&format!(
        "sh -c 'echo out; echo err >&2' > {p} 2>&1; wc -l < {p}",
        p = path.display()
    ))
    .success()
    .stdout(predicate::str::diff("2").trim());
}

#[test]
fn heredoc_body() {
    run("cat <<EOF\nline $((1+1))\nEOF").success().stdout("line 2\n");
    run("cat <<'EOF'\n$HOME stays\nEOF").success().stdout("$HOME stays\n");
}

#[test]
fn herestring() {
    run("cat <<< 'here string'").success().stdout("here string\n");
}

#[test]
fn glob_without_match_stays_literal() {
    run("echo /no/such/*x").success().stdout("/no/such/*x\n");
    run("shopt -s nullglob; echo /no/such/*x").success().stdout("\n");
}

// ----------------------------------------------------------------------
// Aliases, traps, jobs
// ----------------------------------------------------------------------

#[test]
fn alias_expands_once() {
    run("alias e='echo aliased'; e done").success().stdout("aliased done\n");
    // Self-referencing aliases terminate.
    run("alias echo='echo wrapped'; echo x").success().stdout("wrapped x\n");
}

#[test]
fn exit_trap_runs_on_exit() {
    run("trap 'echo bye' EXIT; exit 3").code(3).stdout("bye\n");
}

#[test]
fn err_then_exit_trap_order() {
    run("trap 'echo ERR' ERR; trap 'echo EXIT' EXIT; set -e; false")
        .failure()
        .stdout("ERR\nEXIT\n");
}

#[test]
fn background_job_and_wait() {
    run("sleep 0.05 & wait; echo done").success().stdout(predicate::str::contains("done"));
}

#[test]
fn background_pid_is_real_and_kill_terminates_it() {
    // $! must name the actual child: kill it, then wait reports 128+15.
    run("sleep 5 & pid=$!; kill $pid; wait $pid; echo status=$?")
        .success()
        .stdout(predicate::str::contains("status=143"));
}

#[test]
fn kill_accepts_job_specs() {
    run("sleep 5 & kill %1; wait; echo reaped")
        .success()
        .stdout(predicate::str::contains("reaped"));
}

#[test]
fn fg_waits_for_background_job() {
    run("sleep 0.05 & fg > /dev/null; echo done")
        .success()
        .stdout(predicate::str::contains("done"));
}

#[test]
fn bg_reports_running_job() {
    run("sleep 0.05 & bg %1; wait")
        .success()
        .stdout(predicate::str::contains("sleep 0.05"));
}

// ----------------------------------------------------------------------
// Builtins
// ----------------------------------------------------------------------

#[test]
fn cd_updates_pwd() {
    run("cd /; pwd").success().stdout("/\n");
    run("cd /tmp; cd /; cd -; pwd")
        .success()
        .stdout(predicate::str::contains("/tmp"));
}

#[test]
fn shift_positional() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("s.sh");
    std::fs::write(&script, "shift; echo $1\n").unwrap();
    den()
        .arg(script.display().to_string())
        .arg("a")
        .arg("b")
        .assert()
        .success()
        .stdout("b\n");
}

#[test]
fn printf_formats() {
    run("printf '%s=%d\\n' x 5").success().stdout("x=5\n");
    run("printf '%05d\\n' 42").success().stdout("00042\n");
}

#[test]
fn read_splits_fields() {
    run("printf 'a b c\\n' | { read x y; echo \"$y\"; }")
        .success()
        .stdout(predicate::str::contains("b c"));
}

#[test]
fn test_builtin() {
    run("[ 3 -gt 1 ] && echo gt").success().stdout("gt\n");
    run("test -d / && echo dir").success().stdout("dir\n");
}

#[test]
fn type_reports_kinds() {
    run("type cd").success().stdout(predicate::str::contains("builtin"));
    run("type if").success().stdout(predicate::str::contains("keyword"));
}

#[test]
fn eval_builtin() {
    run("cmd='echo evaluated'; eval $cmd").success().stdout("evaluated\n");
}

#[test]
fn source_builtin() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib.sh");
    std::fs::write(&lib, "sourced_var=hello\n").unwrap();
    run(&format!(". {}; echo $sourced_var", lib.display()))
        .success()
        .stdout("hello\n");
}

#[test]
fn command_not_found_is_127() {
    run("definitely-not-a-command-zz 2>/dev/null").code(127);
}

// ----------------------------------------------------------------------
// Scripts
// ----------------------------------------------------------------------

#[test]
fn script_positional_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("args.sh");
    std::fs::write(&script, "echo $0 has $# args: $1 $2\n").unwrap();
    den()
        .arg(script.display().to_string())
        .arg("one")
        .arg("two")
        .assert()
        .success()
        .stdout(predicate::str::contains("has 2 args: one two"));
}

#[test]
fn script_exit_code_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fail.sh");
    std::fs::write(&script, "exit 42\n").unwrap();
    den().arg(script.display().to_string()).assert().code(42);
}

#[test]
fn multiline_script_with_functions() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("multi.sh");
    std::fs::write(
        &script,
        "greet() {\n  echo \"hi $1\"\n}\nfor name in ana bob; do\n  greet $name\ndone\n",
    )
    .unwrap();
    den()
        .arg(script.display().to_string())
        .assert()
        .success()
        .stdout("hi ana\nhi bob\n");
}
