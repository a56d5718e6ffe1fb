//! The executor: statements → processes, builtins and state changes.
//!
//! Walks the AST statement by statement: `&&`/`||` short-circuit between
//! pipeline results, `&` registers a background job, errexit and the ERR
//! trap fire on failures that are not exempted (conditions, negated
//! pipelines, non-final members of a chain), and DEBUG runs before each
//! simple command. Command resolution order: alias (done at the word
//! level), function, builtin, external.

use std::collections::HashMap;

use crate::ast::{
    Assignment, ChainOperator, Command, Script, SimpleCommand, Statement, Word,
};

use super::alias;
use super::builtins;
use super::control_flow;
use super::errors::ExecError;
use super::expansion::{expand_assignment_value, expand_words};
use super::functions;
use super::io::CommandIo;
use super::pipeline::execute_pipeline;
use super::redirect::apply_redirections;
use super::signals;
use super::spawn;
use super::state::ShellState;
use super::vars::Variable;

/// Execute a whole script; the shell-level result of the last statement.
pub fn execute_script(
    state: &mut ShellState,
    script: &Script,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    execute_statements(state, &script.statements, io)
}

/// Execute a statement list sequentially; each statement's status is
/// committed before the next begins.
pub fn execute_statements(
    state: &mut ShellState,
    statements: &[Statement],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    let mut status = state.last_exit_code;
    for statement in statements {
        checkpoint(state, io);
        status = execute_statement(state, statement, io)?;
    }
    Ok(status)
}

/// Trap/job checkpoint between commands: reap children flagged by
/// SIGCHLD, fire pending signal traps.
pub fn checkpoint(state: &mut ShellState, io: &CommandIo) {
    if signals::take_sigchld() {
        state.jobs.reap();
    }
    for signal in signals::take_pending_signals() {
        if let Some(text) = state.traps.signals.get(&signal).cloned() {
            if !text.is_empty() {
                run_trap(state, &text, io);
            }
        }
    }
}

/// Execute one and-or list.
pub fn execute_statement(
    state: &mut ShellState,
    statement: &Statement,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if state.options.noexec {
        return Ok(0);
    }

    if state.options.verbose {
        if let Some(source) = &statement.source_text {
            use std::io::Write;
            let mut stderr = io.stderr_writer();
            let _ = writeln!(stderr, "{}", source);
        }
    }

    if statement.background {
        return launch_background(state, statement, io);
    }

    let mut status = 0;
    let mut last_ran = 0usize;

    for (index, pipeline) in statement.pipelines.iter().enumerate() {
        if index > 0 {
            let skip = match statement.operators[index - 1] {
                ChainOperator::And => status != 0,
                ChainOperator::Or => status == 0,
            };
            if skip {
                continue;
            }
        }
        status = execute_pipeline(state, pipeline, io)?;
        last_ran = index;
    }

    // errexit / ERR: only the final pipeline of the chain is subject, and
    // negated pipelines and condition contexts are exempt.
    let subject = last_ran == statement.pipelines.len() - 1
        && !statement.pipelines[last_ran].negated
        && !state.in_condition
        && !state.traps.running;

    if status != 0 && subject {
        // Without errtrace the ERR trap stays at the top level; `set -E`
        // carries it into function frames.
        if state.call_depth == 0 || state.options.errtrace {
            if let Some(text) = state.traps.err.clone() {
                run_trap(state, &text, io);
            }
        }
        if state.options.errexit {
            return Err(ExecError::Errexit(status));
        }
    }

    Ok(status)
}

fn launch_background(
    state: &mut ShellState,
    statement: &Statement,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    // A single external simple command backgrounds as a real OS child so
    // `$!`, `kill`, `fg` and `bg` act on a real pid; anything more
    // complex falls back to a shell-side thread job.
    if let Some(status) = try_background_process(state, statement, io)? {
        return Ok(status);
    }

    let mut foreground = statement.clone();
    foreground.background = false;

    let mut bg_state = state.clone();
    bg_state.is_subshell = true;
    let bg_io = io
        .try_clone()
        .map_err(|e| ExecError::Fatal(format!("cannot duplicate fds: {}", e)))?;

    let handle = std::thread::spawn(move || {
        match execute_statement(&mut bg_state, &foreground, &bg_io) {
            Ok(status) => status,
            Err(ExecError::Exit(code))
            | Err(ExecError::Errexit(code))
            | Err(ExecError::Return(code)) => code,
            Err(_) => 1,
        }
    });

    let command_line = statement.source_text.clone().unwrap_or_default();
    let (id, pid) = state.jobs.add_thread(handle, command_line);
    state.last_background_pid = Some(pid);
    if state.interactive {
        use std::io::Write;
        let mut stderr = io.stderr_writer();
        let _ = writeln!(stderr, "[{}] {}", id, pid);
    }
    state.last_exit_code = 0;
    Ok(0)
}

/// Spawn `cmd args… &` directly when the statement is one simple command
/// that resolves to an external program. Expansion runs against a cloned
/// state (a background command's side effects belong to its subshell);
/// the child's real pid lands in the job table. Returns None when the
/// statement needs the thread path instead.
fn try_background_process(
    state: &mut ShellState,
    statement: &Statement,
    io: &CommandIo,
) -> Result<Option<i32>, ExecError> {
    if statement.pipelines.len() != 1 {
        return Ok(None);
    }
    let pipeline = &statement.pipelines[0];
    if pipeline.negated || pipeline.commands.len() != 1 {
        return Ok(None);
    }
    let Command::Simple(simple) = &pipeline.commands[0] else {
        return Ok(None);
    };
    if simple.name.is_none() {
        return Ok(None);
    }

    let mut sub_state = state.clone();
    sub_state.is_subshell = true;
    let command = alias::expand_aliases(&sub_state, simple);
    if command.name.is_none() {
        return Ok(None);
    }

    let mut words: Vec<Word> = Vec::with_capacity(command.args.len() + 1);
    words.push(command.name.clone().unwrap());
    words.extend(command.args.iter().cloned());
    let fields = match expand_words(&mut sub_state, &words) {
        Ok(fields) => fields,
        // Expansion failures (and their diagnostics) belong to the
        // subshell; let the thread path surface them.
        Err(_) => return Ok(None),
    };
    let Some(name) = fields.first() else {
        return Ok(None);
    };
    if sub_state.functions.contains_key(name) || builtins::find(name).is_some() {
        return Ok(None);
    }
    let Some(path) = spawn::resolve_external(&mut sub_state, name) else {
        // The thread path reports command-not-found.
        return Ok(None);
    };

    let mut scoped = io
        .try_clone()
        .map_err(|e| ExecError::Fatal(format!("cannot duplicate fds: {}", e)))?;
    if let Err(err) = apply_redirections(&mut sub_state, &mut scoped, &command.redirections) {
        use std::io::Write;
        let mut stderr = io.stderr_writer();
        let _ = writeln!(stderr, "den: {}", err);
        state.last_exit_code = 1;
        return Ok(Some(1));
    }

    let mut extra_env: HashMap<String, String> = HashMap::new();
    for assignment in &command.assignments {
        let value = match &assignment.value {
            Some(word) => match expand_assignment_value(&mut sub_state, word) {
                Ok(value) => value,
                Err(_) => return Ok(None),
            },
            None => String::new(),
        };
        extra_env.insert(assignment.name.clone(), value);
    }

    match spawn::spawn_external(&sub_state, &path, &fields, &extra_env, &scoped) {
        Ok(child) => {
            let pid = child.id();
            // The Child handle is dropped without waiting; the job table
            // reaps the pid at the next checkpoint or in `wait`.
            drop(child);
            let command_line = statement.source_text.clone().unwrap_or_default();
            let id = state.jobs.add_process(pid, command_line);
            state.last_background_pid = Some(pid);
            if state.interactive {
                use std::io::Write;
                let mut stderr = io.stderr_writer();
                let _ = writeln!(stderr, "[{}] {}", id, pid);
            }
            state.last_exit_code = 0;
            Ok(Some(0))
        }
        Err(failure) => {
            use std::io::Write;
            let mut stderr = io.stderr_writer();
            let _ = writeln!(stderr, "den: {}", failure.message);
            state.last_exit_code = failure.status;
            Ok(Some(failure.status))
        }
    }
}

/// Execute a single command node (pipeline stage or standalone).
pub fn execute_command(
    state: &mut ShellState,
    command: &Command,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    match command {
        Command::Simple(simple) => execute_simple(state, simple, io),
        Command::Compound(compound) => {
            let mut scoped = io
                .try_clone()
                .map_err(|e| ExecError::Fatal(format!("cannot duplicate fds: {}", e)))?;
            if let Err(err) = apply_redirections(state, &mut scoped, compound.redirections()) {
                return command_error(state, io, err);
            }
            control_flow::execute_compound(state, compound, &scoped)
        }
        Command::FunctionDef(def) => {
            state.functions.insert(def.name.clone(), def.clone());
            state.last_exit_code = 0;
            Ok(0)
        }
    }
}

/// Report a command-scoped failure (expansion/redirection) and return its
/// status; anything else keeps unwinding.
fn command_error(
    state: &mut ShellState,
    io: &CommandIo,
    err: ExecError,
) -> Result<i32, ExecError> {
    match err.command_status() {
        Some(status) => {
            use std::io::Write;
            let mut stderr = io.stderr_writer();
            let _ = writeln!(stderr, "den: {}", err);
            state.last_exit_code = status;
            Ok(status)
        }
        None => Err(err),
    }
}

pub fn execute_simple(
    state: &mut ShellState,
    command: &SimpleCommand,
    io: &CommandIo,
) -> Result<i32, ExecError> {
    state.current_line = command.line;

    if let Some(text) = state.traps.debug.clone() {
        if !state.traps.running {
            run_trap(state, &text, io);
        }
    }

    let command = alias::expand_aliases(state, command);

    // Assignment-only command: variables persist in the shell.
    if command.name.is_none() {
        match io.try_clone() {
            Ok(mut scratch) => {
                if let Err(err) = apply_redirections(state, &mut scratch, &command.redirections) {
                    return command_error(state, io, err);
                }
            }
            Err(e) => return Err(ExecError::Fatal(format!("cannot duplicate fds: {}", e))),
        }
        state.last_exit_code = 0;
        for assignment in &command.assignments {
            if let Err(err) = apply_assignment(state, assignment) {
                return command_error(state, io, err);
            }
        }
        return Ok(state.last_exit_code);
    }

    // Expand argv.
    let mut words: Vec<Word> = Vec::with_capacity(command.args.len() + 1);
    words.push(command.name.clone().unwrap());
    words.extend(command.args.iter().cloned());
    let fields = match expand_words(state, &words) {
        Ok(fields) => fields,
        Err(err) => return command_error(state, io, err),
    };

    if fields.is_empty() {
        // All words expanded away; redirections and assignments still run.
        match io.try_clone() {
            Ok(mut scratch) => {
                if let Err(err) = apply_redirections(state, &mut scratch, &command.redirections) {
                    return command_error(state, io, err);
                }
            }
            Err(e) => return Err(ExecError::Fatal(format!("cannot duplicate fds: {}", e))),
        }
        for assignment in &command.assignments {
            if let Err(err) = apply_assignment(state, assignment) {
                return command_error(state, io, err);
            }
        }
        return Ok(0);
    }

    if state.options.xtrace {
        use std::io::Write;
        let mut stderr = io.stderr_writer();
        let _ = writeln!(stderr, "+ {}", fields.join(" "));
    }

    // Expand assignment prefixes into temporary bindings.
    let mut bindings: Vec<(String, String)> = Vec::new();
    for assignment in &command.assignments {
        let value = match &assignment.value {
            Some(word) => match expand_assignment_value(state, word) {
                Ok(value) => value,
                Err(err) => return command_error(state, io, err),
            },
            None => String::new(),
        };
        bindings.push((assignment.name.clone(), value));
    }

    let name = fields[0].clone();
    let args: Vec<String> = fields[1..].to_vec();
    let status = run_resolved(state, &command, &name, &fields, &args, &bindings, io)?;

    state.last_arg = fields.last().cloned().unwrap_or_default();
    state.last_exit_code = status;
    Ok(status)
}

/// Resolution order: function, builtin, external.
#[allow(clippy::too_many_arguments)]
fn run_resolved(
    state: &mut ShellState,
    command: &SimpleCommand,
    name: &str,
    fields: &[String],
    args: &[String],
    bindings: &[(String, String)],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    // `exec` with only redirections rewrites the shell's own fds; the
    // redirection list must not be burned on a command-scoped io.
    if name == "exec" && args.is_empty() && !state.functions.contains_key("exec") {
        return builtins::eval_cmd::run_exec_redirections(state, &command.redirections, io);
    }

    if let Some(def) = state.functions.get(name).cloned() {
        let mut scoped = io
            .try_clone()
            .map_err(|e| ExecError::Fatal(format!("cannot duplicate fds: {}", e)))?;
        if let Err(err) = apply_redirections(state, &mut scoped, &command.redirections) {
            return command_error(state, io, err);
        }
        let saved = bind_temporaries(state, bindings);
        let result = functions::invoke_function(state, &def, args, &scoped);
        unbind_temporaries(state, saved);
        return result;
    }

    if let Some(handler) = builtins::lookup(state, name) {
        let mut scoped = io
            .try_clone()
            .map_err(|e| ExecError::Fatal(format!("cannot duplicate fds: {}", e)))?;
        if let Err(err) = apply_redirections(state, &mut scoped, &command.redirections) {
            return command_error(state, io, err);
        }
        let saved = bind_temporaries(state, bindings);
        let result = handler(state, name, args, &scoped);
        unbind_temporaries(state, saved);
        return match result {
            // POSIX: a usage error in a special builtin exits a
            // non-interactive shell; regular builtins just fail the
            // command.
            Ok(status) => {
                if status == 2 && builtins::is_special(name) && !state.interactive {
                    Err(ExecError::Exit(status))
                } else {
                    Ok(status)
                }
            }
            Err(err) => command_error(state, io, err),
        };
    }

    let mut scoped = io
        .try_clone()
        .map_err(|e| ExecError::Fatal(format!("cannot duplicate fds: {}", e)))?;
    if let Err(err) = apply_redirections(state, &mut scoped, &command.redirections) {
        return command_error(state, io, err);
    }
    let extra_env: HashMap<String, String> = bindings.iter().cloned().collect();
    spawn::run_external(state, fields, &extra_env, &scoped)
}

/// Apply `VAR=value` / `VAR+=value` / `VAR[i]=value` / `VAR=(…)` to the
/// shell.
pub fn apply_assignment(state: &mut ShellState, assignment: &Assignment) -> Result<(), ExecError> {
    if let Some(elements) = &assignment.array {
        let mut values = Vec::new();
        for word in elements {
            values.extend(expand_words(state, std::slice::from_ref(word))?);
        }
        return state
            .set_array(&assignment.name, values, assignment.append)
            .map_err(|e| ExecError::Expansion { message: e, status: 1 });
    }

    let value = match &assignment.value {
        Some(word) => expand_assignment_value(state, word)?,
        None => String::new(),
    };

    if let Some(subscript) = &assignment.subscript {
        return state
            .set_element(&assignment.name, subscript, value)
            .map_err(|e| ExecError::Expansion { message: e, status: 1 });
    }

    let result = if assignment.append {
        state.append_string(&assignment.name, value)
    } else {
        state.set_string(&assignment.name, value)
    };
    result.map_err(|e| ExecError::Expansion { message: e, status: 1 })
}

/// Set prefix assignments for the duration of one command, exported.
fn bind_temporaries(
    state: &mut ShellState,
    bindings: &[(String, String)],
) -> Vec<(String, Option<Variable>)> {
    let mut saved = Vec::with_capacity(bindings.len());
    for (name, value) in bindings {
        saved.push((name.clone(), state.snapshot_var(name)));
        if state.set_string(name, value.clone()).is_ok() {
            let _ = state.modify_attrs(name, |a| a.exported = true);
        }
    }
    saved
}

fn unbind_temporaries(state: &mut ShellState, saved: Vec<(String, Option<Variable>)>) {
    for (name, snapshot) in saved.into_iter().rev() {
        state.restore_var(&name, snapshot);
    }
}

/// Run a trap body. `$?` is preserved around the trap and traps do not
/// re-enter.
pub fn run_trap(state: &mut ShellState, text: &str, io: &CommandIo) {
    if state.traps.running {
        return;
    }
    let Ok(script) = crate::parser::parse(text) else {
        use std::io::Write;
        let mut stderr = io.stderr_writer();
        let _ = writeln!(stderr, "den: trap: syntax error in trap command");
        return;
    };

    state.traps.running = true;
    let saved_status = state.last_exit_code;
    let _ = execute_statements(state, &script.statements, io);
    state.last_exit_code = saved_status;
    state.traps.running = false;
}

/// Fire the EXIT trap exactly once, at shell teardown.
pub fn fire_exit_trap(state: &mut ShellState, io: &CommandIo) {
    if state.traps.exit_fired {
        return;
    }
    state.traps.exit_fired = true;
    if let Some(text) = state.traps.exit.clone() {
        run_trap(state, &text, io);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn run(state: &mut ShellState, input: &str) -> Result<i32, ExecError> {
        let script = parse(input).unwrap();
        execute_script(state, &script, &CommandIo::inherit())
    }

    fn test_state() -> ShellState {
        let mut state = ShellState::default();
        state.set_string("PATH", "/usr/bin:/bin".to_string()).unwrap();
        state
    }

    #[test]
    fn assignment_only_sets_variable() {
        let mut state = test_state();
        run(&mut state, "X=1").unwrap();
        assert_eq!(state.get_string("X"), Some("1".to_string()));
    }

    #[test]
    fn and_or_short_circuit() {
        let mut state = test_state();
        run(&mut state, "true && X=yes").unwrap();
        assert_eq!(state.get_string("X"), Some("yes".to_string()));

        run(&mut state, "false && Y=no").unwrap();
        assert_eq!(state.get_string("Y"), None);

        run(&mut state, "false || Z=fallback").unwrap();
        assert_eq!(state.get_string("Z"), Some("fallback".to_string()));
    }

    #[test]
    fn readonly_assignment_fails_without_mutation() {
        let mut state = test_state();
        run(&mut state, "readonly R=1").unwrap();
        let status = run(&mut state, "R=2").unwrap();
        assert_ne!(status, 0);
        assert_eq!(state.get_string("R"), Some("1".to_string()));
    }

    #[test]
    fn errexit_stops_script() {
        let mut state = test_state();
        state.options.errexit = true;
        let result = run(&mut state, "false; X=after");
        assert!(matches!(result, Err(ExecError::Errexit(1))));
        assert_eq!(state.get_string("X"), None);
    }

    #[test]
    fn errexit_exempts_conditions() {
        let mut state = test_state();
        state.options.errexit = true;
        let status = run(&mut state, "if false; then :; fi; X=ok").unwrap();
        assert_eq!(status, 0);
        assert_eq!(state.get_string("X"), Some("ok".to_string()));
    }

    #[test]
    fn errexit_exempts_negation_and_chain_members() {
        let mut state = test_state();
        state.options.errexit = true;
        assert!(run(&mut state, "! true; X=1").is_ok());
        assert!(run(&mut state, "false || true; Y=1").is_ok());
        assert_eq!(state.get_string("Y"), Some("1".to_string()));
    }

    #[test]
    fn function_definition_and_call() {
        let mut state = test_state();
        run(&mut state, "f() { return 7; }").unwrap();
        let status = run(&mut state, "f").unwrap();
        assert_eq!(status, 7);
        assert_eq!(state.last_exit_code, 7);
    }

    #[test]
    fn function_shadows_builtin() {
        let mut state = test_state();
        run(&mut state, "true() { return 3; }").unwrap();
        assert_eq!(run(&mut state, "true").unwrap(), 3);
    }

    #[test]
    fn temp_bindings_restore() {
        let mut state = test_state();
        run(&mut state, "V=outer").unwrap();
        run(&mut state, "V=inner true").unwrap();
        assert_eq!(state.get_string("V"), Some("outer".to_string()));
    }

    #[test]
    fn temp_bindings_reach_function() {
        let mut state = test_state();
        run(&mut state, "f() { seen=$V; }; V=tmp f").unwrap();
        assert_eq!(state.get_string("seen"), Some("tmp".to_string()));
        assert_eq!(state.get_string("V"), None);
    }

    #[test]
    fn not_found_is_127() {
        let mut state = test_state();
        let status = run(&mut state, "no-such-command-zzz 2>/dev/null").unwrap();
        assert_eq!(status, 127);
    }

    #[test]
    fn err_trap_fires_before_exit() {
        let mut state = test_state();
        state.options.errexit = true;
        run(&mut state, "trap 'mark=err' ERR").unwrap();
        let result = run(&mut state, "false");
        assert!(matches!(result, Err(ExecError::Errexit(_))));
        assert_eq!(state.get_string("mark"), Some("err".to_string()));
    }

    #[test]
    fn err_trap_fires_without_errexit() {
        let mut state = test_state();
        run(&mut state, "trap 'mark=seen' ERR").unwrap();
        run(&mut state, "false").unwrap();
        assert_eq!(state.get_string("mark"), Some("seen".to_string()));
    }

    #[test]
    fn exit_trap_once() {
        let mut state = test_state();
        run(&mut state, "trap 'count=$((count+1))' EXIT").unwrap();
        let io = CommandIo::inherit();
        fire_exit_trap(&mut state, &io);
        fire_exit_trap(&mut state, &io);
        assert_eq!(state.get_string("count"), Some("1".to_string()));
    }

    #[test]
    fn background_job_registered() {
        let mut state = test_state();
        run(&mut state, "true &").unwrap();
        assert!(state.last_background_pid.is_some());
        assert_eq!(state.jobs.jobs().len(), 1);
        state.jobs.wait_all();
    }

    #[test]
    fn background_external_is_a_process_job() {
        let mut state = test_state();
        run(&mut state, "sleep 0.05 &").unwrap();
        let pid = state.last_background_pid.unwrap();
        let job = state.jobs.jobs().last().unwrap();
        // A process job carries the real child pid and no thread handle.
        assert_eq!(job.pid, pid);
        assert!(job.handle.is_none());
        state.jobs.wait_all();
    }

    #[test]
    fn background_compound_falls_back_to_thread_job() {
        let mut state = test_state();
        run(&mut state, "{ true; } &").unwrap();
        let job = state.jobs.jobs().last().unwrap();
        assert!(job.handle.is_some());
        state.jobs.wait_all();
    }

    #[test]
    fn special_builtin_usage_error_exits_script() {
        let mut state = test_state();
        let result = run(&mut state, "shift bogus 2>/dev/null; X=after");
        assert!(matches!(result, Err(ExecError::Exit(2))), "got {:?}", result);
        assert_eq!(state.get_string("X"), None);
    }

    #[test]
    fn regular_builtin_usage_error_continues() {
        let mut state = test_state();
        run(&mut state, "[ x 2>/dev/null; X=after").unwrap();
        assert_eq!(state.get_string("X"), Some("after".to_string()));
    }

    #[test]
    fn special_builtin_usage_error_spares_interactive_shell() {
        let mut state = test_state();
        state.interactive = true;
        let status = run(&mut state, "shift bogus 2>/dev/null").unwrap();
        assert_eq!(status, 2);
    }

    #[test]
    fn command_substitution_sets_status() {
        let mut state = test_state();
        run(&mut state, "out=$(echo hi)").unwrap();
        assert_eq!(state.get_string("out"), Some("hi".to_string()));
    }

    #[test]
    fn quoted_expansion_is_single_arg() {
        let mut state = test_state();
        run(&mut state, "V='a b'; set -- \"$V\"").unwrap();
        assert_eq!(state.positional, vec!["a b".to_string()]);
        run(&mut state, "set -- $V").unwrap();
        assert_eq!(state.positional, vec!["a".to_string(), "b".to_string()]);
    }
}
