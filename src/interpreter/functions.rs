//! Shell function invocation.
//!
//! A call pushes a scope frame, swaps in the call arguments as positional
//! parameters, and runs the body compound. `return` unwinds to the call
//! site; loop bookkeeping is isolated so `break` inside a function cannot
//! escape into the caller's loops.

use crate::ast::FunctionDef;

use super::control_flow;
use super::errors::ExecError;
use super::io::CommandIo;
use super::redirect::apply_redirections;
use super::state::ShellState;

const MAX_CALL_DEPTH: u32 = 512;

pub fn invoke_function(
    state: &mut ShellState,
    def: &FunctionDef,
    args: &[String],
    io: &CommandIo,
) -> Result<i32, ExecError> {
    if state.call_depth >= MAX_CALL_DEPTH {
        return Err(ExecError::Fatal(format!(
            "{}: maximum function nesting level exceeded",
            def.name
        )));
    }

    let saved_positional = std::mem::replace(&mut state.positional, args.to_vec());
    let saved_loop_depth = std::mem::replace(&mut state.loop_depth, 0);
    state.push_frame();

    let mut scoped_io = match io.try_clone() {
        Ok(io) => io,
        Err(e) => {
            state.pop_frame();
            state.positional = saved_positional;
            state.loop_depth = saved_loop_depth;
            return Err(ExecError::Fatal(format!("cannot duplicate fds: {}", e)));
        }
    };

    let result = apply_redirections(state, &mut scoped_io, &def.redirections)
        .and_then(|()| control_flow::execute_compound(state, &def.body, &scoped_io));

    state.pop_frame();
    state.positional = saved_positional;
    state.loop_depth = saved_loop_depth;

    match result {
        Ok(status) => Ok(status),
        Err(ExecError::Return(code)) => Ok(code),
        // break/continue do not cross a function boundary.
        Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => Ok(0),
        Err(other) => Err(other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Command;
    use crate::parser::parse;

    fn define(state: &mut ShellState, input: &str) -> FunctionDef {
        let script = parse(input).unwrap();
        match &script.statements[0].pipelines[0].commands[0] {
            Command::FunctionDef(def) => {
                state.functions.insert(def.name.clone(), def.clone());
                def.clone()
            }
            other => panic!("not a function def: {:?}", other),
        }
    }

    #[test]
    fn return_status_propagates() {
        let mut state = ShellState::default();
        let def = define(&mut state, "f() { return 7; }");
        let status =
            invoke_function(&mut state, &def, &[], &CommandIo::inherit()).unwrap();
        assert_eq!(status, 7);
    }

    #[test]
    fn positional_params_are_call_arguments() {
        let mut state = ShellState::default();
        state.positional = vec!["outer".to_string()];
        let def = define(&mut state, "f() { result=$1; }");
        invoke_function(
            &mut state,
            &def,
            &["inner".to_string()],
            &CommandIo::inherit(),
        )
        .unwrap();
        assert_eq!(state.get_string("result"), Some("inner".to_string()));
        assert_eq!(state.positional, vec!["outer".to_string()]);
    }

    #[test]
    fn local_variables_do_not_leak() {
        let mut state = ShellState::default();
        state.set_string("v", "0".to_string()).unwrap();
        let def = define(&mut state, "f() { local v=1; }");
        invoke_function(&mut state, &def, &[], &CommandIo::inherit()).unwrap();
        assert_eq!(state.get_string("v"), Some("0".to_string()));
    }

    #[test]
    fn plain_assignment_reaches_caller_scope() {
        let mut state = ShellState::default();
        state.set_string("g", "0".to_string()).unwrap();
        let def = define(&mut state, "f() { g=1; }");
        invoke_function(&mut state, &def, &[], &CommandIo::inherit()).unwrap();
        assert_eq!(state.get_string("g"), Some("1".to_string()));
    }

    #[test]
    fn recursion_limit_enforced() {
        let mut state = ShellState::default();
        state.call_depth = MAX_CALL_DEPTH;
        let def = define(&mut state, "f() { return 0; }");
        assert!(invoke_function(&mut state, &def, &[], &CommandIo::inherit()).is_err());
    }
}
