//! The interactive loop.
//!
//! States: awaiting-primary → (incomplete input) awaiting-continuation →
//! running-foreground → awaiting-primary. Ctrl-C at a prompt cancels the
//! input buffer and redraws; Ctrl-D on an empty buffer ends the session.
//! Line editing itself is rustyline's concern; the shell only supplies
//! prompts and consumes complete logical lines.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::history;
use crate::interpreter::executor;
use crate::interpreter::io::CommandIo;
use crate::interpreter::{signals, ExecError};
use crate::prompt;
use crate::shell::Shell;

pub fn run(shell: &mut Shell) -> i32 {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("den: cannot initialize line editor: {}", err);
            return 1;
        }
    };

    let history_path = history::history_path(&shell.state);
    if let Some(path) = &history_path {
        for entry in history::load_entries(path) {
            let _ = editor.add_history_entry(entry);
        }
    }

    let io = CommandIo::inherit();
    let mut buffer = String::new();

    loop {
        // Between commands: reap jobs, surface finished ones, run traps.
        executor::checkpoint(&mut shell.state, &io);
        for (id, command, job_state) in shell.state.jobs.take_notifications() {
            eprintln!("[{}]  {}  {}", id, job_state, command);
        }
        shell.state.jobs.prune();
        let _ = signals::take_sigint();

        let prompt_text = if buffer.is_empty() {
            prompt::primary_prompt(&shell.state)
        } else {
            prompt::continuation_prompt(&shell.state)
        };

        match editor.readline(&prompt_text) {
            Ok(line) => {
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&line);

                match crate::parser::parse(&buffer) {
                    Err(err) if err.is_incomplete() => {
                        // Keep accumulating under PS2.
                        continue;
                    }
                    Err(err) => {
                        eprintln!("den: syntax error: {}", err);
                        shell.state.last_exit_code = 2;
                        buffer.clear();
                    }
                    Ok(script) => {
                        let entry = std::mem::take(&mut buffer);
                        if !entry.trim().is_empty() {
                            let _ = editor.add_history_entry(entry.as_str());
                            if let Some(path) = &history_path {
                                let _ = history::append_entry(path, &entry);
                            }
                        }

                        match executor::execute_script(&mut shell.state, &script, &io) {
                            Ok(status) => {
                                shell.state.last_exit_code = status;
                            }
                            Err(ExecError::Exit(code)) | Err(ExecError::Errexit(code)) => {
                                return code;
                            }
                            Err(err) => {
                                eprintln!("den: {}", err);
                                shell.state.last_exit_code =
                                    err.command_status().unwrap_or(1);
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C: drop whatever was typed, fresh primary prompt.
                buffer.clear();
                shell.state.last_exit_code = 130;
            }
            Err(ReadlineError::Eof) => {
                if buffer.is_empty() {
                    return shell.state.last_exit_code;
                }
                buffer.clear();
            }
            Err(err) => {
                eprintln!("den: input error: {}", err);
                return shell.state.last_exit_code;
            }
        }
    }
}
