use std::path::PathBuf;

use clap::Parser;

use den::{Shell, ShellConfig};

#[derive(Parser)]
#[command(name = "den")]
#[command(about = "A POSIX-compatible command shell")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Run this command string and exit
    #[arg(short = 'c', value_name = "CMD")]
    command: Option<String>,

    /// Wrap the -c result as {"exit_code": N}
    #[arg(long)]
    json: bool,

    /// Load this configuration file instead of the defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Act as a login shell (read /etc/profile and ~/.den_profile)
    #[arg(short = 'l', long = "login")]
    login: bool,

    /// Subcommand (shell, exec, version), or a script path with its
    /// arguments
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let interactive = cli.command.is_none()
        && (cli.args.is_empty() || cli.args[0] == "shell")
        && is_stdin_tty();

    let mut shell = Shell::new(ShellConfig {
        interactive,
        login: cli.login,
        config_path: cli.config,
    });

    // -c "CMD" runs first regardless of trailing words.
    if let Some(command) = cli.command {
        let status = shell.run_command(&command);
        if cli.json {
            print_json_result(status);
        }
        std::process::exit(status);
    }

    let status = match cli.args.first().map(|s| s.as_str()) {
        None | Some("shell") => {
            if interactive {
                shell.run_interactive()
            } else {
                run_stdin(&mut shell)
            }
        }
        Some("version") => {
            println!("den {}", env!("CARGO_PKG_VERSION"));
            0
        }
        Some("help") => {
            use clap::CommandFactory;
            let _ = Cli::command().print_help();
            0
        }
        Some("exec") => {
            // Join the remaining words into one command line.
            let command = cli.args[1..].join(" ");
            shell.run_command(&command)
        }
        Some(script) => {
            let path = PathBuf::from(script);
            let args: Vec<String> = cli.args[1..].to_vec();
            shell.run_script(&path, &args)
        }
    };

    if cli.json {
        print_json_result(status);
    }
    std::process::exit(status);
}

/// Non-interactive with no script: read the whole of stdin as a script.
fn run_stdin(shell: &mut Shell) -> i32 {
    use std::io::Read;
    let mut text = String::new();
    if std::io::stdin().read_to_string(&mut text).is_err() {
        eprintln!("den: cannot read standard input");
        return 1;
    }
    if text.trim().is_empty() {
        return 0;
    }
    shell.run_command(&text)
}

fn print_json_result(status: i32) {
    let value = if status == 0 {
        serde_json::json!({ "exit_code": status })
    } else {
        serde_json::json!({
            "error": format!("command exited with status {}", status),
            "exit_code": status,
        })
    };
    println!("{}", value);
}

fn is_stdin_tty() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal()
}
