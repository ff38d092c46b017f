//! Built-in commands executed in-process: `exit`, `cd`, `pwd`.
//!
//! Builtins are parsed with [`argh`] (`FromArgs`) and run directly against
//! the session state instead of spawning a child. They only participate in
//! single-stage foreground jobs; a builtin name inside a pipeline or a
//! backgrounded line is executed as an external command lookup (and will
//! usually fail with "command not found").

use crate::env::Environment;
use crate::interpreter::Interpreter;
use crate::job::{self, Command, ExitCode};
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// A command the interpreter knows how to run without spawning a process.
///
/// The returned exit status follows shell conventions: 0 for success,
/// non-zero for failure. A returned error becomes a single `Error: ...`
/// diagnostic and status 1.
trait BuiltinCommand: FromArgs {
    /// Canonical name of the command, e.g. "cd".
    fn name() -> &'static str;

    fn execute(
        self,
        session: &mut Interpreter,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<ExitCode>;
}

/// Try to handle `cmd` as a builtin.
///
/// Returns `Ok(None)` when the name matches no builtin, letting the executor
/// fall through to external spawning. When the command is handled, one
/// completion report line is emitted before returning, success or failure.
pub(crate) fn dispatch(
    session: &mut Interpreter,
    cmd: &Command,
    cmdline: &str,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<Option<ExitCode>> {
    let status = match cmd.program() {
        name if name == Exit::name() => run::<Exit>(session, cmd, stdout, stderr)?,
        name if name == Cd::name() => run::<Cd>(session, cmd, stdout, stderr)?,
        name if name == Pwd::name() => run::<Pwd>(session, cmd, stdout, stderr)?,
        _ => return Ok(None),
    };
    job::write_completion_report(stderr, cmdline, &[status])?;
    Ok(Some(status))
}

fn run<T: BuiltinCommand>(
    session: &mut Interpreter,
    cmd: &Command,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<ExitCode> {
    let args: Vec<&str> = cmd.args[1..].iter().map(String::as_str).collect();
    match T::from_args(&[T::name()], &args) {
        Ok(builtin) => match builtin.execute(session, stdout, stderr) {
            Ok(status) => Ok(status),
            Err(err) => {
                writeln!(stderr, "Error: {err}")?;
                Ok(1)
            }
        },
        // `--help` and malformed arguments both land here.
        Err(EarlyExit { output, status }) => {
            writeln!(stderr, "{}", output.trim_end())?;
            Ok(if status.is_err() { 1 } else { 0 })
        }
    }
}

#[derive(FromArgs)]
/// Terminate the interpreter. Refused while a background job is running.
struct Exit {
    #[argh(positional, greedy)]
    /// ignored; `exit` takes no meaningful arguments here
    _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        session: &mut Interpreter,
        _stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<ExitCode> {
        if session.background.is_some() {
            return Err(anyhow::anyhow!("active job still running"));
        }
        writeln!(stderr, "Bye...")?;
        session.env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the working directory. Defaults to $HOME when no target is given.
struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory
    target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        session: &mut Interpreter,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
    ) -> Result<ExitCode> {
        let env: &mut Environment = &mut session.env;
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(anyhow::anyhow!("HOME environment variable not set")),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        // Canonicalizing first keeps the cache valid without re-querying the
        // working directory after the change.
        let canonical = fs::canonicalize(&new_dir)
            .and_then(|dir| std::env::set_current_dir(&dir).map(|_| dir))
            .map_err(|_| anyhow::anyhow!("cannot cd into directory"))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        session: &mut Interpreter,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", session.env.current_dir.display())?;
        stdout.flush()?;
        Ok(0)
    }
}
