use crate::builtin;
use crate::env::Environment;
use crate::executor;
use crate::job::{self, Job, RunningJob};
use crate::parser;
use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, IsTerminal, Write};

const PROMPT: &str = "sshell$ ";

/// An interactive interpreter session.
///
/// Holds the two pieces of session-wide mutable state: the [`Environment`]
/// (variables, working-directory cache, exit flag) and the single tracked
/// background job. Everything is touched from one thread; a second session
/// is fully independent of the first.
///
/// Example
/// ```no_run
/// use sshell::Interpreter;
/// let mut sh = Interpreter::new().unwrap();
/// sh.interpret("echo hello").unwrap();
/// ```
pub struct Interpreter {
    pub(crate) env: Environment,
    /// At most one backgrounded job is tracked at a time. Storing a new one
    /// drops the previous occupant: its processes keep running but their
    /// completion is never reported.
    pub(crate) background: Option<RunningJob>,
}

impl Interpreter {
    /// Create a session from the current process environment.
    pub fn new() -> Result<Self> {
        Ok(Self {
            env: Environment::new()?,
            background: None,
        })
    }

    /// Interpret one command line against the real standard streams.
    pub fn interpret(&mut self, line: &str) -> Result<()> {
        self.interpret_with_io(line, &mut io::stdout(), &mut io::stderr())
    }

    /// Interpret one command line, writing builtin output to `stdout` and
    /// diagnostics plus completion reports to `stderr`.
    ///
    /// Recoverable failures (parse errors, builtin failures, per-stage spawn
    /// failures) are fully handled here: one diagnostic line, then `Ok(())`.
    /// An `Err` means the interpreter cannot continue.
    pub fn interpret_with_io(
        &mut self,
        line: &str,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let job = match parser::parse(line) {
            Ok(job) => job,
            Err(err) => {
                writeln!(stderr, "Error: {err}")?;
                return Ok(());
            }
        };
        log::debug!(
            "parsed '{}': {} stage(s), background: {}",
            job.cmdline,
            job.commands.len(),
            job.background
        );
        self.run_job(job, stdout, stderr)
    }

    fn run_job(&mut self, job: Job, stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<()> {
        // Builtins never participate in pipelines or background execution.
        if job.commands.len() == 1 && !job.background {
            if let Some(status) =
                builtin::dispatch(self, &job.commands[0], &job.cmdline, stdout, stderr)?
            {
                log::debug!("builtin '{}' finished with status {status}", job.cmdline);
                return Ok(());
            }
        }

        let mut running = executor::spawn(&self.env, &job, stderr)?;
        if job.background {
            if let Some(replaced) = self.background.replace(running) {
                log::debug!("stopped tracking background job '{}'", replaced.cmdline());
            }
        } else {
            let statuses = running.wait_all();
            job::write_completion_report(stderr, &job.cmdline, &statuses)?;
        }
        Ok(())
    }

    /// Non-blocking check on the tracked background job.
    ///
    /// Called once at the start of every prompt cycle. A no-op while the slot
    /// is empty or the job is still running; once every stage has exited, the
    /// completion report is emitted and the slot cleared.
    pub fn poll_background(&mut self, stderr: &mut dyn Write) -> Result<()> {
        let all_done = match &mut self.background {
            Some(running) => running.poll(),
            None => return Ok(()),
        };
        if all_done {
            let finished = self.background.take().expect("slot checked above");
            job::write_completion_report(stderr, finished.cmdline(), &finished.statuses())?;
        }
        Ok(())
    }

    /// Whether the `exit` builtin has accepted termination.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// The interactive read-prompt loop. Returns the process exit code.
    ///
    /// Each cycle polls the background job, reads one line, skips empty
    /// lines, and hands the rest to [`Interpreter::interpret`]. When standard
    /// input is not a terminal the accepted line is echoed after the prompt
    /// so piped transcripts read like interactive ones.
    pub fn repl(&mut self) -> Result<i32> {
        let mut rl = DefaultEditor::new()?;
        let interactive = io::stdin().is_terminal();

        loop {
            self.poll_background(&mut io::stderr())?;

            let line = match rl.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Eof) => {
                    eprintln!("Error: end of file");
                    return Ok(0);
                }
                Err(ReadlineError::Interrupted) => return Ok(130),
                Err(err) => {
                    return Err(anyhow::Error::new(err).context("failed to read command"));
                }
            };

            if !interactive {
                println!("{PROMPT}{line}");
                io::stdout().flush().context("cannot flush standard output")?;
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let _ = rl.add_history_entry(line);

            self.interpret(line)?;
            if self.should_exit() {
                return Ok(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn interpret(session: &mut Interpreter, line: &str) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        session.interpret_with_io(line, &mut out, &mut err).unwrap();
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    /// Poll until the background slot clears, collecting everything written
    /// to the diagnostic stream along the way.
    fn poll_until_reported(session: &mut Interpreter, timeout: Duration) -> String {
        let start = Instant::now();
        let mut err = Vec::new();
        while session.background.is_some() {
            assert!(start.elapsed() < timeout, "background job never completed");
            session.poll_background(&mut err).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }
        String::from_utf8(err).unwrap()
    }

    #[test]
    fn polling_an_empty_slot_is_a_noop() {
        let mut session = Interpreter::new().unwrap();
        let mut err = Vec::new();
        session.poll_background(&mut err).unwrap();
        session.poll_background(&mut err).unwrap();
        assert!(err.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn foreground_job_reports_synchronously() {
        let mut session = Interpreter::new().unwrap();
        let (_, err) = interpret(&mut session, "true");
        assert_eq!(err, "+ completed 'true' [0]\n");
        let (_, err) = interpret(&mut session, "false");
        assert_eq!(err, "+ completed 'false' [1]\n");
    }

    #[test]
    fn parse_error_prints_one_diagnostic_and_no_report() {
        let mut session = Interpreter::new().unwrap();
        let (out, err) = interpret(&mut session, "cmd1 | | cmd2");
        assert_eq!(out, "");
        assert_eq!(err, "Error: missing command\n");
    }

    #[test]
    fn unreadable_input_redirect_spawns_nothing() {
        let mut session = Interpreter::new().unwrap();
        let (_, err) = interpret(&mut session, "cat < missing-input-file.txt");
        assert_eq!(err, "Error: cannot open input file\n");
    }

    #[test]
    #[cfg(unix)]
    fn background_job_reports_once_at_a_later_poll() {
        let mut session = Interpreter::new().unwrap();
        let (_, err) = interpret(&mut session, "true &");
        // Handed to the tracker; nothing reported yet.
        assert_eq!(err, "");
        assert!(session.background.is_some());

        let reported = poll_until_reported(&mut session, Duration::from_secs(5));
        assert_eq!(reported, "+ completed 'true &' [0]\n");

        let mut err = Vec::new();
        session.poll_background(&mut err).unwrap();
        assert!(err.is_empty(), "completion must be reported exactly once");
    }

    #[test]
    #[cfg(unix)]
    fn exit_is_refused_while_a_background_job_runs() {
        let mut session = Interpreter::new().unwrap();
        let (_, err) = interpret(&mut session, "sleep 2 &");
        assert_eq!(err, "");

        let (_, err) = interpret(&mut session, "exit");
        assert_eq!(
            err,
            "Error: active job still running\n+ completed 'exit' [1]\n"
        );
        assert!(!session.should_exit());

        let reported = poll_until_reported(&mut session, Duration::from_secs(10));
        assert_eq!(reported, "+ completed 'sleep 2 &' [0]\n");

        let (_, err) = interpret(&mut session, "exit");
        assert_eq!(err, "Bye...\n+ completed 'exit' [0]\n");
        assert!(session.should_exit());
    }

    #[test]
    #[cfg(unix)]
    fn replacing_the_background_slot_abandons_the_old_job() {
        let mut session = Interpreter::new().unwrap();
        interpret(&mut session, "sleep 5 &");
        interpret(&mut session, "true &");
        // Only the replacement is ever reported.
        let reported = poll_until_reported(&mut session, Duration::from_secs(5));
        assert_eq!(reported, "+ completed 'true &' [0]\n");
    }
}
