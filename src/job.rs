use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Child;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// 127 is reserved for "command not found" and 1 for other per-stage setup
/// failures, mirroring POSIX shell conventions.
pub type ExitCode = i32;

/// One pipeline stage: a command name with its arguments and optional
/// redirection targets.
///
/// Invariants upheld by the parser: `args` is non-empty and bounded, at most
/// one input and one output path, and an input path only appears on the first
/// stage of a pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name followed by its arguments.
    pub args: Vec<String>,
    /// Input-redirection target (`< file`), first stage only.
    pub input: Option<PathBuf>,
    /// Output-redirection target (`> file`).
    pub output: Option<PathBuf>,
}

impl Command {
    /// The command name, i.e. the first argument.
    pub fn program(&self) -> &str {
        &self.args[0]
    }
}

/// A fully parsed command line: an ordered pipeline of commands, a background
/// flag, and the original line retained for completion reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Pipeline stages in execution order. Non-empty once parsed.
    pub commands: Vec<Command>,
    /// True when the line ended with `&`.
    pub background: bool,
    /// The trimmed original command line.
    pub cmdline: String,
}

/// One spawned pipeline stage.
///
/// A stage that failed to spawn (program not found, redirect reopen failure)
/// is `Done` from the start; its siblings run regardless.
#[derive(Debug)]
pub(crate) enum Stage {
    Running(Child),
    Done(ExitCode),
}

/// A job whose stages have been handed to the operating system.
///
/// Owns one `Child` handle per live stage; dropping the handle releases the
/// stage's pipe descriptors without terminating the process, which is exactly
/// what happens when a tracked background job is replaced.
#[derive(Debug)]
pub(crate) struct RunningJob {
    cmdline: String,
    stages: Vec<Stage>,
}

impl RunningJob {
    pub(crate) fn new(cmdline: String, stages: Vec<Stage>) -> Self {
        debug_assert!(!stages.is_empty());
        Self { cmdline, stages }
    }

    pub(crate) fn cmdline(&self) -> &str {
        &self.cmdline
    }

    /// Block until every stage has terminated, collecting exit statuses in
    /// stage order. Abnormal termination counts as status 1.
    pub(crate) fn wait_all(&mut self) -> Vec<ExitCode> {
        self.stages
            .iter_mut()
            .map(|stage| match stage {
                Stage::Running(child) => {
                    let code = match child.wait() {
                        Ok(status) => status.code().unwrap_or(1),
                        Err(_) => 1,
                    };
                    *stage = Stage::Done(code);
                    code
                }
                Stage::Done(code) => *code,
            })
            .collect()
    }

    /// Non-blocking status sweep over the live stages.
    ///
    /// Each stage that has exited is marked done with its status the moment
    /// it reports; a failed status check also marks the stage done with
    /// status 1 rather than aborting the sweep. Returns `true` once every
    /// stage has been reaped.
    pub(crate) fn poll(&mut self) -> bool {
        for stage in &mut self.stages {
            if let Stage::Running(child) = stage {
                match child.try_wait() {
                    Ok(Some(status)) => *stage = Stage::Done(status.code().unwrap_or(1)),
                    Ok(None) => {}
                    Err(err) => {
                        log::debug!("status check failed for stage of '{}': {err}", self.cmdline);
                        *stage = Stage::Done(1);
                    }
                }
            }
        }
        self.stages.iter().all(|s| matches!(s, Stage::Done(_)))
    }

    /// Exit statuses in stage order. Meaningful once every stage is done;
    /// stages still running report as 1.
    pub(crate) fn statuses(&self) -> Vec<ExitCode> {
        self.stages
            .iter()
            .map(|stage| match stage {
                Stage::Done(code) => *code,
                Stage::Running(_) => 1,
            })
            .collect()
    }
}

/// Write the single completion report line for a finished job and flush it.
///
/// Format: `+ completed '<cmdline>' [s0][s1]...` with one bracketed status
/// per stage in stage order.
pub(crate) fn write_completion_report(
    out: &mut dyn Write,
    cmdline: &str,
    statuses: &[ExitCode],
) -> io::Result<()> {
    write!(out, "+ completed '{cmdline}' ")?;
    for status in statuses {
        write!(out, "[{status}]")?;
    }
    writeln!(out)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(cmdline: &str, statuses: &[ExitCode]) -> String {
        let mut buf = Vec::new();
        write_completion_report(&mut buf, cmdline, statuses).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn report_single_stage() {
        assert_eq!(report("echo hi", &[0]), "+ completed 'echo hi' [0]\n");
    }

    #[test]
    fn report_multi_stage_keeps_stage_order() {
        assert_eq!(
            report("ls | wc -l > out.txt", &[0, 1]),
            "+ completed 'ls | wc -l > out.txt' [0][1]\n"
        );
    }

    #[test]
    fn failed_stage_is_done_from_the_start() {
        let mut job = RunningJob::new("nope".to_string(), vec![Stage::Done(127)]);
        assert!(job.poll());
        assert_eq!(job.statuses(), vec![127]);
        assert_eq!(job.wait_all(), vec![127]);
    }
}
