//! Spawns a validated [`Job`] as one child process per pipeline stage.
//!
//! Adjacent stages are connected through OS pipes created by the spawn
//! primitive; redirect targets are reopened here (the parser only probed
//! them). Every descriptor lives inside a `File`, `ChildStdout` or `Child`
//! handle, so pipe ends close on drop in the parent and are never inherited
//! past the stage they belong to.

use crate::env::Environment;
use crate::job::{ExitCode, Job, RunningJob, Stage};
use anyhow::{Result, bail};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdout, Command, Stdio};

/// Spawn every stage of `job`, in order, without waiting for any of them.
///
/// A stage that cannot start (program not found, redirect reopen failure) is
/// recorded as already done with the conventional status (127 for "not
/// found", 1 otherwise) and one diagnostic line; its siblings spawn anyway.
/// Only resource exhaustion in the spawn primitive itself is fatal.
pub(crate) fn spawn(env: &Environment, job: &Job, stderr: &mut dyn Write) -> Result<RunningJob> {
    let last = job.commands.len() - 1;
    let mut stages: Vec<Stage> = Vec::with_capacity(job.commands.len());
    let mut prev_stdout: Option<ChildStdout> = None;

    for (i, cmd) in job.commands.iter().enumerate() {
        let upstream = prev_stdout.take();
        match spawn_stage(env, job, i, upstream, stderr)? {
            SpawnOutcome::Spawned(mut child) => {
                if i < last && cmd.output.is_none() {
                    prev_stdout = child.stdout.take();
                }
                stages.push(Stage::Running(child));
            }
            SpawnOutcome::Failed(code) => stages.push(Stage::Done(code)),
        }
    }

    Ok(RunningJob::new(job.cmdline.clone(), stages))
}

enum SpawnOutcome {
    Spawned(std::process::Child),
    Failed(ExitCode),
}

fn spawn_stage(
    env: &Environment,
    job: &Job,
    index: usize,
    upstream: Option<ChildStdout>,
    stderr: &mut dyn Write,
) -> Result<SpawnOutcome> {
    let cmd = &job.commands[index];
    let last = index == job.commands.len() - 1;

    let search_paths = env.get_var("PATH").unwrap_or_default();
    let Some(program) = find_command_path(OsStr::new(&search_paths), Path::new(cmd.program()))
    else {
        writeln!(stderr, "Error: command not found")?;
        return Ok(SpawnOutcome::Failed(127));
    };

    let mut command = Command::new(program.as_ref());
    command
        .args(&cmd.args[1..])
        .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&env.current_dir);

    if let Some(path) = &cmd.input {
        match File::open(path) {
            Ok(file) => {
                command.stdin(Stdio::from(file));
            }
            Err(_) => {
                writeln!(stderr, "Error: cannot open input file")?;
                return Ok(SpawnOutcome::Failed(1));
            }
        }
    } else if let Some(out) = upstream {
        command.stdin(Stdio::from(out));
    } else if index > 0 {
        // The preceding stage never produced a pipe (it failed to spawn);
        // this stage reads immediate end-of-file instead.
        command.stdin(Stdio::null());
    }

    if let Some(path) = &cmd.output {
        match open_output(path) {
            Ok(file) => {
                command.stdout(Stdio::from(file));
            }
            Err(_) => {
                writeln!(stderr, "Error: cannot open output file")?;
                return Ok(SpawnOutcome::Failed(1));
            }
        }
    } else if !last {
        command.stdout(Stdio::piped());
    }

    log::debug!("spawning stage {index} of '{}': {:?}", job.cmdline, cmd.args);
    match command.spawn() {
        Ok(child) => Ok(SpawnOutcome::Spawned(child)),
        Err(err) if is_resource_exhaustion(&err) => {
            bail!("cannot spawn '{}': {err}", cmd.program())
        }
        Err(err) => {
            writeln!(stderr, "Error: cannot execute '{}': {err}", cmd.program())?;
            Ok(SpawnOutcome::Failed(1))
        }
    }
}

/// Output targets are created if absent and truncated if present, mode 0644.
fn open_output(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

/// A spawn failure caused by process-table or memory exhaustion cannot be
/// attributed to one stage; the interpreter gives up instead.
fn is_resource_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::OutOfMemory | io::ErrorKind::WouldBlock
    )
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative path with multiple components (e.g., `bin/sh`) or a `./` prefix:
///   returns it if it exists relative to the current directory.
/// - Single component: search each directory in `search_paths` (PATH) and
///   return the first existing match.
/// - Empty path: returns `None`.
pub(crate) fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(name), None) => find_in_path(search_paths, name.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let candidate = dir.join(cmd);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
