//! Turns one raw command line into a [`Job`], or a structured parse error.
//!
//! Parsing is a small token-driven state machine: the line is first stripped
//! of a trailing background marker, then split on whitespace, and each token
//! either extends the current pipeline stage, closes it (`|`, `>`, `<`), or
//! supplies a redirection path. Redirection targets are probe-opened here so
//! that an unusable path fails the whole line before anything is spawned.

use crate::job::{Command, Job};
use std::fs::{File, OpenOptions};
use std::path::Path;
use thiserror::Error;

/// Maximum number of pipeline stages per job.
pub const MAX_COMMANDS: usize = 4;
/// Maximum number of arguments (command name included) per stage.
pub const MAX_ARGUMENTS: usize = 16;

/// Everything that can go wrong while compiling a command line into a job.
///
/// Each variant's message is printed after a literal `Error: ` prefix as the
/// single diagnostic for the failed line; no processes are spawned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A stage closed (`|`, `>`, `<`, end of line after a pipe) with no
    /// arguments collected.
    #[error("missing command")]
    MissingCommand,
    /// Output redirection on a stage that is not allowed to carry one, or a
    /// second `>` on the same stage.
    #[error("mislocated output redirection")]
    MislocatedOutputRedirect,
    /// Input redirection on any stage but the first, or a second `<`.
    #[error("mislocated input redirection")]
    MislocatedInputRedirect,
    /// `&` anywhere but as the very last token of the line.
    #[error("mislocated background sign")]
    MislocatedBackgroundSign,
    /// Line ended while a `>` was still waiting for its path.
    #[error("no output file")]
    NoOutputFile,
    /// Line ended while a `<` was still waiting for its path.
    #[error("no input file")]
    NoInputFile,
    /// More than [`MAX_ARGUMENTS`] arguments on one stage.
    #[error("too many process arguments")]
    TooManyArguments,
    /// More than [`MAX_COMMANDS`] pipeline stages.
    #[error("too many commands")]
    TooManyCommands,
    /// The output target could not be created or truncated.
    #[error("cannot open output file")]
    CannotOpenOutputFile,
    /// The input target does not exist or is not readable.
    #[error("cannot open input file")]
    CannotOpenInputFile,
}

/// What the next ordinary token means to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    CollectingArgs,
    ExpectingOutputPath,
    ExpectingInputPath,
}

/// Parse one raw command line into a validated [`Job`].
///
/// On failure all partially built state is discarded; the caller prints one
/// diagnostic line and takes no further action for this prompt cycle.
pub fn parse(raw_line: &str) -> Result<Job, ParseError> {
    let cmdline = raw_line.trim();

    // A `&` glued to the end of the line marks the whole job as background;
    // it never reaches the tokenizer.
    let mut background = false;
    let mut rest = cmdline;
    if let Some(stripped) = rest.strip_suffix('&') {
        background = true;
        rest = stripped.trim_end();
    }

    let mut stages: Vec<Command> = vec![Command::default()];
    let mut mode = Mode::CollectingArgs;

    let mut tokens = rest.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        let stage_index = stages.len() - 1;
        let stage = stages.last_mut().expect("at least one stage");
        match token {
            "|" => {
                if stage.args.is_empty() {
                    return Err(ParseError::MissingCommand);
                }
                if stage.output.is_some() {
                    return Err(ParseError::MislocatedOutputRedirect);
                }
                if stage_index > 0 && stage.input.is_some() {
                    return Err(ParseError::MislocatedInputRedirect);
                }
                if stages.len() == MAX_COMMANDS {
                    return Err(ParseError::TooManyCommands);
                }
                stages.push(Command::default());
                mode = Mode::CollectingArgs;
            }
            ">" => {
                if stage.args.is_empty() {
                    return Err(ParseError::MissingCommand);
                }
                if stage.output.is_some() {
                    return Err(ParseError::MislocatedOutputRedirect);
                }
                mode = Mode::ExpectingOutputPath;
            }
            "<" => {
                if stage.args.is_empty() {
                    return Err(ParseError::MissingCommand);
                }
                if stage_index > 0 || stage.input.is_some() {
                    return Err(ParseError::MislocatedInputRedirect);
                }
                mode = Mode::ExpectingInputPath;
            }
            "&" => {
                if tokens.peek().is_some() {
                    return Err(ParseError::MislocatedBackgroundSign);
                }
                background = true;
            }
            path if mode == Mode::ExpectingOutputPath => {
                probe_output(Path::new(path))?;
                stage.output = Some(path.into());
                mode = Mode::CollectingArgs;
            }
            path if mode == Mode::ExpectingInputPath => {
                File::open(path).map_err(|_| ParseError::CannotOpenInputFile)?;
                stage.input = Some(path.into());
                mode = Mode::CollectingArgs;
            }
            arg => {
                if stage.args.len() == MAX_ARGUMENTS {
                    return Err(ParseError::TooManyArguments);
                }
                stage.args.push(arg.to_string());
            }
        }
    }

    match mode {
        Mode::ExpectingOutputPath => return Err(ParseError::NoOutputFile),
        Mode::ExpectingInputPath => return Err(ParseError::NoInputFile),
        Mode::CollectingArgs => {}
    }
    if stages.last().expect("at least one stage").args.is_empty() {
        // Covers both a dangling pipe and a line reduced to nothing by the
        // background marker; a parsed job always has at least one command.
        return Err(ParseError::MissingCommand);
    }

    Ok(Job {
        commands: stages,
        background,
        cmdline: cmdline.to_string(),
    })
}

/// Validity probe for an output target: create it if absent, truncate it if
/// present, mode 0644. The descriptor is closed immediately; the executor
/// reopens the path at spawn time.
fn probe_output(path: &Path) -> Result<(), ParseError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options
        .open(path)
        .map(|_| ())
        .map_err(|_| ParseError::CannotOpenOutputFile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_command_with_args() {
        let job = parse("echo hello world").unwrap();
        assert_eq!(job.commands.len(), 1);
        assert_eq!(job.commands[0].args, vec!["echo", "hello", "world"]);
        assert!(!job.background);
        assert_eq!(job.cmdline, "echo hello world");
    }

    #[test]
    fn stage_count_is_one_plus_pipes() {
        for (line, pipes) in [("a", 0), ("a | b", 1), ("a | b | c", 2), ("a | b | c | d", 3)] {
            let job = parse(line).unwrap();
            assert_eq!(job.commands.len(), pipes + 1, "line: {line}");
        }
    }

    #[test]
    fn empty_pipeline_stage_is_missing_command() {
        assert_eq!(parse("cmd1 | | cmd2"), Err(ParseError::MissingCommand));
        assert_eq!(parse("| cmd"), Err(ParseError::MissingCommand));
        assert_eq!(parse("cmd1 |"), Err(ParseError::MissingCommand));
    }

    #[test]
    fn redirect_without_command_is_missing_command() {
        assert_eq!(parse("> out"), Err(ParseError::MissingCommand));
        assert_eq!(parse("< in"), Err(ParseError::MissingCommand));
    }

    #[test]
    fn dangling_redirects() {
        assert_eq!(parse("echo hi >"), Err(ParseError::NoOutputFile));
        assert_eq!(parse("cat <"), Err(ParseError::NoInputFile));
    }

    #[test]
    fn input_redirect_only_on_first_stage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        std::fs::write(&input, "data\n").unwrap();
        let line = format!("grep x | cat < {}", input.display());
        assert_eq!(parse(&line), Err(ParseError::MislocatedInputRedirect));

        let line = format!("cat < {} | wc -l", input.display());
        let job = parse(&line).unwrap();
        assert_eq!(job.commands[0].input.as_deref(), Some(input.as_path()));
    }

    #[test]
    fn output_redirect_must_be_on_the_last_stage_before_a_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let line = format!("echo hi > {} | cat", out.display());
        assert_eq!(parse(&line), Err(ParseError::MislocatedOutputRedirect));
    }

    #[test]
    fn duplicate_redirects_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();
        let line = format!("echo hi > {} > {}", a.display(), b.display());
        assert_eq!(parse(&line), Err(ParseError::MislocatedOutputRedirect));
        let line = format!("cat < {} < {}", a.display(), b.display());
        assert_eq!(parse(&line), Err(ParseError::MislocatedInputRedirect));
    }

    #[test]
    fn background_marker_variants() {
        let job = parse("sleep 5 &").unwrap();
        assert!(job.background);
        assert_eq!(job.cmdline, "sleep 5 &");
        assert_eq!(job.commands[0].args, vec!["sleep", "5"]);

        let job = parse("sleep 5&").unwrap();
        assert!(job.background);
    }

    #[test]
    fn background_sign_must_be_last() {
        assert_eq!(parse("sleep 5 & echo hi"), Err(ParseError::MislocatedBackgroundSign));
    }

    #[test]
    fn lone_background_sign_has_no_command() {
        assert_eq!(parse("&"), Err(ParseError::MissingCommand));
    }

    #[test]
    fn argument_bound_is_enforced() {
        // Command name plus 15 arguments fits; one more does not.
        let ok = format!("cmd {}", (0..15).map(|i| i.to_string()).collect::<Vec<_>>().join(" "));
        assert!(parse(&ok).is_ok());
        let too_many = format!("{ok} extra");
        assert_eq!(parse(&too_many), Err(ParseError::TooManyArguments));
    }

    #[test]
    fn stage_bound_is_enforced() {
        assert!(parse("a | b | c | d").is_ok());
        assert_eq!(parse("a | b | c | d | e"), Err(ParseError::TooManyCommands));
    }

    #[test]
    fn output_probe_creates_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        std::fs::write(&out, "previous contents").unwrap();
        let job = parse(&format!("echo hi > {}", out.display())).unwrap();
        assert_eq!(job.commands[0].output.as_deref(), Some(out.as_path()));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn output_probe_failure() {
        let line = "echo hi > /definitely/not/a/dir/out.txt";
        assert_eq!(parse(line), Err(ParseError::CannotOpenOutputFile));
    }

    #[test]
    fn input_probe_failure() {
        assert_eq!(
            parse("cat < missing-file-that-does-not-exist.txt"),
            Err(ParseError::CannotOpenInputFile)
        );
    }

    #[test]
    fn arguments_may_follow_a_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let job = parse(&format!("echo a > {} b", out.display())).unwrap();
        assert_eq!(job.commands[0].args, vec!["echo", "a", "b"]);
        assert_eq!(job.commands[0].output.as_deref(), Some(out.as_path()));
    }
}
