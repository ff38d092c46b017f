use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Default search path used when the process was started without `PATH`.
const DEFAULT_PATH: &str = "/bin:/usr/bin";

/// Mutable, session-level view of the process environment.
///
/// The environment contains:
/// - `vars`: a map of environment variables passed to spawned commands.
/// - `current_dir`: the cached working directory, kept in sync with the
///   process working directory by the `cd` builtin.
/// - `should_exit`: a flag the interactive loop checks to know when the
///   `exit` builtin has accepted termination.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The cached current working directory.
    pub current_dir: PathBuf,
    /// When set to true, indicates that the interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment`.
    ///
    /// Copies variables from `std::env::vars()`, defaulting `PATH` to
    /// `/bin:/usr/bin` when absent, and initializes `current_dir` from the
    /// process working directory. Failing to determine the working directory
    /// at startup is unrecoverable.
    pub fn new() -> Result<Self> {
        let mut vars: HashMap<String, String> = stdenv::vars().collect();
        vars.entry("PATH".to_string())
            .or_insert_with(|| DEFAULT_PATH.to_string());
        let current_dir =
            stdenv::current_dir().context("cannot determine current working directory")?;
        Ok(Self {
            vars,
            current_dir,
            should_exit: false,
        })
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}
