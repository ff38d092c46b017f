//! A small interactive command interpreter.
//!
//! One line of input becomes a [`job::Job`]: up to four commands connected by
//! pipes, with optional input/output redirection and an optional trailing `&`
//! that sends the whole job to the background. Built-in commands (`exit`,
//! `cd`, `pwd`) run in-process; everything else is resolved through `PATH`
//! and spawned as a child process with its standard streams wired to the
//! neighbouring pipeline stages.
//!
//! The main entry point is [`Interpreter`], which holds the per-session state
//! (environment, working-directory cache, the single tracked background job)
//! and drives both the interactive loop and single-line interpretation. The
//! public modules [`parser`] and [`job`] expose the parse result types for
//! embedding and testing.

mod builtin;
pub mod env;
mod executor;
pub mod job;
mod interpreter;
pub mod parser;

/// Re-export of the interactive session type.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;
