//! A minimal interactive shell.
//!
//! Input lines are split on whitespace into an argument vector. The first
//! token names either a built-in (`exit`, `pwd`, `cd`, `ls`, `cp`, `env`)
//! that runs inside the shell process, or an external program that is run
//! in a child process and waited for. There is no quoting, piping,
//! redirection or job control.
//!
//! The main entry point is [`Interpreter`], which drives the read-eval loop
//! over any [`io_adapters::LineReader`]. The shell's own variable table and
//! tracked working directory live in [`Environment`].

pub mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
#[cfg(test)]
mod test_support;

pub use env::Environment;
pub use error::ShellError;
/// Just a convenient re-export of the read-eval loop.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{Interpreter, LineOutcome};
