use thiserror::Error;

/// Conditions after which the interpreter cannot continue.
///
/// Everything else (bad built-in arguments, missing files, programs that
/// cannot be executed) is reported and the loop carries on.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A child process could not be created.
    #[error("fork: {0}")]
    Fork(#[source] nix::Error),
    /// Reading the next input line failed.
    #[error("read: {0}")]
    Input(#[from] std::io::Error),
    /// The interactive line editor failed.
    #[error("line editor: {0}")]
    Editor(#[from] rustyline::error::ReadlineError),
}
