use crate::builtin;
use crate::command::{ExitCode, Streams};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::{self, ChildStatus};
use crate::io_adapters::LineReader;
use crate::lexer;
use std::io::Write;
use std::path::Path;

/// Fixed label at the start of every prompt.
pub const PROMPT_LABEL: &str = "myshell";

/// What happened to one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Empty or whitespace only; nothing was run.
    Blank,
    /// Handled by a built-in.
    Builtin,
    /// Run as an external program; the status is informational only.
    External(ChildStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Terminated(ExitCode),
}

/// The read-eval loop of the shell.
///
/// The interpreter owns the [`Environment`] and the streams built-ins write
/// to. Each line is tokenized, offered to the built-in dispatcher, and run as
/// an external program only if no built-in claimed it.
///
/// Example
/// ```
/// use myshell::{Environment, Interpreter};
/// use myshell::io_adapters::{SharedBuffer, StreamReader};
///
/// let out = SharedBuffer::new();
/// let mut sh = Interpreter::with_streams(
///     Environment::empty("/"),
///     Box::new(out.clone()),
///     Box::new(SharedBuffer::new()),
/// );
/// let mut input = StreamReader::new(&b"env GREETING=hi\nenv\nexit 4\n"[..], Vec::new());
/// assert_eq!(sh.run(&mut input).unwrap(), 4);
/// assert_eq!(out.contents(), "GREETING=hi\n");
/// ```
pub struct Interpreter {
    env: Environment,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
}

impl Interpreter {
    /// An interpreter writing to the process' stdout and stderr.
    pub fn new(env: Environment) -> Self {
        Self::with_streams(env, Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn with_streams(env: Environment, out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self { env, out, err }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// `myshell <leaf>> `, where leaf is the last component of the working directory.
    pub fn prompt(&self) -> String {
        format!("{PROMPT_LABEL} {}> ", prompt_leaf(&self.env.current_dir))
    }

    /// Reads and runs lines until end of input or an `exit` built-in.
    ///
    /// Returns the status the shell should exit with: 0 at end of input, or
    /// the code given to `exit`. Only fatal conditions are returned as errors.
    pub fn run(&mut self, reader: &mut dyn LineReader) -> Result<ExitCode, ShellError> {
        loop {
            if let LoopState::Terminated(code) = self.step(reader)? {
                log::debug!("terminating with status {code}");
                return Ok(code);
            }
        }
    }

    fn step(&mut self, reader: &mut dyn LineReader) -> Result<LoopState, ShellError> {
        let prompt = self.prompt();
        let Some(line) = reader.read_line(&prompt)? else {
            log::debug!("end of input");
            return Ok(LoopState::Terminated(0));
        };

        self.process_line(&line)?;
        Ok(match self.env.take_exit_request() {
            Some(code) => LoopState::Terminated(code),
            None => LoopState::Running,
        })
    }

    /// Runs a single line, skipping it entirely when it is blank.
    pub fn process_line(&mut self, line: &str) -> Result<LineOutcome, ShellError> {
        if lexer::is_blank(line) {
            return Ok(LineOutcome::Blank);
        }

        let args = lexer::tokenize(line);
        log::debug!("tokens: {args:?}");

        let mut streams = Streams::new(self.out.as_mut(), self.err.as_mut());
        let handled = builtin::try_builtin(&args, &mut streams, &mut self.env);
        // Pending output must precede anything a child writes.
        self.flush();
        if handled {
            return Ok(LineOutcome::Builtin);
        }

        let status = external::execute_external(&args, &self.env, self.err.as_mut())?;
        Ok(LineOutcome::External(status))
    }

    fn flush(&mut self) {
        if let Err(e) = self.out.flush().and_then(|()| self.err.flush()) {
            log::warn!("cannot flush output: {e}");
        }
    }
}

fn prompt_leaf(dir: &Path) -> String {
    match dir.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => dir.to_string_lossy().into_owned(),
    }
}
