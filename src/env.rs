use crate::command::ExitCode;
use std::env as stdenv;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Mutable, user-level view of the process state the shell reads and writes.
///
/// The environment contains:
/// - the environment table: `NAME=VALUE` pairs in insertion order, handed to
///   every external program as its complete environment;
/// - `current_dir`: the working directory shown in the prompt and used by
///   `pwd`, `ls`, `cp` and child processes;
/// - a pending exit request set by the `exit` built-in and consumed by the loop.
///
/// Handlers receive it by reference instead of touching process globals, so
/// tests can inject a fake table with [`Environment::empty`].
#[derive(Debug, Clone)]
pub struct Environment {
    vars: Vec<(String, String)>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    exit_request: Option<ExitCode>,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// Variables whose name or value is not valid UTF-8 are converted lossily.
    pub fn new() -> Self {
        let vars = stdenv::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|e| {
            log::warn!("cannot determine working directory: {e}");
            PathBuf::from(".")
        });
        Self {
            vars,
            current_dir,
            exit_request: None,
        }
    }

    /// An environment with an empty table rooted at `current_dir`.
    pub fn empty(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: Vec::new(),
            current_dir: current_dir.into(),
            exit_request: None,
        }
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set or override an environment variable.
    ///
    /// An existing entry keeps its position in the table; a new one is appended.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        let key = key.into();
        let val = val.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = val,
            None => self.vars.push((key, val)),
        }
    }

    /// All variables in table order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The tracked working directory, provided it still exists.
    pub fn working_dir(&self) -> io::Result<&Path> {
        let meta = fs::metadata(&self.current_dir)?;
        if meta.is_dir() {
            Ok(&self.current_dir)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                "working directory is no longer a directory",
            ))
        }
    }

    /// Resolve `path` against the tracked working directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.current_dir.join(path)
    }

    pub fn request_exit(&mut self, code: ExitCode) {
        self.exit_request = Some(code);
    }

    pub fn take_exit_request(&mut self) -> Option<ExitCode> {
        self.exit_request.take()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;
    use std::env as stdenv;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::empty(stdenv::current_dir().unwrap());

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE"));
    }

    #[test]
    fn test_env_overwrite_keeps_position() {
        let mut env = Environment::empty("/");
        env.set_var("A", "1");
        env.set_var("B", "2");
        env.set_var("A", "3");

        let table: Vec<_> = env.vars().collect();
        assert_eq!(table, vec![("A", "3"), ("B", "2")]);
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_empty_env_does_not_fall_back_to_process() {
        let env = Environment::empty("/");
        assert_eq!(env.get_var("PATH"), None);
    }

    #[test]
    fn test_working_dir_reports_missing_directory() {
        let env = Environment::empty("/definitely/not/a/real/dir/for/myshell");
        assert!(env.working_dir().is_err());

        let env = Environment::empty("/");
        assert_eq!(env.working_dir().unwrap(), std::path::Path::new("/"));
    }

    #[test]
    fn test_exit_request_is_consumed_once() {
        let mut env = Environment::empty("/");
        assert_eq!(env.take_exit_request(), None);
        env.request_exit(3);
        assert_eq!(env.take_exit_request(), Some(3));
        assert_eq!(env.take_exit_request(), None);
    }
}
