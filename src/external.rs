use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ShellError;
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, chdir, execve, fork, write};
use std::ffi::{CStr, CString, NulError, OsStr};
use std::fs;
use std::io::Write;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Search path used when the environment table has no `PATH`.
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Child status when the program could not be found.
pub const EXIT_NOT_FOUND: ExitCode = 127;

/// Child status when the program was found but could not be executed.
pub const EXIT_NOT_EXECUTABLE: ExitCode = 126;

/// Interpreter for executable files that the kernel does not recognize.
const FALLBACK_SHELL: &CStr = c"/bin/sh";

/// How a waited-for child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Exited(ExitCode),
    Signaled(i32),
    /// The wait itself failed, so the outcome is unknown.
    Lost,
}

impl ChildStatus {
    /// Shell-style status code: the exit code, or 128 + signal number.
    pub fn code(self) -> ExitCode {
        match self {
            ChildStatus::Exited(code) => code,
            ChildStatus::Signaled(signal) => 128 + signal,
            ChildStatus::Lost => -1,
        }
    }
}

/// Everything the child needs, converted before forking so the child only
/// performs async-signal-safe calls.
struct Launch {
    program: Option<CString>,
    argv: Vec<CString>,
    /// `sh <program> <args...>`, tried when `program` fails with `ENOEXEC`.
    script_argv: Vec<CString>,
    envp: Vec<CString>,
    cwd: CString,
}

impl Launch {
    fn prepare(args: &[String], env: &Environment) -> Result<Self, NulError> {
        let search_paths = env.get_var("PATH").unwrap_or(DEFAULT_SEARCH_PATH);
        let program = find_command_path(OsStr::new(search_paths), Path::new(&args[0]))
            .map(|path| CString::new(path.into_os_string().into_vec()))
            .transpose()?;
        let argv = args
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        let envp = env
            .vars()
            .map(|(k, v)| CString::new(format!("{k}={v}")))
            .collect::<Result<Vec<_>, _>>()?;
        let cwd = CString::new(env.current_dir.as_os_str().as_bytes())?;
        let script_argv = match &program {
            Some(path) => [c"sh".to_owned(), path.clone()]
                .into_iter()
                .chain(argv[1..].iter().cloned())
                .collect(),
            None => Vec::new(),
        };
        Ok(Self {
            program,
            argv,
            script_argv,
            envp,
            cwd,
        })
    }
}

/// Runs `args` as an external program and blocks until it terminates.
///
/// The child runs in the tracked working directory with exactly the
/// environment table as its environment. Failing to find or execute the
/// program only affects the child, which reports the error and exits with
/// [`EXIT_NOT_FOUND`] or [`EXIT_NOT_EXECUTABLE`]. Failing to create the child
/// is fatal and returned as [`ShellError::Fork`].
pub fn execute_external(
    args: &[String],
    env: &Environment,
    err: &mut dyn Write,
) -> Result<ChildStatus, ShellError> {
    let Some(name) = args.first() else {
        return Ok(ChildStatus::Exited(0));
    };

    let launch = match Launch::prepare(args, env) {
        Ok(launch) => launch,
        Err(e) => {
            if let Err(io) = writeln!(err, "{name}: {e}") {
                log::warn!("cannot report launch failure: {io}");
            }
            return Ok(ChildStatus::Exited(EXIT_NOT_EXECUTABLE));
        }
    };

    // SAFETY: the child only calls chdir, execve, write and _exit.
    let child = match unsafe { fork() } {
        Ok(ForkResult::Child) => exec_child(&launch),
        Ok(ForkResult::Parent { child }) => child,
        Err(errno) => return Err(ShellError::Fork(errno)),
    };
    log::debug!("spawned {name} as pid {child}");

    let status = wait_for(child);
    log::debug!("pid {child} finished: {status:?}");
    Ok(status)
}

fn exec_child(launch: &Launch) -> ! {
    let name = launch.argv[0].as_c_str();
    if let Err(errno) = chdir(launch.cwd.as_c_str()) {
        child_fail(name, errno, EXIT_NOT_EXECUTABLE);
    }

    let errno = match &launch.program {
        Some(program) => match execve(program.as_c_str(), &launch.argv, &launch.envp) {
            Ok(never) => match never {},
            // No recognizable header: run it as a shell script, like execvp.
            Err(Errno::ENOEXEC) => {
                match execve(FALLBACK_SHELL, &launch.script_argv, &launch.envp) {
                    Ok(never) => match never {},
                    Err(_) => Errno::ENOEXEC,
                }
            }
            Err(errno) => errno,
        },
        None => Errno::ENOENT,
    };
    let code = if errno == Errno::ENOENT {
        EXIT_NOT_FOUND
    } else {
        EXIT_NOT_EXECUTABLE
    };
    child_fail(name, errno, code)
}

fn child_fail(name: &CStr, errno: Errno, code: ExitCode) -> ! {
    let stderr = std::io::stderr();
    let parts: [&[u8]; 4] = [name.to_bytes(), b": ", errno.desc().as_bytes(), b"\n"];
    for part in parts {
        let _ = write(&stderr, part);
    }
    // SAFETY: _exit is async-signal-safe and skips atexit handlers.
    unsafe { libc::_exit(code) }
}

fn wait_for(child: Pid) -> ChildStatus {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return ChildStatus::Exited(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => return ChildStatus::Signaled(signal as i32),
            Ok(other) => log::debug!("pid {child}: {other:?}"),
            Err(Errno::EINTR) => {}
            Err(errno) => {
                log::warn!("waitpid({child}): {errno}");
                return ChildStatus::Lost;
            }
        }
    }
}

/// Resolve a command path the way `execvp` does.
///
/// Behavior:
/// - Names containing a `/` are used as given; the child reports whether they exist.
/// - Other names are searched in each directory of `search_paths` (PATH), returning
///   the first regular file with an execute bit. An empty PATH entry means the
///   current directory.
/// - Empty name: returns `None`.
pub fn find_command_path(search_paths: &OsStr, path: &Path) -> Option<PathBuf> {
    let bytes = path.as_os_str().as_bytes();
    if bytes.is_empty() {
        return None;
    }
    if bytes.contains(&b'/') {
        return Some(path.to_path_buf());
    }
    find_in_path(search_paths, path.as_os_str())
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        let path = dir.join(cmd);
        if is_executable(&path) {
            return Some(path);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
