use crate::command::{ExitCode, Streams};
use crate::env::Environment;
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use chrono::{DateTime, Local};
use nix::unistd::{Gid, Group, Uid, User};
use std::env;
use std::fs::{self, File, FileType, Metadata, OpenOptions, ReadDir};
use std::io::{self, Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt};
use std::path::PathBuf;

/// Status reported for a built-in whose arguments could not be parsed.
const USAGE_ERROR: ExitCode = 2;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are executed directly in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "ls" or "cd".
    fn name() -> &'static str;

    /// Builds the command from the tokens following its name.
    ///
    /// Commands that take operands check the raw count themselves, so an
    /// operand such as `help`, `--` or `-dir` is never taken for an option.
    /// Only `ls` has options and parses them with [`argh`].
    fn parse(args: &[&str]) -> Result<Self, EarlyExit>;

    /// Executes the command using provided output streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, streams: &mut Streams<'_>, env: &mut Environment) -> Result<ExitCode>;
}

/// Every command name the dispatcher recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Exit,
    Pwd,
    Cd,
    Ls,
    Cp,
    Env,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Exit,
        Builtin::Pwd,
        Builtin::Cd,
        Builtin::Ls,
        Builtin::Cp,
        Builtin::Env,
    ];

    /// Looks up a built-in by its full command name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "exit" => Some(Builtin::Exit),
            "pwd" => Some(Builtin::Pwd),
            "cd" => Some(Builtin::Cd),
            "ls" => Some(Builtin::Ls),
            "cp" => Some(Builtin::Cp),
            "env" => Some(Builtin::Env),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Exit => Exit::name(),
            Builtin::Pwd => Pwd::name(),
            Builtin::Cd => Cd::name(),
            Builtin::Ls => Ls::name(),
            Builtin::Cp => Cp::name(),
            Builtin::Env => Env::name(),
        }
    }

    fn run(
        self,
        args: &[&str],
        streams: &mut Streams<'_>,
        env: &mut Environment,
    ) -> io::Result<ExitCode> {
        match self {
            Builtin::Exit => invoke::<Exit>(args, streams, env),
            Builtin::Pwd => invoke::<Pwd>(args, streams, env),
            Builtin::Cd => invoke::<Cd>(args, streams, env),
            Builtin::Ls => invoke::<Ls>(args, streams, env),
            Builtin::Cp => invoke::<Cp>(args, streams, env),
            Builtin::Env => invoke::<Env>(args, streams, env),
        }
    }
}

/// Runs `args` as a built-in if its first element names one.
///
/// Returns `true` when the command was recognized, whether or not it
/// succeeded; failures have already been reported on `streams.err`.
pub fn try_builtin(args: &[String], streams: &mut Streams<'_>, env: &mut Environment) -> bool {
    let Some((name, rest)) = args.split_first() else {
        return false;
    };
    let Some(builtin) = Builtin::from_name(name) else {
        return false;
    };

    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    match builtin.run(&rest, streams, env) {
        Ok(code) => log::debug!("builtin {} finished with status {code}", builtin.name()),
        Err(e) => log::warn!("builtin {}: cannot write output: {e}", builtin.name()),
    }
    true
}

fn invoke<T: BuiltinCommand>(
    args: &[&str],
    streams: &mut Streams<'_>,
    env: &mut Environment,
) -> io::Result<ExitCode> {
    let cmd = match T::parse(args) {
        Ok(cmd) => cmd,
        Err(EarlyExit {
            output,
            status: Ok(()),
        }) => {
            writeln!(streams.out, "{}", output.trim_end())?;
            return Ok(0);
        }
        Err(EarlyExit {
            output,
            status: Err(()),
        }) => {
            writeln!(streams.err, "{}: {}", T::name(), output.trim_end())?;
            return Ok(USAGE_ERROR);
        }
    };

    match cmd.execute(streams, env) {
        Ok(code) => Ok(code),
        Err(e) => {
            writeln!(streams.err, "{e:#}")?;
            Ok(1)
        }
    }
}

fn usage_error(message: impl Into<String>) -> EarlyExit {
    EarlyExit {
        output: message.into(),
        status: Err(()),
    }
}

/// Accepts zero or one operand.
fn optional_operand(args: &[&str]) -> Result<Option<String>, EarlyExit> {
    match args {
        [] => Ok(None),
        [operand] => Ok(Some(operand.to_string())),
        _ => Err(usage_error("too many arguments")),
    }
}

/// Exit the shell with the given status, or 0 when omitted.
pub struct Exit {
    /// Status to exit with, between 0 and 255.
    pub code: Option<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Exit {
            code: optional_operand(args)?,
        })
    }

    fn execute(self, _streams: &mut Streams<'_>, env: &mut Environment) -> Result<ExitCode> {
        let code = match &self.code {
            Some(raw) => parse_exit_code(raw)?,
            None => 0,
        };
        env.request_exit(code);
        Ok(0)
    }
}

fn parse_exit_code(raw: &str) -> Result<ExitCode> {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        bail!("exit: {raw}: numeric argument required");
    }
    match digits.parse::<u8>() {
        Ok(code) => Ok(ExitCode::from(code)),
        Err(_) => bail!("exit: {raw}: maximum allowable argument is 255"),
    }
}

/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        match args {
            [] => Ok(Pwd {}),
            _ => Err(usage_error("too many arguments")),
        }
    }

    fn execute(self, streams: &mut Streams<'_>, env: &mut Environment) -> Result<ExitCode> {
        let dir = env.working_dir().context("pwd")?;
        writeln!(streams.out, "{}", dir.display())?;
        Ok(0)
    }
}

/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    /// Directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Cd {
            target: optional_operand(args)?,
        })
    }

    fn execute(self, _streams: &mut Streams<'_>, env: &mut Environment) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) => PathBuf::from(t),
            None => env
                .get_var("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("cd: HOME not set"))?,
        };

        let new_dir = env.resolve(&target);
        let canonical =
            fs::canonicalize(&new_dir).with_context(|| format!("cd: {}", target.display()))?;

        env::set_current_dir(&canonical).with_context(|| format!("cd: {}", target.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the entries of the current working directory.
pub struct Ls {
    #[argh(switch, short = 'l')]
    /// use the long listing format.
    pub long: bool,
}

/// Entries per row in the short listing.
const LS_COLUMNS: usize = 4;

/// `%b %d %H:%M`, e.g. `Mar 07 14:05`.
const LS_TIME_FORMAT: &str = "%b %d %H:%M";

const PERMISSION_BITS: [(u32, char); 9] = [
    (0o400, 'r'),
    (0o200, 'w'),
    (0o100, 'x'),
    (0o040, 'r'),
    (0o020, 'w'),
    (0o010, 'x'),
    (0o004, 'r'),
    (0o002, 'w'),
    (0o001, 'x'),
];

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ls::from_args(&[Self::name()], args)
    }

    fn execute(self, streams: &mut Streams<'_>, env: &mut Environment) -> Result<ExitCode> {
        let dir = env.working_dir().context("ls")?;
        let entries = fs::read_dir(dir).with_context(|| format!("ls: {}", dir.display()))?;
        if self.long {
            list_long(entries, streams)
        } else {
            list_short(entries, streams)
        }
    }
}

fn list_short(entries: ReadDir, streams: &mut Streams<'_>) -> Result<ExitCode> {
    let mut status = 0;
    let mut column = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                writeln!(streams.err, "ls: {e}")?;
                status = 1;
                continue;
            }
        };
        write!(streams.out, "{}\t", entry.file_name().to_string_lossy())?;
        column += 1;
        if column == LS_COLUMNS {
            writeln!(streams.out)?;
            column = 0;
        }
    }
    writeln!(streams.out)?;
    Ok(status)
}

struct LongEntry {
    name: String,
    meta: Metadata,
}

fn list_long(entries: ReadDir, streams: &mut Streams<'_>) -> Result<ExitCode> {
    let mut status = 0;
    let mut listed = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                writeln!(streams.err, "ls: {e}")?;
                status = 1;
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        // Follow links like stat(2); fall back to the link itself when dangling.
        let path = entry.path();
        match fs::metadata(&path).or_else(|_| fs::symlink_metadata(&path)) {
            Ok(meta) => listed.push(LongEntry { name, meta }),
            Err(e) => {
                writeln!(streams.err, "ls: {name}: {e}")?;
                status = 1;
            }
        }
    }

    // st_blocks counts 512-byte units; report 1K blocks like ls does.
    let total: u64 = listed.iter().map(|e| e.meta.blocks()).sum::<u64>() / 2;
    writeln!(streams.out, "total {total}")?;
    for entry in &listed {
        writeln!(streams.out, "{}", long_line(entry))?;
    }
    Ok(status)
}

fn long_line(entry: &LongEntry) -> String {
    let meta = &entry.meta;
    format!(
        "{}{} {} {} {} {:>6} {} {}",
        file_type_char(meta.file_type()),
        permission_string(meta.mode()),
        meta.nlink(),
        owner_name(meta.uid()),
        group_name(meta.gid()),
        meta.size(),
        format_mtime(meta),
        entry.name
    )
}

fn file_type_char(ft: FileType) -> char {
    if ft.is_dir() {
        'd'
    } else if ft.is_symlink() {
        'l'
    } else if ft.is_char_device() {
        'c'
    } else if ft.is_block_device() {
        'b'
    } else if ft.is_fifo() {
        'p'
    } else if ft.is_socket() {
        's'
    } else {
        '-'
    }
}

fn permission_string(mode: u32) -> String {
    PERMISSION_BITS
        .iter()
        .map(|&(bit, ch)| if mode & bit != 0 { ch } else { '-' })
        .collect()
}

fn owner_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn group_name(gid: u32) -> String {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => group.name,
        _ => gid.to_string(),
    }
}

fn format_mtime(meta: &Metadata) -> String {
    match meta.modified() {
        Ok(time) => DateTime::<Local>::from(time)
            .format(LS_TIME_FORMAT)
            .to_string(),
        Err(_) => format!("{:>12}", "?"),
    }
}

/// Copy the contents of one file into another, creating or truncating it.
pub struct Cp {
    /// File to read from.
    pub source: String,
    /// File to create or overwrite.
    pub destination: String,
}

const COPY_BUFFER_SIZE: usize = 4096;

impl BuiltinCommand for Cp {
    fn name() -> &'static str {
        "cp"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        match args {
            [source, destination] => Ok(Cp {
                source: source.to_string(),
                destination: destination.to_string(),
            }),
            _ => Err(usage_error(format!("expected 2 arguments, got {}", args.len()))),
        }
    }

    fn execute(self, _streams: &mut Streams<'_>, env: &mut Environment) -> Result<ExitCode> {
        let source_path = env.resolve(&self.source);
        let destination_path = env.resolve(&self.destination);

        let mut source =
            File::open(&source_path).with_context(|| format!("cp: {}", self.source))?;

        if let (Ok(a), Ok(b)) = (
            fs::canonicalize(&source_path),
            fs::canonicalize(&destination_path),
        ) {
            if a == b {
                bail!(
                    "cp: {} and {} are the same file",
                    self.source,
                    self.destination
                );
            }
        }

        let mut destination = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o666)
            .open(&destination_path)
            .with_context(|| format!("cp: {}", self.destination))?;

        let copied = copy_contents(&mut source, &mut destination)
            .with_context(|| format!("cp: {} -> {}", self.source, self.destination))?;
        log::debug!("cp: copied {copied} bytes to {}", destination_path.display());
        Ok(0)
    }
}

fn copy_contents(source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<u64> {
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        destination.write_all(&buf[..n])?;
        total += n as u64;
    }
    destination.flush()?;
    Ok(total)
}

/// Print every environment variable, or set one given as NAME=VALUE.
pub struct Env {
    /// Assignment of the form NAME=VALUE.
    pub assignment: Option<String>,
}

impl BuiltinCommand for Env {
    fn name() -> &'static str {
        "env"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Env {
            assignment: optional_operand(args)?,
        })
    }

    fn execute(self, streams: &mut Streams<'_>, env: &mut Environment) -> Result<ExitCode> {
        let Some(assignment) = self.assignment else {
            for (name, value) in env.vars() {
                writeln!(streams.out, "{name}={value}")?;
            }
            return Ok(0);
        };

        match assignment.split_once('=') {
            Some(("", _)) => bail!("env: {assignment}: variable name must not be empty"),
            Some((name, value)) => env.set_var(name, value),
            None => log::debug!("env: ignoring {assignment:?}, expected NAME=VALUE"),
        }
        Ok(0)
    }
}
