use argh::FromArgs;
use env_logger::Env;

/// Environment variable holding the log filter, in `env_logger` syntax.
pub const LOG_ENV: &str = "MYSHELL_LOG";

#[derive(FromArgs, Debug, Default, PartialEq, Eq)]
/// A minimal interactive shell.
pub struct Options {
    #[argh(switch)]
    /// read plain lines from stdin even on a terminal.
    pub plain: bool,

    #[argh(switch, short = 'v')]
    /// log debug diagnostics to stderr.
    pub verbose: bool,
}

impl Options {
    /// Filter used when `MYSHELL_LOG` is unset.
    pub fn default_log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "warn" }
    }

    /// Whether input should go through the line editor.
    pub fn use_editor(&self, stdin_is_terminal: bool) -> bool {
        stdin_is_terminal && !self.plain
    }
}

/// Installs the global logger. Diagnostics go to stderr, never stdout.
pub fn init_logging(options: &Options) {
    env_logger::Builder::from_env(Env::new().filter_or(LOG_ENV, options.default_log_level()))
        .format_timestamp(None)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, argh::EarlyExit> {
        Options::from_args(&["myshell"], args)
    }

    #[test]
    fn test_defaults() {
        let opts = parse(&[]).unwrap();
        assert_eq!(opts, Options::default());
        assert_eq!(opts.default_log_level(), "warn");
        assert!(opts.use_editor(true));
        assert!(!opts.use_editor(false));
    }

    #[test]
    fn test_switches() {
        let opts = parse(&["-v", "--plain"]).unwrap();
        assert!(opts.verbose);
        assert_eq!(opts.default_log_level(), "debug");
        assert!(!opts.use_editor(true));
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let err = parse(&["--bogus"]).unwrap_err();
        assert!(err.status.is_err());
        assert!(err.output.contains("--bogus"));
    }

    #[test]
    fn test_help_is_not_an_error() {
        let exit = parse(&["--help"]).unwrap_err();
        assert!(exit.status.is_ok());
        assert!(exit.output.contains("--plain"));
    }
}
