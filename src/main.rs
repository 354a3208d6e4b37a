use myshell::config::{self, Options};
use myshell::io_adapters::{EditorReader, LineReader, StreamReader};
use myshell::{Environment, Interpreter, ShellError};
use std::io::{self, IsTerminal};
use std::process;

fn make_reader(options: &Options) -> Result<Box<dyn LineReader>, ShellError> {
    if options.use_editor(io::stdin().is_terminal()) {
        Ok(Box::new(EditorReader::new()?))
    } else {
        Ok(Box::new(StreamReader::new(io::stdin().lock(), io::stdout())))
    }
}

fn run(options: &Options) -> Result<i32, ShellError> {
    let mut reader = make_reader(options)?;
    let mut shell = Interpreter::new(Environment::new());
    shell.run(reader.as_mut())
}

fn main() {
    let options: Options = argh::from_env();
    config::init_logging(&options);

    match run(&options) {
        Ok(code) => process::exit(code),
        Err(e) => {
            log::error!("fatal: {e}");
            eprintln!("myshell: {e}");
            process::exit(1);
        }
    }
}
