use crate::error::ShellError;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::cell::RefCell;
use std::io::{BufRead, Result as IoResult, Write};
use std::rc::Rc;

/// Initial capacity of the line buffer; it grows as needed for longer lines.
const INITIAL_LINE_CAPACITY: usize = 1024;

/// A source of input lines for the read-eval loop.
pub trait LineReader {
    /// Shows `prompt` and reads one line without its terminator.
    ///
    /// Returns `Ok(None)` at end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError>;
}

/// Reads lines from any buffered stream, writing the prompt to `prompt_out`.
///
/// Used when standard input is a pipe or a file, and in tests.
pub struct StreamReader<R, W> {
    input: R,
    prompt_out: W,
    buf: Vec<u8>,
}

impl<R: BufRead, W: Write> StreamReader<R, W> {
    pub fn new(input: R, prompt_out: W) -> Self {
        Self {
            input,
            prompt_out,
            buf: Vec::with_capacity(INITIAL_LINE_CAPACITY),
        }
    }

    /// Gives back the prompt writer, e.g. to inspect what was shown.
    pub fn into_prompt_out(self) -> W {
        self.prompt_out
    }
}

impl<R: BufRead, W: Write> LineReader for StreamReader<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        self.prompt_out.write_all(prompt.as_bytes())?;
        self.prompt_out.flush()?;

        self.buf.clear();
        if self.input.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        strip_terminator(&mut self.buf);
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Removes one trailing `\n` or `\r\n`.
fn strip_terminator(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

/// Interactive line editing on a terminal, backed by [`rustyline`].
///
/// No history is kept. Ctrl-C abandons the current line, Ctrl-D ends input.
pub struct EditorReader {
    editor: DefaultEditor,
}

impl EditorReader {
    pub fn new() -> Result<Self, ShellError> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineReader for EditorReader {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Memory-backed writer for capturing output, shareable between owners.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(input: &[u8]) -> StreamReader<Cursor<Vec<u8>>, Vec<u8>> {
        StreamReader::new(Cursor::new(input.to_vec()), Vec::new())
    }

    #[test]
    fn test_lines_are_stripped_of_one_terminator() {
        let mut r = reader(b"first\nsecond\r\n\n\nlast");
        assert_eq!(r.read_line("> ").unwrap().as_deref(), Some("first"));
        assert_eq!(r.read_line("> ").unwrap().as_deref(), Some("second"));
        assert_eq!(r.read_line("> ").unwrap().as_deref(), Some(""));
        assert_eq!(r.read_line("> ").unwrap().as_deref(), Some(""));
        assert_eq!(r.read_line("> ").unwrap().as_deref(), Some("last"));
        assert_eq!(r.read_line("> ").unwrap(), None);
    }

    #[test]
    fn test_prompt_is_written_before_each_read() {
        let mut r = reader(b"a\n");
        r.read_line("one> ").unwrap();
        r.read_line("two> ").unwrap();
        assert_eq!(r.into_prompt_out(), b"one> two> ");
    }

    #[test]
    fn test_long_line_grows_buffer() {
        let long = "x".repeat(INITIAL_LINE_CAPACITY * 5 + 17);
        let mut r = reader(format!("{long}\n").as_bytes());
        assert_eq!(r.read_line("").unwrap(), Some(long));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut r = reader(b"ls \xff\n");
        assert_eq!(r.read_line("").unwrap().as_deref(), Some("ls \u{fffd}"));
    }

    #[test]
    fn test_empty_input_is_end_of_input() {
        let mut r = reader(b"");
        assert_eq!(r.read_line("").unwrap(), None);
    }

    #[test]
    fn test_shared_buffer_clones_share_storage() {
        let buf = SharedBuffer::new();
        let mut writer = buf.clone();
        write!(writer, "hello").unwrap();
        assert_eq!(buf.contents(), "hello");
    }
}
