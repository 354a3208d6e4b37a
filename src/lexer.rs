//! Lexical analysis of a single input line into an argument vector.
//!
//! The only delimiter is whitespace: there is no quoting, escaping or
//! substitution, so a token can never contain a whitespace character.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    /// Walks the input once, emitting every maximal run of non-whitespace
    /// characters as an owned token.
    fn make_tokens(mut self) -> Vec<String> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            match self.state {
                LexingState::Start => self.handle_start(ch),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
            }
        }

        if self.state == LexingState::ReadingWord {
            out.push(std::mem::take(&mut self.buffer));
        }

        out
    }

    fn handle_start(&mut self, ch: char) {
        if !is_separator(ch) {
            self.buffer.push(ch);
            self.state = LexingState::ReadingWord;
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<String>) {
        if is_separator(ch) {
            out.push(std::mem::take(&mut self.buffer));
            self.state = LexingState::Start;
        } else {
            self.buffer.push(ch);
        }
    }
}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace()
}

/// Splits `line` into its whitespace-delimited tokens, left to right.
///
/// Tokens are copied out of `line`, so the result does not borrow the input
/// buffer. Every token is non-empty; an empty or all-whitespace line yields
/// an empty vector.
pub fn tokenize(line: &str) -> Vec<String> {
    LexingFSM::new(line).make_tokens()
}

/// True when `line` would tokenize to nothing.
pub fn is_blank(line: &str) -> bool {
    line.chars().all(is_separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_lines_yield_nothing() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
        assert!(tokenize(" \t \x0b\x0c\r\n").is_empty());
    }

    #[test]
    fn test_runs_of_whitespace_collapse() {
        assert_eq!(tokenize("  a   b c  "), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tabs_and_mixed_separators() {
        assert_eq!(
            tokenize("ls\t-l\n"),
            vec!["ls".to_string(), "-l".to_string()]
        );
        assert_eq!(tokenize("cp\t \tsrc    dst"), vec!["cp", "src", "dst"]);
    }

    #[test]
    fn test_no_quoting_is_honored() {
        assert_eq!(
            tokenize(r#"echo "hello world" 'a b'"#),
            vec!["echo", "\"hello", "world\"", "'a", "b'"]
        );
        assert_eq!(tokenize(r"a\ b"), vec![r"a\", "b"]);
    }

    #[test]
    fn test_non_ascii_tokens_survive() {
        assert_eq!(tokenize("cd  répertoire\u{3000}x"), vec!["cd", "répertoire", "x"]);
    }

    #[test]
    fn test_tokens_outlive_input() {
        let tokens = {
            let line = String::from("env NAME=value");
            tokenize(&line)
        };
        assert_eq!(tokens, vec!["env", "NAME=value"]);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(""));
        assert!(is_blank(" \t "));
        assert!(!is_blank("  x "));
    }
}
