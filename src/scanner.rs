//! Scans an input string (source file) character by character.
//! Unlike a byte-slice tokenizer this never reads out of bounds: peeking at
//! the end of input yields '\0', so callers can treat end-of-file like any
//! other terminator.

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub msg: String,
    pub ofs: usize,
}
pub type ParseResult<T> = Result<T, ParseError>;

pub struct Scanner<'a> {
    buf: &'a str,
    pub ofs: usize,
    pub line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a str) -> Self {
        Scanner {
            buf,
            ofs: 0,
            line: 1,
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.buf[start..end]
    }
    pub fn at_end(&self) -> bool {
        self.ofs >= self.buf.len()
    }
    pub fn peek(&self) -> char {
        self.buf[self.ofs..].chars().next().unwrap_or('\0')
    }
    pub fn peek_newline(&self) -> bool {
        let rest = &self.buf[self.ofs..];
        rest.starts_with('\n') || rest.starts_with("\r\n")
    }
    pub fn next(&mut self) {
        match self.buf[self.ofs..].chars().next() {
            None => {}
            Some(c) => {
                if c == '\n' {
                    self.line += 1;
                }
                self.ofs += c.len_utf8();
            }
        }
    }
    pub fn read(&mut self) -> char {
        let c = self.peek();
        self.next();
        c
    }
    pub fn skip(&mut self, ch: char) -> bool {
        if !self.at_end() && self.peek() == ch {
            self.next();
            return true;
        }
        false
    }
    /// Consume `word` if the input continues with it.
    pub fn skip_str(&mut self, word: &str) -> bool {
        if self.buf[self.ofs..].starts_with(word) {
            self.ofs += word.len();
            return true;
        }
        false
    }

    /// Skip horizontal whitespace.
    pub fn skip_spaces(&mut self) {
        while self.skip(' ') || self.skip('\t') {}
    }

    /// Advance to the start of the next line, or to the end of input.
    pub fn skip_line(&mut self) {
        while !self.at_end() {
            if self.read() == '\n' {
                break;
            }
        }
    }

    pub fn parse_error<T, S: Into<String>>(&self, msg: S) -> ParseResult<T> {
        Err(ParseError {
            msg: msg.into(),
            ofs: self.ofs,
        })
    }
}

/// 1-based line number of a byte offset within `text`.
pub fn line_of(text: &str, ofs: usize) -> usize {
    let end = ofs.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&c| c == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_past_end() {
        let mut scanner = Scanner::new("a");
        assert_eq!(scanner.read(), 'a');
        assert!(scanner.at_end());
        assert_eq!(scanner.peek(), '\0');
        scanner.next();
        assert_eq!(scanner.ofs, 1);
    }

    #[test]
    fn tracks_lines() {
        let mut scanner = Scanner::new("x\ny\r\nz");
        scanner.skip_line();
        assert_eq!(scanner.line, 2);
        assert!(!scanner.peek_newline());
        scanner.next();
        assert!(scanner.peek_newline());
        scanner.skip_line();
        assert_eq!(scanner.line, 3);
        assert_eq!(scanner.read(), 'z');
    }

    #[test]
    fn multibyte() {
        let mut scanner = Scanner::new("é\"");
        assert_eq!(scanner.read(), 'é');
        assert!(scanner.skip('"'));
        assert!(scanner.at_end());
    }

    #[test]
    fn line_numbers() {
        let text = "a\nb\nc";
        assert_eq!(line_of(text, 0), 1);
        assert_eq!(line_of(text, 2), 2);
        assert_eq!(line_of(text, 4), 3);
        assert_eq!(line_of(text, 100), 3);
    }
}
