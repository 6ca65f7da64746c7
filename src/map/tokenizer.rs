//! Script tokenizer shared by `.map` files and the entity lump.
//!
//! Tokens are separated by whitespace; `"quoted strings"` form one token
//! (without the quotes) and `//` starts a comment running to end of line.

use crate::errors::{CompileError, Result};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub line: usize,
    pub quoted: bool,
}

pub struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    peeked: Option<Token<'a>>,
}

impl<'a> Tokenizer<'a> {
    pub const fn new(src: &'a str) -> Self {
        Tokenizer {
            src,
            pos: 0,
            line: 1,
            peeked: None,
        }
    }

    /// Line of the most recently read token.
    pub const fn line(&self) -> usize {
        self.line
    }

    pub fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_space_and_comments(&mut self) {
        let bytes = self.src.as_bytes();
        loop {
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                if bytes[self.pos] == b'\n' {
                    self.line += 1;
                }
                self.pos += 1;
            }
            if bytes[self.pos..].starts_with(b"//") {
                while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn scan(&mut self) -> Result<Option<Token<'a>>> {
        self.skip_space_and_comments();
        let bytes = self.src.as_bytes();
        if self.pos >= bytes.len() {
            return Ok(None);
        }

        if bytes[self.pos] == b'"' {
            let start = self.pos + 1;
            let line = self.line;
            let mut end = start;
            while end < bytes.len() && bytes[end] != b'"' {
                if bytes[end] == b'\n' {
                    self.line += 1;
                }
                end += 1;
            }
            if end >= bytes.len() {
                return Err(CompileError::Parse {
                    line,
                    message: "unterminated quoted string".into(),
                });
            }
            self.pos = end + 1;
            return Ok(Some(Token {
                text: &self.src[start..end],
                line,
                quoted: true,
            }));
        }

        let start = self.pos;
        while self.pos < bytes.len() && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        Ok(Some(Token {
            text: &self.src[start..self.pos],
            line: self.line,
            quoted: false,
        }))
    }

    pub fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        match self.peeked.take() {
            Some(t) => Ok(Some(t)),
            None => self.scan(),
        }
    }

    pub fn peek(&mut self) -> Result<Option<Token<'a>>> {
        if self.peeked.is_none() {
            self.peeked = self.scan()?;
        }
        Ok(self.peeked)
    }

    /// Next token; end of input is an error.
    pub fn require(&mut self, what: &str) -> Result<Token<'a>> {
        self.next_token()?
            .ok_or_else(|| self.error(format!("unexpected end of file, expected {what}")))
    }

    pub fn expect(&mut self, expected: &str) -> Result<()> {
        let t = self.require(expected)?;
        if t.text != expected {
            return Err(CompileError::Parse {
                line: t.line,
                message: format!("expected '{expected}', found '{}'", t.text),
            });
        }
        Ok(())
    }

    pub fn parse<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let t = self.require(what)?;
        t.text.parse().map_err(|_| CompileError::Parse {
            line: t.line,
            message: format!("expected {what}, found '{}'", t.text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_comments_and_lines() {
        let mut t = Tokenizer::new("// header\n{\n\"classname\" \"info player\"\n( 1 2 3 )\n}");
        assert_eq!(t.next_token().unwrap().unwrap().text, "{");
        let key = t.next_token().unwrap().unwrap();
        assert!(key.quoted);
        assert_eq!(key.line, 3);
        assert_eq!(t.next_token().unwrap().unwrap().text, "info player");
        assert_eq!(t.next_token().unwrap().unwrap().text, "(");
        assert_eq!(t.parse::<f64>("number").unwrap(), 1.0);
        assert_eq!(t.peek().unwrap().unwrap().text, "2");
        assert_eq!(t.next_token().unwrap().unwrap().text, "2");
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let mut t = Tokenizer::new("\"oops");
        assert!(matches!(t.next_token(), Err(CompileError::Parse { line: 1, .. })));
    }
}
