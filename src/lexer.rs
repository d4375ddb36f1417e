//! The character-level scanner underneath the parser.
//!
//! [`ParserState`] wraps the source text and offers whitespace and comment
//! skipping, single and multi character peek/consume, identifier-or-literal
//! extraction, and longest-match token search over a candidate set.

use crate::error::{ParseError, ParseResult};

/// Scanner state over one source file.
#[derive(Debug, Clone)]
pub struct ParserState {
    chars: Vec<char>,
    /// Current position, as an index into the character stream.
    pub pos: usize,
    filename: String,
}

impl ParserState {
    /// Creates a scanner over the given source text.
    pub fn new(code: &str, filename: impl Into<String>) -> Self {
        ParserState {
            chars: code.chars().collect(),
            pos: 0,
            filename: filename.into(),
        }
    }

    /// Name of the file being scanned, for diagnostics.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Skips whitespace and both `/* ... */` and `// ...` comments.
    pub fn skip(&mut self) {
        let mut in_comment = false;
        let mut in_line_comment = false;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            let next = self.chars.get(self.pos + 1).copied();
            if in_comment {
                if c == '*' && next == Some('/') {
                    in_comment = false;
                    self.pos += 1;
                }
            } else if in_line_comment {
                if c == '\n' {
                    in_line_comment = false;
                }
            } else if c == '/' && next == Some('*') {
                in_comment = true;
                self.pos += 1;
            } else if c == '/' && next == Some('/') {
                in_line_comment = true;
                self.pos += 1;
            } else if !c.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    /// Whether the whole input has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn eof_error(&self) -> ParseError {
        ParseError::at(self.line(), "unexpected end of code")
    }

    /// Returns the next character without consuming it.
    pub fn peek(&self) -> ParseResult<char> {
        self.chars.get(self.pos).copied().ok_or_else(|| self.eof_error())
    }

    /// Returns and consumes the next character.
    pub fn get(&mut self) -> ParseResult<char> {
        let c = self.peek()?;
        self.pos += 1;
        Ok(c)
    }

    /// Returns up to `n` upcoming characters without consuming them. Shorter
    /// at end of input, so prefix checks near the end stay safe.
    pub fn peek_str(&self, n: usize) -> String {
        self.chars[self.pos..self.chars.len().min(self.pos + n)]
            .iter()
            .collect()
    }

    /// Consumes and returns exactly `n` characters.
    pub fn get_str(&mut self, n: usize) -> ParseResult<String> {
        let mut out = String::with_capacity(n);
        for _ in 0..n {
            out.push(self.get()?);
        }
        Ok(out)
    }

    /// Consumes the next character if it matches `c`; reports whether it did.
    pub fn check_match(&mut self, c: char) -> ParseResult<bool> {
        if self.peek()? == c {
            self.pos += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Reads the next identifier or numeric literal, or an empty string if
    /// the next character starts neither. A `-` directly before a digit is
    /// folded into the literal.
    pub fn next_ident_or_literal(&mut self) -> String {
        self.read_ident_or_literal(true)
    }

    /// Like [`ParserState::next_ident_or_literal`] but leaves the token in
    /// the stream (leading whitespace is still skipped).
    pub fn peek_ident_or_literal(&mut self) -> String {
        self.read_ident_or_literal(false)
    }

    fn read_ident_or_literal(&mut self, consume: bool) -> String {
        self.skip();
        let mut end = self.pos;
        let mut out = String::new();
        if self.chars.get(end) == Some(&'-')
            && self.chars.get(end + 1).is_some_and(|c| c.is_ascii_digit())
        {
            out.push('-');
            out.push(self.chars[end + 1]);
            end += 2;
        }
        while let Some(&c) = self.chars.get(end) {
            if c.is_ascii_alphanumeric() || c == '_' {
                out.push(c);
                end += 1;
            } else {
                break;
            }
        }
        if consume {
            self.pos = end;
        }
        out
    }

    /// Finds the longest token from `tokens` at the current position,
    /// returning its index. With `require_complete`, the match must not be
    /// followed by an identifier character (so `for` does not match inside
    /// `foreach`).
    pub fn find_token(
        &mut self,
        tokens: &[&str],
        consume: bool,
        require_complete: bool,
    ) -> Option<usize> {
        if self.at_end() {
            return None;
        }
        let mut found: Option<(usize, usize)> = None;
        for (i, token) in tokens.iter().enumerate() {
            let len = token.chars().count();
            if found.is_some_and(|(_, best)| len <= best) {
                continue;
            }
            if self.peek_str(len) != *token {
                continue;
            }
            if require_complete {
                if let Some(&after) = self.chars.get(self.pos + len) {
                    if after.is_ascii_alphanumeric() || after == '_' {
                        continue;
                    }
                }
            }
            found = Some((i, len));
        }
        if let Some((index, len)) = found {
            if consume {
                self.pos += len;
            }
            Some(index)
        } else {
            None
        }
    }

    /// Current 1-based line number.
    pub fn line(&self) -> usize {
        1 + self.chars[..self.pos.min(self.chars.len())]
            .iter()
            .filter(|&&c| c == '\n')
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_whitespace() {
        let mut s = ParserState::new("  /* block */ // line\n  token", "t");
        s.skip();
        assert_eq!(s.next_ident_or_literal(), "token");
        assert!(s.at_end());
    }

    #[test]
    fn longest_match_wins() {
        let mut s = ParserState::new("<<= x", "t");
        let tokens = ["<", "<<", "<<="];
        assert_eq!(s.find_token(&tokens, true, false), Some(2));
    }

    #[test]
    fn complete_token_requirement() {
        let mut s = ParserState::new("foreach", "t");
        assert_eq!(s.find_token(&["for"], false, true), None);
        assert_eq!(s.find_token(&["for"], false, false), Some(0));
    }

    #[test]
    fn negative_literals_fold() {
        let mut s = ParserState::new("-42", "t");
        assert_eq!(s.next_ident_or_literal(), "-42");
    }

    #[test]
    fn line_numbers() {
        let mut s = ParserState::new("a\nb\nc", "t");
        s.pos = 4;
        assert_eq!(s.line(), 3);
    }
}
