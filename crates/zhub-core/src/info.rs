//! Parser for the INFO property-tree format used by cluster schema files
//!
//! ```text
//! ; comment
//! key "quoted data"
//! key data
//! {
//!     child value
//! }
//! ```
//!
//! Each entry is a key with optional data on the same line, optionally
//! followed by a `{ ... }` block of child entries. The opening brace may sit
//! on the entry's line or on a following one. Quoted strings understand C
//! escapes and may be continued on the next line with a trailing `\`.

use crate::error::{Error, Result};

/// One entry of a property tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InfoNode {
    pub key: String,
    pub data: String,
    pub children: Vec<InfoNode>,
    /// 1-based source line of the key
    pub line: usize,
}

impl InfoNode {
    /// First child with the given key
    pub fn child(&self, key: &str) -> Option<&InfoNode> {
        self.children.iter().find(|c| c.key == key)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Open,
    Close,
    Newline,
}

fn syntax(line: usize, msg: impl std::fmt::Display) -> Error {
    Error::schema(format!("line {}: {}", line, msg))
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn skip_blanks(&mut self) {
        while matches!(self.chars.peek(), Some(' ' | '\t' | '\r')) {
            self.chars.next();
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_blanks();
            let line = self.line;
            let Some(&c) = self.chars.peek() else {
                break;
            };
            match c {
                '\n' => {
                    self.chars.next();
                    self.line += 1;
                    tokens.push((Token::Newline, line));
                }
                ';' => {
                    while matches!(self.chars.peek(), Some(c) if *c != '\n') {
                        self.chars.next();
                    }
                }
                '{' => {
                    self.chars.next();
                    tokens.push((Token::Open, line));
                }
                '}' => {
                    self.chars.next();
                    tokens.push((Token::Close, line));
                }
                '"' => {
                    let text = self.quoted_with_continuation()?;
                    tokens.push((Token::Text(text), line));
                }
                _ => {
                    let mut word = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_whitespace() || matches!(c, '{' | '}' | ';' | '"') {
                            break;
                        }
                        word.push(c);
                        self.chars.next();
                    }
                    tokens.push((Token::Text(word), line));
                }
            }
        }
        Ok(tokens)
    }

    fn quoted_with_continuation(&mut self) -> Result<String> {
        let mut text = self.quoted()?;
        loop {
            self.skip_blanks();
            if self.chars.peek() != Some(&'\\') {
                return Ok(text);
            }
            self.chars.next();
            self.skip_blanks();
            if self.chars.next() != Some('\n') {
                return Err(syntax(self.line, "expected line break after '\\'"));
            }
            self.line += 1;
            self.skip_blanks();
            if self.chars.peek() != Some(&'"') {
                return Err(syntax(self.line, "expected quoted string after line continuation"));
            }
            text.push_str(&self.quoted()?);
        }
    }

    fn quoted(&mut self) -> Result<String> {
        let start = self.line;
        self.chars.next();
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None | Some('\n') => return Err(syntax(start, "unterminated string")),
                Some('"') => return Ok(text),
                Some('\\') => {
                    let escaped = match self.chars.next() {
                        Some('0') => '\0',
                        Some('a') => '\x07',
                        Some('b') => '\x08',
                        Some('f') => '\x0c',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('v') => '\x0b',
                        Some(c @ ('"' | '\'' | '\\')) => c,
                        Some(c) => return Err(syntax(start, format!("invalid escape '\\{}'", c))),
                        None => return Err(syntax(start, "unterminated string")),
                    };
                    text.push(escaped);
                }
                Some(c) => text.push(c),
            }
        }
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, line)| *line)
            .unwrap_or(1)
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn entries(&mut self, opened_at: Option<usize>) -> Result<Vec<InfoNode>> {
        let mut nodes = Vec::new();
        loop {
            self.skip_newlines();
            let line = self.line();
            match self.peek().cloned() {
                None => {
                    return match opened_at {
                        Some(open) => Err(syntax(open, "unclosed '{'")),
                        None => Ok(nodes),
                    };
                }
                Some(Token::Close) => {
                    if opened_at.is_none() {
                        return Err(syntax(line, "unmatched '}'"));
                    }
                    self.pos += 1;
                    return Ok(nodes);
                }
                Some(Token::Open) => return Err(syntax(line, "'{' without a key")),
                Some(Token::Newline) => unreachable!("newlines skipped above"),
                Some(Token::Text(key)) => {
                    self.pos += 1;
                    nodes.push(self.entry(key, line)?);
                }
            }
        }
    }

    fn entry(&mut self, key: String, line: usize) -> Result<InfoNode> {
        let mut node = InfoNode {
            key,
            line,
            ..Default::default()
        };

        if let Some(Token::Text(data)) = self.peek().cloned() {
            self.pos += 1;
            node.data = data;
            if let Some(Token::Text(extra)) = self.peek() {
                return Err(syntax(line, format!("unexpected '{}' after data", extra)));
            }
        }

        let rewind = self.pos;
        self.skip_newlines();
        if self.peek() == Some(&Token::Open) {
            let open = self.line();
            self.pos += 1;
            node.children = self.entries(Some(open))?;
        } else {
            self.pos = rewind;
        }
        Ok(node)
    }
}

/// Parse INFO text into its top-level entries
pub fn parse(text: &str) -> Result<Vec<InfoNode>> {
    let tokens = Lexer::new(text).tokenize()?;
    Parser { tokens, pos: 0 }.entries(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_entries() {
        let nodes = parse(
            r#"
            ; clusters
            0x0006 "On/Off"
            {
                attributes {
                    0x0000 "OnOff" { type bool }
                }
            }
            "#,
        )
        .unwrap();

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].key, "0x0006");
        assert_eq!(nodes[0].data, "On/Off");
        let attrs = nodes[0].child("attributes").unwrap();
        assert_eq!(attrs.children[0].data, "OnOff");
        assert_eq!(attrs.children[0].children[0].key, "type");
        assert_eq!(attrs.children[0].children[0].data, "bool");
        assert_eq!(attrs.children[0].line, 6);
    }

    #[test]
    fn test_escapes_and_continuation() {
        let nodes = parse("k \"a\\tb\" \\\n  \"c\\\"d\"\nnext").unwrap();
        assert_eq!(nodes[0].data, "a\tbc\"d");
        assert_eq!(nodes[1].key, "next");
        assert_eq!(nodes[1].line, 3);
    }

    #[test]
    fn test_key_without_data() {
        let nodes = parse("a\nb c\n").unwrap();
        assert_eq!(nodes[0].data, "");
        assert!(nodes[0].children.is_empty());
        assert_eq!(nodes[1].data, "c");
    }

    #[test]
    fn test_errors_carry_line() {
        let err = parse("a {\n b c\n").unwrap_err();
        assert_eq!(err.to_string(), "schema error: line 1: unclosed '{'");
        assert!(parse("a b c").is_err());
        assert!(parse("}").is_err());
        assert!(parse("a \"open").is_err());
    }
}
