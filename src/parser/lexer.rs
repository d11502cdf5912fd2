//! The line-oriented lexer.
//!
//! Source is ASCII and strictly line-shaped: the lexer is handed one
//! physical line at a time and produces tokens until the end-of-line
//! token, with a one-token push-back used by the parser's lookahead.

use std::collections::HashMap;

use lazy_static::lazy_static;
use maplit::hashmap;

use crate::config::{MAX_NUMBER_LEN, MAX_STR_IDENT_LEN};
use crate::load_file::Opcode;

use super::error::ErrorKind;

/// An error at a column of the current line, before the assembler ties
/// it to a file and line number.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineError {
    pub kind: ErrorKind,
    pub col: usize,
}

impl LineError {
    pub fn new(kind: ErrorKind, col: usize) -> Self {
        Self { kind, col }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Opcode(Opcode),
    Org,
    Nam,
    Ver,
    Aut,
    Def,

    Number(u32),
    Ident(String),
    Str(String),

    Hash,
    Dollar,
    At,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Comma,
    Equal,
    Colon,
    LParen,
    RParen,

    /// A character no token can start with.
    Invalid(char),

    /// End of line, also produced by a `;` comment.
    Eol,
}

/// A token plus the column it started at. The column both anchors
/// diagnostics and implements push-back.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
}

lazy_static! {
    /// Opcode and directive keywords, all exactly three letters,
    /// matched case-insensitively against the folded identifier.
    static ref KEYWORDS: HashMap<&'static str, TokenKind> = hashmap! {
        "DAT" => TokenKind::Opcode(Opcode::Dat),
        "MOV" => TokenKind::Opcode(Opcode::Mov),
        "ADD" => TokenKind::Opcode(Opcode::Add),
        "SUB" => TokenKind::Opcode(Opcode::Sub),
        "MUL" => TokenKind::Opcode(Opcode::Mul),
        "DIV" => TokenKind::Opcode(Opcode::Div),
        "MOD" => TokenKind::Opcode(Opcode::Mod),
        "JMP" => TokenKind::Opcode(Opcode::Jmp),
        "JMZ" => TokenKind::Opcode(Opcode::Jmz),
        "JMN" => TokenKind::Opcode(Opcode::Jmn),
        "SKL" => TokenKind::Opcode(Opcode::Skl),
        "SKE" => TokenKind::Opcode(Opcode::Ske),
        "SKN" => TokenKind::Opcode(Opcode::Skn),
        "SKG" => TokenKind::Opcode(Opcode::Skg),
        "SPL" => TokenKind::Opcode(Opcode::Spl),
        "ORG" => TokenKind::Org,
        "NAM" => TokenKind::Nam,
        "VER" => TokenKind::Ver,
        "AUT" => TokenKind::Aut,
        "DEF" => TokenKind::Def,
    };
}

fn is_string_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'.' | b'@' | b'\'' | b' ')
}

/// Tokenizes a single line.
pub struct Lexer<'a> {
    line: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(line: &'a str) -> Self {
        Self {
            line: line.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.line.get(self.pos).copied()
    }

    /// Push a token back; the next [`Self::next_token`] call re-reads it.
    pub fn unget(&mut self, token: &Token) {
        self.pos = token.start;
    }

    /// Produce the next token. Once [`TokenKind::Eol`] has been
    /// returned, every further call returns it again.
    pub fn next_token(&mut self) -> Result<Token, LineError> {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }

        let start = self.pos;
        let ch = match self.peek() {
            None | Some(b';') => {
                return Ok(Token {
                    kind: TokenKind::Eol,
                    start,
                })
            }
            Some(ch) => ch,
        };

        let kind = match ch {
            b'#' => TokenKind::Hash,
            b'$' => TokenKind::Dollar,
            b'@' => TokenKind::At,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b',' => TokenKind::Comma,
            b'=' => TokenKind::Equal,
            b':' => TokenKind::Colon,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'"' => return self.string(),
            b'0'..=b'9' => return self.number(),
            _ if ch.is_ascii_alphabetic() => return self.ident(),
            _ => TokenKind::Invalid(ch as char),
        };

        self.pos += 1;
        Ok(Token { kind, start })
    }

    fn string(&mut self) -> Result<Token, LineError> {
        self.pos += 1;
        let body_start = self.pos;

        while self.peek().map_or(false, is_string_char) {
            self.pos += 1;
        }

        if self.pos - body_start > MAX_STR_IDENT_LEN {
            return Err(LineError::new(ErrorKind::StringTooLong, body_start));
        }

        match self.peek() {
            None => Err(LineError::new(ErrorKind::UnterminatedString, self.pos)),
            Some(b'"') => {
                let body =
                    String::from_utf8_lossy(&self.line[body_start..self.pos]).into_owned();
                self.pos += 1;
                Ok(Token {
                    kind: TokenKind::Str(body),
                    start: body_start,
                })
            }
            Some(_) => Err(LineError::new(ErrorKind::IllegalStringChar, self.pos)),
        }
    }

    fn number(&mut self) -> Result<Token, LineError> {
        let start = self.pos;

        while self.peek().map_or(false, |ch| ch.is_ascii_digit()) {
            self.pos += 1;
        }

        if self.pos - start > MAX_NUMBER_LEN {
            return Err(LineError::new(ErrorKind::NumberTooLong, start));
        }

        let digits = std::str::from_utf8(&self.line[start..self.pos])
            .expect("digits are ASCII");
        let value: u32 = digits.parse().expect("bounded digit count fits u32");

        Ok(Token {
            kind: TokenKind::Number(value),
            start,
        })
    }

    fn ident(&mut self) -> Result<Token, LineError> {
        let start = self.pos;

        while self
            .peek()
            .map_or(false, |ch| ch.is_ascii_alphanumeric() || ch == b'_')
        {
            self.pos += 1;
        }

        if self.pos - start > MAX_STR_IDENT_LEN {
            return Err(LineError::new(ErrorKind::IdentifierTooLong, start));
        }

        let folded = std::str::from_utf8(&self.line[start..self.pos])
            .expect("identifier chars are ASCII")
            .to_ascii_uppercase();

        let kind = KEYWORDS
            .get(folded.as_str())
            .cloned()
            .unwrap_or(TokenKind::Ident(folded));

        Ok(Token { kind, start })
    }
}
