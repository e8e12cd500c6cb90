//! Core scanner implementation.
//!
//! The scanner is pull-based: `scan_token` skips whitespace and comments,
//! then dispatches on the current character to produce exactly one token.

use crate::cursor::Cursor;
use crate::token::{keyword_from_ident, Token, TokenKind};

/// Scanner for Lox source text.
///
/// Produces one token per `scan_token` call; after the end of input it keeps
/// returning `Eof` tokens.
pub struct Scanner<'a> {
    /// Character cursor for source traversal.
    cursor: Cursor<'a>,

    /// Starting byte offset of the current token.
    token_start: usize,

    /// Line number where the current token starts.
    token_line: u32,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
            token_start: 0,
            token_line: 1,
        }
    }

    /// Returns the next token from the source code.
    ///
    /// Skips whitespace and `//` comments, then dispatches on the current
    /// character. Unrecognized characters and unterminated strings produce
    /// `Error` tokens whose lexeme is the message.
    pub fn scan_token(&mut self) -> Token<'a> {
        self.skip_whitespace();

        self.token_start = self.cursor.position();
        self.token_line = self.cursor.line();

        if self.cursor.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.cursor.current_char();
        self.cursor.advance();

        match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            ';' => self.make_token(TokenKind::Semicolon),
            ',' => self.make_token(TokenKind::Comma),
            '.' => self.make_token(TokenKind::Dot),
            '-' => self.make_token(TokenKind::Minus),
            '+' => self.make_token(TokenKind::Plus),
            '/' => self.make_token(TokenKind::Slash),
            '*' => self.make_token(TokenKind::Star),
            '!' => {
                let kind = if self.cursor.matches('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make_token(kind)
            }
            '=' => {
                let kind = if self.cursor.matches('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make_token(kind)
            }
            '<' => {
                let kind = if self.cursor.matches('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.make_token(kind)
            }
            '>' => {
                let kind = if self.cursor.matches('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.make_token(kind)
            }
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(),
            c if is_ident_start(c) => self.scan_identifier(),
            _ => self.error_token("Unexpected character."),
        }
    }

    /// Skips whitespace and line comments, tracking newlines.
    fn skip_whitespace(&mut self) {
        loop {
            match self.cursor.current_char() {
                ' ' | '\r' | '\t' | '\n' => self.cursor.advance(),
                '/' => {
                    if self.cursor.peek_next() == '/' {
                        // A comment goes until the end of the line.
                        while self.cursor.current_char() != '\n' && !self.cursor.is_at_end() {
                            self.cursor.advance();
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Scans a string literal. The returned lexeme keeps its quotes.
    ///
    /// Strings may span multiple lines; the token's line is the one the
    /// opening quote appeared on.
    fn scan_string(&mut self) -> Token<'a> {
        while self.cursor.current_char() != '"' && !self.cursor.is_at_end() {
            self.cursor.advance();
        }

        if self.cursor.is_at_end() {
            return self.error_token("Unterminated string.");
        }

        // The closing quote.
        self.cursor.advance();
        self.make_token(TokenKind::String)
    }

    /// Scans a number literal: digits with an optional fractional part.
    fn scan_number(&mut self) -> Token<'a> {
        while self.cursor.current_char().is_ascii_digit() {
            self.cursor.advance();
        }

        // Look for a fractional part.
        if self.cursor.current_char() == '.' && self.cursor.peek_next().is_ascii_digit() {
            // Consume the ".".
            self.cursor.advance();
            while self.cursor.current_char().is_ascii_digit() {
                self.cursor.advance();
            }
        }

        self.make_token(TokenKind::Number)
    }

    /// Scans an identifier or keyword.
    fn scan_identifier(&mut self) -> Token<'a> {
        while is_ident_continue(self.cursor.current_char()) {
            self.cursor.advance();
        }

        let text = self.cursor.slice_from(self.token_start);
        let kind = keyword_from_ident(text).unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }

    /// Builds a token of the given kind from the current lexeme range.
    fn make_token(&self, kind: TokenKind) -> Token<'a> {
        Token::new(kind, self.cursor.slice_from(self.token_start), self.token_line)
    }

    /// Builds an `Error` token whose lexeme is the message itself.
    fn error_token(&self, message: &'static str) -> Token<'a> {
        Token::new(TokenKind::Error, message, self.token_line)
    }
}

/// Returns true if `c` can start an identifier.
#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Returns true if `c` can continue an identifier.
#[inline]
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
