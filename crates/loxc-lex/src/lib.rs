//! loxc-lex - Lexical Analyzer (Scanner)
//!
//! The scanner transforms Lox source text into a stream of tokens. It is
//! deliberately lazy: the compiler pulls one token at a time, so the whole
//! token stream never exists in memory at once.
//!
//! Tokens borrow their lexemes directly from the source string and carry the
//! line number they started on. String lexemes include their enclosing
//! quotes; the compiler strips them when it interns the literal.
//!
//! Invalid input does not abort scanning. The scanner emits an `Error` token
//! whose lexeme is the message ("Unexpected character.", "Unterminated
//! string.") and the parser reports it with its usual diagnostics.

pub mod cursor;
pub mod scanner;
pub mod token;

#[cfg(test)]
mod edge_cases;

pub use cursor::Cursor;
pub use scanner::Scanner;
pub use token::{Token, TokenKind};
