//! Edge case tests for the scanner.

use crate::{Scanner, TokenKind};

fn scan_all(source: &str) -> Vec<(TokenKind, String)> {
    let mut scanner = Scanner::new(source);
    let mut out = Vec::new();
    loop {
        let token = scanner.scan_token();
        out.push((token.kind, token.lexeme.to_string()));
        if token.kind == TokenKind::Eof {
            return out;
        }
    }
}

#[test]
fn test_unexpected_character_produces_error_token() {
    let tokens = scan_all("@");
    assert_eq!(tokens[0].0, TokenKind::Error);
    assert_eq!(tokens[0].1, "Unexpected character.");
    // Scanning continues after the bad character.
    let tokens = scan_all("@ 1");
    assert_eq!(tokens[1].0, TokenKind::Number);
}

#[test]
fn test_unterminated_string() {
    let tokens = scan_all("\"never closed");
    assert_eq!(tokens[0].0, TokenKind::Error);
    assert_eq!(tokens[0].1, "Unterminated string.");
}

#[test]
fn test_empty_string_literal() {
    let tokens = scan_all("\"\"");
    assert_eq!(tokens[0].0, TokenKind::String);
    assert_eq!(tokens[0].1, "\"\"");
}

#[test]
fn test_comment_at_end_of_file_without_newline() {
    let tokens = scan_all("1 // trailing");
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].0, TokenKind::Number);
    assert_eq!(tokens[1].0, TokenKind::Eof);
}

#[test]
fn test_slash_alone_is_division() {
    let tokens = scan_all("1 / 2");
    assert_eq!(tokens[1].0, TokenKind::Slash);
}

#[test]
fn test_dot_before_digits_does_not_start_number() {
    let tokens = scan_all(".5");
    assert_eq!(tokens[0].0, TokenKind::Dot);
    assert_eq!(tokens[1].0, TokenKind::Number);
}

#[test]
fn test_keyword_prefix_is_identifier() {
    for source in ["superb", "thistle", "nilly", "orchid", "andy", "iffy"] {
        let tokens = scan_all(source);
        assert_eq!(tokens[0].0, TokenKind::Identifier, "{source}");
    }
}

#[test]
fn test_crlf_line_counting() {
    let tokens = scan_all("1\r\n2");
    assert_eq!(tokens[0].0, TokenKind::Number);
    assert_eq!(tokens[1].0, TokenKind::Number);
}

#[test]
fn test_whitespace_only_input() {
    let tokens = scan_all("  \t \r\n  ");
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].0, TokenKind::Eof);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The scanner never panics and always terminates with Eof,
        /// whatever bytes it is fed.
        #[test]
        fn scanner_total_on_arbitrary_input(source in "\\PC{0,200}") {
            let tokens = scan_all(&source);
            prop_assert_eq!(tokens.last().map(|t| t.0), Some(TokenKind::Eof));
        }

        /// Identifier lexemes round-trip: scanning an identifier-shaped
        /// string yields one token with exactly that lexeme.
        #[test]
        fn identifier_lexeme_roundtrip(name in "[a-zA-Z_][a-zA-Z0-9_]{0,20}") {
            let tokens = scan_all(&name);
            prop_assert_eq!(tokens.len(), 2);
            prop_assert_eq!(tokens[0].1.as_str(), name.as_str());
        }
    }
}
