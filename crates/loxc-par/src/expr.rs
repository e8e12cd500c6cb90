//! Expression parsing using Pratt Parsing (Top-Down Operator Precedence)
//!
//! Each token kind has a parse rule: an optional prefix handler, an optional
//! infix handler, and the infix precedence. `parse_precedence` advances,
//! runs the prefix handler of what it saw, then keeps absorbing infix
//! operators while their precedence is at least the requested one.
//!
//! # Operator precedence (lowest to highest)
//!
//! | Level      | Operators           |
//! |------------|---------------------|
//! | Assignment | `=`                 |
//! | Or         | `or`                |
//! | And        | `and`               |
//! | Equality   | `==`, `!=`          |
//! | Comparison | `<`, `<=`, `>`, `>=`|
//! | Term       | `+`, `-`            |
//! | Factor     | `*`, `/`            |
//! | Unary      | `!`, `-`            |
//! | Call       | `.`, `()`           |

use loxc_lex::{Token, TokenKind};
use loxc_runtime::{OpCode, Value};

use crate::Compiler;

/// Binding strength, weakest first. Handlers for an operator parse their
/// right operand one level above their own precedence, which makes the
/// binary operators left-associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter.
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src, 'ctx> = fn(&mut Compiler<'src, 'ctx>, bool);

/// One row of the Pratt table.
pub(crate) struct ParseRule<'src, 'ctx> {
    prefix: Option<ParseFn<'src, 'ctx>>,
    infix: Option<ParseFn<'src, 'ctx>>,
    precedence: Precedence,
}

/// The parse rule for a token kind. The set is closed, so this match is the
/// whole table.
fn rule<'src, 'ctx>(kind: TokenKind) -> ParseRule<'src, 'ctx> {
    use TokenKind::*;

    let (prefix, infix, precedence): (
        Option<ParseFn<'src, 'ctx>>,
        Option<ParseFn<'src, 'ctx>>,
        Precedence,
    ) = match kind {
        LeftParen => (Some(grouping), Some(call), Precedence::Call),
        Dot => (None, Some(dot), Precedence::Call),
        Minus => (Some(unary), Some(binary), Precedence::Term),
        Plus => (None, Some(binary), Precedence::Term),
        Slash | Star => (None, Some(binary), Precedence::Factor),
        Bang => (Some(unary), None, Precedence::None),
        BangEqual | EqualEqual => (None, Some(binary), Precedence::Equality),
        Greater | GreaterEqual | Less | LessEqual => {
            (None, Some(binary), Precedence::Comparison)
        }
        Identifier => (Some(variable), None, Precedence::None),
        String => (Some(string), None, Precedence::None),
        Number => (Some(number), None, Precedence::None),
        And => (None, Some(and_), Precedence::And),
        Or => (None, Some(or_), Precedence::Or),
        True | False | Nil => (Some(literal), None, Precedence::None),
        This => (Some(this_), None, Precedence::None),
        Super => (Some(super_), None, Precedence::None),
        _ => (None, None, Precedence::None),
    };

    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

impl<'src, 'ctx> Compiler<'src, 'ctx> {
    /// Parses anything at assignment precedence or tighter.
    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// The Pratt core: prefix handler for the first token, then infix
    /// handlers while the next operator binds at least as tightly as
    /// `precedence`.
    ///
    /// `can_assign` rides along so `variable` and `dot` only treat `=` as
    /// assignment when the context allows it; a leftover `=` afterwards is
    /// the "Invalid assignment target." error.
    pub(crate) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let prefix = match rule(self.previous.kind).prefix {
            Some(prefix) => prefix,
            None => {
                self.error("Expect expression.");
                return;
            }
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Parses a parenthesized argument list; returns the count.
    pub(crate) fn argument_list(&mut self) -> u8 {
        let mut count: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count.min(255) as u8
    }
}

// === Prefix handlers ===

fn number(compiler: &mut Compiler, _can_assign: bool) {
    let value: f64 = compiler.previous.lexeme.parse().unwrap_or(0.0);
    compiler.emit_constant(Value::Number(value));
}

fn string(compiler: &mut Compiler, _can_assign: bool) {
    // Strip the enclosing quotes.
    let lexeme = compiler.previous.lexeme;
    let chars = &lexeme[1..lexeme.len() - 1];
    let string = compiler.intern(chars);
    compiler.emit_constant(Value::Obj(string));
}

fn literal(compiler: &mut Compiler, _can_assign: bool) {
    match compiler.previous.kind {
        TokenKind::False => compiler.emit_op(OpCode::False),
        TokenKind::True => compiler.emit_op(OpCode::True),
        TokenKind::Nil => compiler.emit_op(OpCode::Nil),
        _ => unreachable!("literal handler on non-literal token"),
    }
}

fn grouping(compiler: &mut Compiler, _can_assign: bool) {
    compiler.expression();
    compiler.consume(TokenKind::RightParen, "Expect ')' after expression.");
}

fn unary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous.kind;

    // Compile the operand first; the instruction applies to its result.
    compiler.parse_precedence(Precedence::Unary);

    match operator {
        TokenKind::Minus => compiler.emit_op(OpCode::Negate),
        TokenKind::Bang => compiler.emit_op(OpCode::Not),
        _ => unreachable!("unary handler on non-unary token"),
    }
}

fn variable<'src, 'ctx>(compiler: &mut Compiler<'src, 'ctx>, can_assign: bool) {
    compiler.named_variable(compiler.previous, can_assign);
}

fn this_(compiler: &mut Compiler, _can_assign: bool) {
    if compiler.classes.is_empty() {
        compiler.error("Can't use 'this' outside of a class.");
        return;
    }
    compiler.named_variable(compiler.previous, false);
}

fn super_<'src, 'ctx>(compiler: &mut Compiler<'src, 'ctx>, _can_assign: bool) {
    match compiler.classes.last() {
        None => compiler.error("Can't use 'super' outside of a class."),
        Some(class) if !class.has_superclass => {
            compiler.error("Can't use 'super' in a class with no superclass.");
        }
        Some(_) => {}
    }

    compiler.consume(TokenKind::Dot, "Expect '.' after 'super'.");
    compiler.consume(TokenKind::Identifier, "Expect superclass method name.");
    let name = compiler.identifier_constant(compiler.previous);

    // `this` provides the receiver, `super` the class to look in.
    compiler.named_variable(Token::synthetic("this"), false);
    if compiler.match_token(TokenKind::LeftParen) {
        let arg_count = compiler.argument_list();
        compiler.named_variable(Token::synthetic("super"), false);
        compiler.emit_op(OpCode::SuperInvoke);
        compiler.emit_byte(name);
        compiler.emit_byte(arg_count);
    } else {
        compiler.named_variable(Token::synthetic("super"), false);
        compiler.emit_op(OpCode::GetSuper);
        compiler.emit_byte(name);
    }
}

// === Infix handlers ===

fn binary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous.kind;
    let precedence = rule(operator).precedence;
    compiler.parse_precedence(precedence.next());

    match operator {
        TokenKind::BangEqual => compiler.emit_ops(OpCode::Equal, OpCode::Not),
        TokenKind::EqualEqual => compiler.emit_op(OpCode::Equal),
        TokenKind::Greater => compiler.emit_op(OpCode::Greater),
        TokenKind::GreaterEqual => compiler.emit_ops(OpCode::Less, OpCode::Not),
        TokenKind::Less => compiler.emit_op(OpCode::Less),
        TokenKind::LessEqual => compiler.emit_ops(OpCode::Greater, OpCode::Not),
        TokenKind::Plus => compiler.emit_op(OpCode::Add),
        TokenKind::Minus => compiler.emit_op(OpCode::Subtract),
        TokenKind::Star => compiler.emit_op(OpCode::Multiply),
        TokenKind::Slash => compiler.emit_op(OpCode::Divide),
        _ => unreachable!("binary handler on non-binary token"),
    }
}

fn call(compiler: &mut Compiler, _can_assign: bool) {
    let arg_count = compiler.argument_list();
    compiler.emit_op(OpCode::Call);
    compiler.emit_byte(arg_count);
}

fn dot<'src, 'ctx>(compiler: &mut Compiler<'src, 'ctx>, can_assign: bool) {
    compiler.consume(TokenKind::Identifier, "Expect property name after '.'.");
    let name = compiler.identifier_constant(compiler.previous);

    if can_assign && compiler.match_token(TokenKind::Equal) {
        compiler.expression();
        compiler.emit_op(OpCode::SetProperty);
        compiler.emit_byte(name);
    } else if compiler.match_token(TokenKind::LeftParen) {
        // Fused property access + call.
        let arg_count = compiler.argument_list();
        compiler.emit_op(OpCode::Invoke);
        compiler.emit_byte(name);
        compiler.emit_byte(arg_count);
    } else {
        compiler.emit_op(OpCode::GetProperty);
        compiler.emit_byte(name);
    }
}

/// `and` short-circuits: if the left side is falsey the right side is
/// skipped and the left value is the result.
fn and_(compiler: &mut Compiler, _can_assign: bool) {
    let end_jump = compiler.emit_jump(OpCode::JumpIfFalse);

    compiler.emit_op(OpCode::Pop);
    compiler.parse_precedence(Precedence::And);

    compiler.patch_jump(end_jump);
}

/// `or` short-circuits: a truthy left side skips the right.
fn or_(compiler: &mut Compiler, _can_assign: bool) {
    let else_jump = compiler.emit_jump(OpCode::JumpIfFalse);
    let end_jump = compiler.emit_jump(OpCode::Jump);

    compiler.patch_jump(else_jump);
    compiler.emit_op(OpCode::Pop);

    compiler.parse_precedence(Precedence::Or);
    compiler.patch_jump(end_jump);
}
