//! loxc-par - Single-Pass Compiler
//!
//! ============================================================================
//! COMPILATION MODEL
//! ============================================================================
//!
//! There is no AST. The compiler is a Pratt parser that emits bytecode while
//! it parses: each token kind maps to an optional prefix handler, an optional
//! infix handler, and an infix precedence, and `parse_precedence` drives them
//! (see `expr`). Statements and declarations are ordinary recursive descent
//! (see `stmt`).
//!
//! Name resolution happens inline during parsing (see `scope`):
//!
//! 1. Locals: searched top-down in the current function frame. A local with
//!    the sentinel depth -1 is declared but not yet initialized; reading it
//!    is the "own initializer" error.
//! 2. Upvalues: resolved recursively against enclosing frames, deduplicated
//!    by (index, is_local), capped at 256 per function.
//! 3. Globals: everything else; the identifier becomes a string constant and
//!    access is late-bound through the VM's globals table at runtime.
//!
//! ERROR HANDLING
//! --------------
//!
//! Compile errors print to stderr immediately in the fixed
//! `[line N] Error ...: message` shape, set `had_error`, and flip the parser
//! into panic mode, which suppresses further reports until `synchronize`
//! discards tokens up to a statement boundary. Parsing always continues to
//! the end of the source so one run surfaces as many errors as possible;
//! the caller gets a single `CompileError` at the end.
//!
//! GC COOPERATION
//! --------------
//!
//! The compiler allocates interned strings and finished functions in the
//! shared heap, so a collection can strike mid-compilation. At every
//! allocation site it marks the in-progress functions of its frame stack
//! (names and constant pools) plus the VM's persistent roots, handed in as
//! a `GcRoots`, before letting the heap collect.

pub mod expr;
pub mod scope;
pub mod stmt;

#[cfg(test)]
mod tests;

#[cfg(test)]
mod edge_cases;

use thiserror::Error;
use tracing::debug;

use loxc_lex::{Scanner, Token, TokenKind};
use loxc_runtime::{Chunk, GcRoots, Heap, Obj, ObjRef, OpCode, Value};

use scope::{ClassFrame, FunctionFrame, FunctionType};

/// Compilation failed; diagnostics were already written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("compilation failed")]
pub struct CompileError;

/// Compiles Lox source into a script function in `heap`.
///
/// `roots` supplies the caller's persistent GC roots (the VM's stack,
/// globals, and friends) so collections triggered by compiler allocations
/// keep them alive.
///
/// The returned function is not yet rooted anywhere; the caller must root it
/// (the VM pushes it on its stack) before the next allocation site.
pub fn compile(
    source: &str,
    heap: &mut Heap,
    roots: &dyn GcRoots,
) -> Result<ObjRef, CompileError> {
    let mut compiler = Compiler::new(source, heap, roots);

    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }

    let function = compiler.end_function();
    if compiler.had_error {
        Err(CompileError)
    } else {
        debug!(constants = compiler.heap.function(function).chunk.constants.len(),
               "compiled script");
        Ok(function)
    }
}

/// The single-pass compiler: parser state, the function frame stack, and
/// the class context stack, all driving bytecode emission into the frame on
/// top.
pub struct Compiler<'src, 'ctx> {
    scanner: Scanner<'src>,
    pub(crate) current: Token<'src>,
    pub(crate) previous: Token<'src>,
    pub(crate) had_error: bool,
    panic_mode: bool,

    /// One frame per function being compiled; the script frame is at the
    /// bottom and never pops until the end of the source.
    pub(crate) frames: Vec<FunctionFrame<'src>>,
    /// One entry per enclosing `class` declaration.
    pub(crate) classes: Vec<ClassFrame>,

    pub(crate) heap: &'ctx mut Heap,
    roots: &'ctx dyn GcRoots,
}

impl<'src, 'ctx> Compiler<'src, 'ctx> {
    fn new(source: &'src str, heap: &'ctx mut Heap, roots: &'ctx dyn GcRoots) -> Self {
        let placeholder = Token::new(TokenKind::Eof, "", 0);
        Self {
            scanner: Scanner::new(source),
            current: placeholder,
            previous: placeholder,
            had_error: false,
            panic_mode: false,
            frames: vec![FunctionFrame::new(None, FunctionType::Script)],
            classes: Vec::new(),
            heap,
            roots,
        }
    }

    // === Token plumbing ===

    /// Moves to the next token, reporting (and skipping) scan errors.
    pub(crate) fn advance(&mut self) {
        self.previous = self.current;

        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    /// Consumes the expected token kind or reports `message`.
    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn is_panicking(&self) -> bool {
        self.panic_mode
    }

    /// Consumes the token if it matches; returns whether it did.
    pub(crate) fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // === Diagnostics ===

    pub(crate) fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    pub(crate) fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    /// Reports one diagnostic unless already panicking.
    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        eprint!("[line {}] Error", token.line);
        match token.kind {
            TokenKind::Eof => eprint!(" at end"),
            // Scan errors carry the message as their lexeme; no location.
            TokenKind::Error => {}
            _ => eprint!(" at '{}'", token.lexeme),
        }
        eprintln!(": {message}");

        self.had_error = true;
    }

    /// Leaves panic mode by skipping to a likely statement boundary.
    pub(crate) fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // === Frame access ===

    pub(crate) fn frame(&self) -> &FunctionFrame<'src> {
        self.frames.last().expect("no active function frame")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut FunctionFrame<'src> {
        self.frames.last_mut().expect("no active function frame")
    }

    pub(crate) fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.frame_mut().function.chunk
    }

    // === Bytecode emission ===

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk().write(byte, line);
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.current_chunk().write_op(op, line);
    }

    pub(crate) fn emit_ops(&mut self, first: OpCode, second: OpCode) {
        self.emit_op(first);
        self.emit_op(second);
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op(OpCode::Constant);
        self.emit_byte(index);
    }

    /// Adds a constant, reporting the per-chunk budget overflow.
    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.current_chunk().add_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    /// Emits a jump with a placeholder offset; returns the operand position
    /// for `patch_jump`.
    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().code.len() - 2
    }

    /// Backpatches a forward jump to land after the current instruction.
    pub(crate) fn patch_jump(&mut self, offset: usize) {
        // -2 adjusts for the operand bytes themselves.
        let jump = self.current_chunk().code.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }

        let bytes = (jump as u16).to_be_bytes();
        self.current_chunk().code[offset] = bytes[0];
        self.current_chunk().code[offset + 1] = bytes[1];
    }

    /// Emits a backward jump to `loop_start`.
    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::JumpBack);

        let offset = self.current_chunk().code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    /// The implicit return: initializers hand back `this`, everything else
    /// returns nil.
    pub(crate) fn emit_return(&mut self) {
        if self.frame().fn_type == FunctionType::Initializer {
            self.emit_op(OpCode::GetLocal);
            self.emit_byte(0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    // === Heap cooperation ===

    /// Interns a string, collecting first if the heap asks for it.
    pub(crate) fn intern(&mut self, chars: &str) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(chars)
    }

    /// Interns an identifier lexeme and stores it as a constant.
    pub(crate) fn identifier_constant(&mut self, name: Token<'src>) -> u8 {
        let string = self.intern(name.lexeme);
        self.make_constant(Value::Obj(string))
    }

    /// Runs a collection with the compiler's own roots: every in-progress
    /// function's name and constants, plus the caller's persistent roots.
    fn collect_garbage(&mut self) {
        for frame_index in 0..self.frames.len() {
            if let Some(name) = self.frames[frame_index].function.name {
                self.heap.mark_object(name);
            }
            let constants = self.frames[frame_index].function.chunk.constants.len();
            for i in 0..constants {
                let value = self.frames[frame_index].function.chunk.constants[i];
                self.heap.mark_value(value);
            }
        }

        self.roots.mark_roots(self.heap);
        self.heap.collect();
    }

    /// Finishes the innermost function: emits the implicit return, pops its
    /// frame, and moves the function into the heap.
    ///
    /// Returns the function's handle; the upvalue descriptors the `Closure`
    /// instruction needs are left on the popped frame, which the caller
    /// receives through `end_function_with_upvalues` when compiling nested
    /// functions.
    pub(crate) fn end_function(&mut self) -> ObjRef {
        let (function, _) = self.end_function_with_upvalues();
        function
    }

    pub(crate) fn end_function_with_upvalues(&mut self) -> (ObjRef, Vec<scope::UpvalueDesc>) {
        self.emit_return();

        // Collect while the finished function is still rooted by its frame;
        // the allocation below cannot trigger another cycle.
        if self.heap.should_collect() {
            self.collect_garbage();
        }

        let frame = self.frames.pop().expect("no active function frame");
        let upvalues = frame.upvalues;
        let function = self.heap.alloc(Obj::Function(frame.function));

        #[cfg(feature = "print-code")]
        if !self.had_error {
            let name = self.heap.format_value(Value::Obj(function));
            eprintln!(
                "{}",
                loxc_runtime::debug::disassemble_chunk(
                    self.heap,
                    &self.heap.function(function).chunk,
                    &name,
                )
            );
        }

        (function, upvalues)
    }
}
