//! Function frames, lexical scopes, and variable resolution.

use loxc_lex::{Token, TokenKind};
use loxc_runtime::{Function, OpCode};

use crate::Compiler;

/// Locals and upvalues per function are addressed by one-byte operands.
pub(crate) const MAX_LOCALS: usize = 256;
pub(crate) const MAX_UPVALUES: usize = 256;

/// Depth sentinel for a local that is declared but not yet initialized.
const UNINITIALIZED: i32 = -1;

/// What kind of function a frame is compiling; drives the reserved zeroth
/// slot and the implicit-return shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionType {
    Function,
    Initializer,
    Method,
    Script,
}

/// One local variable slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Local<'src> {
    pub(crate) name: Token<'src>,
    /// Scope depth, or [`UNINITIALIZED`] until the initializer has run.
    pub(crate) depth: i32,
    /// Whether some nested function closes over this slot.
    pub(crate) is_captured: bool,
}

/// Compile-time upvalue descriptor, emitted after the `Closure` opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Local slot (is_local) or upvalue index (not) in the enclosing frame.
    pub index: u8,
    pub is_local: bool,
}

/// Per-function compiler state.
pub(crate) struct FunctionFrame<'src> {
    /// The function being built; moved into the heap when the frame ends.
    pub(crate) function: Function,
    pub(crate) fn_type: FunctionType,
    pub(crate) locals: Vec<Local<'src>>,
    pub(crate) upvalues: Vec<UpvalueDesc>,
    pub(crate) scope_depth: i32,
}

impl<'src> FunctionFrame<'src> {
    /// Creates a frame with slot zero reserved for the receiver: named
    /// "this" inside methods and initializers, unnamed otherwise.
    pub(crate) fn new(name: Option<loxc_runtime::ObjRef>, fn_type: FunctionType) -> Self {
        let receiver = if matches!(fn_type, FunctionType::Method | FunctionType::Initializer) {
            Token::synthetic("this")
        } else {
            Token::synthetic("")
        };

        Self {
            function: Function::new(name),
            fn_type,
            locals: vec![Local {
                name: receiver,
                depth: 0,
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

/// Class context: tracks whether `super` is legal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassFrame {
    pub(crate) has_superclass: bool,
}

impl<'src, 'ctx> Compiler<'src, 'ctx> {
    pub(crate) fn begin_scope(&mut self) {
        self.frame_mut().scope_depth += 1;
    }

    /// Closes a scope: discards its locals, closing each captured one so
    /// closures keep their own copy.
    pub(crate) fn end_scope(&mut self) {
        self.frame_mut().scope_depth -= 1;

        loop {
            let captured = {
                let frame = self.frame();
                match frame.locals.last() {
                    Some(local) if local.depth > frame.scope_depth => local.is_captured,
                    _ => break,
                }
            };
            if captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.frame_mut().locals.pop();
        }
    }

    /// Parses an identifier and declares it; returns the name-constant index
    /// for globals, 0 for locals (which need no constant).
    pub(crate) fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);

        self.declare_variable();
        if self.frame().scope_depth > 0 {
            return 0;
        }

        self.identifier_constant(self.previous)
    }

    /// Declares the previous token as a local in the current scope; no-op at
    /// global scope. Redeclaring within the same scope is an error.
    pub(crate) fn declare_variable(&mut self) {
        if self.frame().scope_depth == 0 {
            return;
        }

        let name = self.previous;
        let mut duplicate = false;
        {
            let frame = self.frame();
            for local in frame.locals.iter().rev() {
                if local.depth != UNINITIALIZED && local.depth < frame.scope_depth {
                    break;
                }
                if local.name.lexeme == name.lexeme {
                    duplicate = true;
                    break;
                }
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(name);
    }

    /// Appends a local in the uninitialized state.
    pub(crate) fn add_local(&mut self, name: Token<'src>) {
        if self.frame().locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }

        self.frame_mut().locals.push(Local {
            name,
            depth: UNINITIALIZED,
            is_captured: false,
        });
    }

    /// Finishes a declaration: locals become readable, globals emit their
    /// define instruction.
    pub(crate) fn define_variable(&mut self, global: u8) {
        if self.frame().scope_depth > 0 {
            self.mark_initialized();
            return;
        }

        self.emit_op(OpCode::DefineGlobal);
        self.emit_byte(global);
    }

    /// Flips the newest local from declared to initialized.
    pub(crate) fn mark_initialized(&mut self) {
        if self.frame().scope_depth == 0 {
            return;
        }
        let depth = self.frame().scope_depth;
        if let Some(local) = self.frame_mut().locals.last_mut() {
            local.depth = depth;
        }
    }

    /// Resolves `name` as a local of `frame_index`, top-down.
    pub(crate) fn resolve_local(&mut self, frame_index: usize, name: Token<'src>) -> Option<u8> {
        let mut in_own_initializer = false;
        let mut found = None;

        for (slot, local) in self.frames[frame_index].locals.iter().enumerate().rev() {
            if local.name.lexeme == name.lexeme {
                if local.depth == UNINITIALIZED {
                    in_own_initializer = true;
                }
                found = Some(slot as u8);
                break;
            }
        }

        if in_own_initializer {
            self.error("Can't read local variable in its own initializer.");
        }
        found
    }

    /// Resolves `name` as an upvalue of `frame_index`, capturing through the
    /// chain of enclosing functions as needed.
    pub(crate) fn resolve_upvalue(&mut self, frame_index: usize, name: Token<'src>) -> Option<u8> {
        if frame_index == 0 {
            return None;
        }

        if let Some(local) = self.resolve_local(frame_index - 1, name) {
            self.frames[frame_index - 1].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(frame_index, local, true));
        }

        if let Some(upvalue) = self.resolve_upvalue(frame_index - 1, name) {
            return Some(self.add_upvalue(frame_index, upvalue, false));
        }

        None
    }

    /// Adds an upvalue descriptor, reusing an existing equal one.
    fn add_upvalue(&mut self, frame_index: usize, index: u8, is_local: bool) -> u8 {
        let desc = UpvalueDesc { index, is_local };

        for (i, existing) in self.frames[frame_index].upvalues.iter().enumerate() {
            if *existing == desc {
                return i as u8;
            }
        }

        if self.frames[frame_index].upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }

        self.frames[frame_index].upvalues.push(desc);
        let count = self.frames[frame_index].upvalues.len();
        self.frames[frame_index].function.upvalue_count = count;
        (count - 1) as u8
    }

    /// Emits the load or store for an identifier reference, choosing local,
    /// upvalue, or global access.
    pub(crate) fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let top = self.frames.len() - 1;

        let (arg, get_op, set_op) = if let Some(slot) = self.resolve_local(top, name) {
            (slot, OpCode::GetLocal, OpCode::SetLocal)
        } else if let Some(slot) = self.resolve_upvalue(top, name) {
            (slot, OpCode::GetUpvalue, OpCode::SetUpvalue)
        } else {
            let constant = self.identifier_constant(name);
            (constant, OpCode::GetGlobal, OpCode::SetGlobal)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(set_op);
        } else {
            self.emit_op(get_op);
        }
        self.emit_byte(arg);
    }
}
