//! loxc-vm - Bytecode Virtual Machine
//!
//! ============================================================================
//! EXECUTION MODEL
//! ============================================================================
//!
//! The VM executes closures over a single operand stack. Each call pushes a
//! frame holding the running closure, its instruction pointer, and the base
//! slot of its stack window: the base slot is the receiver (or the script
//! closure), parameters follow, and locals grow above them.
//!
//! Dispatch is a fetch-decode loop over one-byte opcodes. Runtime errors
//! print the message and a stack trace (one `[line N] in ...` per active
//! frame, innermost first) to stderr, reset the stack, and surface as
//! `InterpretError::Runtime` from `interpret`; the VM itself stays usable,
//! which is what keeps the REPL alive across errors.
//!
//! GC: the VM owns the heap and is its main root provider. Every allocation
//! site checks the heap's trigger and, when it fires, marks the operand
//! stack, the frame closures, the open upvalues, the globals table, and the
//! interned "init" string before collecting. During compilation those same
//! roots ride along into the compiler through a [`GcRoots`] view.

pub mod natives;


use std::io::{self, Write};

use thiserror::Error;
use tracing::debug;

use loxc_par::compile;
use loxc_runtime::{
    BoundMethod, Class, Closure, GcRoots, Heap, Instance, Native, NativeFn, Obj, ObjKind, ObjRef,
    OpCode, Table, Upvalue, Value,
};

/// Maximum call depth.
const FRAMES_MAX: usize = 64;

/// Operand stack capacity: one window per frame.
const STACK_MAX: usize = FRAMES_MAX * 256;

/// How an `interpret` call failed. Diagnostics were already printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InterpretError {
    /// The source did not compile.
    #[error("compile error")]
    Compile,
    /// Execution aborted on a runtime error.
    #[error("runtime error")]
    Runtime,
}

/// One function invocation.
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    closure: ObjRef,
    /// The closure's function, resolved once at call time.
    function: ObjRef,
    /// Offset into the function's chunk.
    ip: usize,
    /// Stack slot of the receiver / callee; the frame's window starts here.
    base: usize,
}

/// The VM's persistent roots, viewed for compile-time collections.
struct CompileRoots<'a> {
    stack: &'a [Value],
    frames: &'a [CallFrame],
    globals: &'a Table,
    open_upvalues: &'a [ObjRef],
    init_string: ObjRef,
}

impl GcRoots for CompileRoots<'_> {
    fn mark_roots(&self, heap: &mut Heap) {
        for &value in self.stack {
            heap.mark_value(value);
        }
        for frame in self.frames {
            heap.mark_object(frame.closure);
        }
        for &upvalue in self.open_upvalues {
            heap.mark_object(upvalue);
        }
        heap.mark_table(self.globals);
        heap.mark_object(self.init_string);
    }
}

/// The virtual machine. One instance per interpreter session; the REPL runs
/// every line against the same machine so globals accumulate.
pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    /// Upvalues still aliasing stack slots, sorted by descending slot.
    open_upvalues: Vec<ObjRef>,
    /// The interned "init", looked up on every class construction.
    init_string: ObjRef,
    /// Program output (`print`); stdout unless a test installs a buffer.
    out: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Builds a VM whose program output goes to `out`.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        natives::record_process_start();

        let mut heap = Heap::new();
        let init_string = heap.intern("init");

        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            out,
        };

        vm.define_native("clock", natives::clock);
        vm
    }

    /// Turns the collector's stress mode on or off.
    pub fn set_gc_stress(&mut self, stress: bool) {
        self.heap.set_stress(stress);
    }

    /// Lifetime collector counters, for diagnostics and tests.
    pub fn gc_stats(&self) -> loxc_runtime::GcStats {
        self.heap.stats()
    }

    /// Compiles and runs one unit of source against this VM's state.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        debug!(bytes = source.len(), "interpreting source");
        let roots = CompileRoots {
            stack: &self.stack,
            frames: &self.frames,
            globals: &self.globals,
            open_upvalues: &self.open_upvalues,
            init_string: self.init_string,
        };
        let function =
            compile(source, &mut self.heap, &roots).map_err(|_| InterpretError::Compile)?;

        // Root the script function across the closure allocation.
        self.push(Value::Obj(function));
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        let closure = self.heap.alloc(Obj::Closure(Closure {
            function,
            upvalues: Vec::new(),
        }));
        self.pop();
        self.push(Value::Obj(closure));
        self.call_closure(closure, 0)?;

        self.run()
    }

    /// Registers a native function under a global name.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let name_ref = self.intern(name);
        self.heap.push_root(Value::Obj(name_ref));

        if self.heap.should_collect() {
            self.collect_garbage();
        }
        let native = self.heap.alloc(Obj::Native(Native {
            name: name_ref,
            function,
        }));
        self.heap.push_root(Value::Obj(native));

        let hash = self.heap.string(name_ref).hash;
        self.globals.set(name_ref, hash, Value::Obj(native));

        self.heap.pop_root();
        self.heap.pop_root();
    }

    // === Stack ===

    #[inline]
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    #[inline]
    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // === Frames and instruction decoding ===

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    #[inline]
    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active call frame");
        let byte = self.heap.function(frame.function).chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    #[inline]
    fn read_u16(&mut self) -> u16 {
        let high = self.read_byte();
        let low = self.read_byte();
        u16::from_be_bytes([high, low])
    }

    #[inline]
    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.frame();
        self.heap.function(frame.function).chunk.constants[index]
    }

    /// Reads a constant that the compiler guarantees is a string.
    #[inline]
    fn read_string(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            other => panic!("name constant is not an object: {other:?}"),
        }
    }

    // === Errors ===

    /// Prints the message and a stack trace, resets the machine, and hands
    /// back the error for the dispatch loop to propagate.
    fn runtime_error(&mut self, message: &str) -> InterpretError {
        eprintln!("{message}");

        for frame in self.frames.iter().rev() {
            let function = self.heap.function(frame.function);
            // ip already advanced past the failing instruction.
            let line = function.chunk.line_at(frame.ip.saturating_sub(1));
            match function.name {
                Some(name) => {
                    eprintln!("[line {}] in {}()", line, self.heap.string(name).chars)
                }
                None => eprintln!("[line {line}] in script"),
            }
        }

        self.reset_stack();
        InterpretError::Runtime
    }

    // === GC ===

    /// Marks the VM's roots and runs a collection.
    fn collect_garbage(&mut self) {
        for i in 0..self.stack.len() {
            let value = self.stack[i];
            self.heap.mark_value(value);
        }
        for i in 0..self.frames.len() {
            let closure = self.frames[i].closure;
            self.heap.mark_object(closure);
        }
        for i in 0..self.open_upvalues.len() {
            let upvalue = self.open_upvalues[i];
            self.heap.mark_object(upvalue);
        }
        self.heap.mark_table(&self.globals);
        self.heap.mark_object(self.init_string);

        self.heap.collect();
    }

    /// Interns through the VM's allocation-site GC check.
    fn intern(&mut self, chars: &str) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(chars)
    }

    // === Calls ===

    /// Dispatches a call on `callee` with `arg_count` arguments already on
    /// the stack.
    fn call_value(&mut self, callee: Value, arg_count: usize) -> Result<(), InterpretError> {
        if let Value::Obj(r) = callee {
            match self.heap.kind(r) {
                ObjKind::Closure => return self.call_closure(r, arg_count),
                ObjKind::Native => {
                    let function = self.heap.native(r).function;
                    let first_arg = self.stack.len() - arg_count;
                    let result = function(&self.stack[first_arg..]);
                    self.stack.truncate(first_arg - 1);
                    self.push(result);
                    return Ok(());
                }
                ObjKind::Class => return self.construct_instance(r, arg_count),
                ObjKind::BoundMethod => {
                    let bound = self.heap.bound_method(r);
                    let (receiver, method) = (bound.receiver, bound.method);
                    let slot = self.stack.len() - arg_count - 1;
                    self.stack[slot] = receiver;
                    return self.call_closure(method, arg_count);
                }
                _ => {}
            }
        }
        Err(self.runtime_error("Can only call functions and classes."))
    }

    /// Pushes a frame for a closure call, checking arity and recursion
    /// depth.
    fn call_closure(&mut self, closure: ObjRef, arg_count: usize) -> Result<(), InterpretError> {
        let function = self.heap.closure(closure).function;
        let arity = self.heap.function(function).arity;

        if arg_count != arity {
            let message = format!("Expected {arity} arguments but got {arg_count}.");
            return Err(self.runtime_error(&message));
        }

        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }

        self.frames.push(CallFrame {
            closure,
            function,
            ip: 0,
            base: self.stack.len() - arg_count - 1,
        });
        Ok(())
    }

    /// `Class(...)`: builds an instance and runs `init` if the class has
    /// one.
    fn construct_instance(&mut self, class: ObjRef, arg_count: usize) -> Result<(), InterpretError> {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        let instance = self.heap.alloc(Obj::Instance(Instance {
            class,
            fields: Table::new(),
        }));
        let slot = self.stack.len() - arg_count - 1;
        self.stack[slot] = Value::Obj(instance);

        let hash = self.heap.string(self.init_string).hash;
        match self.heap.class(class).methods.get(self.init_string, hash) {
            Some(Value::Obj(initializer)) => self.call_closure(initializer, arg_count),
            _ if arg_count != 0 => {
                let message = format!("Expected 0 arguments but got {arg_count}.");
                Err(self.runtime_error(&message))
            }
            _ => Ok(()),
        }
    }

    /// `INVOKE`: property call without materializing a bound method. A field
    /// with the same name shadows the method and is called as a plain value.
    fn invoke(&mut self, name: ObjRef, arg_count: usize) -> Result<(), InterpretError> {
        let receiver = self.peek(arg_count);
        let instance = match receiver {
            Value::Obj(r) if self.heap.kind(r) == ObjKind::Instance => r,
            _ => return Err(self.runtime_error("Only instances have properties.")),
        };

        let hash = self.heap.string(name).hash;
        if let Some(field) = self.heap.instance(instance).fields.get(name, hash) {
            let slot = self.stack.len() - arg_count - 1;
            self.stack[slot] = field;
            return self.call_value(field, arg_count);
        }

        let class = self.heap.instance(instance).class;
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        arg_count: usize,
    ) -> Result<(), InterpretError> {
        let hash = self.heap.string(name).hash;
        match self.heap.class(class).methods.get(name, hash) {
            Some(Value::Obj(method)) => self.call_closure(method, arg_count),
            _ => {
                let message = format!("Undefined property '{}'.", self.heap.string(name).chars);
                Err(self.runtime_error(&message))
            }
        }
    }

    /// Resolves a method on `class` and leaves a bound method on the stack
    /// in place of the receiver.
    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), InterpretError> {
        let hash = self.heap.string(name).hash;
        let method = match self.heap.class(class).methods.get(name, hash) {
            Some(Value::Obj(method)) => method,
            _ => {
                let message = format!("Undefined property '{}'.", self.heap.string(name).chars);
                return Err(self.runtime_error(&message));
            }
        };

        if self.heap.should_collect() {
            self.collect_garbage();
        }
        let receiver = self.peek(0);
        let bound = self
            .heap
            .alloc(Obj::BoundMethod(BoundMethod { receiver, method }));
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    // === Upvalues ===

    /// Captures the stack slot as an upvalue, reusing an existing open one.
    /// The open list stays sorted by descending slot.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut index = 0;
        while index < self.open_upvalues.len() {
            let upvalue = self.open_upvalues[index];
            match *self.heap.upvalue(upvalue) {
                Upvalue::Open(existing) if existing > slot => index += 1,
                Upvalue::Open(existing) if existing == slot => return upvalue,
                _ => break,
            }
        }

        if self.heap.should_collect() {
            self.collect_garbage();
        }
        let created = self.heap.alloc(Obj::Upvalue(Upvalue::Open(slot)));
        self.open_upvalues.insert(index, created);
        created
    }

    /// Closes every open upvalue at or above `last`, moving the stack value
    /// into the upvalue.
    fn close_upvalues(&mut self, last: usize) {
        while let Some(&upvalue) = self.open_upvalues.first() {
            let slot = match *self.heap.upvalue(upvalue) {
                Upvalue::Open(slot) => slot,
                Upvalue::Closed(_) => {
                    self.open_upvalues.remove(0);
                    continue;
                }
            };
            if slot < last {
                break;
            }

            let value = self.stack[slot];
            *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value);
            self.open_upvalues.remove(0);
        }
    }

    // === Binary helpers ===

    fn binary_number(
        &mut self,
        apply: fn(f64, f64) -> Value,
    ) -> Result<(), InterpretError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(apply(a, b));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    // === Dispatch ===

    fn run(&mut self) -> Result<(), InterpretError> {
        loop {
            #[cfg(feature = "trace-execution")]
            self.trace_instruction();

            let byte = self.read_byte();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(_) => {
                    let message = format!("Unknown opcode {byte}.");
                    return Err(self.runtime_error(&message));
                }
            };

            match op {
                OpCode::Constant => {
                    let constant = self.read_constant();
                    self.push(constant);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().base;
                    let value = self.stack[base + slot];
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().base;
                    self.stack[base + slot] = self.peek(0);
                }

                OpCode::GetGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string(name).hash;
                    match self.globals.get(name, hash) {
                        Some(value) => self.push(value),
                        None => {
                            let message =
                                format!("Undefined variable '{}'.", self.heap.string(name).chars);
                            return Err(self.runtime_error(&message));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    // Assignment never creates; undo the insert it just did.
                    if self.globals.set(name, hash, value) {
                        self.globals.delete(name, hash);
                        let message =
                            format!("Undefined variable '{}'.", self.heap.string(name).chars);
                        return Err(self.runtime_error(&message));
                    }
                }

                OpCode::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(slot) => self.stack[slot],
                        Upvalue::Closed(value) => value,
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = self.peek(0);
                    let open_slot = match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(slot) => Some(slot),
                        Upvalue::Closed(_) => None,
                    };
                    match open_slot {
                        Some(slot) => self.stack[slot] = value,
                        None => *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value),
                    }
                }

                OpCode::GetProperty => {
                    let name = self.read_string();
                    let instance = match self.peek(0) {
                        Value::Obj(r) if self.heap.kind(r) == ObjKind::Instance => r,
                        _ => {
                            return Err(self.runtime_error("Only instances have properties."));
                        }
                    };

                    let hash = self.heap.string(name).hash;
                    if let Some(value) = self.heap.instance(instance).fields.get(name, hash) {
                        self.pop();
                        self.push(value);
                    } else {
                        let class = self.heap.instance(instance).class;
                        self.bind_method(class, name)?;
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string();
                    let instance = match self.peek(1) {
                        Value::Obj(r) if self.heap.kind(r) == ObjKind::Instance => r,
                        _ => {
                            return Err(self.runtime_error("Only instances have properties."));
                        }
                    };

                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    self.heap.instance_mut(instance).fields.set(name, hash, value);

                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_string();
                    let superclass = match self.pop() {
                        Value::Obj(r) => r,
                        other => panic!("superclass slot holds {other:?}"),
                    };
                    self.bind_method(superclass, name)?;
                }

                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.binary_number(|a, b| Value::Bool(a > b))?,
                OpCode::Less => self.binary_number(|a, b| Value::Bool(a < b))?,
                OpCode::Add => {
                    match (self.peek(1), self.peek(0)) {
                        (Value::Number(a), Value::Number(b)) => {
                            self.pop();
                            self.pop();
                            self.push(Value::Number(a + b));
                        }
                        (Value::Obj(a), Value::Obj(b))
                            if self.heap.kind(a) == ObjKind::String
                                && self.heap.kind(b) == ObjKind::String =>
                        {
                            let combined = format!(
                                "{}{}",
                                self.heap.string(a).chars,
                                self.heap.string(b).chars
                            );
                            // Operands stay on the stack across the
                            // allocation so a collection keeps them alive.
                            let result = self.intern(&combined);
                            self.pop();
                            self.pop();
                            self.push(Value::Obj(result));
                        }
                        _ => {
                            return Err(self.runtime_error(
                                "Operands must be two numbers or two strings.",
                            ));
                        }
                    }
                }
                OpCode::Subtract => self.binary_number(|a, b| Value::Number(a - b))?,
                OpCode::Multiply => self.binary_number(|a, b| Value::Number(a * b))?,
                OpCode::Divide => self.binary_number(|a, b| Value::Number(a / b))?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => match self.peek(0) {
                    Value::Number(n) => {
                        self.pop();
                        self.push(Value::Number(-n));
                    }
                    _ => return Err(self.runtime_error("Operand must be a number.")),
                },

                OpCode::Print => {
                    let value = self.pop();
                    let text = self.heap.format_value(value);
                    let _ = writeln!(self.out, "{text}");
                }

                OpCode::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::JumpBack => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte() as usize;
                    let callee = self.peek(arg_count);
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte() as usize;
                    self.invoke(name, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte() as usize;
                    let superclass = match self.pop() {
                        Value::Obj(r) => r,
                        other => panic!("superclass slot holds {other:?}"),
                    };
                    self.invoke_from_class(superclass, name, arg_count)?;
                }

                OpCode::Closure => {
                    let function = match self.read_constant() {
                        Value::Obj(r) => r,
                        other => panic!("closure constant is not an object: {other:?}"),
                    };
                    let upvalue_count = self.heap.function(function).upvalue_count;

                    if self.heap.should_collect() {
                        self.collect_garbage();
                    }
                    let closure = self.heap.alloc(Obj::Closure(Closure {
                        function,
                        upvalues: Vec::with_capacity(upvalue_count),
                    }));
                    // On the stack immediately: upvalue allocation below
                    // must see the closure as a root.
                    self.push(Value::Obj(closure));

                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            let base = self.frame().base;
                            self.capture_upvalue(base + index)
                        } else {
                            self.heap.closure(self.frame().closure).upvalues[index]
                        };
                        self.heap.closure_mut(closure).upvalues.push(upvalue);
                    }
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }

                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("call frame underflow");
                    self.close_upvalues(frame.base);

                    if self.frames.is_empty() {
                        // The script frame: done.
                        self.stack.truncate(frame.base);
                        return Ok(());
                    }

                    self.stack.truncate(frame.base);
                    self.push(result);
                }

                OpCode::Class => {
                    let name = self.read_string();
                    if self.heap.should_collect() {
                        self.collect_garbage();
                    }
                    let class = self.heap.alloc(Obj::Class(Class {
                        name,
                        methods: Table::new(),
                    }));
                    self.push(Value::Obj(class));
                }
                OpCode::Inherit => {
                    let superclass = match self.peek(1) {
                        Value::Obj(r) if self.heap.kind(r) == ObjKind::Class => r,
                        _ => return Err(self.runtime_error("Superclass must be a class.")),
                    };
                    let subclass = match self.peek(0) {
                        Value::Obj(r) => r,
                        other => panic!("subclass slot holds {other:?}"),
                    };

                    let methods: Vec<(ObjRef, Value)> = {
                        let table = &self.heap.class(superclass).methods;
                        (0..table.capacity())
                            .filter_map(|i| table.entry_at(i))
                            .collect()
                    };
                    for (key, value) in methods {
                        let hash = self.heap.string(key).hash;
                        self.heap.class_mut(subclass).methods.set(key, hash, value);
                    }

                    self.pop();
                }
                OpCode::Method => {
                    let name = self.read_string();
                    let method = self.peek(0);
                    let class = match self.peek(1) {
                        Value::Obj(r) => r,
                        other => panic!("class slot holds {other:?}"),
                    };
                    let hash = self.heap.string(name).hash;
                    self.heap.class_mut(class).methods.set(name, hash, method);
                    self.pop();
                }
            }
        }
    }

    #[cfg(feature = "trace-execution")]
    fn trace_instruction(&self) {
        let mut line = String::from("          ");
        for value in &self.stack {
            line.push_str(&format!("[ {} ]", self.heap.format_value(*value)));
        }
        eprintln!("{line}");

        let frame = self.frames.last().expect("no active call frame");
        let mut text = String::new();
        loxc_runtime::debug::disassemble_instruction(
            &self.heap,
            &self.heap.function(frame.function).chunk,
            frame.ip,
            &mut text,
        );
        eprint!("{text}");
    }
}
