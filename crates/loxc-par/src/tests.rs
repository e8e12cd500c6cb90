//! Bytecode-shape tests for the compiler.

use loxc_runtime::{Chunk, GcRoots, Heap, ObjRef, OpCode, Value};

use crate::{compile, CompileError};

struct NoRoots;

impl GcRoots for NoRoots {
    fn mark_roots(&self, _heap: &mut Heap) {}
}

fn compile_source(source: &str) -> (Heap, Result<ObjRef, CompileError>) {
    let mut heap = Heap::new();
    let result = compile(source, &mut heap, &NoRoots);
    (heap, result)
}

fn compile_ok(source: &str) -> (Heap, ObjRef) {
    let (heap, result) = compile_source(source);
    let function = result.expect("expected source to compile");
    (heap, function)
}

/// Walks a chunk and returns its opcodes, skipping operands.
fn opcodes(heap: &Heap, chunk: &Chunk) -> Vec<OpCode> {
    let mut ops = Vec::new();
    let mut offset = 0;
    while offset < chunk.code.len() {
        let op = OpCode::try_from(chunk.code[offset]).expect("valid opcode");
        ops.push(op);
        offset += 1;
        offset += match op {
            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::GetSuper
            | OpCode::Call
            | OpCode::Class
            | OpCode::Method => 1,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpBack => 2,
            OpCode::Invoke | OpCode::SuperInvoke => 2,
            OpCode::Closure => {
                let constant = chunk.code[offset] as usize;
                let function = match chunk.constants[constant] {
                    Value::Obj(r) => r,
                    other => panic!("closure constant is not an object: {other:?}"),
                };
                1 + 2 * heap.function(function).upvalue_count
            }
            _ => 0,
        };
    }
    ops
}

/// The function objects stored in a chunk's constant pool.
fn function_constants(heap: &Heap, chunk: &Chunk) -> Vec<ObjRef> {
    chunk
        .constants
        .iter()
        .filter_map(|value| value.as_obj())
        .filter(|r| matches!(heap.obj(*r), loxc_runtime::Obj::Function(_)))
        .collect()
}

#[test]
fn test_arithmetic_respects_precedence() {
    let (heap, script) = compile_ok("print 1 + 2 * 3;");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::Constant,
            OpCode::Constant,
            OpCode::Constant,
            OpCode::Multiply,
            OpCode::Add,
            OpCode::Print,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_grouping_overrides_precedence() {
    let (heap, script) = compile_ok("print (1 + 2) * 3;");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::Constant,
            OpCode::Constant,
            OpCode::Add,
            OpCode::Constant,
            OpCode::Multiply,
            OpCode::Print,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_global_declaration() {
    let (heap, script) = compile_ok("var a = 1;");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::Constant,
            OpCode::DefineGlobal,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_var_without_initializer_defaults_nil() {
    let (heap, script) = compile_ok("var a;");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::Nil,
            OpCode::DefineGlobal,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_locals_use_slots_not_names() {
    let (heap, script) = compile_ok("{ var a = 1; print a; }");
    let chunk = &heap.function(script).chunk;
    let ops = opcodes(&heap, chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::Constant,
            OpCode::GetLocal,
            OpCode::Print,
            OpCode::Pop,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
    // The local's name never reaches the constant pool.
    assert_eq!(chunk.constants.len(), 1);
    assert_eq!(chunk.constants[0], Value::Number(1.0));
}

#[test]
fn test_and_or_short_circuit_shape() {
    let (heap, script) = compile_ok("print true and false or true;");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::True,
            OpCode::JumpIfFalse,
            OpCode::Pop,
            OpCode::False,
            OpCode::JumpIfFalse,
            OpCode::Jump,
            OpCode::Pop,
            OpCode::True,
            OpCode::Print,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_if_else_shape() {
    let (heap, script) = compile_ok("if (true) print 1; else print 2;");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::True,
            OpCode::JumpIfFalse,
            OpCode::Pop,
            OpCode::Constant,
            OpCode::Print,
            OpCode::Jump,
            OpCode::Pop,
            OpCode::Constant,
            OpCode::Print,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_while_loops_back() {
    let (heap, script) = compile_ok("while (false) print 1;");
    let chunk = &heap.function(script).chunk;
    let ops = opcodes(&heap, chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::False,
            OpCode::JumpIfFalse,
            OpCode::Pop,
            OpCode::Constant,
            OpCode::Print,
            OpCode::JumpBack,
            OpCode::Pop,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
    // The backward jump lands on the condition at offset 0.
    let jump_back_at = chunk
        .code
        .iter()
        .position(|&b| b == u8::from(OpCode::JumpBack))
        .expect("backward jump emitted");
    let offset =
        u16::from_be_bytes([chunk.code[jump_back_at + 1], chunk.code[jump_back_at + 2]]) as usize;
    assert_eq!(jump_back_at + 3 - offset, 0);
}

#[test]
fn test_function_declaration_emits_closure() {
    let (heap, script) = compile_ok("fun f() { print 1; }");
    let chunk = &heap.function(script).chunk;
    let ops = opcodes(&heap, chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::Closure,
            OpCode::DefineGlobal,
            OpCode::Nil,
            OpCode::Return,
        ]
    );

    let functions = function_constants(&heap, chunk);
    assert_eq!(functions.len(), 1);
    let f = heap.function(functions[0]);
    assert_eq!(f.arity, 0);
    assert_eq!(f.upvalue_count, 0);
    assert_eq!(heap.string(f.name.expect("named function")).chars.as_ref(), "f");
}

#[test]
fn test_parameters_become_arity() {
    let (heap, script) = compile_ok("fun add(a, b, c) { return a + b + c; }");
    let functions = function_constants(&heap, &heap.function(script).chunk);
    assert_eq!(heap.function(functions[0]).arity, 3);
}

#[test]
fn test_closure_emits_upvalue_pairs() {
    let (heap, script) = compile_ok("fun outer() { var x = 1; fun inner() { print x; } }");
    let outer = function_constants(&heap, &heap.function(script).chunk)[0];
    let outer_chunk = &heap.function(outer).chunk;
    let inner = function_constants(&heap, outer_chunk)[0];

    // inner captures x as a local of outer.
    assert_eq!(heap.function(inner).upvalue_count, 1);

    let closure_at = outer_chunk
        .code
        .iter()
        .position(|&b| b == u8::from(OpCode::Closure))
        .expect("closure instruction");
    let is_local = outer_chunk.code[closure_at + 2];
    let index = outer_chunk.code[closure_at + 3];
    assert_eq!(is_local, 1);
    // Slot 1: slot 0 is the reserved receiver slot.
    assert_eq!(index, 1);
}

#[test]
fn test_transitive_capture_goes_through_enclosing_function() {
    let (heap, script) = compile_ok(
        "fun a() { var x = 1; fun b() { fun c() { print x; } } }",
    );
    let a = function_constants(&heap, &heap.function(script).chunk)[0];
    let b = function_constants(&heap, &heap.function(a).chunk)[0];
    let c = function_constants(&heap, &heap.function(b).chunk)[0];

    // b captures x from a as a local; c captures it from b as an upvalue.
    assert_eq!(heap.function(b).upvalue_count, 1);
    assert_eq!(heap.function(c).upvalue_count, 1);

    let b_chunk = &heap.function(b).chunk;
    let closure_at = b_chunk
        .code
        .iter()
        .position(|&byte| byte == u8::from(OpCode::Closure))
        .expect("closure instruction");
    let is_local = b_chunk.code[closure_at + 2];
    assert_eq!(is_local, 0);
}

#[test]
fn test_upvalues_deduplicate() {
    let (heap, script) = compile_ok("fun outer() { var x = 1; fun inner() { print x + x; } }");
    let outer = function_constants(&heap, &heap.function(script).chunk)[0];
    let inner = function_constants(&heap, &heap.function(outer).chunk)[0];
    assert_eq!(heap.function(inner).upvalue_count, 1);
}

#[test]
fn test_class_with_methods() {
    let (heap, script) = compile_ok("class Greeter { init(name) { } say() { } }");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert_eq!(
        ops,
        vec![
            OpCode::Class,
            OpCode::DefineGlobal,
            OpCode::GetGlobal,
            OpCode::Closure,
            OpCode::Method,
            OpCode::Closure,
            OpCode::Method,
            OpCode::Pop,
            OpCode::Nil,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_initializer_returns_receiver_slot() {
    let (heap, script) = compile_ok("class C { init() { } }");
    let init = function_constants(&heap, &heap.function(script).chunk)[0];
    let ops = opcodes(&heap, &heap.function(init).chunk);
    // Implicit return loads slot 0 (`this`) instead of nil.
    assert_eq!(ops, vec![OpCode::GetLocal, OpCode::Return]);
}

#[test]
fn test_inheritance_emits_inherit() {
    let (heap, script) = compile_ok("class A { } class B < A { }");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert!(ops.contains(&OpCode::Inherit));
}

#[test]
fn test_super_call_fuses() {
    let (heap, script) =
        compile_ok("class A { m() { } } class B < A { m() { super.m(); } }");
    let chunk = &heap.function(script).chunk;
    let b_method: Vec<ObjRef> = function_constants(&heap, chunk);
    // Find the method that uses super: it has one upvalue ("super").
    let uses_super = b_method
        .iter()
        .find(|f| heap.function(**f).upvalue_count == 1)
        .expect("method capturing super");
    let ops = opcodes(&heap, &heap.function(*uses_super).chunk);
    assert!(ops.contains(&OpCode::SuperInvoke));
}

#[test]
fn test_property_access_forms() {
    let (heap, script) = compile_ok("var o; o.f = 1; print o.f; o.m(2);");
    let ops = opcodes(&heap, &heap.function(script).chunk);
    assert!(ops.contains(&OpCode::SetProperty));
    assert!(ops.contains(&OpCode::GetProperty));
    assert!(ops.contains(&OpCode::Invoke));
}

#[test]
fn test_chunk_lines_stay_parallel() {
    let sources = [
        "print 1;\nprint 2;\nprint 3;",
        "fun f(a) { return a; }\nprint f(1);",
        "class C { m() { return this; } }",
        "for (var i = 0; i < 3; i = i + 1) print i;",
    ];
    for source in sources {
        let (heap, script) = compile_ok(source);
        let chunk = &heap.function(script).chunk;
        assert_eq!(chunk.code.len(), chunk.lines.len(), "{source}");
    }
}

#[test]
fn test_identifier_strings_are_interned_once() {
    let (heap, script) = compile_ok("var name = 1; print name; print name;");
    let chunk = &heap.function(script).chunk;
    // Every reference to `name` shares one interned string constant; the
    // pool holds the number, and each mention of the identifier re-adds the
    // same object.
    let name_constants: Vec<ObjRef> = chunk
        .constants
        .iter()
        .filter_map(|v| v.as_obj())
        .collect();
    assert!(name_constants.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_compile_under_gc_stress() {
    let mut heap = Heap::new();
    heap.set_stress(true);
    let result = compile(
        "class A { init() { this.x = \"value\"; } m() { return this.x; } }\n\
         fun wrap(v) { fun get() { return v; } return get; }\n\
         var a = A();\n\
         print wrap(a.m)();",
        &mut heap,
        &NoRoots,
    );
    let script = result.expect("stress compile succeeds");
    // Everything the script needs survived the per-allocation collections.
    assert!(heap.is_live(script));
    for function in function_constants(&heap, &heap.function(script).chunk) {
        assert!(heap.is_live(function));
    }
}
