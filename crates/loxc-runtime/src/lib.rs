//! loxc-runtime - Values, Heap, and Garbage Collector
//!
//! ============================================================================
//! RUNTIME OVERVIEW
//! ============================================================================
//!
//! This crate owns everything the compiler and the VM share at runtime:
//!
//! 1. VALUES
//!    - `Value`: nil / bool / number / object reference, a Copy tagged union
//!    - Equality by tag and payload; object references compare by identity
//!
//! 2. HEAP OBJECTS
//!    - Strings, functions, closures, upvalues, classes, instances, bound
//!      methods and natives, all living in one index-based pool
//!    - `ObjRef` is a handle into that pool; identity equality is handle
//!      equality
//!
//! 3. BYTECODE
//!    - `Chunk`: code bytes, a parallel line array, and a constant pool
//!    - `OpCode`: the instruction set, one byte each
//!
//! 4. TABLES
//!    - Open-addressed hash table keyed by interned strings, with linear
//!      probing and tombstones; used for globals, interning, methods and
//!      instance fields
//!
//! 5. GARBAGE COLLECTION
//!    - Precise tri-color mark-and-sweep over the pool
//!    - Roots are supplied by the owner (VM stack, frames, globals, open
//!      upvalues) and, during compilation, by the compiler's in-progress
//!      functions; the heap itself contributes registered temp roots
//!    - The interned-string table is weak: white keys are pruned before
//!      sweep
//!
//! String interning is an invariant, not an optimization: every code path
//! that materializes string bytes funnels through `Heap::intern`, so two
//! string values are equal exactly when their handles are equal.

pub mod chunk;
pub mod debug;
pub mod heap;
pub mod object;
pub mod table;
pub mod value;

pub use chunk::{Chunk, OpCode};
pub use heap::{GcRoots, GcStats, Heap};
pub use object::{
    BoundMethod, Class, Closure, Function, Instance, LoxString, Native, NativeFn, Obj, ObjKind,
    ObjRef, Upvalue,
};
pub use table::Table;
pub use value::Value;
