//! The object heap and its mark-and-sweep collector.
//!
//! Objects live in an index-based pool; an [`ObjRef`] is a slot index. Swept
//! slots go on a free list and are recycled by later allocations, so the
//! pool doubles as the all-objects list the sweep phase walks.
//!
//! Collection is tri-color: white objects are unmarked, gray objects sit on
//! the worklist waiting to be scanned, black objects are marked and scanned.
//! The owner of the heap marks its roots (operand stack, call frames, open
//! upvalues, globals, and during compilation the in-progress functions),
//! then calls [`Heap::collect`], which drains the worklist, prunes white
//! keys out of the weak interned-string table, and sweeps.
//!
//! Allocation itself never collects. Callers check [`Heap::should_collect`]
//! at their allocation sites, where they know the full root set; a new
//! object that is not yet reachable from a root must sit on the VM stack or
//! be registered via [`Heap::push_root`] before the next such site.

use tracing::debug;

use crate::object::{hash_string, LoxString, Obj, ObjKind, ObjRef, Upvalue};
use crate::table::Table;
use crate::value::Value;

/// First collection happens once this many bytes are live.
const FIRST_GC_THRESHOLD: usize = 1024 * 1024;

/// After a collection the threshold becomes live-bytes times this factor.
const GC_GROW_FACTOR: usize = 2;

/// A pool slot: mark bit, accounted size, payload.
#[derive(Debug)]
struct HeapEntry {
    marked: bool,
    size: usize,
    obj: Obj,
}

/// Counters the collector keeps across its lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    /// Completed collection cycles.
    pub collections: usize,
    /// Objects freed over all cycles.
    pub objects_freed: usize,
    /// Bytes reclaimed over all cycles.
    pub bytes_freed: usize,
}

/// Root providers the heap cannot see on its own.
///
/// The VM implements this over its stack, frames, open upvalues and globals;
/// the compiler passes it through so collections triggered while compiling
/// still see the VM's persistent state.
pub trait GcRoots {
    /// Mark every root by calling `mark_value` / `mark_object` /
    /// `mark_table` on `heap`.
    fn mark_roots(&self, heap: &mut Heap);
}

/// The object heap.
pub struct Heap {
    slots: Vec<Option<HeapEntry>>,
    /// Indices of swept slots available for reuse.
    free: Vec<usize>,
    /// Interning table; weak (pruned of unmarked keys every cycle).
    strings: Table,
    /// Gray worklist for the mark phase.
    gray: Vec<ObjRef>,
    /// Explicitly registered roots for objects mid-construction.
    temp_roots: Vec<Value>,
    bytes_allocated: usize,
    next_gc: usize,
    /// Collect at every allocation site, for shaking out missing roots.
    stress: bool,
    stats: GcStats,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            gray: Vec::new(),
            temp_roots: Vec::new(),
            bytes_allocated: 0,
            next_gc: FIRST_GC_THRESHOLD,
            stress: cfg!(feature = "stress-gc"),
            stats: GcStats::default(),
        }
    }

    /// Force stress mode on or off (tests drive this directly).
    pub fn set_stress(&mut self, stress: bool) {
        self.stress = stress;
    }

    /// True when the next allocation site should run a collection first.
    #[inline]
    pub fn should_collect(&self) -> bool {
        self.stress || self.bytes_allocated > self.next_gc
    }

    /// Bytes currently accounted to live objects.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Lifetime collector counters.
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Number of live objects in the pool.
    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    // === Allocation ===

    /// Moves `obj` into the pool and returns its handle.
    ///
    /// Never collects; the caller decides that at its allocation site.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        let size = obj_size(&obj);
        self.bytes_allocated += size;

        let entry = HeapEntry {
            marked: false,
            size,
            obj,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(entry);
                index
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        ObjRef::new(index)
    }

    /// Interns `chars`: returns the existing string object with this content
    /// or allocates one and registers it in the strings table.
    pub fn intern(&mut self, chars: &str) -> ObjRef {
        let hash = hash_string(chars);
        if let Some(existing) = self.strings.find_string(chars, hash, |r| self.string(r)) {
            return existing;
        }

        let string = self.alloc(Obj::String(LoxString {
            chars: chars.into(),
            hash,
        }));
        self.strings.set(string, hash, Value::Nil);
        string
    }

    /// Registers a value as a root until the matching [`Heap::pop_root`].
    pub fn push_root(&mut self, value: Value) {
        self.temp_roots.push(value);
    }

    /// Releases the most recently registered temp root.
    pub fn pop_root(&mut self) {
        self.temp_roots.pop();
    }

    // === Typed accessors ===
    //
    // Handles are produced only by this heap and stay valid while the object
    // is reachable, so a missing slot or a kind mismatch is a collector or
    // compiler bug, not a recoverable condition.

    fn entry(&self, r: ObjRef) -> &HeapEntry {
        self.slots[r.index()].as_ref().expect("stale object handle")
    }

    fn entry_mut(&mut self, r: ObjRef) -> &mut HeapEntry {
        self.slots[r.index()].as_mut().expect("stale object handle")
    }

    pub fn obj(&self, r: ObjRef) -> &Obj {
        &self.entry(r).obj
    }

    pub fn kind(&self, r: ObjRef) -> ObjKind {
        self.entry(r).obj.kind()
    }

    pub fn string(&self, r: ObjRef) -> &LoxString {
        match &self.entry(r).obj {
            Obj::String(s) => s,
            other => panic!("expected string, found {:?}", other.kind()),
        }
    }

    pub fn function(&self, r: ObjRef) -> &crate::object::Function {
        match &self.entry(r).obj {
            Obj::Function(f) => f,
            other => panic!("expected function, found {:?}", other.kind()),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &crate::object::Closure {
        match &self.entry(r).obj {
            Obj::Closure(c) => c,
            other => panic!("expected closure, found {:?}", other.kind()),
        }
    }

    pub fn closure_mut(&mut self, r: ObjRef) -> &mut crate::object::Closure {
        match &mut self.entry_mut(r).obj {
            Obj::Closure(c) => c,
            other => panic!("expected closure, found {:?}", other.kind()),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &Upvalue {
        match &self.entry(r).obj {
            Obj::Upvalue(u) => u,
            other => panic!("expected upvalue, found {:?}", other.kind()),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut Upvalue {
        match &mut self.entry_mut(r).obj {
            Obj::Upvalue(u) => u,
            other => panic!("expected upvalue, found {:?}", other.kind()),
        }
    }

    pub fn class(&self, r: ObjRef) -> &crate::object::Class {
        match &self.entry(r).obj {
            Obj::Class(c) => c,
            other => panic!("expected class, found {:?}", other.kind()),
        }
    }

    pub fn class_mut(&mut self, r: ObjRef) -> &mut crate::object::Class {
        match &mut self.entry_mut(r).obj {
            Obj::Class(c) => c,
            other => panic!("expected class, found {:?}", other.kind()),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &crate::object::Instance {
        match &self.entry(r).obj {
            Obj::Instance(i) => i,
            other => panic!("expected instance, found {:?}", other.kind()),
        }
    }

    pub fn instance_mut(&mut self, r: ObjRef) -> &mut crate::object::Instance {
        match &mut self.entry_mut(r).obj {
            Obj::Instance(i) => i,
            other => panic!("expected instance, found {:?}", other.kind()),
        }
    }

    pub fn bound_method(&self, r: ObjRef) -> &crate::object::BoundMethod {
        match &self.entry(r).obj {
            Obj::BoundMethod(b) => b,
            other => panic!("expected bound method, found {:?}", other.kind()),
        }
    }

    pub fn native(&self, r: ObjRef) -> &crate::object::Native {
        match &self.entry(r).obj {
            Obj::Native(n) => n,
            other => panic!("expected native, found {:?}", other.kind()),
        }
    }

    /// Whether the slot for `r` is still live (test and assertion use).
    pub fn is_live(&self, r: ObjRef) -> bool {
        self.slots
            .get(r.index())
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Looks up an interned string by content without interning it.
    pub fn find_interned(&self, chars: &str) -> Option<ObjRef> {
        let hash = hash_string(chars);
        self.strings.find_string(chars, hash, |r| self.string(r))
    }

    // === Value formatting ===

    /// Renders a value the way `print` shows it.
    pub fn format_value(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => crate::value::format_number(n),
            Value::Obj(r) => self.format_object(r),
        }
    }

    fn format_object(&self, r: ObjRef) -> String {
        match self.obj(r) {
            Obj::String(s) => s.chars.to_string(),
            Obj::Function(f) => self.format_function_name(f.name),
            Obj::Closure(c) => {
                let function = self.function(c.function);
                self.format_function_name(function.name)
            }
            Obj::Upvalue(_) => "<upvalue>".to_string(),
            Obj::Class(c) => format!("<class {}>", self.string(c.name).chars),
            Obj::Instance(i) => {
                let class = self.class(i.class);
                format!("<{} instance>", self.string(class.name).chars)
            }
            Obj::BoundMethod(b) => {
                let method = self.closure(b.method);
                let function = self.function(method.function);
                let method_name = match function.name {
                    Some(name) => self.string(name).chars.to_string(),
                    None => "script".to_string(),
                };
                let class_name = match b.receiver {
                    Value::Obj(receiver) => {
                        let instance = self.instance(receiver);
                        self.string(self.class(instance.class).name).chars.to_string()
                    }
                    _ => "?".to_string(),
                };
                format!("<method {method_name} of {class_name} instance>")
            }
            Obj::Native(_) => "<native function>".to_string(),
        }
    }

    fn format_function_name(&self, name: Option<ObjRef>) -> String {
        match name {
            Some(name) => format!("<function {}>", self.string(name).chars),
            None => "<script>".to_string(),
        }
    }

    // === Mark phase ===

    /// Marks a value's object, if it has one.
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    /// Marks an object gray: sets its mark bit and queues it for scanning.
    pub fn mark_object(&mut self, r: ObjRef) {
        let entry = self.entry_mut(r);
        if entry.marked {
            return;
        }
        entry.marked = true;
        self.gray.push(r);
    }

    /// Marks every key and value of a strong table (globals, methods).
    pub fn mark_table(&mut self, table: &Table) {
        for i in 0..table.capacity() {
            if let Some((key, value)) = table.entry_at(i) {
                self.mark_object(key);
                self.mark_value(value);
            }
        }
    }

    /// Drains the gray worklist, blackening each object by marking its
    /// children.
    fn trace_references(&mut self) {
        while let Some(r) = self.gray.pop() {
            self.blacken(r);
        }
    }

    /// Marks the children of one gray object.
    ///
    /// Children are read one index at a time so the borrow of `self` is
    /// released before each `mark_*` call; an object may reference itself
    /// (an instance stored in its own field) and marking is idempotent.
    fn blacken(&mut self, r: ObjRef) {
        match self.kind(r) {
            ObjKind::String => {}
            ObjKind::Native => {
                let name = self.native(r).name;
                self.mark_object(name);
            }
            ObjKind::Upvalue => {
                if let Upvalue::Closed(value) = *self.upvalue(r) {
                    self.mark_value(value);
                }
            }
            ObjKind::Function => {
                if let Some(name) = self.function(r).name {
                    self.mark_object(name);
                }
                let constants = self.function(r).chunk.constants.len();
                for i in 0..constants {
                    let value = self.function(r).chunk.constants[i];
                    self.mark_value(value);
                }
            }
            ObjKind::Closure => {
                let function = self.closure(r).function;
                self.mark_object(function);
                let upvalues = self.closure(r).upvalues.len();
                for i in 0..upvalues {
                    let upvalue = self.closure(r).upvalues[i];
                    self.mark_object(upvalue);
                }
            }
            ObjKind::Class => {
                let name = self.class(r).name;
                self.mark_object(name);
                let capacity = self.class(r).methods.capacity();
                for i in 0..capacity {
                    if let Some((key, value)) = self.class(r).methods.entry_at(i) {
                        self.mark_object(key);
                        self.mark_value(value);
                    }
                }
            }
            ObjKind::Instance => {
                let class = self.instance(r).class;
                self.mark_object(class);
                let capacity = self.instance(r).fields.capacity();
                for i in 0..capacity {
                    if let Some((key, value)) = self.instance(r).fields.entry_at(i) {
                        self.mark_object(key);
                        self.mark_value(value);
                    }
                }
            }
            ObjKind::BoundMethod => {
                let bound = self.bound_method(r);
                let (receiver, method) = (bound.receiver, bound.method);
                self.mark_value(receiver);
                self.mark_object(method);
            }
        }
    }

    // === Collection ===

    /// Runs a full cycle: finishes marking from the already-marked roots
    /// (plus registered temp roots), prunes white interned strings, sweeps,
    /// and raises the next trigger threshold.
    ///
    /// Callers mark their roots first, then call this.
    pub fn collect(&mut self) {
        let before = self.bytes_allocated;
        debug!(bytes = before, "gc begin");

        for i in 0..self.temp_roots.len() {
            let value = self.temp_roots[i];
            self.mark_value(value);
        }

        self.trace_references();
        self.remove_white_strings();
        let freed = self.sweep();

        self.next_gc = self.bytes_allocated * GC_GROW_FACTOR;
        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        self.stats.bytes_freed += before - self.bytes_allocated;

        debug!(
            freed_objects = freed,
            freed_bytes = before - self.bytes_allocated,
            live_bytes = self.bytes_allocated,
            next_gc = self.next_gc,
            "gc end"
        );
    }

    /// Drops interning entries whose key did not survive marking, so sweep
    /// cannot free a string the table still points at.
    fn remove_white_strings(&mut self) {
        let mut white = Vec::new();
        for i in 0..self.strings.capacity() {
            if let Some((key, _)) = self.strings.entry_at(i) {
                if !self.entry(key).marked {
                    white.push((key, self.strings.hash_at(i)));
                }
            }
        }
        for (key, hash) in white {
            self.strings.delete(key, hash);
        }
    }

    /// Frees every unmarked slot and clears the mark bit on survivors.
    /// Returns the number of objects freed.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for index in 0..self.slots.len() {
            match &mut self.slots[index] {
                Some(entry) if entry.marked => entry.marked = false,
                Some(entry) => {
                    self.bytes_allocated -= entry.size;
                    self.slots[index] = None;
                    self.free.push(index);
                    freed += 1;
                }
                None => {}
            }
        }
        freed
    }
}

/// Accounted size of an object: the slot payload plus owned buffers.
fn obj_size(obj: &Obj) -> usize {
    use std::mem::size_of;

    let owned = match obj {
        Obj::String(s) => s.chars.len(),
        Obj::Function(f) => {
            f.chunk.code.len() + f.chunk.lines.len() * size_of::<u32>()
                + f.chunk.constants.len() * size_of::<Value>()
        }
        Obj::Closure(c) => c.upvalues.len() * size_of::<ObjRef>(),
        Obj::Class(c) => c.methods.capacity() * size_of::<(Option<ObjRef>, u32, Value)>(),
        Obj::Instance(i) => i.fields.capacity() * size_of::<(Option<ObjRef>, u32, Value)>(),
        Obj::Upvalue(_) | Obj::BoundMethod(_) | Obj::Native(_) => 0,
    };

    size_of::<HeapEntry>() + owned
}
