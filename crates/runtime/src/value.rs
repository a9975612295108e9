//! Heap value variants and the arena that owns them (§3).
//!
//! The core crate models the outer tagged-value sum as
//! `idio_core::Value = Immediate | Heap(HeapRef)`; this module supplies
//! what a `HeapRef` actually addresses. `Heap` is the explicit runtime
//! value the design note ("Global mutable state") calls for: everything
//! process-wide in the source implementation (constants table, intern
//! pools, module registry) is reachable from here rather than scattered
//! across statics.

use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;
use idio_core::Value;

pub use idio_core::HeapRef;

bitflags! {
    /// Per-object GC bookkeeping flags (§3: "a small set of GC flags").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcFlags: u8 {
        const FREE  = 0b001;
        const CONST = 0b010;
        /// Set while a value is mid-traversal by print/equal, to detect
        /// cycles (§9 "Cyclic graphs").
        const SEEN  = 0b100;
    }
}

bitflags! {
    /// Mutually-exclusive string role flags (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StringRole: u8 {
        const ORDINARY      = 0b00001;
        const OCTET_STRING  = 0b00010;
        const PATHNAME      = 0b00100;
        const FD_PATHNAME   = 0b01000;
        const FIFO_PATHNAME = 0b10000;
    }
}

/// Code-point width of a string's byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringWidth {
    W1,
    W2,
    W4,
}

#[derive(Debug, Clone)]
pub struct StringData {
    pub bytes: Vec<u8>,
    pub width: StringWidth,
    pub role: StringRole,
}

#[derive(Debug, Clone)]
pub struct SubstringData {
    pub len: usize,
    pub offset: usize,
    pub parent: HeapRef,
}

#[derive(Debug, Clone)]
pub struct SymbolData {
    pub name: Rc<str>,
}

#[derive(Debug, Clone)]
pub struct KeywordData {
    pub name: Rc<str>,
}

#[derive(Debug, Clone, Copy)]
pub struct PairData {
    pub head: Value,
    pub tail: Value,
}

#[derive(Debug, Clone)]
pub struct ArrayData {
    pub used: usize,
    pub default: Value,
    pub storage: Vec<Value>,
}

impl ArrayData {
    pub fn allocated(&self) -> usize {
        self.storage.len()
    }
}

/// A hash's key-equality predicate / hash function may be a native
/// comparator or a guest closure reference (§3).
#[derive(Debug, Clone)]
pub enum KeyStrategy {
    Native,
    Guest(HeapRef),
}

#[derive(Debug, Clone)]
pub struct HashData {
    pub buckets: Vec<Vec<(Value, Value)>>,
    pub count: usize,
    pub mask: usize,
    pub key_equality: KeyStrategy,
    pub hash_function: KeyStrategy,
}

impl HashData {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(8);
        HashData {
            buckets: vec![Vec::new(); capacity],
            count: 0,
            mask: capacity - 1,
            key_equality: KeyStrategy::Native,
            hash_function: KeyStrategy::Native,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClosureData {
    pub code_pc: usize,
    pub frame: Option<HeapRef>,
    pub module: Option<HeapRef>,
    /// Index into the constants table.
    pub signature_index: u32,
    /// Index into the constants table.
    pub docstring_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(u16),
    Variadic { min: u16 },
}

#[derive(Clone)]
pub struct PrimitiveData {
    pub name: Rc<str>,
    pub arity: Arity,
}

impl std::fmt::Debug for PrimitiveData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveData")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

#[derive(Debug, Clone)]
pub struct BignumData {
    pub sign: Sign,
    pub exponent: i64,
    pub significand: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct ModuleData {
    pub name: Rc<str>,
    pub exports: Vec<Value>,
    pub imports: Vec<HeapRef>,
    pub symbols: HashMap<Rc<str>, Value>,
}

#[derive(Debug, Clone)]
pub struct FrameData {
    pub parent: Option<HeapRef>,
    pub args: Vec<Value>,
    pub tail_rest: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructFieldKind {
    Value,
}

#[derive(Debug, Clone)]
pub struct StructTypeData {
    pub name: Rc<str>,
    pub parent: Option<HeapRef>,
    pub fields: Vec<Rc<str>>,
}

#[derive(Debug, Clone)]
pub struct StructInstanceData {
    pub struct_type: HeapRef,
    pub fields: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ThreadData {
    pub pc: usize,
    pub extension_index: usize,
    pub value_register: Value,
    pub function_register: Value,
    pub expression_register: Value,
    pub stack: Vec<Value>,
    pub frame: Option<HeapRef>,
    pub environment: Option<HeapRef>,
    pub module: Option<HeapRef>,
    pub input_handle: Option<HeapRef>,
    pub output_handle: Option<HeapRef>,
    pub error_handle: Option<HeapRef>,
    /// `longjmp`-style escape target; `None` means "no escape pending".
    pub jump_target: Option<usize>,
    pub holes: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CScalar {
    Char(i8),
    SChar(i8),
    UChar(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    LongLong(i64),
    ULongLong(u64),
    Float(f32),
    Double(f64),
    /// `long double` equality is deliberately unsupported (§9 open
    /// questions) — stored as the best native approximation available.
    LongDouble(f64),
    Pointer(usize),
}

impl CScalar {
    /// Per the open question: rather than an ULP comparator, keep the
    /// explicit "unsupported" behaviour for `LongDouble` — any two
    /// long-double scalars compare unequal, including to themselves.
    pub fn supports_equality(&self) -> bool {
        !matches!(self, CScalar::LongDouble(_))
    }
}

#[derive(Debug, Clone)]
pub struct BitsetData {
    pub len_bits: usize,
    pub words: Vec<u64>,
}

impl BitsetData {
    pub fn new(len_bits: usize) -> Self {
        BitsetData {
            len_bits,
            words: vec![0u64; len_bits.div_ceil(64)],
        }
    }

    pub fn get(&self, bit: usize) -> bool {
        assert!(bit < self.len_bits);
        (self.words[bit / 64] >> (bit % 64)) & 1 != 0
    }

    pub fn set(&mut self, bit: usize, value: bool) {
        assert!(bit < self.len_bits);
        let word = &mut self.words[bit / 64];
        if value {
            *word |= 1 << (bit % 64);
        } else {
            *word &= !(1 << (bit % 64));
        }
    }
}

/// The variant sum for everything a `HeapRef` can address (§3).
#[derive(Debug, Clone)]
pub enum HeapData {
    String(StringData),
    Substring(SubstringData),
    Symbol(SymbolData),
    Keyword(KeywordData),
    Pair(PairData),
    Array(ArrayData),
    Hash(HashData),
    Closure(ClosureData),
    Primitive(PrimitiveData),
    Bignum(BignumData),
    Module(ModuleData),
    Frame(FrameData),
    Handle(crate::handle::HandleData),
    StructType(StructTypeData),
    StructInstance(StructInstanceData),
    Thread(ThreadData),
    Continuation(crate::continuation::ContinuationData),
    Bitset(BitsetData),
    CScalar(CScalar),
    /// Transient, internal to codegen; never reachable from guest code.
    InstrBuf(idio_core::InstrBuf),
}

impl HeapData {
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapData::String(_) => "string",
            HeapData::Substring(_) => "substring",
            HeapData::Symbol(_) => "symbol",
            HeapData::Keyword(_) => "keyword",
            HeapData::Pair(_) => "pair",
            HeapData::Array(_) => "array",
            HeapData::Hash(_) => "hash",
            HeapData::Closure(_) => "closure",
            HeapData::Primitive(_) => "primitive",
            HeapData::Bignum(_) => "bignum",
            HeapData::Module(_) => "module",
            HeapData::Frame(_) => "frame",
            HeapData::Handle(_) => "handle",
            HeapData::StructType(_) => "struct-type",
            HeapData::StructInstance(_) => "struct-instance",
            HeapData::Thread(_) => "thread",
            HeapData::Continuation(_) => "continuation",
            HeapData::Bitset(_) => "bitset",
            HeapData::CScalar(_) => "C-scalar",
            HeapData::InstrBuf(_) => "instruction-buffer",
        }
    }
}

/// One heap-allocated object: its vtable, GC flags, and data (§3).
#[derive(Debug, Clone)]
pub struct HeapObject {
    pub vtable: Rc<crate::vtable::Vtable>,
    pub flags: GcFlags,
    pub data: HeapData,
}

/// The arena owning every heap object, plus the process-wide state the
/// design notes say should live in one explicit runtime value: the
/// constants table, intern pools, and module registry.
///
/// Strong ownership only (§3, "Lifecycle"): a `Heap` never hands out weak
/// references, and dropping it drops everything it owns.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Option<HeapObject>>,
    free_list: Vec<usize>,
    symbol_intern: HashMap<Rc<str>, HeapRef>,
    keyword_intern: HashMap<Rc<str>, HeapRef>,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    pub fn alloc(&mut self, vtable: Rc<crate::vtable::Vtable>, data: HeapData) -> HeapRef {
        let obj = HeapObject {
            vtable,
            flags: GcFlags::empty(),
            data,
        };
        if let Some(idx) = self.free_list.pop() {
            self.objects[idx] = Some(obj);
            HeapRef::from_raw(idx as u64)
        } else {
            self.objects.push(Some(obj));
            HeapRef::from_raw((self.objects.len() - 1) as u64)
        }
    }

    pub fn get(&self, r: HeapRef) -> &HeapObject {
        self.objects[r.raw() as usize]
            .as_ref()
            .expect("dangling HeapRef: object already freed")
    }

    pub fn get_mut(&mut self, r: HeapRef) -> &mut HeapObject {
        self.objects[r.raw() as usize]
            .as_mut()
            .expect("dangling HeapRef: object already freed")
    }

    /// Intern a symbol name, returning the existing reference if the byte
    /// sequence has already been interned (§3: "unique per byte
    /// sequence").
    pub fn intern_symbol(&mut self, name: &str, vtable: Rc<crate::vtable::Vtable>) -> HeapRef {
        if let Some(&r) = self.symbol_intern.get(name) {
            return r;
        }
        let name: Rc<str> = Rc::from(name);
        let r = self.alloc(
            vtable,
            HeapData::Symbol(SymbolData { name: name.clone() }),
        );
        self.symbol_intern.insert(name, r);
        r
    }

    /// Intern a keyword name, distinct from the symbol namespace (§3).
    pub fn intern_keyword(&mut self, name: &str, vtable: Rc<crate::vtable::Vtable>) -> HeapRef {
        if let Some(&r) = self.keyword_intern.get(name) {
            return r;
        }
        let name: Rc<str> = Rc::from(name);
        let r = self.alloc(
            vtable,
            HeapData::Keyword(KeywordData { name: name.clone() }),
        );
        self.keyword_intern.insert(name, r);
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vtable::Vtable;

    fn test_vtable() -> Rc<Vtable> {
        Rc::new(Vtable::new("string", None))
    }

    #[test]
    fn alloc_roundtrips() {
        let mut heap = Heap::new();
        let r = heap.alloc(
            test_vtable(),
            HeapData::String(StringData {
                bytes: b"hi".to_vec(),
                width: StringWidth::W1,
                role: StringRole::ORDINARY,
            }),
        );
        assert_eq!(heap.get(r).data.type_name(), "string");
    }

    #[test]
    fn symbol_interning_is_unique_per_name() {
        let mut heap = Heap::new();
        let vt = Rc::new(Vtable::new("symbol", None));
        let a = heap.intern_symbol("foo", vt.clone());
        let b = heap.intern_symbol("foo", vt.clone());
        let c = heap.intern_symbol("bar", vt);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn symbol_and_keyword_namespaces_are_distinct() {
        let mut heap = Heap::new();
        let vt = Rc::new(Vtable::new("x", None));
        let sym = heap.intern_symbol("name", vt.clone());
        let kw = heap.intern_keyword("name", vt);
        assert_ne!(sym, kw);
    }

    #[test]
    fn bitset_get_set() {
        let mut bs = BitsetData::new(130);
        assert!(!bs.get(129));
        bs.set(129, true);
        assert!(bs.get(129));
        bs.set(129, false);
        assert!(!bs.get(129));
    }

    #[test]
    fn long_double_equality_unsupported() {
        let a = CScalar::LongDouble(1.0);
        assert!(!a.supports_equality());
        let b = CScalar::Double(1.0);
        assert!(b.supports_equality());
    }
}
