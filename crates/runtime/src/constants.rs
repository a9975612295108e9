//! The constants table (§3 "Constants table").
//!
//! A pair `(array, hash)`: the hash maps constant value → fixnum index,
//! the array provides reverse lookup. `nil` occupies index 0 by
//! convention. Lookup uses the hash except when the key's own hash would
//! be structural-only (pairs), in which case the array is scanned with
//! `equal?`.

use idio_core::{Immediate, Value};

use crate::equality;
use crate::value::{Heap, HeapData};

/// A hashable projection of a `Value`, used as the constants table's
/// hash key. Heap values whose equality is structural-only (pairs) are
/// never used as a hash key — they always fall through to the linear
/// `equal?` scan, per §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HashKey {
    Immediate(Immediate),
    HeapIdentity(u64),
}

fn is_structural_only(heap: &Heap, v: Value) -> bool {
    matches!(
        v.as_heap_ref().map(|r| &heap.get(r).data),
        Some(HeapData::Pair(_))
    )
}

fn hash_key(v: Value) -> HashKey {
    match v {
        Value::Immediate(i) => HashKey::Immediate(i),
        Value::Heap(r) => HashKey::HeapIdentity(r.raw()),
    }
}

/// The process-wide constants table: append-only, `nil` pinned at index
/// 0 by construction.
#[derive(Debug)]
pub struct ConstantsTable {
    array: Vec<Value>,
    index: std::collections::HashMap<HashKey, u32>,
}

impl ConstantsTable {
    /// Create a table with `nil` already interned at index 0, per §3's
    /// convention.
    pub fn new() -> Self {
        let mut t = ConstantsTable {
            array: Vec::new(),
            index: std::collections::HashMap::new(),
        };
        let nil = Value::from(Immediate::NIL);
        t.array.push(nil);
        t.index.insert(hash_key(nil), 0);
        t
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        false // `nil` is always present at index 0.
    }

    /// Reverse lookup: the value at `index`.
    pub fn get(&self, index: u32) -> Option<Value> {
        self.array.get(index as usize).copied()
    }

    /// Lookup-or-extend: find `v`'s index, interning it if not already
    /// present.
    pub fn intern(&mut self, heap: &Heap, v: Value) -> u32 {
        if !is_structural_only(heap, v) {
            if let Some(&idx) = self.index.get(&hash_key(v)) {
                return idx;
            }
        } else {
            // Structural-only key: linear scan with `equal?`.
            for (i, &existing) in self.array.iter().enumerate() {
                if equality::equal(heap, existing, v) {
                    return i as u32;
                }
            }
        }
        let idx = self.array.len() as u32;
        self.array.push(v);
        if !is_structural_only(heap, v) {
            self.index.insert(hash_key(v), idx);
        }
        idx
    }

    /// Lookup without extending; `None` if not present.
    pub fn find(&self, heap: &Heap, v: Value) -> Option<u32> {
        if !is_structural_only(heap, v) {
            self.index.get(&hash_key(v)).copied()
        } else {
            self.array
                .iter()
                .position(|&existing| equality::equal(heap, existing, v))
                .map(|i| i as u32)
        }
    }
}

impl Default for ConstantsTable {
    fn default() -> Self {
        ConstantsTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_at_index_zero() {
        let t = ConstantsTable::new();
        assert_eq!(t.get(0), Some(Value::from(Immediate::NIL)));
    }

    #[test]
    fn intern_is_idempotent() {
        let heap = Heap::new();
        let mut t = ConstantsTable::new();
        let v = Value::from(Immediate::Fixnum(42));
        let a = t.intern(&heap, v);
        let b = t.intern(&heap, v);
        assert_eq!(a, b);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn distinct_values_get_distinct_indices() {
        let heap = Heap::new();
        let mut t = ConstantsTable::new();
        let a = t.intern(&heap, Value::from(Immediate::Fixnum(1)));
        let b = t.intern(&heap, Value::from(Immediate::Fixnum(2)));
        assert_ne!(a, b);
    }

    #[test]
    fn find_without_interning_reports_absence() {
        let heap = Heap::new();
        let t = ConstantsTable::new();
        assert_eq!(t.find(&heap, Value::from(Immediate::Fixnum(99))), None);
    }

    #[test]
    fn structural_pair_keys_use_equal_scan() {
        use crate::value::PairData;
        use crate::vtable::Vtable;
        use std::rc::Rc;

        let mut heap = Heap::new();
        let vt = Rc::new(Vtable::new("pair", None));
        let mk = |h: &mut Heap, vt: Rc<Vtable>| {
            h.alloc(
                vt,
                HeapData::Pair(PairData {
                    head: Value::from(Immediate::Fixnum(1)),
                    tail: Value::from(Immediate::NIL),
                }),
            )
        };
        let p1 = mk(&mut heap, vt.clone());
        let p2 = mk(&mut heap, vt);

        let mut t = ConstantsTable::new();
        let i1 = t.intern(&heap, Value::from(p1));
        let i2 = t.intern(&heap, Value::from(p2));
        assert_eq!(i1, i2, "structurally-equal pairs share one constants-table slot");
    }
}
