//! Three-tier structural equality (§3, §9 "Cyclic graphs").
//!
//! `eq?` is word/identity equality. `eqv?` extends `eq?` to compare
//! immediates and unboxed-scalar heap values (C scalars, bignums) by
//! value rather than identity. `equal?` is full structural equality,
//! walking pairs/arrays/strings/hashes with an explicit cycle-safe
//! *seen* list rather than recursion alone, per the design note: a
//! vector of node-identifier pairs checked by linear scan.

use idio_core::Value;

use crate::value::{CScalar, Heap, HeapData, HeapRef};

/// `eq?`: word equality for immediates, reference identity for heap
/// values.
pub fn eq(a: Value, b: Value) -> bool {
    a == b
}

/// `eqv?`: like `eq?`, but compares C scalars and bignums by value
/// rather than by identity, since boxed numbers needn't be interned.
pub fn eqv(heap: &Heap, a: Value, b: Value) -> bool {
    if eq(a, b) {
        return true;
    }
    match (a.as_heap_ref(), b.as_heap_ref()) {
        (Some(ra), Some(rb)) => match (&heap.get(ra).data, &heap.get(rb).data) {
            (HeapData::CScalar(x), HeapData::CScalar(y)) => cscalar_eqv(x, y),
            (HeapData::Bignum(x), HeapData::Bignum(y)) => {
                x.sign == y.sign && x.exponent == y.exponent && x.significand == y.significand
            }
            _ => false,
        },
        _ => false,
    }
}

fn cscalar_eqv(a: &CScalar, b: &CScalar) -> bool {
    if !a.supports_equality() || !b.supports_equality() {
        // `long double` equality is deliberately unsupported (§9).
        return false;
    }
    use CScalar::*;
    match (a, b) {
        (Char(x), Char(y)) | (SChar(x), SChar(y)) => x == y,
        (UChar(x), UChar(y)) => x == y,
        (Short(x), Short(y)) => x == y,
        (UShort(x), UShort(y)) => x == y,
        (Int(x), Int(y)) => x == y,
        (UInt(x), UInt(y)) => x == y,
        (Long(x), Long(y)) | (LongLong(x), LongLong(y)) => x == y,
        (ULong(x), ULong(y)) | (ULongLong(x), ULongLong(y)) => x == y,
        (Float(x), Float(y)) => x == y,
        (Double(x), Double(y)) => x == y,
        (Pointer(x), Pointer(y)) => x == y,
        _ => false,
    }
}

/// A cycle-safe *seen* list of reference pairs already being compared;
/// re-entry on a pair already in the list returns `true` (§9).
#[derive(Default)]
struct SeenList {
    pairs: Vec<(HeapRef, HeapRef)>,
}

impl SeenList {
    fn contains(&self, a: HeapRef, b: HeapRef) -> bool {
        self.pairs.iter().any(|&(x, y)| x == a && y == b)
    }

    fn push(&mut self, a: HeapRef, b: HeapRef) {
        self.pairs.push((a, b));
    }
}

/// `equal?`: full structural equality, cycle-safe.
pub fn equal(heap: &Heap, a: Value, b: Value) -> bool {
    let mut seen = SeenList::default();
    equal_inner(heap, a, b, &mut seen)
}

fn equal_inner(heap: &Heap, a: Value, b: Value, seen: &mut SeenList) -> bool {
    if eqv(heap, a, b) {
        return true;
    }
    let (ra, rb) = match (a.as_heap_ref(), b.as_heap_ref()) {
        (Some(ra), Some(rb)) => (ra, rb),
        _ => return false,
    };
    if seen.contains(ra, rb) {
        return true;
    }
    seen.push(ra, rb);

    match (&heap.get(ra).data, &heap.get(rb).data) {
        (HeapData::String(x), HeapData::String(y)) => x.bytes == y.bytes,
        (HeapData::Symbol(x), HeapData::Symbol(y)) => x.name == y.name,
        (HeapData::Keyword(x), HeapData::Keyword(y)) => x.name == y.name,
        (HeapData::Pair(x), HeapData::Pair(y)) => {
            equal_inner(heap, x.head, y.head, seen) && equal_inner(heap, x.tail, y.tail, seen)
        }
        (HeapData::Array(x), HeapData::Array(y)) => {
            x.used == y.used
                && x.storage[..x.used]
                    .iter()
                    .zip(y.storage[..y.used].iter())
                    .all(|(&ea, &eb)| equal_inner(heap, ea, eb, seen))
        }
        (HeapData::Bitset(x), HeapData::Bitset(y)) => {
            x.len_bits == y.len_bits && x.words == y.words
        }
        (HeapData::Substring(x), HeapData::Substring(y)) => {
            substring_bytes(heap, ra) == substring_bytes(heap, rb) && {
                let _ = (x, y);
                true
            }
        }
        _ => false,
    }
}

fn substring_bytes(heap: &Heap, r: HeapRef) -> Vec<u8> {
    if let HeapData::Substring(s) = &heap.get(r).data {
        if let HeapData::String(parent) = &heap.get(s.parent).data {
            return parent.bytes[s.offset..s.offset + s.len].to_vec();
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{PairData, StringData, StringRole, StringWidth};
    use crate::vtable::Vtable;
    use idio_core::Immediate;
    use std::rc::Rc;

    fn test_vtable() -> Rc<Vtable> {
        Rc::new(Vtable::new("x", None))
    }

    #[test]
    fn eq_is_word_equality_for_immediates() {
        assert!(eq(Value::from(Immediate::Fixnum(5)), Value::from(Immediate::Fixnum(5))));
        assert!(!eq(Value::from(Immediate::Fixnum(5)), Value::from(Immediate::Fixnum(6))));
    }

    #[test]
    fn eqv_compares_cscalars_by_value() {
        let mut heap = Heap::new();
        let a = heap.alloc(test_vtable(), HeapData::CScalar(CScalar::Int(3)));
        let b = heap.alloc(test_vtable(), HeapData::CScalar(CScalar::Int(3)));
        assert!(eqv(&heap, Value::from(a), Value::from(b)));
    }

    #[test]
    fn longdouble_eqv_is_always_false() {
        let mut heap = Heap::new();
        let a = heap.alloc(test_vtable(), HeapData::CScalar(CScalar::LongDouble(1.0)));
        let b = heap.alloc(test_vtable(), HeapData::CScalar(CScalar::LongDouble(1.0)));
        assert!(!eqv(&heap, Value::from(a), Value::from(b)));
    }

    #[test]
    fn equal_compares_strings_structurally() {
        let mut heap = Heap::new();
        let mk = |h: &mut Heap| {
            h.alloc(
                test_vtable(),
                HeapData::String(StringData {
                    bytes: b"hi".to_vec(),
                    width: StringWidth::W1,
                    role: StringRole::ORDINARY,
                }),
            )
        };
        let a = mk(&mut heap);
        let b = mk(&mut heap);
        assert_ne!(a, b, "distinct allocations");
        assert!(equal(&heap, Value::from(a), Value::from(b)));
    }

    #[test]
    fn equal_handles_self_referential_pair() {
        let mut heap = Heap::new();
        let p = heap.alloc(
            test_vtable(),
            HeapData::Pair(PairData {
                head: Value::from(Immediate::Fixnum(1)),
                tail: Value::from(Immediate::NIL),
            }),
        );
        // Make the pair point to itself, forming a cycle.
        if let HeapData::Pair(pd) = &mut heap.get_mut(p).data {
            pd.tail = Value::from(p);
        }
        // equal? of a cyclic pair against itself must terminate and
        // return true rather than looping forever.
        assert!(equal(&heap, Value::from(p), Value::from(p)));
    }
}
