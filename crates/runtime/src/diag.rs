//! Diagnostics: `idio-dump` / `idio-debug` (§6 "Utility surface").
//!
//! Grounded on the runtime crate's SON (Seq Object Notation) printer for
//! the structured-tree rendering style and its plain `println!`-based
//! stack dumper for the destination (stderr/stdout, no `tracing`
//! dependency at this layer — see [`crate::report`]).

use std::fmt::Write as _;

use idio_core::Value;

use crate::print;
use crate::value::{Heap, HeapData};

/// `idio-dump`: a structured, indentation-free tree dump of a value's
/// heap shape, not just its printed representation — useful for
/// inspecting vtable/type info a plain `print` hides.
pub fn dump(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    dump_inner(heap, v, &mut out, 0);
    out
}

fn dump_inner(heap: &Heap, v: Value, out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    match v {
        Value::Immediate(imm) => {
            let _ = writeln!(out, "{indent}<immediate {imm}>");
        }
        Value::Heap(r) => {
            let obj = heap.get(r);
            let _ = writeln!(
                out,
                "{indent}<{} @{} gen={}> {}",
                obj.data.type_name(),
                r.raw(),
                obj.vtable.generation(),
                print::print(heap, v)
            );
            if let HeapData::Pair(p) = &obj.data {
                dump_inner(heap, p.head, out, depth + 1);
                dump_inner(heap, p.tail, out, depth + 1);
            }
        }
    }
}

/// `idio-debug fmt o`: print a debug-formatted line to stderr, used from
/// guest code as a `dbg!`-equivalent. `fmt` is a free-form label the
/// caller supplies (mirroring the guest primitive's first argument).
pub fn debug(heap: &Heap, fmt: &str, o: Value) {
    eprintln!("{fmt}: {}", print::print(heap, o));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{PairData, StringData, StringRole, StringWidth};
    use crate::vtable::Vtable;
    use idio_core::Immediate;
    use std::rc::Rc;

    #[test]
    fn dump_shows_type_and_generation() {
        let mut heap = Heap::new();
        let vt = Rc::new(Vtable::new("string", None));
        let r = heap.alloc(
            vt,
            HeapData::String(StringData {
                bytes: b"x".to_vec(),
                width: StringWidth::W1,
                role: StringRole::ORDINARY,
            }),
        );
        let out = dump(&heap, Value::from(r));
        assert!(out.contains("<string"));
        assert!(out.contains("gen=0"));
    }

    #[test]
    fn dump_recurses_into_pairs() {
        let mut heap = Heap::new();
        let vt = Rc::new(Vtable::new("pair", None));
        let p = heap.alloc(
            vt,
            HeapData::Pair(PairData {
                head: Value::from(Immediate::Fixnum(1)),
                tail: Value::from(Immediate::NIL),
            }),
        );
        let out = dump(&heap, Value::from(p));
        assert!(out.contains("<immediate 1>"));
        assert!(out.contains("<immediate nil>"));
    }
}
