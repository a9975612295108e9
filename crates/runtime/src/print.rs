//! Printing with cycle-safe traversal (§9 "Cyclic graphs").
//!
//! On re-entry for a value already mid-traversal, the printer renders
//! `#<^{T@p}>` rather than recursing forever, where `T` is the type name
//! and `p` is the heap reference's raw index (standing in for the
//! source's pointer value).

use std::fmt::Write as _;

use idio_core::{Immediate, Value};

use crate::value::{Heap, HeapData, HeapRef};
use crate::vtable::Vtable;

/// Tracks heap references currently being printed, to detect cycles.
#[derive(Default)]
struct Seen {
    refs: Vec<HeapRef>,
}

impl Seen {
    fn contains(&self, r: HeapRef) -> bool {
        self.refs.contains(&r)
    }

    fn push(&mut self, r: HeapRef) {
        self.refs.push(r);
    }

    fn pop(&mut self) {
        self.refs.pop();
    }
}

/// Write the `write`-style (machine-readable) representation of `v`.
pub fn print(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    let mut seen = Seen::default();
    write_value(heap, v, &mut out, &mut seen, false);
    out
}

/// Write the `display`-style (human-readable) representation of `v`:
/// strings/symbols render their contents instead of a quoted literal.
pub fn display(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    let mut seen = Seen::default();
    write_value(heap, v, &mut out, &mut seen, true);
    out
}

fn write_value(heap: &Heap, v: Value, out: &mut String, seen: &mut Seen, display_mode: bool) {
    match v {
        Value::Immediate(imm) => {
            let _ = write!(out, "{imm}");
        }
        Value::Heap(r) => write_heap(heap, r, out, seen, display_mode),
    }
}

fn write_heap(heap: &Heap, r: HeapRef, out: &mut String, seen: &mut Seen, display_mode: bool) {
    if seen.contains(r) {
        let type_name = heap.get(r).data.type_name();
        let _ = write!(out, "#<^{{{}@{}}}>", type_name, r.raw());
        return;
    }

    // Custom `->string`/`->display-string` vtable methods take priority,
    // per the dynamic-dispatch design note.
    let obj = heap.get(r);
    let custom = if display_mode {
        obj.vtable.resolve_to_display_string()
    } else {
        obj.vtable.resolve_to_string()
    };
    if let Some(method) = custom {
        if let Ok(rendered) = method(heap, r, &[]) {
            let _ = write!(out, "{}", render_method_result(heap, rendered));
            return;
        }
    }

    seen.push(r);
    write_heap_default(heap, r, out, seen, display_mode);
    seen.pop();
}

fn render_method_result(heap: &Heap, v: Value) -> String {
    match v {
        Value::Immediate(Immediate::Constant(_)) | Value::Immediate(Immediate::Fixnum(_)) => {
            v.to_string()
        }
        Value::Heap(r) => match &heap.get(r).data {
            HeapData::String(s) => String::from_utf8_lossy(&s.bytes).into_owned(),
            _ => v.to_string(),
        },
        _ => v.to_string(),
    }
}

fn write_heap_default(heap: &Heap, r: HeapRef, out: &mut String, seen: &mut Seen, display_mode: bool) {
    match &heap.get(r).data {
        HeapData::String(s) => {
            let text = String::from_utf8_lossy(&s.bytes);
            if display_mode {
                let _ = write!(out, "{text}");
            } else {
                let _ = write!(out, "{:?}", text.as_ref());
            }
        }
        HeapData::Substring(sub) => {
            if let HeapData::String(parent) = &heap.get(sub.parent).data {
                let slice = &parent.bytes[sub.offset..sub.offset + sub.len];
                let text = String::from_utf8_lossy(slice);
                if display_mode {
                    let _ = write!(out, "{text}");
                } else {
                    let _ = write!(out, "{:?}", text.as_ref());
                }
            }
        }
        HeapData::Symbol(s) => {
            let _ = write!(out, "{}", s.name);
        }
        HeapData::Keyword(k) => {
            let _ = write!(out, "{}:", k.name);
        }
        HeapData::Pair(_) => write_pair(heap, r, out, seen, display_mode),
        HeapData::Array(a) => {
            out.push_str("#[ ");
            for &elem in &a.storage[..a.used] {
                write_value(heap, elem, out, seen, display_mode);
                out.push(' ');
            }
            out.push(']');
        }
        HeapData::Hash(h) => {
            let _ = write!(out, "#<hash count={}>", h.count);
        }
        HeapData::Closure(c) => {
            let _ = write!(out, "#<closure@{}>", c.code_pc);
        }
        HeapData::Primitive(p) => {
            let _ = write!(out, "#<primitive {}>", p.name);
        }
        HeapData::Bignum(_) => out.push_str("#<bignum>"),
        HeapData::Module(m) => {
            let _ = write!(out, "#<module {}>", m.name);
        }
        HeapData::Frame(_) => out.push_str("#<frame>"),
        HeapData::Handle(h) => {
            let _ = write!(out, "#<handle {}>", h.name);
        }
        HeapData::StructType(s) => {
            let _ = write!(out, "#<struct-type {}>", s.name);
        }
        HeapData::StructInstance(_) => out.push_str("#<struct-instance>"),
        HeapData::Thread(t) => {
            let _ = write!(out, "#<thread PC=[{}]@{}>", t.extension_index, t.pc);
        }
        HeapData::Continuation(k) => {
            let _ = write!(out, "{k}");
        }
        HeapData::Bitset(b) => {
            let _ = write!(out, "#<bitset len={}>", b.len_bits);
        }
        HeapData::CScalar(_) => out.push_str("#<C-scalar>"),
        HeapData::InstrBuf(_) => out.push_str("#<instruction-buffer>"),
    }
}

fn write_pair(heap: &Heap, r: HeapRef, out: &mut String, seen: &mut Seen, display_mode: bool) {
    out.push('(');
    let mut cur = Value::Heap(r);
    let mut first = true;
    loop {
        match cur {
            Value::Heap(cr) => {
                if seen.contains(cr) && !first {
                    let type_name = heap.get(cr).data.type_name();
                    let _ = write!(out, " . #<^{{{}@{}}}>", type_name, cr.raw());
                    break;
                }
                match &heap.get(cr).data {
                    HeapData::Pair(p) => {
                        if !first {
                            out.push(' ');
                        }
                        first = false;
                        if cr != r {
                            seen.push(cr);
                        }
                        write_value(heap, p.head, out, seen, display_mode);
                        cur = p.tail;
                    }
                    _ => {
                        out.push_str(" . ");
                        write_value(heap, cur, out, seen, display_mode);
                        break;
                    }
                }
            }
            Value::Immediate(Immediate::Constant(c)) if c == idio_core::tagged::idio_const::NIL => {
                break;
            }
            other => {
                out.push_str(" . ");
                write_value(heap, other, out, seen, display_mode);
                break;
            }
        }
    }
    out.push(')');
}

/// A vtable for `string`-like types carrying no custom `->string`
/// method — used by tests and as the default a fresh runtime installs.
pub fn default_vtable(type_name: &'static str) -> Vtable {
    Vtable::new(type_name, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{PairData, StringData, StringRole, StringWidth};
    use std::rc::Rc;

    fn heap_with_vtable() -> (Heap, Rc<Vtable>) {
        (Heap::new(), Rc::new(default_vtable("x")))
    }

    #[test]
    fn prints_fixnum() {
        let heap = Heap::new();
        assert_eq!(print(&heap, Value::from(Immediate::Fixnum(42))), "42");
    }

    #[test]
    fn prints_string_quoted_but_displays_bare() {
        let (mut heap, vt) = heap_with_vtable();
        let r = heap.alloc(
            vt,
            HeapData::String(StringData {
                bytes: b"hi".to_vec(),
                width: StringWidth::W1,
                role: StringRole::ORDINARY,
            }),
        );
        assert_eq!(print(&heap, Value::from(r)), "\"hi\"");
        assert_eq!(display(&heap, Value::from(r)), "hi");
    }

    #[test]
    fn prints_list() {
        let (mut heap, vt) = heap_with_vtable();
        let tail = heap.alloc(
            vt.clone(),
            HeapData::Pair(PairData {
                head: Value::from(Immediate::Fixnum(2)),
                tail: Value::from(Immediate::NIL),
            }),
        );
        let head = heap.alloc(
            vt,
            HeapData::Pair(PairData {
                head: Value::from(Immediate::Fixnum(1)),
                tail: Value::from(tail),
            }),
        );
        assert_eq!(print(&heap, Value::from(head)), "(1 2)");
    }

    #[test]
    fn cyclic_pair_prints_marker_instead_of_looping() {
        let (mut heap, vt) = heap_with_vtable();
        let p = heap.alloc(
            vt,
            HeapData::Pair(PairData {
                head: Value::from(Immediate::Fixnum(1)),
                tail: Value::from(Immediate::NIL),
            }),
        );
        if let HeapData::Pair(pd) = &mut heap.get_mut(p).data {
            pd.tail = Value::from(p);
        }
        let rendered = print(&heap, Value::from(p));
        assert!(rendered.contains("#<^{pair@"), "got: {rendered}");
    }
}
