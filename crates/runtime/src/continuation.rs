//! First-class continuations (§4.8, §9 "Coroutine-like continuations").
//!
//! `call/cc` snapshots the VM stack by shallow copy; `call/dc` captures
//! only an index into the live stack. The source implementation uses
//! `setjmp`/`sigjmp_buf`; a reimplementation without that primitive
//! replaces it with an explicit state enum plus a `Result`-returning
//! interpreter loop (the design note's own suggestion) — the stack copy
//! or index is still captured here, `Escape` is the typed replacement
//! for the jmp-buf.

use idio_core::Value;

use crate::value::HeapRef;

/// Whether a continuation captured the whole stack (`call/cc`) or just a
/// marker into the live one (`call/dc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationKind {
    Full,
    Delimited,
}

/// What the captured stack looks like, depending on `kind`.
#[derive(Debug, Clone)]
pub enum CapturedStack {
    /// `call/cc`: a shallow copy of the entire VM stack at capture time.
    Copy(Vec<Value>),
    /// `call/dc`: just the depth the live stack had at capture time.
    Marker(usize),
}

/// The escape-target replacement for the source's `sigjmp_buf`: invoking
/// a continuation produces this instead of a non-local jump, and the
/// interpreter loop (out of scope here) is expected to unwind to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escape {
    pub pc: usize,
    pub extension_index: usize,
}

/// The heap representation behind `HeapData::Continuation`.
#[derive(Debug, Clone)]
pub struct ContinuationData {
    pub kind: ContinuationKind,
    pub pc: usize,
    pub extension_index: usize,
    pub stack: CapturedStack,
    pub frame: Option<HeapRef>,
    pub environment: Option<HeapRef>,
    pub module: Option<HeapRef>,
    pub escape: Escape,
    /// Deep-copied at capture time (§3: "thread ... hole list").
    pub holes: Vec<Value>,
}

impl ContinuationData {
    /// Capture a continuation from thread state, per §4.8.
    ///
    /// `stack` is the live VM stack; for `Full` it is shallow-copied, for
    /// `Delimited` only its current length is recorded.
    pub fn capture(
        kind: ContinuationKind,
        pc: usize,
        extension_index: usize,
        stack: &[Value],
        frame: Option<HeapRef>,
        environment: Option<HeapRef>,
        module: Option<HeapRef>,
        holes: &[Value],
    ) -> Self {
        let captured = match kind {
            ContinuationKind::Full => CapturedStack::Copy(stack.to_vec()),
            ContinuationKind::Delimited => CapturedStack::Marker(stack.len()),
        };
        ContinuationData {
            kind,
            pc,
            extension_index,
            stack: captured,
            frame,
            environment,
            module,
            escape: Escape { pc, extension_index },
            holes: holes.to_vec(),
        }
    }

    /// Depth of the captured stack view, for printing (`ss=` in the
    /// source's `#<K...>` representation).
    pub fn stack_depth(&self) -> usize {
        match &self.stack {
            CapturedStack::Copy(v) => v.len(),
            CapturedStack::Marker(n) => *n,
        }
    }
}

impl std::fmt::Display for ContinuationData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ContinuationKind::Full => "",
            ContinuationKind::Delimited => "D",
        };
        write!(
            f,
            "#<K{kind} ss={}@PC=[{}]@{}>",
            self.stack_depth(),
            self.extension_index,
            self.pc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idio_core::Immediate;

    #[test]
    fn full_continuation_copies_stack() {
        let stack = vec![Value::from(Immediate::Fixnum(1)), Value::from(Immediate::Fixnum(2))];
        let k = ContinuationData::capture(
            ContinuationKind::Full,
            10,
            0,
            &stack,
            None,
            None,
            None,
            &[],
        );
        assert!(matches!(k.stack, CapturedStack::Copy(ref v) if v.len() == 2));
        assert_eq!(k.stack_depth(), 2);
    }

    #[test]
    fn delimited_continuation_captures_marker_only() {
        let stack = vec![Value::from(Immediate::Fixnum(1)); 5];
        let k = ContinuationData::capture(
            ContinuationKind::Delimited,
            0,
            0,
            &stack,
            None,
            None,
            None,
            &[],
        );
        assert!(matches!(k.stack, CapturedStack::Marker(5)));
    }

    #[test]
    fn display_matches_source_style() {
        let k = ContinuationData::capture(ContinuationKind::Delimited, 3, 1, &[], None, None, None, &[]);
        assert_eq!(k.to_string(), "#<KD ss=0@PC=[1]@3>");
    }
}
